use storage::types::{JobId, TableId};

use crate::error::{ErrorKind, OutputError};
use crate::load::metadata::MetadataOperation;

/// Lifecycle of a deferred load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadTaskState {
    Created,
    Submitted { job_id: JobId },
    Succeeded { job_id: JobId },
    /// `job_id` is `None` when the task failed before a job was submitted.
    Failed {
        job_id: Option<JobId>,
        error: OutputError,
    },
}

impl LoadTaskState {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            LoadTaskState::Created => None,
            LoadTaskState::Submitted { job_id } | LoadTaskState::Succeeded { job_id } => {
                Some(*job_id)
            }
            LoadTaskState::Failed { job_id, .. } => *job_id,
        }
    }
}

/// Load of one destination table, tracked by [`crate::load::LoadTaskQueue`].
#[derive(Debug, Clone)]
pub struct DeferredLoadTask {
    destination: TableId,
    freshly_created: bool,
    metadata: Vec<MetadataOperation>,
    state: LoadTaskState,
}

impl DeferredLoadTask {
    pub fn new(destination: TableId, freshly_created: bool, metadata: Vec<MetadataOperation>) -> Self {
        Self {
            destination,
            freshly_created,
            metadata,
            state: LoadTaskState::Created,
        }
    }

    /// A task for a destination whose preparation already failed.
    pub fn failed(destination: TableId, error: OutputError) -> Self {
        Self {
            destination,
            freshly_created: false,
            metadata: Vec::new(),
            state: LoadTaskState::Failed {
                job_id: None,
                error,
            },
        }
    }

    pub fn destination(&self) -> &TableId {
        &self.destination
    }

    pub fn metadata(&self) -> &[MetadataOperation] {
        &self.metadata
    }

    pub fn state(&self) -> &LoadTaskState {
        &self.state
    }

    pub(crate) fn set_state(&mut self, state: LoadTaskState) {
        self.state = state;
    }

    /// Returns `true` when the destination table has to be dropped after a failure.
    ///
    /// Only tables created by this run and left without data qualify. A failed metadata
    /// update happens after the data landed, so that table stays.
    pub fn needs_compensation(&self) -> bool {
        match &self.state {
            LoadTaskState::Failed { error, .. } => {
                self.freshly_created && error.kind() != ErrorKind::MetadataUpdateFailed
            }
            _ => false,
        }
    }
}
