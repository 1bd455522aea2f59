use std::time::Duration;

use config::shared::JobPollingConfig;
use metrics::counter;
use rand::Rng;
use storage::StorageClient;
use storage::types::{Job, JobId, JobStatus, LoadRequest, TableId};
use tracing::{debug, info, warn};

use crate::bail;
use crate::error::{ErrorKind, OutputError, OutputResult};
use crate::load::metadata::MetadataOperation;
use crate::load::task::{DeferredLoadTask, LoadTaskState};
use crate::metrics::{
    ERROR_KIND_LABEL, OUTPUT_COMPENSATING_TABLE_DROPS_TOTAL, OUTPUT_LOAD_TASKS_FAILED_TOTAL,
    OUTPUT_LOAD_TASKS_SUBMITTED_TOTAL, OUTPUT_LOAD_TASKS_SUCCEEDED_TOTAL, TABLE_ID_LABEL,
};
use crate::output_error;

/// Tracks submitted load jobs until all of them finish.
///
/// Jobs are submitted as soon as they are enqueued. [`LoadTaskQueue::wait_for_all`] polls them
/// concurrently and reports outcomes in submission order.
#[derive(Debug)]
pub struct LoadTaskQueue<C> {
    client: C,
    polling: JobPollingConfig,
    tasks: Vec<DeferredLoadTask>,
}

impl<C> LoadTaskQueue<C>
where
    C: StorageClient,
{
    pub fn new(client: C, polling: JobPollingConfig) -> Self {
        Self {
            client,
            polling,
            tasks: Vec::new(),
        }
    }

    /// Submits the load and starts tracking it.
    ///
    /// A rejected submission is recorded as a failed task and reported by
    /// [`LoadTaskQueue::wait_for_all`].
    pub async fn enqueue(
        &mut self,
        request: LoadRequest,
        freshly_created: bool,
        metadata: Vec<MetadataOperation>,
    ) {
        let table_id = request.table_id.clone();
        let state = match self.client.submit_load(&request).await {
            Ok(job_id) => {
                debug!(%table_id, %job_id, freshly_created, "load job submitted");
                counter!(OUTPUT_LOAD_TASKS_SUBMITTED_TOTAL, TABLE_ID_LABEL => table_id.to_string())
                    .increment(1);
                LoadTaskState::Submitted { job_id }
            }
            Err(err) => {
                let detail = format!("Failed to load table \"{table_id}\": {}", err.message);
                LoadTaskState::Failed {
                    job_id: None,
                    error: OutputError::from_client_error(
                        ErrorKind::TableLoadFailed,
                        "Load job submission failed",
                        detail,
                        err,
                    ),
                }
            }
        };

        let mut task = DeferredLoadTask::new(table_id, freshly_created, metadata);
        task.set_state(state);
        self.tasks.push(task);
    }

    /// Records a destination that failed before its load could be submitted.
    ///
    /// The error detail is prefixed with the destination unless it already names it.
    pub fn push_failed(&mut self, destination: TableId, error: OutputError) {
        let table = destination.to_string();
        let error = if error.details().iter().any(|detail| detail.contains(&table)) {
            error
        } else {
            error.with_context(format_args!("Failed to load table \"{table}\""))
        };

        debug!(table_id = %destination, %error, "destination failed before load");
        self.tasks.push(DeferredLoadTask::failed(destination, error));
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every task to finish.
    ///
    /// Returns the job ids in submission order when all loads succeeded. Otherwise tables
    /// created by this run for failed loads are dropped and one error listing every failed
    /// destination is returned.
    pub async fn wait_for_all(mut self) -> OutputResult<Vec<JobId>> {
        let mut handles = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let handle = match task.state() {
                LoadTaskState::Submitted { job_id } => {
                    let client = self.client.clone();
                    let polling = self.polling.clone();
                    let table_id = task.destination().clone();
                    let metadata = task.metadata().to_vec();
                    let job_id = *job_id;

                    Some(tokio::spawn(async move {
                        complete_load(&client, &polling, &table_id, job_id, &metadata).await
                    }))
                }
                LoadTaskState::Created
                | LoadTaskState::Succeeded { .. }
                | LoadTaskState::Failed { .. } => None,
            };
            handles.push(handle);
        }

        for (task, handle) in self.tasks.iter_mut().zip(handles) {
            let Some(handle) = handle else {
                continue;
            };

            let job_id = task.state().job_id();
            let state = match handle.await {
                Ok(Ok(job_id)) => LoadTaskState::Succeeded { job_id },
                Ok(Err(error)) => LoadTaskState::Failed { job_id, error },
                Err(err) => LoadTaskState::Failed {
                    job_id,
                    error: output_error!(ErrorKind::LoadTaskPanic, "Load task panicked", err),
                },
            };
            task.set_state(state);
        }

        let mut job_ids = Vec::with_capacity(self.tasks.len());
        let mut errors = Vec::new();
        for task in &self.tasks {
            let table_id = task.destination();
            match task.state() {
                LoadTaskState::Succeeded { job_id } => {
                    counter!(OUTPUT_LOAD_TASKS_SUCCEEDED_TOTAL, TABLE_ID_LABEL => table_id.to_string())
                        .increment(1);
                    job_ids.push(*job_id);
                }
                LoadTaskState::Failed { error, .. } => {
                    counter!(
                        OUTPUT_LOAD_TASKS_FAILED_TOTAL,
                        TABLE_ID_LABEL => table_id.to_string(),
                        ERROR_KIND_LABEL => format!("{:?}", error.kind())
                    )
                    .increment(1);

                    if task.needs_compensation() {
                        self.drop_table(table_id).await;
                    }
                    errors.push(error.clone());
                }
                LoadTaskState::Created | LoadTaskState::Submitted { .. } => {}
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(job_ids)
    }

    async fn drop_table(&self, table_id: &TableId) {
        warn!(%table_id, "Failed to load table \"{table_id}\". Dropping table.");

        match self.client.drop_table(table_id).await {
            Ok(()) => {
                counter!(OUTPUT_COMPENSATING_TABLE_DROPS_TOTAL, TABLE_ID_LABEL => table_id.to_string())
                    .increment(1);
            }
            Err(err) => {
                warn!(%table_id, error = %err, "failed to drop table after a failed load");
            }
        }
    }
}

/// Waits for a load job and applies the queued metadata once it succeeded.
async fn complete_load<C>(
    client: &C,
    polling: &JobPollingConfig,
    table_id: &TableId,
    job_id: JobId,
    metadata: &[MetadataOperation],
) -> OutputResult<JobId>
where
    C: StorageClient,
{
    let job = wait_for_job(client, polling, table_id, job_id).await?;
    if job.status == JobStatus::Error {
        bail!(
            ErrorKind::TableLoadFailed,
            "Table load failed",
            format!(
                "Failed to load table \"{table_id}\": {}",
                job.error.unwrap_or_default()
            )
        );
    }
    info!(%table_id, %job_id, "table loaded");

    for operation in metadata.iter().filter(|operation| !operation.is_empty()) {
        operation.apply(client, table_id).await.map_err(|err| {
            let detail = format!(
                "Failed to update metadata of table \"{table_id}\": {}",
                err.message
            );
            OutputError::from_client_error(
                ErrorKind::MetadataUpdateFailed,
                "Metadata update failed",
                detail,
                err,
            )
        })?;
    }

    Ok(job_id)
}

async fn wait_for_job<C>(
    client: &C,
    polling: &JobPollingConfig,
    table_id: &TableId,
    job_id: JobId,
) -> OutputResult<Job>
where
    C: StorageClient,
{
    let mut attempt = 0;
    loop {
        let job = client.get_job(job_id).await.map_err(|err| {
            let detail = format!("Failed to load table \"{table_id}\": {}", err.message);
            OutputError::from_client_error(
                ErrorKind::TableLoadFailed,
                "Load job status unavailable",
                detail,
                err,
            )
        })?;
        if job.status.is_finished() {
            return Ok(job);
        }

        let delay = backoff_delay(polling, attempt);
        debug!(%table_id, %job_id, status = ?job.status, ?delay, "load job still running");
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}

/// Exponential backoff capped at `max_delay_ms`, with up to 30% jitter.
fn backoff_delay(polling: &JobPollingConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base_delay_ms = polling.initial_delay_ms as f64 * polling.backoff_factor.powi(exponent);
    let capped_delay_ms = base_delay_ms.min(polling.max_delay_ms as f64);

    let jitter_factor = rand::rng().random::<f64>() * 0.3;

    Duration::from_millis((capped_delay_ms * (1.0 + jitter_factor)) as u64)
}
