//! Preparation of destination tables before data is loaded into them.

pub mod bucket;
pub mod data;

use config::shared::TableOutputConfig;
use storage::StorageClient;
use storage::types::{BucketInfo, TableId, TableInfo};
use tracing::debug;

pub use bucket::{DEFAULT_BUCKET_BACKEND, ensure_bucket};
pub use data::DataReconciler;

use crate::error::OutputResult;
use crate::schema::{DesiredSchema, StructureReconciler, diff};
use crate::writer::system_metadata::SystemMetadata;

/// State of a destination after preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDestination {
    pub bucket: BucketInfo,
    /// The live table, `None` when it does not exist yet.
    pub table: Option<TableInfo>,
}

/// Brings an existing destination table in line with its configuration.
#[derive(Debug, Clone)]
pub struct StoragePreparer<C> {
    client: C,
    structure: StructureReconciler<C>,
    data: DataReconciler<C>,
}

impl<C> StoragePreparer<C>
where
    C: StorageClient,
{
    pub fn new(client: C) -> Self {
        Self {
            structure: StructureReconciler::new(client.clone()),
            data: DataReconciler::new(client.clone()),
            client,
        }
    }

    /// Ensures the bucket exists, then reconciles structure and data of an existing table.
    ///
    /// The table is fetched again after all changes, so the returned snapshot is current.
    pub async fn prepare(
        &self,
        destination: &TableId,
        config: &TableOutputConfig,
        desired: &DesiredSchema,
        system_metadata: &SystemMetadata,
    ) -> OutputResult<PreparedDestination> {
        let bucket = ensure_bucket(&self.client, destination.bucket(), system_metadata).await?;

        let Some(table) = get_table_if_exists(&self.client, destination).await? else {
            debug!(table_id = %destination, "destination table does not exist yet");
            return Ok(PreparedDestination {
                bucket,
                table: None,
            });
        };

        let changes = diff(desired, &table);
        self.structure.apply(&bucket, &table, &changes).await?;
        self.data.apply_row_deletion(config, destination).await?;

        let table = get_table_if_exists(&self.client, destination).await?;

        Ok(PreparedDestination { bucket, table })
    }
}

/// Fetches a table, mapping "not found" to `None`.
pub async fn get_table_if_exists<C>(client: &C, table_id: &TableId) -> OutputResult<Option<TableInfo>>
where
    C: StorageClient,
{
    match client.get_table(table_id).await {
        Ok(table) => Ok(Some(table)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err.into()),
    }
}
