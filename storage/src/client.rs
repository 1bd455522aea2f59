use std::future::Future;
use std::path::Path;

use crate::error::ClientError;
use crate::types::{
    BucketId, BucketInfo, ColumnDefinitionUpdate, ColumnSpec, DeleteWhere, FileId,
    FileUploadOptions, Job, JobId, LoadRequest, MetadataEntry, TableDefinition, TableId,
    TableInfo,
};

/// Operations output mapping needs from the remote storage service.
///
/// Every call is a remote round trip and returns fresh state. Implementations are cheap to
/// clone and shared between concurrently running load tasks.
pub trait StorageClient: Clone + Send + Sync + 'static {
    /// Fetches a table. A missing table fails with a [`ClientError`] for which
    /// [`ClientError::is_not_found`] holds.
    fn get_table(
        &self,
        table_id: &TableId,
    ) -> impl Future<Output = Result<TableInfo, ClientError>> + Send;

    fn create_table_definition(
        &self,
        table_id: &TableId,
        definition: &TableDefinition,
    ) -> impl Future<Output = Result<TableInfo, ClientError>> + Send;

    fn drop_table(&self, table_id: &TableId)
    -> impl Future<Output = Result<(), ClientError>> + Send;

    fn get_bucket(
        &self,
        bucket_id: &BucketId,
    ) -> impl Future<Output = Result<BucketInfo, ClientError>> + Send;

    fn create_bucket(
        &self,
        bucket_id: &BucketId,
        backend: &str,
    ) -> impl Future<Output = Result<BucketInfo, ClientError>> + Send;

    fn add_column(
        &self,
        table_id: &TableId,
        column: &ColumnSpec,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn delete_column(
        &self,
        table_id: &TableId,
        column_name: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Alters length and nullability of a typed column.
    fn update_column_definition(
        &self,
        table_id: &TableId,
        column_name: &str,
        update: &ColumnDefinitionUpdate,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn drop_primary_key(
        &self,
        table_id: &TableId,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn create_primary_key(
        &self,
        table_id: &TableId,
        columns: &[String],
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn delete_rows(
        &self,
        table_id: &TableId,
        filter: &DeleteWhere,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Submits an asynchronous import and returns the job tracking it.
    fn submit_load(
        &self,
        request: &LoadRequest,
    ) -> impl Future<Output = Result<JobId, ClientError>> + Send;

    fn get_job(&self, job_id: JobId) -> impl Future<Output = Result<Job, ClientError>> + Send;

    fn upload_file(
        &self,
        path: &Path,
        options: &FileUploadOptions,
    ) -> impl Future<Output = Result<FileId, ClientError>> + Send;

    /// Lists the names of the table-like objects stored in a workspace.
    fn list_workspace_objects(
        &self,
        workspace_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, ClientError>> + Send;

    fn get_workspace_object_columns(
        &self,
        workspace_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Vec<String>, ClientError>> + Send;

    fn write_table_metadata(
        &self,
        table_id: &TableId,
        provider: &str,
        entries: &[MetadataEntry],
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn write_column_metadata(
        &self,
        table_id: &TableId,
        column_name: &str,
        provider: &str,
        entries: &[MetadataEntry],
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn write_bucket_metadata(
        &self,
        bucket_id: &BucketId,
        provider: &str,
        entries: &[MetadataEntry],
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}
