use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::StorageClient;
use crate::error::ClientError;
use crate::types::{
    BucketId, BucketInfo, ColumnDefinitionUpdate, ColumnSpec, DeleteWhere, FileId,
    FileUploadOptions, Job, JobId, JobStatus, LoadRequest, LoadSource, MetadataEntry,
    TableDefinition, TableId, TableInfo,
};
use config::shared::DeleteWhereOperator;

/// Backend assigned to buckets created without an explicit one.
pub const DEFAULT_BACKEND: &str = "snowflake";

/// Storage calls that can be observed and made to fail in [`MemoryStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOperation {
    GetTable,
    CreateTable,
    DropTable,
    GetBucket,
    CreateBucket,
    AddColumn,
    DeleteColumn,
    UpdateColumnDefinition,
    DropPrimaryKey,
    CreatePrimaryKey,
    DeleteRows,
    /// Submission of a load job.
    SubmitLoad,
    /// Execution of a previously submitted load job.
    RunLoad,
    GetJob,
    UploadFile,
    WriteMetadata,
}

/// A call received by [`MemoryStorage`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: StorageOperation,
    pub target: String,
}

/// A file stored by [`StorageClient::upload_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: FileId,
    pub options: FileUploadOptions,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
struct InjectedFault {
    operation: StorageOperation,
    table_id: Option<TableId>,
    error: ClientError,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnSpec>,
    primary_key: Vec<String>,
    rows: Vec<Vec<String>>,
    metadata: Vec<(String, MetadataEntry)>,
    column_metadata: BTreeMap<String, Vec<(String, MetadataEntry)>>,
}

impl MemoryTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    fn info(&self, table_id: &TableId) -> TableInfo {
        TableInfo {
            id: table_id.clone(),
            columns: self.columns.clone(),
            primary_key: self.primary_key.clone(),
            rows_count: self.rows.len() as u64,
        }
    }
}

#[derive(Debug)]
struct MemoryJob {
    request: LoadRequest,
    polls: u32,
    outcome: Option<Result<(), String>>,
}

#[derive(Debug)]
struct Inner {
    buckets: BTreeMap<BucketId, BucketInfo>,
    bucket_metadata: BTreeMap<BucketId, Vec<(String, MetadataEntry)>>,
    tables: BTreeMap<TableId, MemoryTable>,
    jobs: BTreeMap<JobId, MemoryJob>,
    files: Vec<StoredFile>,
    workspaces: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    faults: Vec<InjectedFault>,
    calls: Vec<RecordedCall>,
    next_job_id: u64,
    next_file_id: u64,
    job_latency: u32,
}

impl Inner {
    /// Records the call and returns the first matching injected fault, consuming it.
    fn check(
        &mut self,
        operation: StorageOperation,
        table_id: Option<&TableId>,
        target: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.calls.push(RecordedCall {
            operation,
            target: target.into(),
        });

        let position = self.faults.iter().position(|fault| {
            fault.operation == operation
                && match (&fault.table_id, table_id) {
                    (None, _) => true,
                    (Some(expected), Some(actual)) => expected == actual,
                    (Some(_), None) => false,
                }
        });

        match position {
            Some(position) => Err(self.faults.remove(position).error),
            None => Ok(()),
        }
    }

    fn table(&self, table_id: &TableId) -> Result<&MemoryTable, ClientError> {
        self.tables
            .get(table_id)
            .ok_or_else(|| table_not_found(table_id))
    }

    fn table_mut(&mut self, table_id: &TableId) -> Result<&mut MemoryTable, ClientError> {
        self.tables
            .get_mut(table_id)
            .ok_or_else(|| table_not_found(table_id))
    }

    fn run_load(&mut self, request: &LoadRequest) -> Result<(), String> {
        let (header, records) = self.read_load_source(request)?;

        let table = self
            .tables
            .get_mut(&request.table_id)
            .ok_or_else(|| table_not_found(&request.table_id).message)?;

        let table_columns = table
            .columns
            .iter()
            .map(|column| column.name.clone())
            .collect::<Vec<_>>();

        let missing = table_columns
            .iter()
            .filter(|column| !header.contains(column))
            .cloned()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(format!(
                "Some columns are missing in the csv file. Missing columns: {}. Expected columns: {}.",
                missing.join(","),
                table_columns.join(",")
            ));
        }

        let unknown = header
            .iter()
            .filter(|column| !table_columns.contains(column))
            .cloned()
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(format!(
                "Columns \"{}\" do not exist in table \"{}\".",
                unknown.join("\", \""),
                request.table_id
            ));
        }

        let positions = table_columns
            .iter()
            .map(|column| header.iter().position(|name| name == column).unwrap_or(0))
            .collect::<Vec<_>>();

        let mut rows = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            if record.len() != header.len() {
                return Err(format!(
                    "Row {} contains {} values, expected {}.",
                    index + 1,
                    record.len(),
                    header.len()
                ));
            }
            rows.push(
                positions
                    .iter()
                    .map(|position| record[*position].clone())
                    .collect::<Vec<_>>(),
            );
        }

        if !request.incremental {
            table.rows = rows;
            return Ok(());
        }

        let key_positions = table
            .primary_key
            .iter()
            .filter_map(|column| table.column_index(column))
            .collect::<Vec<_>>();

        for row in rows {
            let existing = if key_positions.is_empty() {
                None
            } else {
                table.rows.iter().position(|current| {
                    key_positions
                        .iter()
                        .all(|position| current[*position] == row[*position])
                })
            };

            match existing {
                Some(position) => table.rows[position] = row,
                None => table.rows.push(row),
            }
        }

        Ok(())
    }

    fn read_load_source(
        &self,
        request: &LoadRequest,
    ) -> Result<(Vec<String>, Vec<Vec<String>>), String> {
        match &request.source {
            LoadSource::LocalFile(path) => {
                let content = fs::read(path)
                    .map_err(|err| format!("Cannot read file \"{}\": {err}", path.display()))?;
                if content.is_empty() {
                    return Err(NO_DATA_MESSAGE.to_string());
                }
                let mut records = parse_csv(&content, request)?;
                split_header(&mut records, request)
            }
            LoadSource::SlicedDirectory(path) => {
                if request.columns.is_empty() {
                    return Err(format!(
                        "Sliced file \"{}\" requires columns to be set.",
                        path.display()
                    ));
                }

                let mut parts = fs::read_dir(path)
                    .map_err(|err| format!("Cannot read directory \"{}\": {err}", path.display()))?
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|part| {
                        part.file_name()
                            .and_then(|name| name.to_str())
                            .is_some_and(|name| name.starts_with("part"))
                    })
                    .collect::<Vec<_>>();
                parts.sort();

                // Empty parts are valid and load no rows.
                let mut records = Vec::new();
                for part in parts {
                    let content = fs::read(&part)
                        .map_err(|err| format!("Cannot read file \"{}\": {err}", part.display()))?;
                    records.extend(parse_csv(&content, request)?);
                }

                Ok((request.columns.clone(), records))
            }
            LoadSource::WorkspaceObject { workspace_id, name } => {
                let content = self
                    .workspaces
                    .get(workspace_id)
                    .and_then(|objects| objects.get(name))
                    .ok_or_else(|| {
                        format!("Object \"{name}\" not found in workspace \"{workspace_id}\".")
                    })?;
                if content.is_empty() {
                    return Err(NO_DATA_MESSAGE.to_string());
                }
                let mut records = parse_csv(content, request)?;
                split_header(&mut records, request)
            }
        }
    }
}

const NO_DATA_MESSAGE: &str = "There are no data in import file";

fn table_not_found(table_id: &TableId) -> ClientError {
    ClientError::not_found(format!(
        "The table \"{}\" was not found in the bucket \"{}\"",
        table_id.name(),
        table_id.bucket()
    ))
}

fn parse_csv(content: &[u8], request: &LoadRequest) -> Result<Vec<Vec<String>>, String> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(request.delimiter.as_bytes().first().copied().unwrap_or(b','));
    match request.enclosure.as_bytes().first() {
        Some(quote) => builder.quote(*quote),
        None => builder.quoting(false),
    };

    let mut reader = builder.from_reader(content);
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| format!("Invalid CSV: {err}"))?;
        records.push(record.iter().map(str::to_string).collect());
    }

    Ok(records)
}

fn split_header(
    records: &mut Vec<Vec<String>>,
    request: &LoadRequest,
) -> Result<(Vec<String>, Vec<Vec<String>>), String> {
    if !request.columns.is_empty() {
        return Ok((request.columns.clone(), std::mem::take(records)));
    }

    if records.is_empty() {
        return Err(NO_DATA_MESSAGE.to_string());
    }

    let header = records.remove(0);
    Ok((header, std::mem::take(records)))
}

/// In-process [`StorageClient`] keeping buckets, tables, jobs and files in memory.
///
/// Load jobs are executed lazily: a job stays `Processing` for a configurable number of
/// [`StorageClient::get_job`] polls and runs on the poll after that. Any operation can be
/// made to fail once with [`MemoryStorage::fail_next`].
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    /// Polls a job stays unfinished for when no latency is configured.
    pub const DEFAULT_JOB_LATENCY: u32 = 1;

    pub fn new() -> Self {
        Self::with_job_latency(Self::DEFAULT_JOB_LATENCY)
    }

    pub fn with_job_latency(job_latency: u32) -> Self {
        let inner = Inner {
            buckets: BTreeMap::new(),
            bucket_metadata: BTreeMap::new(),
            tables: BTreeMap::new(),
            jobs: BTreeMap::new(),
            files: Vec::new(),
            workspaces: BTreeMap::new(),
            faults: Vec::new(),
            calls: Vec::new(),
            next_job_id: 1,
            next_file_id: 1,
            job_latency,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Makes the next matching `operation` fail with `error`.
    ///
    /// With a `table_id`, only calls targeting that table match.
    pub async fn fail_next(
        &self,
        operation: StorageOperation,
        table_id: Option<TableId>,
        error: ClientError,
    ) {
        let mut inner = self.inner.lock().await;
        inner.faults.push(InjectedFault {
            operation,
            table_id,
            error,
        });
    }

    /// Creates a table directly, creating its bucket when needed.
    pub async fn insert_table(
        &self,
        table_id: TableId,
        columns: Vec<ColumnSpec>,
        primary_key: Vec<String>,
        rows: Vec<Vec<String>>,
    ) {
        let mut inner = self.inner.lock().await;
        let bucket_id = table_id.bucket().clone();
        inner
            .buckets
            .entry(bucket_id.clone())
            .or_insert_with(|| BucketInfo {
                id: bucket_id,
                backend: DEFAULT_BACKEND.to_string(),
            });
        inner.tables.insert(
            table_id,
            MemoryTable {
                columns,
                primary_key,
                rows,
                ..Default::default()
            },
        );
    }

    /// Stores a CSV object (header included) in a workspace.
    pub async fn add_workspace_object(
        &self,
        workspace_id: &str,
        name: &str,
        content: impl Into<Vec<u8>>,
    ) {
        let mut inner = self.inner.lock().await;
        inner
            .workspaces
            .entry(workspace_id.to_string())
            .or_default()
            .insert(name.to_string(), content.into());
    }

    pub async fn table(&self, table_id: &TableId) -> Option<TableInfo> {
        let inner = self.inner.lock().await;
        inner.tables.get(table_id).map(|table| table.info(table_id))
    }

    pub async fn table_ids(&self) -> Vec<TableId> {
        let inner = self.inner.lock().await;
        inner.tables.keys().cloned().collect()
    }

    /// Returns the rows of a table with values in column order.
    pub async fn table_rows(&self, table_id: &TableId) -> Option<Vec<Vec<String>>> {
        let inner = self.inner.lock().await;
        inner.tables.get(table_id).map(|table| table.rows.clone())
    }

    pub async fn table_metadata(&self, table_id: &TableId) -> Vec<(String, MetadataEntry)> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table_id)
            .map(|table| table.metadata.clone())
            .unwrap_or_default()
    }

    pub async fn column_metadata(
        &self,
        table_id: &TableId,
        column_name: &str,
    ) -> Vec<(String, MetadataEntry)> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table_id)
            .and_then(|table| table.column_metadata.get(column_name).cloned())
            .unwrap_or_default()
    }

    pub async fn bucket_metadata(&self, bucket_id: &BucketId) -> Vec<(String, MetadataEntry)> {
        let inner = self.inner.lock().await;
        inner
            .bucket_metadata
            .get(bucket_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn buckets(&self) -> Vec<BucketInfo> {
        let inner = self.inner.lock().await;
        inner.buckets.values().cloned().collect()
    }

    pub async fn files(&self) -> Vec<StoredFile> {
        let inner = self.inner.lock().await;
        inner.files.clone()
    }

    /// Returns every call received so far.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        let inner = self.inner.lock().await;
        inner.calls.clone()
    }

    /// Returns the calls of a single kind.
    pub async fn calls_of(&self, operation: StorageOperation) -> Vec<RecordedCall> {
        let inner = self.inner.lock().await;
        inner
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageClient for MemoryStorage {
    async fn get_table(&self, table_id: &TableId) -> Result<TableInfo, ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(StorageOperation::GetTable, Some(table_id), table_id.to_string())?;

        inner.table(table_id).map(|table| table.info(table_id))
    }

    async fn create_table_definition(
        &self,
        table_id: &TableId,
        definition: &TableDefinition,
    ) -> Result<TableInfo, ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::CreateTable,
            Some(table_id),
            table_id.to_string(),
        )?;

        if !inner.buckets.contains_key(table_id.bucket()) {
            return Err(ClientError::not_found(format!(
                "Bucket {} not found",
                table_id.bucket()
            )));
        }
        if inner.tables.contains_key(table_id) {
            return Err(ClientError::bad_request(format!(
                "Table {table_id} already exists"
            )));
        }
        if definition.columns.is_empty() {
            return Err(ClientError::bad_request(format!(
                "Table {table_id} cannot be created without columns"
            )));
        }
        for key_column in &definition.primary_key {
            if !definition
                .columns
                .iter()
                .any(|column| &column.name == key_column)
            {
                return Err(ClientError::bad_request(format!(
                    "Primary key column \"{key_column}\" is not a column of table {table_id}"
                )));
            }
        }

        let table = MemoryTable {
            columns: definition.columns.clone(),
            primary_key: definition.primary_key.clone(),
            ..Default::default()
        };
        let info = table.info(table_id);
        inner.tables.insert(table_id.clone(), table);

        info!(%table_id, "table created");

        Ok(info)
    }

    async fn drop_table(&self, table_id: &TableId) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(StorageOperation::DropTable, Some(table_id), table_id.to_string())?;

        match inner.tables.remove(table_id) {
            Some(_) => {
                info!(%table_id, "table dropped");
                Ok(())
            }
            None => Err(table_not_found(table_id)),
        }
    }

    async fn get_bucket(&self, bucket_id: &BucketId) -> Result<BucketInfo, ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(StorageOperation::GetBucket, None, bucket_id.to_string())?;

        inner
            .buckets
            .get(bucket_id)
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("Bucket {bucket_id} not found")))
    }

    async fn create_bucket(
        &self,
        bucket_id: &BucketId,
        backend: &str,
    ) -> Result<BucketInfo, ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(StorageOperation::CreateBucket, None, bucket_id.to_string())?;

        if inner.buckets.contains_key(bucket_id) {
            return Err(ClientError::bad_request(format!(
                "Bucket {bucket_id} already exists"
            )));
        }

        let bucket = BucketInfo {
            id: bucket_id.clone(),
            backend: backend.to_string(),
        };
        inner.buckets.insert(bucket_id.clone(), bucket.clone());

        Ok(bucket)
    }

    async fn add_column(&self, table_id: &TableId, column: &ColumnSpec) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::AddColumn,
            Some(table_id),
            format!("{table_id}.{}", column.name),
        )?;

        let table = inner.table_mut(table_id)?;
        if table.column_index(&column.name).is_some() {
            return Err(ClientError::bad_request(format!(
                "Column \"{}\" already exists in table {table_id}",
                column.name
            )));
        }

        table.columns.push(column.clone());
        for row in &mut table.rows {
            row.push(String::new());
        }

        debug!(%table_id, column = %column.name, "column added");

        Ok(())
    }

    async fn delete_column(&self, table_id: &TableId, column_name: &str) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::DeleteColumn,
            Some(table_id),
            format!("{table_id}.{column_name}"),
        )?;

        let table = inner.table_mut(table_id)?;
        let Some(index) = table.column_index(column_name) else {
            return Err(ClientError::not_found(format!(
                "Column \"{column_name}\" not found in table {table_id}"
            )));
        };
        if table.primary_key.iter().any(|column| column == column_name) {
            return Err(ClientError::bad_request(format!(
                "Cannot delete column \"{column_name}\", it is part of the primary key"
            )));
        }

        table.columns.remove(index);
        for row in &mut table.rows {
            row.remove(index);
        }

        Ok(())
    }

    async fn update_column_definition(
        &self,
        table_id: &TableId,
        column_name: &str,
        update: &ColumnDefinitionUpdate,
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::UpdateColumnDefinition,
            Some(table_id),
            format!("{table_id}.{column_name}"),
        )?;

        let table = inner.table_mut(table_id)?;
        let Some(index) = table.column_index(column_name) else {
            return Err(ClientError::not_found(format!(
                "Column \"{column_name}\" not found in table {table_id}"
            )));
        };
        let Some(definition) = table.columns[index].definition.as_mut() else {
            return Err(ClientError::bad_request(format!(
                "Column \"{column_name}\" of table {table_id} has no definition to update"
            )));
        };

        definition.length = update.length.clone();
        definition.nullable = update.nullable;

        Ok(())
    }

    async fn drop_primary_key(&self, table_id: &TableId) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::DropPrimaryKey,
            Some(table_id),
            table_id.to_string(),
        )?;

        inner.table_mut(table_id)?.primary_key.clear();

        Ok(())
    }

    async fn create_primary_key(
        &self,
        table_id: &TableId,
        columns: &[String],
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::CreatePrimaryKey,
            Some(table_id),
            format!("{table_id}({})", columns.join(", ")),
        )?;

        let table = inner.table_mut(table_id)?;
        if !table.primary_key.is_empty() {
            return Err(ClientError::bad_request(format!(
                "Table {table_id} already has a primary key"
            )));
        }
        for column in columns {
            if table.column_index(column).is_none() {
                return Err(ClientError::bad_request(format!(
                    "Primary key column \"{column}\" not found in table {table_id}"
                )));
            }
        }

        table.primary_key = columns.to_vec();

        Ok(())
    }

    async fn delete_rows(&self, table_id: &TableId, filter: &DeleteWhere) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(StorageOperation::DeleteRows, Some(table_id), table_id.to_string())?;

        let table = inner.table_mut(table_id)?;
        let Some(index) = table.column_index(&filter.column) else {
            return Err(ClientError::bad_request(format!(
                "Cannot filter by column \"{}\", column does not exist",
                filter.column
            )));
        };

        table.rows.retain(|row| {
            let matches = filter.values.contains(&row[index]);
            match filter.operator {
                DeleteWhereOperator::Eq => !matches,
                DeleteWhereOperator::Ne => matches,
            }
        });

        Ok(())
    }

    async fn submit_load(&self, request: &LoadRequest) -> Result<JobId, ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::SubmitLoad,
            Some(&request.table_id),
            request.table_id.to_string(),
        )?;

        inner.table(&request.table_id)?;

        let job_id = JobId(inner.next_job_id);
        inner.next_job_id += 1;
        inner.jobs.insert(
            job_id,
            MemoryJob {
                request: request.clone(),
                polls: 0,
                outcome: None,
            },
        );

        debug!(%job_id, table_id = %request.table_id, "load job submitted");

        Ok(job_id)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Job, ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(StorageOperation::GetJob, None, job_id.to_string())?;

        let job_latency = inner.job_latency;
        let (request, polls, outcome) = {
            let Some(job) = inner.jobs.get_mut(&job_id) else {
                return Err(ClientError::not_found(format!("Job {job_id} not found")));
            };
            job.polls += 1;
            (job.request.clone(), job.polls, job.outcome.clone())
        };

        let outcome = match outcome {
            Some(outcome) => outcome,
            None if polls <= job_latency => {
                return Ok(Job {
                    id: job_id,
                    status: if polls == 1 {
                        JobStatus::Waiting
                    } else {
                        JobStatus::Processing
                    },
                    error: None,
                });
            }
            None => {
                let outcome = match inner.check(
                    StorageOperation::RunLoad,
                    Some(&request.table_id),
                    request.table_id.to_string(),
                ) {
                    Ok(()) => inner.run_load(&request),
                    Err(err) => Err(err.message),
                };
                if let Some(job) = inner.jobs.get_mut(&job_id) {
                    job.outcome = Some(outcome.clone());
                }
                outcome
            }
        };

        Ok(match outcome {
            Ok(()) => Job {
                id: job_id,
                status: JobStatus::Success,
                error: None,
            },
            Err(message) => Job {
                id: job_id,
                status: JobStatus::Error,
                error: Some(message),
            },
        })
    }

    async fn upload_file(
        &self,
        path: &Path,
        options: &FileUploadOptions,
    ) -> Result<FileId, ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(StorageOperation::UploadFile, None, options.name.clone())?;

        let content = fs::read(path).map_err(|err| {
            ClientError::bad_request(format!("Cannot read file \"{}\": {err}", path.display()))
        })?;

        let id = FileId(inner.next_file_id);
        inner.next_file_id += 1;
        inner.files.push(StoredFile {
            id,
            options: options.clone(),
            content,
        });

        Ok(id)
    }

    async fn list_workspace_objects(&self, workspace_id: &str) -> Result<Vec<String>, ClientError> {
        let inner = self.inner.lock().await;
        inner
            .workspaces
            .get(workspace_id)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| ClientError::not_found(format!("Workspace {workspace_id} not found")))
    }

    async fn get_workspace_object_columns(
        &self,
        workspace_id: &str,
        name: &str,
    ) -> Result<Vec<String>, ClientError> {
        let inner = self.inner.lock().await;
        let content = inner
            .workspaces
            .get(workspace_id)
            .and_then(|objects| objects.get(name))
            .ok_or_else(|| {
                ClientError::not_found(format!(
                    "Object \"{name}\" not found in workspace \"{workspace_id}\""
                ))
            })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(content.as_slice());
        match reader.records().next() {
            Some(Ok(header)) => Ok(header.iter().map(str::to_string).collect()),
            Some(Err(err)) => Err(ClientError::bad_request(format!("Invalid CSV: {err}"))),
            None => Ok(Vec::new()),
        }
    }

    async fn write_table_metadata(
        &self,
        table_id: &TableId,
        provider: &str,
        entries: &[MetadataEntry],
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::WriteMetadata,
            Some(table_id),
            table_id.to_string(),
        )?;

        let table = inner.table_mut(table_id)?;
        for entry in entries {
            upsert_metadata(&mut table.metadata, provider, entry);
        }

        Ok(())
    }

    async fn write_column_metadata(
        &self,
        table_id: &TableId,
        column_name: &str,
        provider: &str,
        entries: &[MetadataEntry],
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(
            StorageOperation::WriteMetadata,
            Some(table_id),
            format!("{table_id}.{column_name}"),
        )?;

        let table = inner.table_mut(table_id)?;
        if table.column_index(column_name).is_none() {
            return Err(ClientError::not_found(format!(
                "Column \"{column_name}\" not found in table {table_id}"
            )));
        }
        let column_metadata = table
            .column_metadata
            .entry(column_name.to_string())
            .or_default();
        for entry in entries {
            upsert_metadata(column_metadata, provider, entry);
        }

        Ok(())
    }

    async fn write_bucket_metadata(
        &self,
        bucket_id: &BucketId,
        provider: &str,
        entries: &[MetadataEntry],
    ) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.check(StorageOperation::WriteMetadata, None, bucket_id.to_string())?;

        if !inner.buckets.contains_key(bucket_id) {
            return Err(ClientError::not_found(format!("Bucket {bucket_id} not found")));
        }
        let metadata = inner.bucket_metadata.entry(bucket_id.clone()).or_default();
        for entry in entries {
            upsert_metadata(metadata, provider, entry);
        }

        Ok(())
    }
}

fn upsert_metadata(
    metadata: &mut Vec<(String, MetadataEntry)>,
    provider: &str,
    entry: &MetadataEntry,
) {
    match metadata
        .iter_mut()
        .find(|(current_provider, current)| current_provider == provider && current.key == entry.key)
    {
        Some((_, current)) => current.value = entry.value.clone(),
        None => metadata.push((provider.to_string(), entry.clone())),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn table_id(id: &str) -> TableId {
        id.parse().unwrap()
    }

    fn load_request(table_id: &TableId, path: PathBuf, incremental: bool) -> LoadRequest {
        LoadRequest {
            table_id: table_id.clone(),
            source: LoadSource::LocalFile(path),
            columns: Vec::new(),
            delimiter: ",".to_string(),
            enclosure: "\"".to_string(),
            incremental,
        }
    }

    async fn wait_for_job(storage: &MemoryStorage, job_id: JobId) -> Job {
        loop {
            let job = storage.get_job(job_id).await.unwrap();
            if job.status.is_finished() {
                return job;
            }
        }
    }

    #[tokio::test]
    async fn missing_table_is_not_found() {
        let storage = MemoryStorage::new();
        let err = storage
            .get_table(&table_id("in.c-main.missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn load_job_finishes_after_latency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "id,name\n1,a\n2,b\n").unwrap();

        let storage = MemoryStorage::with_job_latency(2);
        let id = table_id("in.c-main.data");
        storage
            .insert_table(
                id.clone(),
                vec![ColumnSpec::untyped("id"), ColumnSpec::untyped("name")],
                vec![],
                vec![],
            )
            .await;

        let job_id = storage
            .submit_load(&load_request(&id, path, false))
            .await
            .unwrap();
        assert_eq!(storage.get_job(job_id).await.unwrap().status, JobStatus::Waiting);
        assert_eq!(
            storage.get_job(job_id).await.unwrap().status,
            JobStatus::Processing
        );
        assert_eq!(storage.get_job(job_id).await.unwrap().status, JobStatus::Success);

        let rows = storage.table_rows(&id).await.unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["1".to_string(), "a".to_string()],
                vec!["2".to_string(), "b".to_string()]
            ]
        );
    }

    #[tokio::test]
    async fn empty_file_load_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();

        let storage = MemoryStorage::new();
        let id = table_id("in.c-main.empty");
        storage
            .insert_table(id.clone(), vec![ColumnSpec::untyped("id")], vec![], vec![])
            .await;

        let job_id = storage
            .submit_load(&load_request(&id, path, false))
            .await
            .unwrap();
        let job = wait_for_job(&storage, job_id).await;
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some(NO_DATA_MESSAGE));
    }

    #[tokio::test]
    async fn missing_csv_columns_fail_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "foo\nbar\n").unwrap();

        let storage = MemoryStorage::new();
        let id = table_id("in.c-main.data");
        storage
            .insert_table(
                id.clone(),
                vec![ColumnSpec::untyped("id"), ColumnSpec::untyped("name")],
                vec![],
                vec![],
            )
            .await;

        let job_id = storage
            .submit_load(&load_request(&id, path, false))
            .await
            .unwrap();
        let job = wait_for_job(&storage, job_id).await;
        assert_eq!(
            job.error.as_deref(),
            Some(
                "Some columns are missing in the csv file. Missing columns: id,name. Expected columns: id,name."
            )
        );
    }

    #[tokio::test]
    async fn incremental_load_upserts_on_primary_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "id,name\n1,updated\n3,c\n").unwrap();

        let storage = MemoryStorage::new();
        let id = table_id("in.c-main.data");
        storage
            .insert_table(
                id.clone(),
                vec![ColumnSpec::untyped("id"), ColumnSpec::untyped("name")],
                vec!["id".to_string()],
                vec![
                    vec!["1".to_string(), "a".to_string()],
                    vec!["2".to_string(), "b".to_string()],
                ],
            )
            .await;

        let job_id = storage
            .submit_load(&load_request(&id, path, true))
            .await
            .unwrap();
        wait_for_job(&storage, job_id).await;

        let rows = storage.table_rows(&id).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["1".to_string(), "updated".to_string()]);
    }

    #[tokio::test]
    async fn injected_fault_is_consumed_once() {
        let storage = MemoryStorage::new();
        let id = table_id("in.c-main.data");
        storage
            .insert_table(id.clone(), vec![ColumnSpec::untyped("id")], vec![], vec![])
            .await;
        storage
            .fail_next(
                StorageOperation::AddColumn,
                Some(id.clone()),
                ClientError::internal("boom"),
            )
            .await;

        let err = storage
            .add_column(&id, &ColumnSpec::untyped("name"))
            .await
            .unwrap_err();
        assert_eq!(err.message, "boom");
        storage
            .add_column(&id, &ColumnSpec::untyped("name"))
            .await
            .unwrap();

        assert_eq!(storage.calls_of(StorageOperation::AddColumn).await.len(), 2);
    }

    #[tokio::test]
    async fn delete_rows_honors_operator() {
        let storage = MemoryStorage::new();
        let id = table_id("in.c-main.data");
        let rows = vec![
            vec!["1".to_string()],
            vec!["2".to_string()],
            vec!["3".to_string()],
        ];
        storage
            .insert_table(id.clone(), vec![ColumnSpec::untyped("id")], vec![], rows)
            .await;

        storage
            .delete_rows(
                &id,
                &DeleteWhere {
                    column: "id".to_string(),
                    operator: DeleteWhereOperator::Ne,
                    values: vec!["1".to_string(), "2".to_string()],
                },
            )
            .await
            .unwrap();

        assert_eq!(
            storage.table_rows(&id).await.unwrap(),
            vec![vec!["1".to_string()], vec!["2".to_string()]]
        );
    }
}
