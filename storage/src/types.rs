use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use config::shared::{BaseType, DeleteWhereOperator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a bucket, e.g. `in.c-main`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketId(String);

impl BucketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returned when a string is not a `<bucket>.<table>` identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("`{0}` is not a valid table id")]
pub struct InvalidTableId(pub String);

/// Fully qualified table identifier.
///
/// The bucket is everything before the last dot, so `in.c-main.users` lives in bucket
/// `in.c-main` under the name `users`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId {
    bucket: BucketId,
    name: String,
}

impl TableId {
    pub fn new(bucket: BucketId, name: impl Into<String>) -> Self {
        Self {
            bucket,
            name: name.into(),
        }
    }

    pub fn bucket(&self) -> &BucketId {
        &self.bucket
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for TableId {
    type Err = InvalidTableId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.rsplit_once('.') {
            Some((bucket, name)) if !bucket.is_empty() && !name.is_empty() => {
                Ok(TableId::new(BucketId::new(bucket), name))
            }
            _ => Err(InvalidTableId(value.to_string())),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.bucket, self.name)
    }
}

/// Typed definition of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAttributes {
    pub base_type: BaseType,
    pub length: Option<String>,
    pub nullable: bool,
    pub default: Option<String>,
}

/// A column of a table, typed or untyped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub definition: Option<ColumnAttributes>,
}

impl ColumnSpec {
    /// Creates an untyped column.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: None,
        }
    }

    pub fn typed(name: impl Into<String>, definition: ColumnAttributes) -> Self {
        Self {
            name: name.into(),
            definition: Some(definition),
        }
    }
}

/// Column attributes sent when altering an existing column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinitionUpdate {
    pub length: Option<String>,
    pub nullable: bool,
}

/// Snapshot of a remote table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub id: TableId,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub rows_count: u64,
}

impl TableInfo {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Structure of a table to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
}

/// Snapshot of a remote bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub id: BucketId,
    pub backend: String,
}

/// Predicate of a conditional row deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteWhere {
    pub column: String,
    pub operator: DeleteWhereOperator,
    pub values: Vec<String>,
}

/// Where a load job reads its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// A single CSV file.
    LocalFile(PathBuf),
    /// A directory of headerless `part*` files.
    SlicedDirectory(PathBuf),
    /// A table-like object living in a remote workspace.
    WorkspaceObject { workspace_id: String, name: String },
}

/// Asynchronous table import request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub table_id: TableId,
    pub source: LoadSource,
    /// Column names of headerless data. Empty when the data carries a header row.
    pub columns: Vec<String>,
    pub delimiter: String,
    pub enclosure: String,
    pub incremental: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Waiting,
    Processing,
    Success,
    Error,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Failure message of an errored job.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUploadOptions {
    pub name: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_permanent: bool,
    pub is_encrypted: bool,
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
