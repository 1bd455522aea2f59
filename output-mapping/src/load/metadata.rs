use storage::types::{MetadataEntry, TableId};
use storage::{ClientError, StorageClient};

/// Metadata write queued until the load of its table succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOperation {
    Table {
        provider: String,
        entries: Vec<MetadataEntry>,
    },
    Column {
        column: String,
        provider: String,
        entries: Vec<MetadataEntry>,
    },
}

impl MetadataOperation {
    pub fn table(provider: impl Into<String>, entries: Vec<MetadataEntry>) -> Self {
        MetadataOperation::Table {
            provider: provider.into(),
            entries,
        }
    }

    pub fn column(
        column: impl Into<String>,
        provider: impl Into<String>,
        entries: Vec<MetadataEntry>,
    ) -> Self {
        MetadataOperation::Column {
            column: column.into(),
            provider: provider.into(),
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MetadataOperation::Table { entries, .. } | MetadataOperation::Column { entries, .. } => {
                entries.is_empty()
            }
        }
    }

    pub async fn apply<C>(&self, client: &C, table_id: &TableId) -> Result<(), ClientError>
    where
        C: StorageClient,
    {
        match self {
            MetadataOperation::Table { provider, entries } => {
                client.write_table_metadata(table_id, provider, entries).await
            }
            MetadataOperation::Column {
                column,
                provider,
                entries,
            } => {
                client
                    .write_column_metadata(table_id, column, provider, entries)
                    .await
            }
        }
    }
}
