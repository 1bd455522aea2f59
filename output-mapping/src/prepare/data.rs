use config::shared::TableOutputConfig;
use storage::StorageClient;
use storage::types::{DeleteWhere, TableId};
use tracing::info;

use crate::error::{ErrorKind, OutputError, OutputResult};

/// Deletes rows matching the configured predicate before new data is loaded.
#[derive(Debug, Clone)]
pub struct DataReconciler<C> {
    client: C,
}

impl<C> DataReconciler<C>
where
    C: StorageClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Issues the conditional delete configured by `delete_where_*`. No predicate, no call.
    pub async fn apply_row_deletion(
        &self,
        config: &TableOutputConfig,
        table_id: &TableId,
    ) -> OutputResult<()> {
        let Some(filter) = delete_filter(config) else {
            return Ok(());
        };

        self.client
            .delete_rows(table_id, &filter)
            .await
            .map_err(|err| {
                let detail = format!(
                    "Cannot delete rows from table \"{table_id}\" in Storage: {}",
                    err.message
                );
                OutputError::from_client_error(
                    ErrorKind::RowDeletionFailed,
                    "Row deletion failed",
                    detail,
                    err,
                )
            })?;

        info!(
            %table_id,
            column = %filter.column,
            operator = %filter.operator,
            values = ?filter.values,
            "rows deleted"
        );

        Ok(())
    }
}

fn delete_filter(config: &TableOutputConfig) -> Option<DeleteWhere> {
    let column = config.delete_where_column.as_ref()?;

    Some(DeleteWhere {
        column: column.clone(),
        operator: config.delete_where_operator,
        values: config.delete_where_values.clone(),
    })
}
