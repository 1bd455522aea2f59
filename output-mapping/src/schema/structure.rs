use storage::StorageClient;
use storage::types::{BucketInfo, ColumnDefinitionUpdate, TableId, TableInfo};
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, OutputError, OutputResult};
use crate::schema::diff::{AttributeDelta, TableChangeSet};
use crate::schema::primary_key::{PrimaryKeyOutcome, PrimaryKeyReconciler};

/// Applies a [`TableChangeSet`] to a live table.
///
/// Steps run in a fixed order: missing columns are added, then the primary key is replaced,
/// then column attributes are altered. A failed column addition removes the columns added
/// before it. Primary key failures are logged and never fail the call.
#[derive(Debug, Clone)]
pub struct StructureReconciler<C> {
    client: C,
    primary_keys: PrimaryKeyReconciler<C>,
}

impl<C> StructureReconciler<C>
where
    C: StorageClient,
{
    pub fn new(client: C) -> Self {
        Self {
            primary_keys: PrimaryKeyReconciler::new(client.clone()),
            client,
        }
    }

    pub async fn apply(
        &self,
        bucket: &BucketInfo,
        table: &TableInfo,
        changes: &TableChangeSet,
    ) -> OutputResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let table_id = &table.id;
        debug!(%table_id, backend = %bucket.backend, ?changes, "applying table changes");

        self.add_columns(table_id, changes).await?;

        if let Some(desired_key) = &changes.primary_key {
            let current_key = if changes.missing_columns.is_empty() {
                table.primary_key.clone()
            } else {
                self.client.get_table(table_id).await?.primary_key
            };

            if let PrimaryKeyOutcome::Replaced { from, to } = self
                .primary_keys
                .modify(table_id, &current_key, desired_key)
                .await
            {
                info!(%table_id, ?from, ?to, "primary key updated");
            }
        }

        for delta in &changes.attribute_deltas {
            self.update_attributes(table_id, delta).await?;
        }

        Ok(())
    }

    async fn add_columns(&self, table_id: &TableId, changes: &TableChangeSet) -> OutputResult<()> {
        let mut added = Vec::with_capacity(changes.missing_columns.len());
        for column in &changes.missing_columns {
            match self.client.add_column(table_id, column).await {
                Ok(()) => {
                    debug!(%table_id, column = %column.name, "column added");
                    added.push(column.name.as_str());
                }
                Err(err) => {
                    for name in added.iter().rev() {
                        if let Err(compensation_err) =
                            self.client.delete_column(table_id, name).await
                        {
                            warn!(
                                %table_id,
                                column = %name,
                                error = %compensation_err,
                                "failed to remove column added before a failed column addition"
                            );
                        }
                    }

                    let detail = format!(
                        "Cannot add column \"{}\" to table \"{table_id}\": {}",
                        column.name, err.message
                    );
                    return Err(OutputError::from_client_error(
                        ErrorKind::StructuralChangeFailed,
                        "Adding columns failed",
                        detail,
                        err,
                    ));
                }
            }
        }

        Ok(())
    }

    async fn update_attributes(&self, table_id: &TableId, delta: &AttributeDelta) -> OutputResult<()> {
        let update = ColumnDefinitionUpdate {
            length: delta.desired.length.clone(),
            nullable: delta.desired.nullable,
        };

        self.client
            .update_column_definition(table_id, &delta.column_name, &update)
            .await
            .map_err(|err| {
                let detail = format!(
                    "Cannot update column \"{}\" of table \"{table_id}\": {}",
                    delta.column_name, err.message
                );
                OutputError::from_client_error(
                    ErrorKind::StructuralChangeFailed,
                    "Updating column definition failed",
                    detail,
                    err,
                )
            })
    }
}
