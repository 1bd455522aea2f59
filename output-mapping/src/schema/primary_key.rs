use std::collections::BTreeSet;

use storage::StorageClient;
use storage::types::TableId;
use tracing::{info, warn};

use crate::error::OutputError;

/// Trims key names, drops empty ones and removes duplicates keeping the first occurrence.
pub fn normalize_key(key: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    key.iter()
        .map(|column| column.trim())
        .filter(|column| !column.is_empty())
        .filter(|column| seen.insert(*column))
        .map(str::to_string)
        .collect()
}

/// Returns `true` when the normalized keys contain different columns.
///
/// Column order does not matter for the decision.
pub fn decide(current: &[String], desired: &[String]) -> bool {
    let current = normalize_key(current).into_iter().collect::<BTreeSet<_>>();
    let desired = normalize_key(desired).into_iter().collect::<BTreeSet<_>>();

    current != desired
}

/// Result of a primary key modification. Failures are contained, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKeyOutcome {
    Unchanged,
    Replaced { from: Vec<String>, to: Vec<String> },
    /// The old key could not be dropped, the table was left untouched.
    DropFailed { error: OutputError },
    /// The old key was dropped but the new one could not be created, the table has no key.
    CreateFailed { error: OutputError },
}

#[derive(Debug, Clone)]
pub struct PrimaryKeyReconciler<C> {
    client: C,
}

impl<C> PrimaryKeyReconciler<C>
where
    C: StorageClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Replaces the primary key of a table, dropping the current key first.
    pub async fn modify(
        &self,
        table_id: &TableId,
        current: &[String],
        desired: &[String],
    ) -> PrimaryKeyOutcome {
        let current = normalize_key(current);
        let desired = normalize_key(desired);
        if current == desired {
            return PrimaryKeyOutcome::Unchanged;
        }

        warn!(
            %table_id,
            "Modifying primary key of table \"{table_id}\" from \"{}\" to \"{}\".",
            current.join(", "),
            desired.join(", ")
        );

        if !current.is_empty()
            && let Err(err) = self.client.drop_primary_key(table_id).await
        {
            warn!(
                %table_id,
                "Error deleting primary key of table {table_id}: {}", err.message
            );
            return PrimaryKeyOutcome::DropFailed { error: err.into() };
        }

        if !desired.is_empty()
            && let Err(err) = self.client.create_primary_key(table_id, &desired).await
        {
            warn!(
                %table_id,
                "Error changing primary key of table {table_id}: {}", err.message
            );
            return PrimaryKeyOutcome::CreateFailed { error: err.into() };
        }

        info!(%table_id, primary_key = ?desired, "primary key replaced");

        PrimaryKeyOutcome::Replaced {
            from: current,
            to: desired,
        }
    }
}
