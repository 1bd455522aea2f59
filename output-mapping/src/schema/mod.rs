//! Reconciliation of desired table structure with live tables.

pub mod diff;
pub mod primary_key;
pub mod structure;

use config::shared::{SchemaColumnConfig, TableOutputConfig};
use storage::types::{ColumnAttributes, ColumnSpec, TableDefinition};

pub use diff::{AttributeDelta, TableChangeSet, diff};
pub use primary_key::{PrimaryKeyOutcome, PrimaryKeyReconciler, decide, normalize_key};
pub use structure::StructureReconciler;

use crate::mapping::SourceLayout;

/// Structure a destination table should have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredSchema {
    pub columns: Vec<ColumnSpec>,
    /// Normalized primary key.
    pub primary_key: Vec<String>,
}

impl DesiredSchema {
    /// Builds the schema from typed `schema` columns when configured, else from the columns
    /// found in the data.
    pub fn from_config(config: &TableOutputConfig, layout: &SourceLayout) -> Self {
        let columns = match &config.schema {
            Some(schema) => schema.iter().map(column_spec).collect(),
            None => layout
                .columns
                .iter()
                .map(|name| ColumnSpec::untyped(name.clone()))
                .collect(),
        };

        Self {
            columns,
            primary_key: normalize_key(&config.desired_primary_key()),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn table_definition(&self) -> TableDefinition {
        TableDefinition {
            columns: self.columns.clone(),
            primary_key: self.primary_key.clone(),
        }
    }
}

fn column_spec(column: &SchemaColumnConfig) -> ColumnSpec {
    match &column.data_type {
        Some(data_type) => ColumnSpec::typed(
            column.name.clone(),
            ColumnAttributes {
                base_type: data_type.base_type,
                length: data_type.length.clone(),
                nullable: column.nullable,
                default: data_type.default.clone(),
            },
        ),
        None => ColumnSpec::untyped(column.name.clone()),
    }
}
