use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::{TableFilesConfig, ValidationError};

/// Output mapping configuration for tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TablesConfiguration {
    /// Default bucket for destinations given as bare table names.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Declared mappings, in the order they are processed.
    #[serde(default)]
    pub mapping: Vec<TableMapping>,
    /// Upload options used when tables are stored as files only.
    #[serde(default)]
    pub table_files: Option<TableFilesConfig>,
}

impl TablesConfiguration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for mapping in &self.mapping {
            mapping.validate()?;
        }

        Ok(())
    }
}

/// One declared `source -> destination` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableMapping {
    pub source: String,
    #[serde(flatten)]
    pub table: TableOutputConfig,
}

impl TableMapping {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source.trim().is_empty() {
            return Err(ValidationError::EmptySource);
        }

        self.table.validate()
    }
}

/// Per-table output options.
///
/// This is both the body of a mapping entry and the content of a table manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableOutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Column names of a headerless file.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_enclosure")]
    pub enclosure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_where_column: Option<String>,
    #[serde(default)]
    pub delete_where_operator: DeleteWhereOperator,
    #[serde(default)]
    pub delete_where_values: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataEntryConfig>,
    #[serde(default)]
    pub column_metadata: BTreeMap<String, Vec<MetadataEntryConfig>>,
    /// Typed column definitions. When present they drive the table structure instead of
    /// `columns` and `primary_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<SchemaColumnConfig>>,
    /// Process this mapping even when the job producing the data failed.
    #[serde(default)]
    pub write_always: bool,
}

impl TableOutputConfig {
    pub const DEFAULT_DELIMITER: &'static str = ",";

    pub const DEFAULT_ENCLOSURE: &'static str = "\"";

    pub fn validate(&self) -> Result<(), ValidationError> {
        // The CSV reader works on single bytes.
        if self.delimiter.len() != 1 || !self.delimiter.is_ascii() {
            return Err(ValidationError::InvalidDelimiter(self.delimiter.clone()));
        }

        if self.enclosure.len() > 1 || !self.enclosure.is_ascii() {
            return Err(ValidationError::InvalidEnclosure(self.enclosure.clone()));
        }

        if !self.delete_where_values.is_empty() && self.delete_where_column.is_none() {
            return Err(ValidationError::DeleteWhereColumnMissing);
        }

        if let Some(schema) = &self.schema {
            let mut seen = HashSet::new();
            for column in schema {
                if !seen.insert(column.name.as_str()) {
                    return Err(ValidationError::DuplicateSchemaColumn(column.name.clone()));
                }
            }

            if !self.primary_key.is_empty() && schema.iter().any(|column| column.primary_key) {
                return Err(ValidationError::ConflictingPrimaryKey);
            }
        }

        Ok(())
    }

    /// Returns `true` when the file uses the default CSV dialect.
    pub fn has_default_dialect(&self) -> bool {
        self.delimiter == Self::DEFAULT_DELIMITER && self.enclosure == Self::DEFAULT_ENCLOSURE
    }

    /// Returns the desired primary key, taking it from the schema when one is declared.
    pub fn desired_primary_key(&self) -> Vec<String> {
        match &self.schema {
            Some(schema) if self.primary_key.is_empty() => schema
                .iter()
                .filter(|column| column.primary_key)
                .map(|column| column.name.clone())
                .collect(),
            _ => self.primary_key.clone(),
        }
    }
}

impl Default for TableOutputConfig {
    fn default() -> Self {
        Self {
            destination: None,
            incremental: false,
            primary_key: Vec::new(),
            columns: Vec::new(),
            delimiter: default_delimiter(),
            enclosure: default_enclosure(),
            delete_where_column: None,
            delete_where_operator: DeleteWhereOperator::default(),
            delete_where_values: Vec::new(),
            metadata: Vec::new(),
            column_metadata: BTreeMap::new(),
            schema: None,
            write_always: false,
        }
    }
}

fn default_delimiter() -> String {
    TableOutputConfig::DEFAULT_DELIMITER.to_string()
}

fn default_enclosure() -> String {
    TableOutputConfig::DEFAULT_ENCLOSURE.to_string()
}

/// Comparison used by conditional row deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteWhereOperator {
    #[default]
    Eq,
    Ne,
}

impl DeleteWhereOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteWhereOperator::Eq => "eq",
            DeleteWhereOperator::Ne => "ne",
        }
    }
}

impl fmt::Display for DeleteWhereOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user provided key/value annotation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntryConfig {
    pub key: String,
    pub value: String,
}

/// Typed definition of one destination column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchemaColumnConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataTypeConfig>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

const fn default_nullable() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTypeConfig {
    #[serde(rename = "base")]
    pub base_type: BaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Backend independent logical column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    String,
    Integer,
    Numeric,
    Float,
    Boolean,
    Date,
    Timestamp,
}

impl BaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::String => "STRING",
            BaseType::Integer => "INTEGER",
            BaseType::Numeric => "NUMERIC",
            BaseType::Float => "FLOAT",
            BaseType::Boolean => "BOOLEAN",
            BaseType::Date => "DATE",
            BaseType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
