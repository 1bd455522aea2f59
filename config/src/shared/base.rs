use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A mapping entry does not name its source.
    #[error("`source` cannot be empty")]
    EmptySource,
    /// The field delimiter is not a single ASCII character.
    #[error("Invalid delimiter `{0}`: it must be exactly one ASCII character")]
    InvalidDelimiter(String),
    /// The enclosure is not empty or a single ASCII character.
    #[error("Invalid enclosure `{0}`: it must be empty or a single ASCII character")]
    InvalidEnclosure(String),
    /// Delete values were given without the column they apply to.
    #[error("`delete_where_values` requires `delete_where_column` to be set")]
    DeleteWhereColumnMissing,
    /// A schema declares the same column twice.
    #[error("Column `{0}` is declared more than once in `schema`")]
    DuplicateSchemaColumn(String),
    /// `primary_key` and schema level primary key flags were both used.
    #[error("`primary_key` cannot be combined with `schema` column primary keys")]
    ConflictingPrimaryKey,
    /// Generic field constraint violation.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
