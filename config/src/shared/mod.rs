//! Shared configuration types for output mapping.

mod base;
mod files;
mod service;
mod tables;

pub use base::ValidationError;
pub use files::{FileManifest, FileMapping, FilesConfiguration, TableFilesConfig};
pub use service::{
    BranchConfig, JobPollingConfig, ManifestFormat, OutputMappingConfig, SliceCommandConfig,
    SlicingConfig,
};
pub use tables::{
    BaseType, DataTypeConfig, DeleteWhereOperator, MetadataEntryConfig, SchemaColumnConfig,
    TableMapping, TableOutputConfig, TablesConfiguration,
};
