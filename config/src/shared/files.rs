use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Output mapping configuration for files.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesConfiguration {
    #[serde(default)]
    pub mapping: Vec<FileMapping>,
}

impl FilesConfiguration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.mapping.iter().any(|mapping| mapping.source.trim().is_empty()) {
            return Err(ValidationError::EmptySource);
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMapping {
    pub source: String,
    #[serde(flatten)]
    pub file: FileManifest,
}

/// Upload options of a single file, as declared by a mapping or a `.manifest` sidecar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileManifest {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_permanent: bool,
    #[serde(default = "default_is_encrypted")]
    pub is_encrypted: bool,
    #[serde(default)]
    pub notify: bool,
}

impl Default for FileManifest {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            is_public: false,
            is_permanent: false,
            is_encrypted: default_is_encrypted(),
            notify: false,
        }
    }
}

const fn default_is_encrypted() -> bool {
    true
}

/// Upload options applied to every file when tables are stored as plain files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableFilesConfig {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_table_files_is_permanent")]
    pub is_permanent: bool,
}

impl Default for TableFilesConfig {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            is_permanent: default_table_files_is_permanent(),
        }
    }
}

impl From<TableFilesConfig> for FileManifest {
    fn from(value: TableFilesConfig) -> Self {
        FileManifest {
            tags: value.tags,
            is_permanent: value.is_permanent,
            ..FileManifest::default()
        }
    }
}

const fn default_table_files_is_permanent() -> bool {
    true
}
