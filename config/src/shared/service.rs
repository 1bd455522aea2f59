use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::ValidationError;

/// Settings of the output mapping service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputMappingConfig {
    /// Encoding of manifests written by the slicer.
    #[serde(default)]
    pub manifest_format: ManifestFormat,
    #[serde(default)]
    pub slicing: SlicingConfig,
    #[serde(default)]
    pub job_polling: JobPollingConfig,
    /// Development branch the run writes into, if any.
    #[serde(default)]
    pub branch: Option<BranchConfig>,
}

impl OutputMappingConfig {
    /// Validates all nested sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.slicing.validate()?;
        self.job_polling.validate()?;

        Ok(())
    }
}

impl Config for OutputMappingConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["slicing.command.args"];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SlicingConfig {
    #[serde(default = "default_slicing_enabled")]
    pub enabled: bool,
    /// Upper bound for the size of a single part, in bytes.
    #[serde(default = "default_max_part_size_bytes")]
    pub max_part_size_bytes: u64,
    /// External slicer to run instead of the built-in one.
    #[serde(default)]
    pub command: Option<SliceCommandConfig>,
}

impl SlicingConfig {
    /// Default part size, 256 MiB.
    pub const DEFAULT_MAX_PART_SIZE_BYTES: u64 = 256 * 1024 * 1024;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_part_size_bytes == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "slicing.max_part_size_bytes".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if let Some(command) = &self.command
            && command.program.trim().is_empty()
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "slicing.command.program".to_string(),
                constraint: "cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SlicingConfig {
    fn default() -> Self {
        Self {
            enabled: default_slicing_enabled(),
            max_part_size_bytes: default_max_part_size_bytes(),
            command: None,
        }
    }
}

const fn default_slicing_enabled() -> bool {
    true
}

const fn default_max_part_size_bytes() -> u64 {
    SlicingConfig::DEFAULT_MAX_PART_SIZE_BYTES
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceCommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Backoff used while waiting for remote load jobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobPollingConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl JobPollingConfig {
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

    pub const DEFAULT_MAX_DELAY_MS: u64 = 2000;

    pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "job_polling.initial_delay_ms".to_string(),
                constraint: "must not exceed `job_polling.max_delay_ms`".to_string(),
            });
        }

        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "job_polling.backoff_factor".to_string(),
                constraint: "must be at least 1.0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for JobPollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

const fn default_initial_delay_ms() -> u64 {
    JobPollingConfig::DEFAULT_INITIAL_DELAY_MS
}

const fn default_max_delay_ms() -> u64 {
    JobPollingConfig::DEFAULT_MAX_DELAY_MS
}

const fn default_backoff_factor() -> f64 {
    JobPollingConfig::DEFAULT_BACKOFF_FACTOR
}

/// Branch a run writes into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BranchConfig {
    pub id: String,
    #[serde(default)]
    pub is_default: bool,
    /// The branch has its own storage, so tags need no branch prefix.
    #[serde(default)]
    pub use_branch_storage: bool,
}
