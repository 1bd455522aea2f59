use std::collections::BTreeMap;

use storage::types::MetadataEntry;

use crate::bail;
use crate::error::{ErrorKind, OutputResult};

/// Provider under which system metadata is written.
pub const SYSTEM_PROVIDER: &str = "system";

const CREATED_BY_PREFIX: &str = "KBC.createdBy";

const LAST_UPDATED_BY_PREFIX: &str = "KBC.lastUpdatedBy";

/// Identity of the run producing the output.
///
/// Used to annotate created and updated tables and to tag uploaded files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemMetadata {
    values: BTreeMap<String, String>,
}

impl SystemMetadata {
    pub const COMPONENT_ID: &'static str = "componentId";

    pub const CONFIGURATION_ID: &'static str = "configurationId";

    pub const CONFIGURATION_ROW_ID: &'static str = "configurationRowId";

    pub const BRANCH_ID: &'static str = "branchId";

    pub const RUN_ID: &'static str = "runId";

    /// Keys turned into file tags, in tag order.
    const TAG_KEYS: [&'static str; 5] = [
        Self::COMPONENT_ID,
        Self::CONFIGURATION_ID,
        Self::CONFIGURATION_ROW_ID,
        Self::RUN_ID,
        Self::BRANCH_ID,
    ];

    /// Validates and wraps the given values.
    ///
    /// An empty map is allowed. A non-empty one must carry a component id.
    pub fn new(values: BTreeMap<String, String>) -> OutputResult<Self> {
        let metadata = Self { values };
        if !metadata.values.is_empty() && metadata.component_id().is_none() {
            bail!(
                ErrorKind::ValidationError,
                "Invalid system metadata",
                "Component Id must be set"
            );
        }

        Ok(metadata)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the non-empty value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn component_id(&self) -> Option<&str> {
        self.get(Self::COMPONENT_ID)
    }

    /// Entries describing who created an object.
    pub fn created_entries(&self) -> Vec<MetadataEntry> {
        self.entries(CREATED_BY_PREFIX)
    }

    /// Entries describing who last wrote into an object.
    pub fn updated_entries(&self) -> Vec<MetadataEntry> {
        self.entries(LAST_UPDATED_BY_PREFIX)
    }

    /// Tags of the form `<key>: <value>` for every present identity key.
    pub fn tags(&self) -> Vec<String> {
        Self::TAG_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| format!("{key}: {value}")))
            .collect()
    }

    fn entries(&self, prefix: &str) -> Vec<MetadataEntry> {
        [
            (Self::COMPONENT_ID, "component.id"),
            (Self::CONFIGURATION_ID, "configuration.id"),
            (Self::CONFIGURATION_ROW_ID, "configurationRow.id"),
            (Self::BRANCH_ID, "branch.id"),
        ]
        .into_iter()
        .filter_map(|(key, suffix)| {
            self.get(key)
                .map(|value| MetadataEntry::new(format!("{prefix}.{suffix}"), value))
        })
        .collect()
    }
}
