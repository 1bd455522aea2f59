//! Helpers for tests exercising output mapping against [`storage::memory::MemoryStorage`].

pub mod failpoints;
pub mod staging;

use std::collections::BTreeMap;

use config::shared::{JobPollingConfig, OutputMappingConfig, TableMapping, TableOutputConfig};
use storage::types::TableId;

use crate::writer::SystemMetadata;

/// Parses a table id, panicking on malformed input.
pub fn table_id(id: &str) -> TableId {
    id.parse()
        .unwrap_or_else(|err| panic!("invalid table id in test: {err}"))
}

/// Service configuration polling jobs every few milliseconds.
pub fn fast_config() -> OutputMappingConfig {
    OutputMappingConfig {
        job_polling: JobPollingConfig {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_factor: 2.0,
        },
        ..Default::default()
    }
}

pub fn table_mapping(source: &str, destination: &str) -> TableMapping {
    TableMapping {
        source: source.to_string(),
        table: TableOutputConfig {
            destination: Some(destination.to_string()),
            ..Default::default()
        },
    }
}

/// Metadata of a run of a test component.
pub fn system_metadata() -> SystemMetadata {
    let values = BTreeMap::from([
        (
            SystemMetadata::COMPONENT_ID.to_string(),
            "keboola.test-component".to_string(),
        ),
        (SystemMetadata::CONFIGURATION_ID.to_string(), "123".to_string()),
        (SystemMetadata::RUN_ID.to_string(), "999".to_string()),
    ]);

    match SystemMetadata::new(values) {
        Ok(metadata) => metadata,
        Err(err) => panic!("invalid test system metadata: {err}"),
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
