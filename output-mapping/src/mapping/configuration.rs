//! Effective configuration and physical layout of table sources.

use std::fs;
use std::path::Path;

use config::shared::{ManifestFormat, TableOutputConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use storage::StorageClient;

use crate::bail;
use crate::error::{ErrorKind, OutputError, OutputResult};
use crate::inventory::ItemKind;
use crate::mapping::source::TableSource;
use crate::output_error;

/// Reads and writes manifests in the configured encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManifestCodec {
    format: ManifestFormat,
}

impl ManifestCodec {
    pub fn new(format: ManifestFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ManifestFormat {
        self.format
    }

    /// Parses a manifest into `T`.
    ///
    /// Parse and shape failures are reported as [`ErrorKind::InvalidManifest`].
    pub fn read<T>(&self, path: &Path) -> OutputResult<T>
    where
        T: DeserializeOwned,
    {
        let content = fs::read(path)?;
        let parsed = match self.format {
            ManifestFormat::Json => {
                serde_json::from_slice::<T>(&content).map_err(|err| err.to_string())
            }
            ManifestFormat::Yaml => {
                serde_yaml::from_slice::<T>(&content).map_err(|err| err.to_string())
            }
        };

        parsed.map_err(|message| invalid_manifest(path, &message))
    }

    /// Reads a manifest as a raw object, keeping unknown keys in their original order.
    pub fn read_value(&self, path: &Path) -> OutputResult<serde_json::Value> {
        let value = self.read::<serde_json::Value>(path)?;
        if !value.is_object() {
            return Err(invalid_manifest(path, "manifest must be an object"));
        }

        Ok(value)
    }

    pub fn write<T>(&self, path: &Path, value: &T) -> OutputResult<()>
    where
        T: Serialize,
    {
        let content = match self.format {
            ManifestFormat::Json => serde_json::to_vec_pretty(value).map_err(|err| {
                output_error!(
                    ErrorKind::SerializationError,
                    "Manifest serialization failed",
                    err
                )
            })?,
            ManifestFormat::Yaml => serde_yaml::to_string(value)
                .map_err(|err| {
                    output_error!(
                        ErrorKind::SerializationError,
                        "Manifest serialization failed",
                        err
                    )
                })?
                .into_bytes(),
        };
        fs::write(path, content)?;

        Ok(())
    }
}

fn invalid_manifest(path: &Path, message: &str) -> OutputError {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    output_error!(
        ErrorKind::InvalidManifest,
        "Invalid manifest",
        format!("Failed to parse manifest file \"{name}\": {message}")
    )
}

/// Where the effective configuration of a source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Mapping,
    Manifest,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfiguration {
    pub config: TableOutputConfig,
    pub origin: ConfigOrigin,
}

impl ResolvedConfiguration {
    /// Resolves the configuration of a source.
    ///
    /// A declared mapping wins entirely. Without one the manifest is used, and without a
    /// manifest the defaults.
    pub fn resolve(source: &TableSource, codec: &ManifestCodec) -> OutputResult<Self> {
        let resolved = match (&source.mapping, &source.manifest) {
            (Some(mapping), _) => ResolvedConfiguration {
                config: mapping.table.clone(),
                origin: ConfigOrigin::Mapping,
            },
            (None, Some(manifest)) => ResolvedConfiguration {
                config: codec.read(&manifest.path)?,
                origin: ConfigOrigin::Manifest,
            },
            (None, None) => ResolvedConfiguration {
                config: TableOutputConfig::default(),
                origin: ConfigOrigin::Default,
            },
        };

        resolved.config.validate().map_err(|err| {
            let detail = format!("Invalid configuration of source \"{}\": {err}", source.source_name);
            output_error!(
                ErrorKind::ValidationError,
                "Invalid output mapping configuration",
                detail = detail,
                source: err
            )
        })?;

        Ok(resolved)
    }
}

/// Column layout of the data of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    pub columns: Vec<String>,
    /// The first record of the data is a header and not loaded.
    pub has_header: bool,
}

impl SourceLayout {
    /// Determines the columns of a source.
    ///
    /// Configured `columns` describe a headerless file. Sliced directories take their columns
    /// from their manifest and workspace objects from the workspace. Anything else carries a
    /// header row.
    pub async fn resolve<C>(
        client: &C,
        source: &TableSource,
        config: &TableOutputConfig,
        codec: &ManifestCodec,
    ) -> OutputResult<Self>
    where
        C: StorageClient,
    {
        if !config.columns.is_empty() {
            return Ok(SourceLayout {
                columns: config.columns.clone(),
                has_header: false,
            });
        }

        match &source.item.kind {
            ItemKind::Directory => {
                let columns = match &source.manifest {
                    Some(manifest) => codec.read::<TableOutputConfig>(&manifest.path)?.columns,
                    None => Vec::new(),
                };
                if columns.is_empty() {
                    bail!(
                        ErrorKind::InvalidManifest,
                        "Sliced file columns missing",
                        format!(
                            "Sliced file \"{}\" columns specification missing.",
                            source.source_name
                        )
                    );
                }

                Ok(SourceLayout {
                    columns,
                    has_header: false,
                })
            }
            ItemKind::WorkspaceObject { workspace_id } => {
                let columns = client
                    .get_workspace_object_columns(workspace_id, &source.source_name)
                    .await?;

                Ok(SourceLayout {
                    columns,
                    has_header: true,
                })
            }
            ItemKind::File => Ok(SourceLayout {
                columns: read_header(&source.item.path, config)?,
                has_header: true,
            }),
        }
    }
}

/// Reads the first record of a CSV file. An empty file has no columns.
fn read_header(path: &Path, config: &TableOutputConfig) -> OutputResult<Vec<String>> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(config.delimiter.as_bytes().first().copied().unwrap_or(b','));
    match config.enclosure.as_bytes().first() {
        Some(quote) => builder.quote(*quote),
        None => builder.quoting(false),
    };

    let mut reader = builder.from_path(path)?;
    let mut record = csv::StringRecord::new();
    if !reader.read_record(&mut record)? {
        return Ok(Vec::new());
    }

    Ok(record.iter().map(str::to_string).collect())
}
