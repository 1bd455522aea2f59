//! Splitting of large table sources into directories of parts.
//!
//! A sliced source replaces the original file: the parts are written next to it, then the
//! original is removed and the part directory renamed onto its path together with a
//! rewritten `<name>.manifest`.

mod command;
mod native;

use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use config::shared::ManifestFormat;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use command::{ConfiguredSliceCommand, ExternalSliceCommand};
pub use native::NativeSliceCommand;

use crate::bail;
use crate::error::{ErrorKind, OutputResult};
use crate::failpoints::{SLICE_BEFORE_SWAP, SLICE_DURING_SWAP, output_fail_point};
use crate::inventory::{ItemKind, ManifestFile, MANIFEST_SUFFIX, PhysicalItem, manifest_path_for};
use crate::mapping::TableSource;
use crate::metrics::{OUTPUT_SLICES_CREATED_TOTAL, OUTPUT_SLICES_SKIPPED_TOTAL};

/// Reason a source is left unsliced. Never fails a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SliceSkipped {
    #[error("Only local files is supported for slicing.")]
    NotLocal,
    #[error("Sliced files without manifest are not supported.")]
    SlicedWithoutManifest,
    #[error("Empty files cannot be sliced.")]
    Empty,
    #[error("Params \"delimiter\" or \"enclosure\" specified in mapping are not supported by slicer.")]
    CustomDialect,
    #[error("Param \"columns\" specified in mapping is not supported by slicer.")]
    ColumnsDeclared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceOutcome {
    Sliced,
    Skipped(SliceSkipped),
}

/// Paths and limits of a single slicing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRequest {
    pub table_name: String,
    pub input_path: PathBuf,
    pub input_manifest_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub output_manifest_path: PathBuf,
    pub max_part_size_bytes: u64,
    pub manifest_format: ManifestFormat,
}

/// Produces the part directory and manifest described by a [`SliceRequest`].
pub trait SliceCommand: Send + Sync {
    fn slice(&self, request: &SliceRequest) -> impl Future<Output = OutputResult<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct Slicer<S = ConfiguredSliceCommand> {
    command: S,
    max_part_size_bytes: u64,
    manifest_format: ManifestFormat,
}

impl<S> Slicer<S>
where
    S: SliceCommand,
{
    pub fn new(command: S, max_part_size_bytes: u64, manifest_format: ManifestFormat) -> Self {
        Self {
            command,
            max_part_size_bytes,
            manifest_format,
        }
    }

    /// Slices every source, leaving ineligible ones unchanged.
    ///
    /// Fails when a source name appears more than once, since slicing rewrites the source in
    /// place.
    pub async fn slice_sources(&self, sources: &[TableSource]) -> OutputResult<Vec<TableSource>> {
        let mut occurrences: BTreeMap<&str, usize> = BTreeMap::new();
        for source in sources {
            *occurrences.entry(source.source_name.as_str()).or_default() += 1;
        }
        if let Some(source) = sources
            .iter()
            .find(|source| occurrences.get(source.source_name.as_str()).is_some_and(|count| *count > 1))
        {
            bail!(
                ErrorKind::ValidationError,
                "Source has multiple destinations",
                format!(
                    "Source \"{}\" has multiple destinations set.",
                    source.source_name
                )
            );
        }

        let mut sliced = Vec::with_capacity(sources.len());
        for source in sources {
            let (source, outcome) = self.slice_file(source).await?;
            if let SliceOutcome::Skipped(reason) = outcome {
                warn!(
                    source_name = %source.source_name,
                    "Source \"{}\" slicing skipped: {reason}",
                    source.source_name
                );
            }
            sliced.push(source);
        }

        Ok(sliced)
    }

    /// Slices one source.
    ///
    /// Ineligible sources are returned as a copy together with the skip reason.
    pub async fn slice_file(&self, source: &TableSource) -> OutputResult<(TableSource, SliceOutcome)> {
        if let Err(reason) = check_eligibility(source) {
            counter!(OUTPUT_SLICES_SKIPPED_TOTAL).increment(1);
            return Ok((source.clone(), SliceOutcome::Skipped(reason)));
        }

        info!("Slicing table \"{}\".", source.source_name);

        let input_path = source.item.path.clone();
        let output_dir = temporary_path(&input_path);
        let request = SliceRequest {
            table_name: source.source_name.clone(),
            input_manifest_path: source.manifest.as_ref().map(|manifest| manifest.path.clone()),
            output_manifest_path: manifest_path_for(&output_dir),
            output_dir,
            input_path,
            max_part_size_bytes: self.max_part_size_bytes,
            manifest_format: self.manifest_format,
        };

        if let Err(err) = self.produce(&request).await {
            remove_path(&request.output_dir);
            remove_path(&request.output_manifest_path);
            return Err(err);
        }

        let manifest_path = match swap_in(&request) {
            Ok(manifest_path) => manifest_path,
            Err(err) => {
                remove_path(&request.output_dir);
                remove_path(&request.output_manifest_path);
                return Err(err);
            }
        };
        let (parts, size) = describe_parts(&request.input_path)?;

        info!(
            parts,
            size, "Table \"{}\" sliced into {parts} parts", source.source_name
        );
        counter!(OUTPUT_SLICES_CREATED_TOTAL).increment(1);

        let sliced = TableSource {
            source_name: source.source_name.clone(),
            item: PhysicalItem {
                name: source.item.name.clone(),
                path: request.input_path.clone(),
                kind: ItemKind::Directory,
                size,
            },
            manifest: Some(ManifestFile {
                name: format!("{}{MANIFEST_SUFFIX}", source.source_name),
                path: manifest_path,
                source_name: source.source_name.clone(),
            }),
            mapping: source.mapping.clone(),
        };

        Ok((sliced, SliceOutcome::Sliced))
    }

    async fn produce(&self, request: &SliceRequest) -> OutputResult<()> {
        self.command.slice(request).await?;
        output_fail_point(SLICE_BEFORE_SWAP)?;

        if !request.output_dir.is_dir() || !request.output_manifest_path.is_file() {
            bail!(
                ErrorKind::SliceFailed,
                "Slicer produced no output",
                format!(
                    "Slicing table \"{}\" did not produce \"{}\"",
                    request.table_name,
                    request.output_dir.display()
                )
            );
        }

        Ok(())
    }
}

/// Checks whether a source can be sliced.
pub fn check_eligibility(source: &TableSource) -> Result<(), SliceSkipped> {
    match source.item.kind {
        ItemKind::WorkspaceObject { .. } => return Err(SliceSkipped::NotLocal),
        ItemKind::Directory if source.manifest.is_none() => {
            return Err(SliceSkipped::SlicedWithoutManifest);
        }
        _ => {}
    }

    if source.item.size == 0 {
        return Err(SliceSkipped::Empty);
    }

    if let Some(mapping) = &source.mapping {
        if !mapping.table.has_default_dialect() {
            return Err(SliceSkipped::CustomDialect);
        }
        if !mapping.table.columns.is_empty() {
            return Err(SliceSkipped::ColumnsDeclared);
        }
    }

    Ok(())
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut temporary = path.as_os_str().to_owned();
    temporary.push(format!("-{}", Uuid::new_v4().simple()));
    PathBuf::from(temporary)
}

/// Replaces the original source with the sliced output and returns the new manifest path.
///
/// The original is moved aside first and only removed once the output is in place. When a
/// rename fails, the original is moved back.
fn swap_in(request: &SliceRequest) -> OutputResult<PathBuf> {
    let original = &request.input_path;
    let backup = temporary_path(original);
    fs::rename(original, &backup)?;

    let manifest_path = manifest_path_for(original);
    if let Err(err) = move_output(request, &manifest_path) {
        if original.exists() {
            if let Err(undo_err) = fs::rename(original, &request.output_dir) {
                warn!(
                    path = %original.display(),
                    error = %undo_err,
                    "failed to move sliced output aside"
                );
            }
        }
        if let Err(restore_err) = fs::rename(&backup, original) {
            warn!(
                backup = %backup.display(),
                original = %original.display(),
                error = %restore_err,
                "failed to restore source after a failed swap"
            );
        }
        return Err(err);
    }

    remove_path(&backup);
    Ok(manifest_path)
}

fn move_output(request: &SliceRequest, manifest_path: &Path) -> OutputResult<()> {
    fs::rename(&request.output_dir, &request.input_path)?;
    output_fail_point(SLICE_DURING_SWAP)?;
    fs::rename(&request.output_manifest_path, manifest_path)?;

    Ok(())
}

fn describe_parts(dir: &Path) -> OutputResult<(usize, u64)> {
    let mut parts = 0;
    let mut size = 0;
    for entry in fs::read_dir(dir)? {
        let metadata = entry?.metadata()?;
        if metadata.is_file() {
            parts += 1;
            size += metadata.len();
        }
    }

    Ok((parts, size))
}

fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        Ok(())
    };

    if let Err(err) = result {
        warn!(path = %path.display(), error = %err, "failed to remove slicer output");
    }
}
