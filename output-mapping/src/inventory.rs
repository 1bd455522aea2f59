//! Listing of the data items and manifests present in a staging directory.

use std::fs;
use std::path::{Path, PathBuf};

use storage::StorageClient;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, OutputResult};

/// Suffix of manifest sidecar files.
pub const MANIFEST_SUFFIX: &str = ".manifest";

/// Where the data to upload was staged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Staging {
    /// Files and sliced directories on the local filesystem.
    #[default]
    Local,
    /// Table-like objects stored in a remote workspace.
    Workspace { workspace_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    File,
    /// A directory of parts produced by slicing.
    Directory,
    WorkspaceObject { workspace_id: String },
}

/// A data item found in staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalItem {
    pub name: String,
    pub path: PathBuf,
    pub kind: ItemKind,
    /// Size in bytes. For directories this is the size of all parts together.
    pub size: u64,
}

/// A `<source>.manifest` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub name: String,
    pub path: PathBuf,
    /// Name of the data item the manifest describes.
    pub source_name: String,
}

/// Returns `<path>.manifest`.
pub fn manifest_path_for(path: &Path) -> PathBuf {
    let mut manifest = path.as_os_str().to_owned();
    manifest.push(MANIFEST_SUFFIX);
    PathBuf::from(manifest)
}

/// Lists files and sliced directories under `root`, sorted by name.
///
/// Hidden entries and manifests are not data items.
pub fn list_data_items(root: &Path) -> OutputResult<Vec<PhysicalItem>> {
    let mut items = Vec::new();
    for (name, path) in list_entries(root)? {
        if name.ends_with(MANIFEST_SUFFIX) {
            continue;
        }

        let metadata = fs::metadata(&path)?;
        let item = if metadata.is_dir() {
            PhysicalItem {
                name,
                size: directory_size(&path)?,
                path,
                kind: ItemKind::Directory,
            }
        } else {
            PhysicalItem {
                name,
                path,
                kind: ItemKind::File,
                size: metadata.len(),
            }
        };
        items.push(item);
    }

    debug!(root = %root.display(), count = items.len(), "listed data items");

    Ok(items)
}

/// Lists the manifest files under `root`, sorted by name.
pub fn list_manifests(root: &Path) -> OutputResult<Vec<ManifestFile>> {
    let mut manifests = Vec::new();
    for (name, path) in list_entries(root)? {
        let Some(source_name) = name.strip_suffix(MANIFEST_SUFFIX) else {
            continue;
        };
        if !path.is_file() {
            continue;
        }

        manifests.push(ManifestFile {
            source_name: source_name.to_string(),
            name,
            path,
        });
    }

    Ok(manifests)
}

/// Lists the objects of a workspace as data items.
///
/// Paths point into `root` so the manifests staged next to them can be found.
pub async fn list_workspace_items<C>(
    client: &C,
    workspace_id: &str,
    root: &Path,
) -> OutputResult<Vec<PhysicalItem>>
where
    C: StorageClient,
{
    let mut names = client.list_workspace_objects(workspace_id).await?;
    names.sort();

    Ok(names
        .into_iter()
        .map(|name| PhysicalItem {
            path: root.join(&name),
            name,
            kind: ItemKind::WorkspaceObject {
                workspace_id: workspace_id.to_string(),
            },
            size: 0,
        })
        .collect())
}

fn list_entries(root: &Path) -> OutputResult<Vec<(String, PathBuf)>> {
    if !root.is_dir() {
        bail!(
            ErrorKind::IoError,
            "Staging directory not found",
            format!("`{}` directory does not exist", root.display())
        );
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        entries.push((name, entry.path()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(entries)
}

fn directory_size(path: &Path) -> OutputResult<u64> {
    let mut size = 0;
    for entry in fs::read_dir(path)? {
        let metadata = entry?.metadata()?;
        if metadata.is_file() {
            size += metadata.len();
        }
    }

    Ok(size)
}
