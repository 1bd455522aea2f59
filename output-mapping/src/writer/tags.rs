use config::shared::{BranchConfig, FileManifest};

use crate::writer::system_metadata::SystemMetadata;

/// Appends the identity tags of the run to the manifest tags.
pub fn add_system_tags(mut manifest: FileManifest, metadata: &SystemMetadata) -> FileManifest {
    manifest.tags.extend(metadata.tags());
    manifest
}

/// Prefixes every tag with the branch id when writing into a development branch that shares
/// storage with the default branch.
pub fn rewrite_tags(mut manifest: FileManifest, branch: Option<&BranchConfig>) -> FileManifest {
    let Some(branch) = branch else {
        return manifest;
    };
    if branch.is_default || branch.use_branch_storage {
        return manifest;
    }

    manifest.tags = manifest
        .tags
        .into_iter()
        .map(|tag| format!("{}-{tag}", branch.id))
        .collect();
    manifest
}
