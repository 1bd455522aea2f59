use std::collections::BTreeMap;
use std::path::Path;

use config::shared::{
    BranchConfig, FileManifest, FilesConfiguration, OutputMappingConfig, TableFilesConfig,
};
use metrics::counter;
use storage::StorageClient;
use storage::types::{FileId, FileUploadOptions};
use tracing::{debug, info};

use crate::error::{ErrorKind, OutputError, OutputResult};
use crate::inventory::{ItemKind, list_data_items, list_manifests};
use crate::mapping::{CombineOptions, FileSource, ManifestCodec, SourceKind, combine};
use crate::metrics::OUTPUT_FILES_UPLOADED_TOTAL;
use crate::writer::system_metadata::SystemMetadata;
use crate::writer::tags::{add_system_tags, rewrite_tags};

/// Uploads staged files to file storage.
#[derive(Debug, Clone)]
pub struct FileWriter<C> {
    client: C,
    codec: ManifestCodec,
    branch: Option<BranchConfig>,
}

impl<C> FileWriter<C>
where
    C: StorageClient,
{
    pub fn new(client: C, config: &OutputMappingConfig) -> Self {
        Self {
            client,
            codec: ManifestCodec::new(config.manifest_format),
            branch: config.branch.clone(),
        }
    }

    /// Uploads every file in `staging_path` and returns the created file ids in name order.
    ///
    /// Upload options come from `table_files` when given, else from the last mapping of the
    /// file, else from its manifest. Nothing is uploaded for a failed job.
    pub async fn upload_files(
        &self,
        staging_path: &Path,
        configuration: &FilesConfiguration,
        system_metadata: &SystemMetadata,
        table_files: Option<&TableFilesConfig>,
        is_failed_job: bool,
    ) -> OutputResult<Vec<FileId>> {
        if is_failed_job {
            debug!("skipping file upload of a failed job");
            return Ok(Vec::new());
        }
        configuration.validate()?;

        let files = list_data_items(staging_path)?
            .into_iter()
            .filter(|item| item.kind == ItemKind::File)
            .collect::<Vec<_>>();
        let manifests = list_manifests(staging_path)?;

        let combined = combine(
            &files,
            &configuration.mapping,
            &manifests,
            CombineOptions {
                kind: SourceKind::File,
                include_unmapped: true,
            },
        )?;

        // Later mappings of the same file override earlier ones.
        let mut sources: BTreeMap<String, FileSource> = BTreeMap::new();
        for source in combined.sources {
            sources.insert(source.source_name.clone(), source);
        }

        let mut file_ids = Vec::with_capacity(sources.len());
        for source in sources.values() {
            let mut manifest = self.resolve_manifest(source, table_files)?;
            if !system_metadata.is_empty() {
                manifest = add_system_tags(manifest, system_metadata);
            }
            let manifest = rewrite_tags(manifest, self.branch.as_ref());

            file_ids.push(self.upload(source, manifest).await?);
        }

        info!(count = file_ids.len(), "files uploaded");

        Ok(file_ids)
    }

    fn resolve_manifest(
        &self,
        source: &FileSource,
        table_files: Option<&TableFilesConfig>,
    ) -> OutputResult<FileManifest> {
        if let Some(table_files) = table_files {
            return Ok(table_files.clone().into());
        }

        match (&source.mapping, &source.manifest) {
            (Some(mapping), _) => Ok(mapping.file.clone()),
            (None, Some(manifest)) => self.codec.read(&manifest.path),
            (None, None) => Ok(FileManifest::default()),
        }
    }

    async fn upload(&self, source: &FileSource, manifest: FileManifest) -> OutputResult<FileId> {
        let options = FileUploadOptions {
            name: source.source_name.clone(),
            tags: manifest.tags,
            is_public: manifest.is_public,
            is_permanent: manifest.is_permanent,
            is_encrypted: manifest.is_encrypted,
            notify: manifest.notify,
        };

        let file_id = self
            .client
            .upload_file(&source.item.path, &options)
            .await
            .map_err(|err| {
                let detail = format!(
                    "Cannot upload file '{}' to Storage API: {}",
                    source.source_name, err.message
                );
                OutputError::from_client_error(
                    ErrorKind::FileUploadFailed,
                    "File upload failed",
                    detail,
                    err,
                )
            })?;

        debug!(file_name = %source.source_name, %file_id, tags = ?options.tags, "file uploaded");
        counter!(OUTPUT_FILES_UPLOADED_TOTAL).increment(1);

        Ok(file_id)
    }
}
