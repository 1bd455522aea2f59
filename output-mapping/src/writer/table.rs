use std::collections::BTreeSet;
use std::path::Path;

use config::shared::{
    FilesConfiguration, MetadataEntryConfig, OutputMappingConfig, TableMapping, TableOutputConfig,
    TablesConfiguration,
};
use storage::StorageClient;
use storage::types::{LoadRequest, LoadSource, MetadataEntry, TableId, TableInfo};
use tracing::{debug, info, warn};

use crate::bail;
use crate::error::{ErrorKind, OutputError, OutputResult};
use crate::inventory::{
    ItemKind, ManifestFile, Staging, list_data_items, list_manifests, list_workspace_items,
};
use crate::load::{LoadTaskQueue, MetadataOperation};
use crate::mapping::{
    CombineOptions, ManifestCodec, ResolvedConfiguration, SourceKind, SourceLayout, TableSource,
    combine,
};
use crate::mapping::destination::{check_unique_destinations, resolve_destination};
use crate::prepare::StoragePreparer;
use crate::schema::DesiredSchema;
use crate::slicer::{ConfiguredSliceCommand, Slicer};
use crate::writer::file::FileWriter;
use crate::writer::system_metadata::{SYSTEM_PROVIDER, SystemMetadata};

/// Everything known about one source before the remote side is touched.
#[derive(Debug, Clone)]
struct LoadPlan {
    source: TableSource,
    config: TableOutputConfig,
    layout: SourceLayout,
    destination: TableId,
}

/// Loads staged tables into storage.
#[derive(Debug, Clone)]
pub struct TableWriter<C> {
    client: C,
    config: OutputMappingConfig,
    codec: ManifestCodec,
    slicer: Slicer<ConfiguredSliceCommand>,
    preparer: StoragePreparer<C>,
}

impl<C> TableWriter<C>
where
    C: StorageClient,
{
    pub fn new(client: C, config: OutputMappingConfig) -> Self {
        let slicer = Slicer::new(
            ConfiguredSliceCommand::from(&config.slicing),
            config.slicing.max_part_size_bytes,
            config.manifest_format,
        );

        Self {
            preparer: StoragePreparer::new(client.clone()),
            codec: ManifestCodec::new(config.manifest_format),
            client,
            config,
            slicer,
        }
    }

    /// Prepares every destination and submits its load.
    ///
    /// Validation failures are returned before any remote change is made. Failures of single
    /// destinations are recorded in the returned queue and reported by
    /// [`LoadTaskQueue::wait_for_all`] together with load failures.
    pub async fn upload_tables(
        &self,
        staging_path: &Path,
        configuration: &TablesConfiguration,
        system_metadata: &SystemMetadata,
        staging: &Staging,
        use_file_storage_only: bool,
        is_failed_job: bool,
    ) -> OutputResult<LoadTaskQueue<C>> {
        self.config.validate()?;
        configuration.validate()?;

        let mut queue = LoadTaskQueue::new(self.client.clone(), self.config.job_polling.clone());

        if use_file_storage_only {
            let table_files = configuration.table_files.clone().unwrap_or_default();
            FileWriter::new(self.client.clone(), &self.config)
                .upload_files(
                    staging_path,
                    &FilesConfiguration::default(),
                    system_metadata,
                    Some(&table_files),
                    is_failed_job,
                )
                .await?;
            return Ok(queue);
        }

        let mappings = configuration
            .mapping
            .iter()
            .filter(|mapping| !is_failed_job || mapping.table.write_always)
            .cloned()
            .collect::<Vec<TableMapping>>();

        let (items, manifests) = match staging {
            Staging::Local => (list_data_items(staging_path)?, list_manifests(staging_path)?),
            Staging::Workspace { workspace_id } => {
                let items = list_workspace_items(&self.client, workspace_id, staging_path).await?;
                (items, list_staged_manifests(staging_path)?)
            }
        };

        let combined = combine(
            &items,
            &mappings,
            &manifests,
            CombineOptions {
                kind: SourceKind::Table,
                include_unmapped: !is_failed_job,
            },
        )?;
        debug!(report = ?combined.report, "sources combined");

        let sources = self
            .slice_if_enabled(combined.sources, staging, is_failed_job)
            .await?;

        let plans = self
            .plan_loads(sources, configuration.bucket.as_deref())
            .await?;

        for plan in plans {
            let destination = plan.destination.clone();
            match self.prepare_load(&plan, system_metadata).await {
                Ok((request, freshly_created, metadata)) => {
                    queue.enqueue(request, freshly_created, metadata).await;
                }
                Err(err) => {
                    warn!(table_id = %destination, error = %err, "destination preparation failed");
                    queue.push_failed(destination, err);
                }
            }
        }

        Ok(queue)
    }

    async fn slice_if_enabled(
        &self,
        sources: Vec<TableSource>,
        staging: &Staging,
        is_failed_job: bool,
    ) -> OutputResult<Vec<TableSource>> {
        if !self.config.slicing.enabled || is_failed_job || *staging != Staging::Local {
            return Ok(sources);
        }

        let mut names = BTreeSet::new();
        if !sources
            .iter()
            .all(|source| names.insert(source.source_name.as_str()))
        {
            info!("slicing disabled, some sources are mapped to multiple destinations");
            return Ok(sources);
        }

        self.slicer.slice_sources(&sources).await
    }

    /// Resolves configuration, layout and destination of every source.
    async fn plan_loads(
        &self,
        sources: Vec<TableSource>,
        default_bucket: Option<&str>,
    ) -> OutputResult<Vec<LoadPlan>> {
        let mut plans = Vec::with_capacity(sources.len());
        for source in sources {
            let resolved = ResolvedConfiguration::resolve(&source, &self.codec)?;
            let destination = resolve_destination(&source.source_name, &resolved, default_bucket)?;
            let layout =
                SourceLayout::resolve(&self.client, &source, &resolved.config, &self.codec).await?;

            plans.push(LoadPlan {
                source,
                config: resolved.config,
                layout,
                destination,
            });
        }

        check_unique_destinations(
            plans
                .iter()
                .map(|plan| (plan.source.source_name.as_str(), &plan.destination)),
        )?;

        Ok(plans)
    }

    async fn prepare_load(
        &self,
        plan: &LoadPlan,
        system_metadata: &SystemMetadata,
    ) -> OutputResult<(LoadRequest, bool, Vec<MetadataOperation>)> {
        let destination = &plan.destination;
        let desired = DesiredSchema::from_config(&plan.config, &plan.layout);

        let prepared = self
            .preparer
            .prepare(destination, &plan.config, &desired, system_metadata)
            .await?;

        let (table, freshly_created) = match prepared.table {
            Some(table) => (table, false),
            None => (self.create_table(destination, &desired).await?, true),
        };

        let request = LoadRequest {
            table_id: table.id.clone(),
            source: load_source(&plan.source),
            columns: if plan.layout.has_header {
                Vec::new()
            } else {
                plan.layout.columns.clone()
            },
            delimiter: plan.config.delimiter.clone(),
            enclosure: plan.config.enclosure.clone(),
            incremental: plan.config.incremental,
        };
        let metadata = metadata_operations(&plan.config, &table, freshly_created, system_metadata);

        Ok((request, freshly_created, metadata))
    }

    async fn create_table(
        &self,
        destination: &TableId,
        desired: &DesiredSchema,
    ) -> OutputResult<TableInfo> {
        if desired.columns.is_empty() {
            bail!(
                ErrorKind::TableLoadFailed,
                "Table has no columns",
                format!("Failed to load table \"{destination}\": There are no data in import file")
            );
        }

        let table = self
            .client
            .create_table_definition(destination, &desired.table_definition())
            .await
            .map_err(|err| {
                let detail = format!("Cannot create table \"{destination}\": {}", err.message);
                OutputError::from_client_error(
                    ErrorKind::TableLoadFailed,
                    "Table creation failed",
                    detail,
                    err,
                )
            })?;
        info!(
            table_id = %destination,
            columns = ?desired.column_names(),
            primary_key = ?desired.primary_key,
            "table created"
        );

        Ok(table)
    }
}

fn list_staged_manifests(staging_path: &Path) -> OutputResult<Vec<ManifestFile>> {
    if !staging_path.is_dir() {
        return Ok(Vec::new());
    }

    list_manifests(staging_path)
}

fn load_source(source: &TableSource) -> LoadSource {
    match &source.item.kind {
        ItemKind::File => LoadSource::LocalFile(source.item.path.clone()),
        ItemKind::Directory => LoadSource::SlicedDirectory(source.item.path.clone()),
        ItemKind::WorkspaceObject { workspace_id } => LoadSource::WorkspaceObject {
            workspace_id: workspace_id.clone(),
            name: source.source_name.clone(),
        },
    }
}

/// Metadata written once the load succeeds.
fn metadata_operations(
    config: &TableOutputConfig,
    table: &TableInfo,
    freshly_created: bool,
    system_metadata: &SystemMetadata,
) -> Vec<MetadataOperation> {
    let mut operations = Vec::new();
    if freshly_created {
        operations.push(MetadataOperation::table(
            SYSTEM_PROVIDER,
            system_metadata.created_entries(),
        ));
    }
    operations.push(MetadataOperation::table(
        SYSTEM_PROVIDER,
        system_metadata.updated_entries(),
    ));

    match system_metadata.component_id() {
        Some(provider) => push_user_metadata(&mut operations, config, provider),
        None if has_user_metadata(config) => {
            warn!(table_id = %table.id, "metadata skipped, component id is not set");
        }
        None => {}
    }

    operations.retain(|operation| !operation.is_empty());
    operations
}

fn push_user_metadata(
    operations: &mut Vec<MetadataOperation>,
    config: &TableOutputConfig,
    provider: &str,
) {
    operations.push(MetadataOperation::table(
        provider,
        config.metadata.iter().map(entry).collect(),
    ));
    for (column, entries) in &config.column_metadata {
        operations.push(MetadataOperation::column(
            column.clone(),
            provider,
            entries.iter().map(entry).collect(),
        ));
    }
    for column in config.schema.iter().flatten() {
        operations.push(MetadataOperation::column(
            column.name.clone(),
            provider,
            column
                .metadata
                .iter()
                .map(|(key, value)| MetadataEntry::new(key.clone(), value.clone()))
                .collect(),
        ));
    }
}

fn has_user_metadata(config: &TableOutputConfig) -> bool {
    !config.metadata.is_empty()
        || !config.column_metadata.is_empty()
        || config
            .schema
            .iter()
            .flatten()
            .any(|column| !column.metadata.is_empty())
}

fn entry(entry: &MetadataEntryConfig) -> MetadataEntry {
    MetadataEntry::new(entry.key.clone(), entry.value.clone())
}
