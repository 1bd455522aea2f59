use config::shared::{
    DeleteWhereOperator, OutputMappingConfig, TableFilesConfig, TableOutputConfig,
    TablesConfiguration,
};
use output_mapping::error::ErrorKind;
use output_mapping::inventory::Staging;
use output_mapping::test_utils::staging::StagingDir;
use output_mapping::test_utils::{fast_config, strings, system_metadata, table_id, table_mapping};
use output_mapping::writer::{SystemMetadata, TableWriter};
use storage::ClientError;
use storage::memory::{MemoryStorage, StorageOperation};
use storage::types::ColumnSpec;
use telemetry::init_test_tracing;

fn tables(mappings: Vec<config::shared::TableMapping>) -> TablesConfiguration {
    TablesConfiguration {
        mapping: mappings,
        ..Default::default()
    }
}

async fn upload_and_wait(
    storage: &MemoryStorage,
    config: OutputMappingConfig,
    staging: &StagingDir,
    configuration: &TablesConfiguration,
) -> output_mapping::OutputResult<Vec<storage::types::JobId>> {
    let queue = TableWriter::new(storage.clone(), config)
        .upload_tables(
            staging.path(),
            configuration,
            &system_metadata(),
            &Staging::Local,
            false,
            false,
        )
        .await?;
    queue.wait_for_all().await
}

#[tokio::test]
async fn mapped_csv_files_become_tables_in_declared_order() {
    init_test_tracing();
    let metrics = telemetry::metrics::init_metrics_handle().unwrap();
    let staging = StagingDir::new();
    staging.write("b.csv", "id,name\n1,bob\n");
    staging.write("a.csv", "\"x\",\"y\",\"z\"\n1,2,3\n4,5,6\n");
    let storage = MemoryStorage::new();

    let configuration = tables(vec![
        table_mapping("b.csv", "in.c-main.b"),
        table_mapping("a.csv", "in.c-main.a"),
    ]);
    let job_ids = upload_and_wait(&storage, fast_config(), &staging, &configuration)
        .await
        .unwrap();
    assert_eq!(job_ids.len(), 2);

    let created = storage
        .calls_of(StorageOperation::CreateTable)
        .await
        .into_iter()
        .map(|call| call.target)
        .collect::<Vec<_>>();
    assert_eq!(created, vec!["in.c-main.b", "in.c-main.a"]);

    let a = storage.table(&table_id("in.c-main.a")).await.unwrap();
    assert_eq!(a.column_names(), vec!["x", "y", "z"]);
    assert_eq!(a.rows_count, 2);
    let b = storage.table(&table_id("in.c-main.b")).await.unwrap();
    assert_eq!(b.column_names(), vec!["id", "name"]);
    assert_eq!(
        storage.table_rows(&table_id("in.c-main.b")).await.unwrap(),
        vec![strings(&["1", "bob"])]
    );
    assert!(metrics.render().contains("output_load_tasks_succeeded_total"));
}

#[tokio::test]
async fn manifest_primary_key_is_applied_to_new_table() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("users.csv", "Id,Name,City\n1,a,Prague\n2,b,Brno\n");
    staging.write_manifest(
        "users.csv",
        r#"{"destination": "in.c-main.users", "primary_key": ["Id", "Name"]}"#,
    );
    let storage = MemoryStorage::new();

    upload_and_wait(
        &storage,
        fast_config(),
        &staging,
        &TablesConfiguration::default(),
    )
    .await
    .unwrap();

    let table = storage.table(&table_id("in.c-main.users")).await.unwrap();
    assert_eq!(table.primary_key, strings(&["Id", "Name"]));
    assert_eq!(table.rows_count, 2);
}

#[tokio::test]
async fn rerun_with_extended_primary_key_keeps_rows() {
    init_test_tracing();
    let storage = MemoryStorage::new();

    let first = StagingDir::new();
    first.write("t.csv", "Id,Name\n1,a\n2,b\n");
    let mut mapping = table_mapping("t.csv", "in.c-main.t");
    mapping.table.primary_key = strings(&["Id"]);
    upload_and_wait(&storage, fast_config(), &first, &tables(vec![mapping.clone()]))
        .await
        .unwrap();

    let second = StagingDir::new();
    second.write("t.csv", "Id,Name\n3,c\n");
    mapping.table.primary_key = strings(&["Id", "Name"]);
    mapping.table.incremental = true;
    upload_and_wait(&storage, fast_config(), &second, &tables(vec![mapping]))
        .await
        .unwrap();

    let table_id = table_id("in.c-main.t");
    let table = storage.table(&table_id).await.unwrap();
    assert_eq!(table.primary_key, strings(&["Id", "Name"]));
    assert_eq!(
        storage.table_rows(&table_id).await.unwrap(),
        vec![strings(&["1", "a"]), strings(&["2", "b"]), strings(&["3", "c"])]
    );
}

#[tokio::test]
async fn new_header_columns_are_added_to_existing_table() {
    init_test_tracing();
    let storage = MemoryStorage::new();
    storage
        .insert_table(
            table_id("in.c-main.t"),
            vec![ColumnSpec::untyped("id")],
            vec![],
            vec![strings(&["1"])],
        )
        .await;
    let staging = StagingDir::new();
    staging.write("t.csv", "id,name\n2,b\n");
    let mut mapping = table_mapping("t.csv", "in.c-main.t");
    mapping.table.incremental = true;

    upload_and_wait(&storage, fast_config(), &staging, &tables(vec![mapping]))
        .await
        .unwrap();

    let table_id = table_id("in.c-main.t");
    assert_eq!(
        storage.table(&table_id).await.unwrap().column_names(),
        vec!["id", "name"]
    );
    assert_eq!(
        storage.table_rows(&table_id).await.unwrap(),
        vec![strings(&["1", ""]), strings(&["2", "b"])]
    );
}

#[tokio::test]
async fn rows_are_deleted_before_incremental_load() {
    init_test_tracing();
    let storage = MemoryStorage::new();
    storage
        .insert_table(
            table_id("in.c-main.t"),
            vec![ColumnSpec::untyped("id"), ColumnSpec::untyped("city")],
            vec![],
            vec![strings(&["1", "Prague"]), strings(&["2", "Brno"])],
        )
        .await;
    let staging = StagingDir::new();
    staging.write("t.csv", "id,city\n3,Prague\n");
    let mut mapping = table_mapping("t.csv", "in.c-main.t");
    mapping.table = TableOutputConfig {
        incremental: true,
        delete_where_column: Some("city".to_string()),
        delete_where_operator: DeleteWhereOperator::Eq,
        delete_where_values: strings(&["Prague"]),
        ..mapping.table
    };

    upload_and_wait(&storage, fast_config(), &staging, &tables(vec![mapping]))
        .await
        .unwrap();

    assert_eq!(
        storage.table_rows(&table_id("in.c-main.t")).await.unwrap(),
        vec![strings(&["2", "Brno"]), strings(&["3", "Prague"])]
    );
}

#[tokio::test]
async fn failed_load_drops_only_the_fresh_failed_table() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("t1.csv", "id\n1\n");
    staging.write("t2.csv", "id\n2\n");
    let storage = MemoryStorage::new();
    storage
        .fail_next(
            StorageOperation::RunLoad,
            Some(table_id("in.c-main.t2")),
            ClientError::internal("import failed"),
        )
        .await;

    let configuration = tables(vec![
        table_mapping("t1.csv", "in.c-main.t1"),
        table_mapping("t2.csv", "in.c-main.t2"),
    ]);
    let err = upload_and_wait(&storage, fast_config(), &staging, &configuration)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TableLoadFailed);
    assert!(err.detail().unwrap().contains("in.c-main.t2"));
    assert_eq!(
        storage.table_rows(&table_id("in.c-main.t1")).await.unwrap(),
        vec![strings(&["1"])]
    );
    assert!(storage.table(&table_id("in.c-main.t2")).await.is_none());
}

#[tokio::test]
async fn preparation_failures_are_reported_with_load_failures() {
    init_test_tracing();
    let storage = MemoryStorage::new();
    storage
        .insert_table(
            table_id("in.c-main.existing"),
            vec![ColumnSpec::untyped("id")],
            vec![],
            vec![],
        )
        .await;
    storage
        .fail_next(
            StorageOperation::AddColumn,
            None,
            ClientError::bad_request("column limit reached"),
        )
        .await;
    storage
        .fail_next(
            StorageOperation::RunLoad,
            Some(table_id("in.c-main.fresh")),
            ClientError::internal("import failed"),
        )
        .await;
    let staging = StagingDir::new();
    staging.write("existing.csv", "id,extra\n1,x\n");
    staging.write("fresh.csv", "id\n1\n");

    let configuration = tables(vec![
        table_mapping("existing.csv", "in.c-main.existing"),
        table_mapping("fresh.csv", "in.c-main.fresh"),
    ]);
    let err = upload_and_wait(&storage, fast_config(), &staging, &configuration)
        .await
        .unwrap_err();

    assert_eq!(
        err.kinds(),
        vec![ErrorKind::StructuralChangeFailed, ErrorKind::TableLoadFailed]
    );
    assert_eq!(err.len(), 2);
    assert!(storage.table(&table_id("in.c-main.existing")).await.is_some());
    assert!(storage.table(&table_id("in.c-main.fresh")).await.is_none());
}

#[tokio::test]
async fn unavailable_destination_is_named_in_the_error() {
    init_test_tracing();
    let storage = MemoryStorage::new();
    storage
        .fail_next(
            StorageOperation::GetTable,
            Some(table_id("in.c-main.b")),
            ClientError::internal("unavailable"),
        )
        .await;
    let staging = StagingDir::new();
    staging.write("a.csv", "id\n1\n");
    staging.write("b.csv", "id\n2\n");

    let configuration = tables(vec![
        table_mapping("a.csv", "in.c-main.a"),
        table_mapping("b.csv", "in.c-main.b"),
    ]);
    let err = upload_and_wait(&storage, fast_config(), &staging, &configuration)
        .await
        .unwrap_err();

    assert_eq!(err.kinds(), vec![ErrorKind::StorageRequestFailed]);
    assert_eq!(
        err.detail(),
        Some("Failed to load table \"in.c-main.b\": unavailable")
    );
    assert_eq!(err.status_code(), Some(500));
    assert!(err.to_string().contains("in.c-main.b"));
    assert_eq!(
        storage.table_rows(&table_id("in.c-main.a")).await.unwrap(),
        vec![strings(&["1"])]
    );
    assert!(storage.table(&table_id("in.c-main.b")).await.is_none());
}

#[tokio::test]
async fn duplicate_destinations_fail_before_any_remote_call() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("a.csv", "id\n1\n");
    staging.write("b.csv", "id\n2\n");
    let storage = MemoryStorage::new();

    let configuration = tables(vec![
        table_mapping("a.csv", "in.c-main.t"),
        table_mapping("b.csv", "in.c-main.t"),
    ]);
    let err = TableWriter::new(storage.clone(), fast_config())
        .upload_tables(
            staging.path(),
            &configuration,
            &system_metadata(),
            &Staging::Local,
            false,
            false,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateDestination);
    assert!(err.is_validation_error());
    assert!(storage.calls().await.is_empty());
}

#[tokio::test]
async fn manifests_resolving_to_one_table_are_rejected() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("a.csv", "id\n1\n");
    staging.write("b.csv", "id\n2\n");
    staging.write_manifest("a.csv", r#"{"destination": "t"}"#);
    staging.write_manifest("b.csv", r#"{"destination": "in.c-main.t"}"#);
    let storage = MemoryStorage::new();

    let configuration = TablesConfiguration {
        bucket: Some("in.c-main".to_string()),
        ..Default::default()
    };
    let err = upload_and_wait(&storage, fast_config(), &staging, &configuration)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateDestination);
    assert!(storage.calls().await.is_empty());
}

#[tokio::test]
async fn missing_sources_and_orphaned_manifests_are_validation_errors() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("a.csv", "id\n1\n");
    let storage = MemoryStorage::new();

    let configuration = tables(vec![
        table_mapping("missing.csv", "in.c-main.m"),
        table_mapping("other.csv", "in.c-main.o"),
    ]);
    let err = upload_and_wait(&storage, fast_config(), &staging, &configuration)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(
        err.detail(),
        Some("Table sources not found: \"missing.csv\", \"other.csv\"")
    );

    staging.write_manifest("orphan.csv", "{}");
    let err = upload_and_wait(&storage, fast_config(), &staging, &TablesConfiguration::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OrphanedManifest);
    assert_eq!(
        err.detail(),
        Some("Found orphaned table manifest: \"orphan.csv.manifest\"")
    );
}

#[tokio::test]
async fn failed_job_processes_only_write_always_mappings() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("always.csv", "id\n1\n");
    staging.write("regular.csv", "id\n2\n");
    staging.write("unmapped.csv", "id\n3\n");
    let storage = MemoryStorage::new();

    let mut always = table_mapping("always.csv", "in.c-main.always");
    always.table.write_always = true;
    let configuration = tables(vec![
        always,
        table_mapping("regular.csv", "in.c-main.regular"),
        table_mapping("gone.csv", "in.c-main.gone"),
    ]);

    let queue = TableWriter::new(storage.clone(), fast_config())
        .upload_tables(
            staging.path(),
            &configuration,
            &system_metadata(),
            &Staging::Local,
            false,
            true,
        )
        .await
        .unwrap();
    assert_eq!(queue.task_count(), 1);
    queue.wait_for_all().await.unwrap();

    assert_eq!(storage.table_ids().await, vec![table_id("in.c-main.always")]);
    // Failed jobs never slice.
    assert_eq!(staging.read("always.csv"), b"id\n1\n");
}

#[tokio::test]
async fn large_sources_are_sliced_before_load() {
    init_test_tracing();
    let staging = StagingDir::new();
    let content = (0..50)
        .map(|index| format!("{index},\"value {index}\"\n"))
        .collect::<String>();
    staging.write("big.csv", format!("id,value\n{content}"));
    let storage = MemoryStorage::new();

    let mut config = fast_config();
    config.slicing.max_part_size_bytes = 64;
    upload_and_wait(
        &storage,
        config,
        &staging,
        &tables(vec![table_mapping("big.csv", "in.c-main.big")]),
    )
    .await
    .unwrap();

    assert!(staging.path().join("big.csv").is_dir());
    assert!(staging.path().join("big.csv.manifest").is_file());
    let table = storage.table(&table_id("in.c-main.big")).await.unwrap();
    assert_eq!(table.column_names(), vec!["id", "value"]);
    assert_eq!(table.rows_count, 50);
    assert_eq!(
        storage.table_rows(&table_id("in.c-main.big")).await.unwrap()[49],
        strings(&["49", "value 49"])
    );
}

#[tokio::test]
async fn custom_dialect_is_loaded_unsliced() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("t.csv", "id;name\n1;a\n");
    let storage = MemoryStorage::new();
    let mut mapping = table_mapping("t.csv", "in.c-main.t");
    mapping.table.delimiter = ";".to_string();

    upload_and_wait(&storage, fast_config(), &staging, &tables(vec![mapping]))
        .await
        .unwrap();

    assert!(staging.path().join("t.csv").is_file());
    assert_eq!(
        storage.table_rows(&table_id("in.c-main.t")).await.unwrap(),
        vec![strings(&["1", "a"])]
    );
}

#[tokio::test]
async fn empty_file_does_not_create_a_table() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("empty.csv", "");
    let storage = MemoryStorage::new();

    let err = upload_and_wait(
        &storage,
        fast_config(),
        &staging,
        &tables(vec![table_mapping("empty.csv", "in.c-main.empty")]),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TableLoadFailed);
    assert!(
        err.detail()
            .unwrap()
            .ends_with("There are no data in import file")
    );
    assert!(storage.table_ids().await.is_empty());
}

#[tokio::test]
async fn system_and_user_metadata_are_written_after_load() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("t.csv", "id\n1\n");
    staging.write_manifest(
        "t.csv",
        r#"{
            "destination": "in.c-main.t",
            "metadata": [{"key": "owner", "value": "data-team"}],
            "column_metadata": {"id": [{"key": "description", "value": "identifier"}]}
        }"#,
    );
    let storage = MemoryStorage::new();

    upload_and_wait(
        &storage,
        fast_config(),
        &staging,
        &TablesConfiguration::default(),
    )
    .await
    .unwrap();

    let table_id = table_id("in.c-main.t");
    let metadata = storage.table_metadata(&table_id).await;
    let keys = metadata
        .iter()
        .map(|(provider, entry)| format!("{provider}:{}", entry.key))
        .collect::<Vec<_>>();
    assert!(keys.contains(&"system:KBC.createdBy.component.id".to_string()));
    assert!(keys.contains(&"system:KBC.lastUpdatedBy.configuration.id".to_string()));
    assert!(keys.contains(&"keboola.test-component:owner".to_string()));
    assert_eq!(storage.column_metadata(&table_id, "id").await.len(), 1);

    let bucket_metadata = storage.bucket_metadata(table_id.bucket()).await;
    assert_eq!(bucket_metadata[0].1.key, "KBC.createdBy.component.id");
}

#[tokio::test]
async fn file_storage_only_uploads_tables_as_files() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("t.csv", "id\n1\n");
    staging.write_manifest("t.csv", r#"{"destination": "in.c-main.t"}"#);
    let storage = MemoryStorage::new();

    let configuration = TablesConfiguration {
        table_files: Some(TableFilesConfig {
            tags: strings(&["exported"]),
            is_permanent: true,
        }),
        ..Default::default()
    };
    let queue = TableWriter::new(storage.clone(), fast_config())
        .upload_tables(
            staging.path(),
            &configuration,
            &system_metadata(),
            &Staging::Local,
            true,
            false,
        )
        .await
        .unwrap();
    assert_eq!(queue.task_count(), 0);
    assert!(queue.wait_for_all().await.unwrap().is_empty());

    assert!(storage.table_ids().await.is_empty());
    let files = storage.files().await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].options.name, "t.csv");
    assert!(files[0].options.is_permanent);
    assert_eq!(
        files[0].options.tags,
        strings(&[
            "exported",
            "componentId: keboola.test-component",
            "configurationId: 123",
            "runId: 999",
        ])
    );
}

#[test]
fn table_metadata_requires_component_id() {
    let err = SystemMetadata::new(
        [("runId".to_string(), "1".to_string())]
            .into_iter()
            .collect(),
    )
    .unwrap_err();
    assert_eq!(err.detail(), Some("Component Id must be set"));
}
