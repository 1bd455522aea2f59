use config::shared::TablesConfiguration;
use output_mapping::inventory::Staging;
use output_mapping::test_utils::staging::StagingDir;
use output_mapping::test_utils::{fast_config, strings, system_metadata, table_id, table_mapping};
use output_mapping::writer::TableWriter;
use storage::memory::{MemoryStorage, StorageOperation};
use telemetry::init_test_tracing;

fn workspace() -> Staging {
    Staging::Workspace {
        workspace_id: "ws-1".to_string(),
    }
}

#[tokio::test]
async fn workspace_objects_are_loaded_without_slicing() {
    init_test_tracing();
    let storage = MemoryStorage::new();
    storage
        .add_workspace_object("ws-1", "orders", "id,amount\n1,10\n2,20\n")
        .await;
    storage
        .add_workspace_object("ws-1", "customers", "id,name\n1,a\n")
        .await;
    let manifests = StagingDir::new();
    manifests.write_manifest(
        "customers",
        r#"{"destination": "in.c-main.customers", "primary_key": ["id"]}"#,
    );

    let configuration = TablesConfiguration {
        mapping: vec![table_mapping("orders", "in.c-main.orders")],
        ..Default::default()
    };
    let queue = TableWriter::new(storage.clone(), fast_config())
        .upload_tables(
            manifests.path(),
            &configuration,
            &system_metadata(),
            &workspace(),
            false,
            false,
        )
        .await
        .unwrap();
    assert_eq!(queue.task_count(), 2);
    queue.wait_for_all().await.unwrap();

    assert_eq!(
        storage.table_rows(&table_id("in.c-main.orders")).await.unwrap(),
        vec![strings(&["1", "10"]), strings(&["2", "20"])]
    );
    let customers = storage.table(&table_id("in.c-main.customers")).await.unwrap();
    assert_eq!(customers.primary_key, strings(&["id"]));
    assert_eq!(customers.rows_count, 1);
    assert_eq!(manifests.entries(), vec!["customers.manifest"]);
}

#[tokio::test]
async fn missing_manifest_directory_is_tolerated() {
    init_test_tracing();
    let storage = MemoryStorage::new();
    storage
        .add_workspace_object("ws-1", "orders", "id\n1\n")
        .await;
    let staging = StagingDir::new();
    let missing = staging.path().join("not-there");

    let configuration = TablesConfiguration {
        mapping: vec![table_mapping("orders", "in.c-main.orders")],
        ..Default::default()
    };
    TableWriter::new(storage.clone(), fast_config())
        .upload_tables(
            &missing,
            &configuration,
            &system_metadata(),
            &workspace(),
            false,
            false,
        )
        .await
        .unwrap()
        .wait_for_all()
        .await
        .unwrap();

    assert_eq!(storage.calls_of(StorageOperation::SubmitLoad).await.len(), 1);
}
