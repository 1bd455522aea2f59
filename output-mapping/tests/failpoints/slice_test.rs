use config::shared::TablesConfiguration;
use output_mapping::error::ErrorKind;
use output_mapping::failpoints::{SLICE_BEFORE_SWAP, SLICE_DURING_SWAP};
use output_mapping::inventory::Staging;
use output_mapping::test_utils::failpoints::FailpointScenario;
use output_mapping::test_utils::staging::StagingDir;
use output_mapping::test_utils::{fast_config, system_metadata, table_mapping};
use output_mapping::writer::TableWriter;
use storage::memory::MemoryStorage;
use telemetry::init_test_tracing;

const CONTENT: &str = "id,name\n1,a\n2,b\n";

async fn upload(storage: &MemoryStorage, staging: &StagingDir) -> output_mapping::OutputError {
    let configuration = TablesConfiguration {
        mapping: vec![table_mapping("t.csv", "in.c-main.t")],
        ..Default::default()
    };

    TableWriter::new(storage.clone(), fast_config())
        .upload_tables(
            staging.path(),
            &configuration,
            &system_metadata(),
            &Staging::Local,
            false,
            false,
        )
        .await
        .unwrap_err()
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_before_swap_leaves_source_untouched() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(SLICE_BEFORE_SWAP, "return")]);

    let staging = StagingDir::new();
    staging.write("t.csv", CONTENT);
    staging.write_manifest("t.csv", r#"{"incremental": true}"#);
    let storage = MemoryStorage::new();

    let err = upload(&storage, &staging).await;

    assert_eq!(err.kind(), ErrorKind::InjectedFailure);
    assert_eq!(staging.entries(), vec!["t.csv", "t.csv.manifest"]);
    assert_eq!(staging.read("t.csv"), CONTENT.as_bytes());
    assert_eq!(staging.read("t.csv.manifest"), br#"{"incremental": true}"#);
    assert!(storage.calls().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn io_failure_is_reported_with_its_kind() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(SLICE_BEFORE_SWAP, "return(io)")]);

    let staging = StagingDir::new();
    staging.write("t.csv", CONTENT);
    let storage = MemoryStorage::new();

    let err = upload(&storage, &staging).await;

    assert_eq!(err.kind(), ErrorKind::IoError);
    assert_eq!(
        err.detail(),
        Some("The failpoint 'slice.before_swap' returned an error")
    );
    assert_eq!(staging.entries(), vec!["t.csv"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_during_swap_restores_source() {
    init_test_tracing();
    let _scenario = FailpointScenario::setup(&[(SLICE_DURING_SWAP, "return(io)")]);

    let staging = StagingDir::new();
    staging.write("t.csv", CONTENT);
    staging.write_manifest("t.csv", r#"{"incremental": true}"#);
    let storage = MemoryStorage::new();

    let err = upload(&storage, &staging).await;

    assert_eq!(err.kind(), ErrorKind::IoError);
    assert_eq!(
        err.detail(),
        Some("The failpoint 'slice.during_swap' returned an error")
    );
    assert_eq!(staging.entries(), vec!["t.csv", "t.csv.manifest"]);
    assert_eq!(staging.read("t.csv"), CONTENT.as_bytes());
    assert_eq!(staging.read("t.csv.manifest"), br#"{"incremental": true}"#);
    assert!(storage.calls().await.is_empty());
}
