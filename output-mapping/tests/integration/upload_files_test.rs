use config::shared::{BranchConfig, FileManifest, FileMapping, FilesConfiguration};
use output_mapping::error::ErrorKind;
use output_mapping::test_utils::staging::StagingDir;
use output_mapping::test_utils::{fast_config, strings, system_metadata};
use output_mapping::writer::{FileWriter, SystemMetadata};
use storage::ClientError;
use storage::memory::{MemoryStorage, StorageOperation};
use telemetry::init_test_tracing;

fn file_mapping(source: &str, tags: &[&str]) -> FileMapping {
    FileMapping {
        source: source.to_string(),
        file: FileManifest {
            tags: strings(tags),
            ..Default::default()
        },
    }
}

fn writer(storage: &MemoryStorage) -> FileWriter<MemoryStorage> {
    FileWriter::new(storage.clone(), &fast_config())
}

#[tokio::test]
async fn mapping_wins_over_manifest_and_defaults_apply_otherwise() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("a.txt", "a");
    staging.write_manifest("a.txt", r#"{"tags": ["from-manifest"], "is_public": true}"#);
    staging.write("b.txt", "b");
    staging.write_manifest("b.txt", r#"{"tags": ["from-manifest"], "is_permanent": true}"#);
    staging.write("c.txt", "c");
    let storage = MemoryStorage::new();

    let configuration = FilesConfiguration {
        mapping: vec![file_mapping("a.txt", &["first"]), file_mapping("a.txt", &["mapped"])],
    };
    let file_ids = writer(&storage)
        .upload_files(
            staging.path(),
            &configuration,
            &SystemMetadata::empty(),
            None,
            false,
        )
        .await
        .unwrap();
    assert_eq!(file_ids.len(), 3);

    let files = storage.files().await;
    let names = files
        .iter()
        .map(|file| file.options.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);

    assert_eq!(files[0].options.tags, strings(&["mapped"]));
    assert!(!files[0].options.is_public);
    assert_eq!(files[1].options.tags, strings(&["from-manifest"]));
    assert!(files[1].options.is_permanent);
    assert!(files[2].options.tags.is_empty());
    assert!(files[2].options.is_encrypted);
    assert_eq!(files[2].content, b"c");
}

#[tokio::test]
async fn system_tags_are_appended() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("report.pdf", "%PDF");
    let storage = MemoryStorage::new();

    writer(&storage)
        .upload_files(
            staging.path(),
            &FilesConfiguration {
                mapping: vec![file_mapping("report.pdf", &["monthly"])],
            },
            &system_metadata(),
            None,
            false,
        )
        .await
        .unwrap();

    assert_eq!(
        storage.files().await[0].options.tags,
        strings(&[
            "monthly",
            "componentId: keboola.test-component",
            "configurationId: 123",
            "runId: 999",
        ])
    );
}

#[tokio::test]
async fn development_branch_prefixes_tags() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("report.pdf", "%PDF");
    let storage = MemoryStorage::new();
    let mut config = fast_config();
    config.branch = Some(BranchConfig {
        id: "1234".to_string(),
        is_default: false,
        use_branch_storage: false,
    });

    FileWriter::new(storage.clone(), &config)
        .upload_files(
            staging.path(),
            &FilesConfiguration {
                mapping: vec![file_mapping("report.pdf", &["monthly"])],
            },
            &SystemMetadata::empty(),
            None,
            false,
        )
        .await
        .unwrap();

    assert_eq!(
        storage.files().await[0].options.tags,
        strings(&["1234-monthly"])
    );
}

#[tokio::test]
async fn failed_job_uploads_nothing() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("report.pdf", "%PDF");
    let storage = MemoryStorage::new();

    let file_ids = writer(&storage)
        .upload_files(
            staging.path(),
            &FilesConfiguration::default(),
            &system_metadata(),
            None,
            true,
        )
        .await
        .unwrap();

    assert!(file_ids.is_empty());
    assert!(storage.calls().await.is_empty());
}

#[tokio::test]
async fn missing_file_and_orphaned_manifest_are_rejected() {
    init_test_tracing();
    let staging = StagingDir::new();
    let storage = MemoryStorage::new();

    let err = writer(&storage)
        .upload_files(
            staging.path(),
            &FilesConfiguration {
                mapping: vec![file_mapping("missing.pdf", &[])],
            },
            &SystemMetadata::empty(),
            None,
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.detail(), Some("File 'missing.pdf' not found."));

    staging.write_manifest("gone.pdf", "{}");
    let err = writer(&storage)
        .upload_files(
            staging.path(),
            &FilesConfiguration::default(),
            &SystemMetadata::empty(),
            None,
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OrphanedManifest);
    assert_eq!(
        err.detail(),
        Some("Found orphaned file manifest: 'gone.pdf.manifest'")
    );
    assert!(storage.files().await.is_empty());
}

#[tokio::test]
async fn upload_failure_keeps_status() {
    init_test_tracing();
    let staging = StagingDir::new();
    staging.write("report.pdf", "%PDF");
    let storage = MemoryStorage::new();
    storage
        .fail_next(
            StorageOperation::UploadFile,
            None,
            ClientError::new(503, "storage unavailable"),
        )
        .await;

    let err = writer(&storage)
        .upload_files(
            staging.path(),
            &FilesConfiguration::default(),
            &SystemMetadata::empty(),
            None,
            false,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FileUploadFailed);
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(
        err.detail(),
        Some("Cannot upload file 'report.pdf' to Storage API: storage unavailable")
    );
}
