use storage::StorageClient;
use storage::types::{BucketId, BucketInfo};
use tracing::info;

use crate::error::{ErrorKind, OutputError, OutputResult};
use crate::writer::system_metadata::{SYSTEM_PROVIDER, SystemMetadata};

/// Backend of buckets created by output mapping.
pub const DEFAULT_BUCKET_BACKEND: &str = "snowflake";

/// Returns the bucket, creating it when it does not exist yet.
///
/// A created bucket is annotated with the identity of the run.
pub async fn ensure_bucket<C>(
    client: &C,
    bucket_id: &BucketId,
    system_metadata: &SystemMetadata,
) -> OutputResult<BucketInfo>
where
    C: StorageClient,
{
    match client.get_bucket(bucket_id).await {
        Ok(bucket) => return Ok(bucket),
        Err(err) if !err.is_not_found() => return Err(err.into()),
        Err(_) => {}
    }

    let bucket = client
        .create_bucket(bucket_id, DEFAULT_BUCKET_BACKEND)
        .await
        .map_err(|err| {
            let detail = format!("Cannot create bucket \"{bucket_id}\": {}", err.message);
            OutputError::from_client_error(
                ErrorKind::StorageRequestFailed,
                "Bucket creation failed",
                detail,
                err,
            )
        })?;
    info!(%bucket_id, backend = %bucket.backend, "bucket created");

    let entries = system_metadata.created_entries();
    if !entries.is_empty() {
        client
            .write_bucket_metadata(bucket_id, SYSTEM_PROVIDER, &entries)
            .await
            .map_err(|err| {
                let detail = format!(
                    "Cannot write metadata of bucket \"{bucket_id}\": {}",
                    err.message
                );
                OutputError::from_client_error(
                    ErrorKind::MetadataUpdateFailed,
                    "Bucket metadata update failed",
                    detail,
                    err,
                )
            })?;
    }

    Ok(bucket)
}
