//! Thin wrapper over the S3 calls the API makes. Photos are the only objects stored.

use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

use crate::errors::AppError;

pub async fn put_object(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    body: Bytes,
    content_type: &str,
) -> Result<(), AppError> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body))
        .content_type(content_type)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("upload of {key} failed: {e}")))?;

    info!("Uploaded s3://{}/{}", bucket, key);
    Ok(())
}

pub async fn get_object_bytes(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Result<Vec<u8>, AppError> {
    let object = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("download of {key} failed: {e}")))?;

    let bytes = object
        .body
        .collect()
        .await
        .map_err(|e| AppError::S3(format!("reading body of {key} failed: {e}")))?;

    Ok(bytes.into_bytes().to_vec())
}

/// Object key for an uploaded job photo.
pub fn photo_key(job_id: uuid::Uuid, photo_id: uuid::Uuid, extension: &str) -> String {
    format!("jobs/{job_id}/photos/{photo_id}.{extension}")
}
