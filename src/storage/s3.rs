//! S3-compatible blob store
//!
//! Uses path-style addressing so MinIO and similar servers work without
//! wildcard DNS. Public URLs are built from the configured prefix, not from
//! the endpoint, so a CDN can sit in front of the bucket.

use super::{BlobStore, public_url};
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::utils::blob_key;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use bytes::Bytes;
use tracing::{info, instrument};

pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

/// 404 responses become `ImageNotFound`, everything else stays a storage error
fn map_sdk_error<E>(err: SdkError<E>) -> AppError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let SdkError::ServiceError(ref service_err) = err {
        if service_err.raw().status().as_u16() == 404 {
            return ErrorKind::ImageNotFound.into();
        }
    }
    AppError::storage(err)
}

impl S3BlobStore {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        prefix: &str,
    ) -> Self {
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };

        let credentials = aws_sdk_s3::config::Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "picrank-config",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .endpoint_url(&endpoint)
            .force_path_style(true)
            .build();

        info!(endpoint = %endpoint, bucket = %bucket, "S3 blob store configured");
        Self {
            client: Client::from_conf(config),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self, bytes), fields(backend = "s3", size = bytes.len()))]
    async fn put(&self, album: u64, image: u64, bytes: Bytes) -> AppResult<String> {
        let key = blob_key(album, image);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(bytes.into())
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(public_url(&self.prefix, &self.bucket, &key))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, album: u64, image: u64) -> AppResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(blob_key(album, image))
            .send()
            .await
            .map_err(map_sdk_error)?;
        let data = output.body.collect().await.map_err(AppError::storage)?;
        Ok(data.into_bytes())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn remove(&self, album: u64, image: u64) -> AppResult<()> {
        // delete_object succeeds for missing keys
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(blob_key(album, image))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    async fn health(&self) -> AppResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| AppError::new(ErrorKind::BadHealthStorage, e.to_string()))?;
        Ok(())
    }
}
