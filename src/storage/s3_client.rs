//! S3-compatible storage client
//!
//! Wraps the AWS SDK for the upload relay bucket.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use chrono::DateTime;
use tokio::task::JoinHandle;

use crate::config::StorageConfig;
use crate::error::{AppError, Result, StorageError};

use super::types::{PresignedUpload, StorageObject};

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
    endpoint: String,
    public_base: String,
    presign_ttl: Duration,
}

impl S3Client {
    /// Build a client from configuration; no network traffic happens here
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "nebula-pdf",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url())
            .region(Region::new(config.region_or_default()))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and R2 account endpoints
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            public_base: config.public_url.trim_end_matches('/').to_string(),
            presign_ttl: Duration::from_secs(config.presign_ttl_secs),
        }
    }

    /// Check the bucket is reachable; failures are logged, not fatal
    pub async fn verify_bucket(&self) -> bool {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                tracing::info!("Connected to S3 bucket: {}", self.bucket);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    self.bucket,
                    e
                );
                false
            }
        }
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Lifetime of presigned upload URLs
    pub fn presign_ttl(&self) -> Duration {
        self.presign_ttl
    }

    /// URL an object can be fetched from without credentials
    pub fn public_url(&self, key: &str) -> String {
        if self.public_base.is_empty() {
            format!("{}/{}/{}", self.endpoint, self.bucket, key)
        } else {
            format!("{}/{}", self.public_base, key)
        }
    }

    /// Presigned PUT URL for a direct upload of `key`
    pub async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedUpload> {
        let presign_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Presign(format!("Invalid presign TTL: {}", e)))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::Presign(format!("Failed to presign {}: {}", key, e)))?;

        Ok(PresignedUpload {
            upload_url: request.uri().to_string(),
            public_url: self.public_url(key),
            key: key.to_string(),
        })
    }

    /// Upload an object
    pub async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::SdkError(format!("Failed to put object {}: {}", key, e)))?;

        tracing::debug!(key, size, "Stored object");
        Ok(())
    }

    /// Get an object's data
    pub async fn get_object(&self, key: &str) -> Result<StorageObject> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("404") || e.to_string().contains("NoSuchKey") {
                    AppError::Storage(StorageError::ObjectNotFound(key.to_string()))
                } else {
                    AppError::Storage(StorageError::SdkError(format!(
                        "Failed to get object {}: {}",
                        key, e
                    )))
                }
            })?;

        let size = response.content_length().unwrap_or(0);
        let content_type = response.content_type().map(|s| s.to_string());
        let last_modified = response
            .last_modified()
            .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()));

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::SdkError(format!("Failed to read object body: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(StorageObject {
            key: key.to_string(),
            size,
            content_type,
            last_modified,
            data,
        })
    }

    /// Delete an object
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::SdkError(format!("Failed to delete object {}: {}", key, e))
            })?;

        tracing::debug!(key, "Deleted object");
        Ok(())
    }

    /// Fire-and-forget delete; a failure is only logged
    pub fn spawn_cleanup(&self, key: impl Into<String>) -> JoinHandle<()> {
        let client = self.clone();
        let key = key.into();
        tokio::spawn(async move {
            if let Err(e) = client.delete_object(&key).await {
                tracing::warn!(key = %key, "Cleanup of relay object failed: {}", e);
            }
        })
    }
}
