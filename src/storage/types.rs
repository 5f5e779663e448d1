//! Storage types

use chrono::{DateTime, Utc};
use serde::Serialize;

/// An object fetched from the bucket
#[derive(Debug)]
pub struct StorageObject {
    pub key: String,
    pub size: i64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub data: Vec<u8>,
}

/// Credentials for a direct browser-to-bucket upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub upload_url: String,
    pub public_url: String,
    pub key: String,
}
