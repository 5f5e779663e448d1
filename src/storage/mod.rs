//! Storage module for S3-compatible backends
//!
//! Supports Cloudflare R2, MinIO, Backblaze B2, and AWS S3.

mod s3_client;
mod types;
mod upload;

pub use s3_client::S3Client;
pub use types::*;
pub use upload::*;
