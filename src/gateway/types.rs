//! Gateway types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::ToolType;

/// Gateway errors
///
/// Vendor and fetch failures display their message verbatim; the message is
/// what the caller sees in the 500 body.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Missing {0}")]
    NotConfigured(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Vendor(String),

    #[error("{0}")]
    Fetch(String),
}

/// Compression strength requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompressionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    /// Lenient parse; anything unrecognised is `Medium`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => CompressionLevel::Low,
            "HIGH" | "EXTREME" => CompressionLevel::High,
            _ => CompressionLevel::Medium,
        }
    }

    /// iLovePDF `compression_level` value
    pub fn ilovepdf_level(&self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "recommended",
            CompressionLevel::High => "extreme",
        }
    }
}

/// Kind of vendor operation, without parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Compress,
    Encrypt,
    Decrypt,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Compress => "compress",
            OperationKind::Encrypt => "encrypt",
            OperationKind::Decrypt => "decrypt",
        }
    }

    /// Gated tool charged for this operation
    pub fn tool(&self) -> ToolType {
        match self {
            OperationKind::Compress => ToolType::Compress,
            OperationKind::Encrypt => ToolType::Secure,
            OperationKind::Decrypt => ToolType::Unlock,
        }
    }

    /// Prefix of the returned file name
    pub fn output_prefix(&self) -> &'static str {
        match self {
            OperationKind::Compress => "compressed_",
            OperationKind::Encrypt => "secure_",
            OperationKind::Decrypt => "unlocked_",
        }
    }

    /// Name of the secret that enables this operation
    pub fn required_secret(&self) -> &'static str {
        match self {
            OperationKind::Compress => "iLovePDF Keys",
            OperationKind::Encrypt | OperationKind::Decrypt => "PDF.co API Key",
        }
    }
}

/// A vendor operation with its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOperation {
    Compress { level: CompressionLevel },
    Encrypt { password: String },
    Decrypt { password: String },
}

impl GatewayOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            GatewayOperation::Compress { .. } => OperationKind::Compress,
            GatewayOperation::Encrypt { .. } => OperationKind::Encrypt,
            GatewayOperation::Decrypt { .. } => OperationKind::Decrypt,
        }
    }

    pub fn output_name(&self, input_name: &str) -> String {
        format!("{}{}", self.kind().output_prefix(), input_name)
    }
}

/// File handed to a vendor
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// File returned by a vendor
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}
