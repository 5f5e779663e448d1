//! Third-party PDF operation gateway
//!
//! Relays gated operations (compress, encrypt, decrypt) to external PDF
//! services. Each vendor implements [`PdfVendor`]; the [`Gateway`] picks the
//! first registered vendor that supports an operation.

mod ilovepdf;
mod pdfco;
mod source;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use ilovepdf::ILovePdfClient;
pub use pdfco::PdfCoClient;
pub use source::fetch_remote_file;
pub use types::*;

use crate::config::VendorConfig;

/// An external PDF processing service
#[async_trait]
pub trait PdfVendor: Send + Sync {
    /// Vendor name for logs
    fn name(&self) -> &'static str;

    /// Whether this vendor can run `kind`
    fn supports(&self, kind: OperationKind) -> bool;

    /// Run the whole vendor chain and return the processed bytes
    async fn process(
        &self,
        op: &GatewayOperation,
        input: InputFile,
    ) -> Result<ProcessedFile, GatewayError>;
}

/// Vendor registry
#[derive(Clone, Default)]
pub struct Gateway {
    vendors: Vec<Arc<dyn PdfVendor>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every vendor whose credentials are configured
    pub fn from_config(config: &VendorConfig, http: reqwest::Client) -> Self {
        let mut gateway = Self::new();

        if let Some(ilovepdf) = &config.ilovepdf {
            gateway = gateway.with_vendor(Arc::new(ILovePdfClient::new(ilovepdf, http.clone())));
        } else {
            tracing::warn!("iLovePDF keys not set; compression is unavailable");
        }

        if let Some(pdfco) = &config.pdfco {
            gateway = gateway.with_vendor(Arc::new(PdfCoClient::new(pdfco, http)));
        } else {
            tracing::warn!("PDF.co key not set; encrypt/decrypt are unavailable");
        }

        gateway
    }

    pub fn with_vendor(mut self, vendor: Arc<dyn PdfVendor>) -> Self {
        self.vendors.push(vendor);
        self
    }

    /// Vendor for `kind`, or a configuration error naming the missing secret
    pub fn vendor_for(&self, kind: OperationKind) -> Result<Arc<dyn PdfVendor>, GatewayError> {
        self.vendors
            .iter()
            .find(|v| v.supports(kind))
            .cloned()
            .ok_or(GatewayError::NotConfigured(kind.required_secret()))
    }

    /// Run `op` on `input` through the matching vendor
    pub async fn process(
        &self,
        op: &GatewayOperation,
        input: InputFile,
    ) -> Result<ProcessedFile, GatewayError> {
        let vendor = self.vendor_for(op.kind())?;
        let size = input.bytes.len();
        tracing::info!(vendor = vendor.name(), op = op.kind().as_str(), size, "Dispatching to vendor");

        vendor.process(op, input).await.map_err(|e| {
            tracing::error!(vendor = vendor.name(), op = op.kind().as_str(), "Vendor chain failed: {}", e);
            e
        })
    }
}
