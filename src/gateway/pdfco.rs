//! PDF.co security client (password add/remove)

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use super::types::{GatewayError, GatewayOperation, InputFile, OperationKind, ProcessedFile};
use super::PdfVendor;
use crate::config::PdfCoConfig;

/// Envelope shared by PDF.co JSON responses
#[derive(Debug, Deserialize)]
struct PdfCoResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
}

impl PdfCoResponse {
    /// The result URL, or the vendor's own message when it flagged an error
    fn into_url(self, step: &str) -> Result<String, GatewayError> {
        if self.error {
            return Err(GatewayError::Vendor(
                self.message.unwrap_or_else(|| format!("{} failed", step)),
            ));
        }
        self.url
            .ok_or_else(|| GatewayError::Vendor(format!("{}: response carried no url", step)))
    }
}

/// PDF.co REST client
pub struct PdfCoClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl PdfCoClient {
    pub fn new(config: &PdfCoConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
        failure: &str,
    ) -> Result<String, GatewayError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, endpoint))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Vendor(format!("{}: {}", failure, e)))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Vendor(format!("{}: {}", failure, text)));
        }

        let parsed: PdfCoResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Vendor(format!("{}: {}", failure, e)))?;
        parsed.into_url(failure)
    }

    /// Upload the input as base64 and get back a temporary URL
    async fn upload(&self, input: &InputFile) -> Result<String, GatewayError> {
        let body = json!({
            "file": STANDARD.encode(&input.bytes),
            "name": input.name,
        });
        self.post_json("/v1/file/upload/base64", &body, "Upload Failed").await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to download result: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::Vendor(format!(
                "Failed to download result: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to download result: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PdfVendor for PdfCoClient {
    fn name(&self) -> &'static str {
        "pdf.co"
    }

    fn supports(&self, kind: OperationKind) -> bool {
        matches!(kind, OperationKind::Encrypt | OperationKind::Decrypt)
    }

    async fn process(
        &self,
        op: &GatewayOperation,
        input: InputFile,
    ) -> Result<ProcessedFile, GatewayError> {
        let output_name = op.output_name(&input.name);

        let source_url = self.upload(&input).await?;
        tracing::debug!(file = %input.name, "Uploaded to PDF.co");

        let result_url = match op {
            GatewayOperation::Encrypt { password } => {
                let body = json!({
                    "url": source_url,
                    "ownerPassword": password,
                    "userPassword": password,
                    "encryptionAlgorithm": "AES_128bit",
                    "printAllowed": true,
                    "copyAllowed": false,
                    "modifyAllowed": false,
                    "name": output_name,
                });
                self.post_json("/v1/pdf/security/add", &body, "Security Add Failed")
                    .await?
            }
            GatewayOperation::Decrypt { password } => {
                let body = json!({
                    "url": source_url,
                    "password": password,
                    "name": output_name,
                });
                self.post_json("/v1/pdf/security/remove", &body, "Security Removal Failed")
                    .await?
            }
            GatewayOperation::Compress { .. } => {
                return Err(GatewayError::InvalidInput(
                    "PDF.co client does not handle compress".to_string(),
                ))
            }
        };

        let bytes = self.download(&result_url).await?;
        tracing::info!(file = %output_name, size = bytes.len(), "PDF.co {} finished", op.kind().as_str());

        Ok(ProcessedFile {
            file_name: output_name,
            bytes,
        })
    }
}
