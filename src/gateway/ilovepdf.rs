//! iLovePDF compression client
//!
//! Four calls: start a task, upload the file to the assigned worker,
//! process, download.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use super::types::{GatewayError, GatewayOperation, InputFile, OperationKind, ProcessedFile};
use super::PdfVendor;
use crate::config::ILovePdfConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct StartResponse {
    server: String,
    task: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    server_filename: String,
}

/// iLovePDF REST client
pub struct ILovePdfClient {
    http: reqwest::Client,
    public_key: String,
    secret_key: String,
    api_base: String,
}

impl ILovePdfClient {
    pub fn new(config: &ILovePdfConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            public_key: config.public_key.clone(),
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Self-signed HS256 JWT identifying the project
    pub fn auth_token(&self, issued_at: i64) -> Result<String, GatewayError> {
        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let payload = json!({
            "iss": "ilovepdf",
            "iat": issued_at,
            "jti": self.public_key,
        });

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        );

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| GatewayError::NotConfigured("iLovePDF Keys"))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Workers are announced as bare host names
    fn worker_url(server: &str) -> String {
        let server = server.trim_end_matches('/');
        if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("https://{}", server)
        }
    }

    async fn start(&self, token: &str) -> Result<StartResponse, GatewayError> {
        let url = format!("{}/v1/start/compress", self.api_base);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to start task: {}", e)))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Vendor(format!("Failed to start task: {}", text)));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to start task: {}", e)))
    }

    async fn upload(
        &self,
        token: &str,
        worker: &str,
        task: &str,
        input: &InputFile,
    ) -> Result<UploadResponse, GatewayError> {
        let part = reqwest::multipart::Part::bytes(input.bytes.clone())
            .file_name(input.name.clone())
            .mime_str("application/pdf")
            .map_err(|e| GatewayError::Vendor(format!("Failed to upload file: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("task", task.to_string())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/v1/upload", worker))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to upload file: {}", e)))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Vendor(format!("Failed to upload file: {}", text)));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to upload file: {}", e)))
    }

    async fn process_task(
        &self,
        token: &str,
        worker: &str,
        task: &str,
        server_filename: &str,
        file_name: &str,
        level: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "task": task,
            "tool": "compress",
            "files": [{ "server_filename": server_filename, "filename": file_name }],
            "compression_level": level,
        });

        let response = self
            .http
            .post(format!("{}/v1/process", worker))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to process file: {}", e)))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Vendor(format!("Failed to process file: {}", text)));
        }

        Ok(())
    }

    async fn download(&self, token: &str, worker: &str, task: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/download/{}", worker, task))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to download file: {}", e)))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Vendor(format!("Failed to download file: {}", text)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Vendor(format!("Failed to download file: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PdfVendor for ILovePdfClient {
    fn name(&self) -> &'static str {
        "ilovepdf"
    }

    fn supports(&self, kind: OperationKind) -> bool {
        kind == OperationKind::Compress
    }

    async fn process(
        &self,
        op: &GatewayOperation,
        input: InputFile,
    ) -> Result<ProcessedFile, GatewayError> {
        let GatewayOperation::Compress { level } = op else {
            return Err(GatewayError::InvalidInput(format!(
                "iLovePDF does not handle {}",
                op.kind().as_str()
            )));
        };

        let token = self.auth_token(chrono::Utc::now().timestamp())?;

        let started = self.start(&token).await?;
        let worker = Self::worker_url(&started.server);
        tracing::debug!(task = %started.task, worker = %worker, "iLovePDF task started");

        let uploaded = self.upload(&token, &worker, &started.task, &input).await?;
        self.process_task(
            &token,
            &worker,
            &started.task,
            &uploaded.server_filename,
            &input.name,
            level.ilovepdf_level(),
        )
        .await?;

        let bytes = self.download(&token, &worker, &started.task).await?;
        tracing::info!(
            original = input.bytes.len(),
            compressed = bytes.len(),
            "iLovePDF compression finished"
        );

        Ok(ProcessedFile {
            file_name: op.output_name(&input.name),
            bytes,
        })
    }
}
