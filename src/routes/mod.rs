//! Route modules for the Nebula PDF server

pub mod credits;
pub mod gateway;
pub mod health;
pub mod history;
pub mod payments;
pub mod pdf;
pub mod profile;
pub mod uploads;
pub mod viewer;

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::Multipart,
    http::{header, StatusCode},
    response::Response,
};

use crate::error::{AppError, Result};

/// A file part of a multipart request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A fully read multipart request: file parts in order plus text fields
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub files: Vec<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl MultipartForm {
    /// Drain a multipart body into memory
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            tracing::warn!("Failed to read multipart field: {}", e);
            AppError::BadRequest(format!("Failed to read upload: {}", e))
        })? {
            let name = field.name().unwrap_or("").to_string();
            let file_name = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().unwrap_or("").to_string();

            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?;

            match file_name {
                Some(file_name) => {
                    tracing::debug!(field = %name, file_name = %file_name, size = data.len(), "Received file part");
                    form.files.push(UploadedFile {
                        field: name,
                        file_name,
                        content_type,
                        bytes: data.to_vec(),
                    });
                }
                None => {
                    let value = String::from_utf8_lossy(&data).into_owned();
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// First file sent under `field`
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    pub fn take_file(&mut self, field: &str) -> Option<UploadedFile> {
        let index = self.files.iter().position(|f| f.field == field)?;
        Some(self.files.remove(index))
    }

    /// Non-blank text field
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// `200` response carrying a PDF as a download
pub fn pdf_attachment(file_name: &str, bytes: Vec<u8>) -> Result<Response> {
    attachment(file_name, "application/pdf", bytes)
}

pub fn attachment(file_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<Response> {
    // Quotes and line breaks would corrupt the header value.
    let safe: String = file_name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", safe),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_header() {
        let response = pdf_attachment("secure_a\"b.pdf", b"%PDF-1.4".to_vec()).unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"secure_a_b.pdf\""
        );
    }
}
