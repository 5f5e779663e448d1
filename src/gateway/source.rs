//! Fetching file-by-URL inputs

use super::types::{GatewayError, InputFile};

/// Download a relay object by its public URL, refusing bodies over `max_mb`
pub async fn fetch_remote_file(
    http: &reqwest::Client,
    url: &str,
    file_name: &str,
    max_mb: usize,
) -> Result<InputFile, GatewayError> {
    let fetch_err = |e: reqwest::Error| GatewayError::Fetch(format!("Failed to fetch file from storage: {}", e));
    let limit = max_mb * 1024 * 1024;
    let too_large = || GatewayError::InvalidInput(format!("File size exceeds {}MB limit", max_mb));

    let mut response = http.get(url).send().await.map_err(fetch_err)?;

    if !response.status().is_success() {
        return Err(GatewayError::Fetch(format!(
            "Failed to fetch file from storage: {}",
            response.status().as_u16()
        )));
    }

    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(too_large());
    }

    // The read is capped whatever Content-Length claims.
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
        if bytes.len() + chunk.len() > limit {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }

    tracing::debug!(url, size = bytes.len(), "Fetched remote input");

    Ok(InputFile {
        name: file_name.to_string(),
        bytes,
    })
}
