//! Relay object naming and upload validation

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};

pub const PDF_MIME: &str = "application/pdf";

/// Default ceiling for uploaded PDFs
pub const MAX_PDF_SIZE_MB: usize = 100;

/// Replace every character outside `[A-Za-z0-9.-]` with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Key for a temporary relay object: `temp/{user}/{millis}_{safe name}`
pub fn temp_upload_key(user_id: &str, now: DateTime<Utc>, file_name: &str) -> String {
    format!(
        "temp/{}/{}_{}",
        user_id,
        now.timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

/// Whether `key` names an object under the `temp/` relay prefix
pub fn is_relay_key(key: &str) -> bool {
    key.starts_with("temp/") && !key.split('/').any(|seg| seg == ".." || seg.is_empty())
}

/// Whether `key` is a relay object minted for `user_id` (`temp/{uid}/...`)
pub fn is_own_relay_key(user_id: &str, key: &str) -> bool {
    is_relay_key(key)
        && key
            .strip_prefix("temp/")
            .and_then(|rest| rest.strip_prefix(user_id))
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|name| !name.is_empty())
}

/// Whether a declared content type (or the file extension) names a PDF
pub fn is_pdf_type(file_name: &str, content_type: &str) -> bool {
    let content_type = content_type.trim();
    if !content_type.is_empty() && content_type != "application/octet-stream" {
        return content_type.eq_ignore_ascii_case(PDF_MIME);
    }
    mime_guess::from_path(file_name)
        .first_raw()
        .map(|mime| mime == PDF_MIME)
        .unwrap_or(false)
}

/// Whether the bytes start with the `%PDF-` header
pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    // Some producers prepend junk; the header must sit in the first KiB.
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Reject missing, non-PDF, or oversized uploads
pub fn validate_pdf_upload(
    file_name: &str,
    content_type: &str,
    size: usize,
    max_mb: usize,
) -> Result<()> {
    if file_name.trim().is_empty() || size == 0 {
        return Err(AppError::BadRequest("No file provided".to_string()));
    }

    if !is_pdf_type(file_name, content_type) {
        return Err(AppError::BadRequest("File must be a PDF document".to_string()));
    }

    if size > max_mb * 1024 * 1024 {
        return Err(AppError::BadRequest(format!(
            "File size exceeds {}MB limit",
            max_mb
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_temp_key_sanitizes_name() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let key = temp_upload_key("u1", now, "my report (final).pdf");
        assert_eq!(key, "temp/u1/1700000000123_my_report__final_.pdf");
    }

    #[test]
    fn test_relay_key() {
        assert!(is_relay_key("temp/u1/1700000000123_a.pdf"));
        assert!(!is_relay_key("users/u1/history/x_a.pdf"));
        assert!(!is_relay_key("temp/../users/u1/a.pdf"));
        assert!(!is_relay_key("temp//a.pdf"));
    }

    #[test]
    fn test_relay_key_ownership() {
        assert!(is_own_relay_key("u1", "temp/u1/1700000000123_a.pdf"));
        assert!(!is_own_relay_key("u1", "temp/u2/1700000000123_a.pdf"));
        assert!(!is_own_relay_key("u1", "temp/u10/1_a.pdf"));
        assert!(!is_own_relay_key("u1", "temp/u1/"));
        assert!(!is_own_relay_key("u1", "temp/u1/../u2/1_a.pdf"));
    }

    #[test]
    fn test_pdf_type_detection() {
        assert!(is_pdf_type("a.bin", "application/pdf"));
        assert!(!is_pdf_type("a.pdf", "image/png"));
        assert!(is_pdf_type("a.pdf", ""));
        assert!(is_pdf_type("a.pdf", "application/octet-stream"));
        assert!(!is_pdf_type("a.txt", ""));
    }

    #[test]
    fn test_pdf_signature() {
        assert!(has_pdf_signature(b"%PDF-1.7\n..."));
        assert!(!has_pdf_signature(b"GIF89a"));
        assert!(!has_pdf_signature(b""));
    }

    #[test]
    fn test_validation_messages() {
        let err = validate_pdf_upload("", "", 0, 100).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: No file provided");

        let err = validate_pdf_upload("a.png", "image/png", 10, 100).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: File must be a PDF document");

        let err = validate_pdf_upload("a.pdf", PDF_MIME, 2 * 1024 * 1024, 1).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: File size exceeds 1MB limit");

        assert!(validate_pdf_upload("a.pdf", PDF_MIME, 1024, 1).is_ok());
    }
}
