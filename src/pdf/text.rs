//! Text and metadata extraction

use lopdf::{Dictionary, Document, Object};
use serde::Serialize;
use tracing::warn;

use super::pages::page_boxes;
use super::PageBox;

/// Document information shown by the viewer
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub page_count: usize,
    pub pages: Vec<PageBox>,
}

/// Plain text of every page, each under a `--- Page i ---` header
pub fn extract_text(doc: &Document) -> String {
    let count = doc.get_pages().len() as u32;
    let mut out = String::new();

    for page in 1..=count {
        let text = doc.extract_text(&[page]).unwrap_or_else(|e| {
            warn!(page, error = %e, "Text extraction failed for page");
            String::new()
        });
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        out.push_str(&format!("--- Page {} ---\n\n{}\n\n", page, text));
    }

    out
}

fn info_dict(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).and_then(|o| o.as_dict()).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise Latin-1)
fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|b| char::from(*b)).collect()
}

fn info_string(info: Option<&Dictionary>, key: &[u8]) -> Option<String> {
    match info?.get(key).ok()? {
        Object::String(bytes, _) => Some(decode_text(bytes)).filter(|s| !s.trim().is_empty()),
        _ => None,
    }
}

/// Info dictionary fields plus page geometry
pub fn metadata(doc: &Document) -> PdfMetadata {
    let info = info_dict(doc);
    let pages = page_boxes(doc);
    PdfMetadata {
        title: info_string(info, b"Title"),
        author: info_string(info, b"Author"),
        subject: info_string(info, b"Subject"),
        producer: info_string(info, b"Producer"),
        creation_date: info_string(info, b"CreationDate"),
        page_count: pages.len(),
        pages,
    }
}
