//! PDF operations
//!
//! Structural transformations (merge, split, organize, rotate, watermark,
//! page numbers, signatures, images to PDF, text extraction) work on
//! [`lopdf::Document`]. Page rasterization lives in [`raster`] and uses
//! MuPDF.

mod color;
mod fonts;
mod images;
mod organize;
mod overlay;
mod pages;
pub mod raster;
mod text;

use lopdf::Document;
use thiserror::Error;

pub use color::{parse_hex_color, Rgb};
pub use fonts::{text_width, StandardFont};
pub use images::images_to_pdf;
pub use organize::{extract_pages, merge, parse_page_range, reorder, rotate_all};
pub use overlay::{
    add_page_numbers, sign, watermark, PageNumberPosition, SignaturePlacement, WatermarkOptions,
};
pub use pages::{page_boxes, page_ids, PageBox};
pub use raster::{encode_image, pdf_to_images, render_page, RasterFormat, EXPORT_SCALE};
pub use text::{extract_text, metadata, PdfMetadata};

pub(crate) use overlay::{add_alpha_state, add_page_resource, append_overlay, encode, real};
pub(crate) use pages::{page_box, page_rotation};

/// PDF operation errors
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Invalid PDF: {0}")]
    Load(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid image: {0}")]
    Image(String),

    #[error("Failed to write PDF: {0}")]
    Save(String),

    #[error("Malformed PDF: {0}")]
    Structure(String),

    #[error("Failed to render page: {0}")]
    Render(String),
}

pub type PdfResult<T> = std::result::Result<T, PdfError>;

/// Parse a PDF from memory
pub fn load_document(bytes: &[u8]) -> PdfResult<Document> {
    let doc = Document::load_mem(bytes).map_err(|e| PdfError::Load(e.to_string()))?;

    if doc.is_encrypted() {
        return Err(PdfError::InvalidInput(
            "PDF is password protected; unlock it first".to_string(),
        ));
    }

    if doc.get_pages().is_empty() {
        return Err(PdfError::Load("document has no pages".to_string()));
    }

    Ok(doc)
}

/// Serialize a document, compressing new streams
pub fn save_document(mut doc: Document) -> PdfResult<Vec<u8>> {
    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Save(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Small in-memory documents for tests

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// A document with one page per entry in `sizes`, each labelled "Page N"
    pub fn sample_doc(sizes: &[(f32, f32)]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for (i, (w, h)) in sizes.iter().enumerate() {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 72.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("Page {}", i + 1))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().unwrap(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), Object::Real(*w), Object::Real(*h)],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    /// Save and reload, the way a client would see the result
    pub fn roundtrip(doc: Document) -> Document {
        let bytes = super::save_document(doc).unwrap();
        super::load_document(&bytes).unwrap()
    }

    /// Text of each page, in order
    pub fn page_texts(doc: &Document) -> Vec<String> {
        let count = doc.get_pages().len() as u32;
        (1..=count)
            .map(|n| doc.extract_text(&[n]).unwrap_or_default().trim().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(load_document(b"not a pdf"), Err(PdfError::Load(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let doc = roundtrip(sample_doc(&[(612.0, 792.0), (300.0, 400.0)]));
        assert_eq!(doc.get_pages().len(), 2);
        assert_eq!(page_texts(&doc), vec!["Page 1", "Page 2"]);
    }
}
