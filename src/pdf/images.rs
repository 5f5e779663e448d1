//! Images to PDF and image XObjects

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder, ImageFormat, RgbaImage};
use lopdf::content::Operation;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, warn};

use super::overlay::{encode, real};
use super::{PdfError, PdfResult};

/// Add an RGB image XObject, with a soft mask when any pixel is translucent
pub(crate) fn embed_rgba(doc: &mut Document, img: &RgbaImage) -> ObjectId {
    let (width, height) = img.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in img.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel[3]);
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };

    if alpha.iter().any(|a| *a != u8::MAX) {
        let smask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        dict.set("SMask", smask_id);
    }

    doc.add_object(Stream::new(dict, rgb))
}

/// Keep JPEG data as-is; PDF readers decode DCT natively
fn embed_jpeg(doc: &mut Document, bytes: &[u8]) -> PdfResult<(ObjectId, u32, u32)> {
    let decoder =
        JpegDecoder::new(Cursor::new(bytes)).map_err(|e| PdfError::Image(e.to_string()))?;
    let (width, height) = decoder.dimensions();
    let color_space = match decoder.color_type() {
        ColorType::L8 | ColorType::L16 => "DeviceGray",
        _ => "DeviceRGB",
    };

    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        bytes.to_vec(),
    );
    // Already compressed.
    stream.allows_compression = false;

    Ok((doc.add_object(stream), width, height))
}

fn embed_png(doc: &mut Document, bytes: &[u8]) -> PdfResult<(ObjectId, u32, u32)> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| PdfError::Image(e.to_string()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok((embed_rgba(doc, &img), width, height))
}

/// One page per supported image (JPEG or PNG), sized to the image in points.
///
/// Other formats are skipped; an input with nothing usable is rejected.
pub fn images_to_pdf(images: Vec<(String, Vec<u8>)>) -> PdfResult<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for (name, bytes) in &images {
        let embedded = match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => embed_jpeg(&mut doc, bytes)?,
            Ok(ImageFormat::Png) => embed_png(&mut doc, bytes)?,
            other => {
                warn!(file = %name, format = ?other.ok(), "Skipping unsupported image");
                continue;
            }
        };
        let (image_id, width, height) = embedded;
        let (w, h) = (f64::from(width), f64::from(height));

        let content = encode(vec![
            Operation::new("q", vec![]),
            Operation::new("cm", vec![real(w), 0.into(), 0.into(), real(h), 0.into(), 0.into()]),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ])?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), real(w), real(h)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    if kids.is_empty() {
        return Err(PdfError::InvalidInput("No supported images provided".to_string()));
    }
    debug!(pages = kids.len(), inputs = images.len(), "Built PDF from images");

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    Ok(doc)
}
