//! Page rasterization
//!
//! Pages are rendered with MuPDF. A document is opened fresh from its bytes
//! for every call, so nothing MuPDF owns outlives the blocking task that
//! uses it.

use std::io::{Cursor, Write};
use std::str::FromStr;

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage, RgbaImage};
use mupdf::{Colorspace, Document, Matrix};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{PdfError, PdfResult};

/// Pixels per point for exported page images
pub const EXPORT_SCALE: f32 = 2.0;
pub const JPEG_QUALITY: u8 = 90;
const MAX_PIXELS: f32 = 8192.0 * 8192.0;

/// Encoding of exported page images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterFormat {
    Png,
    #[default]
    Jpeg,
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpg",
        }
    }
}

impl FromStr for RasterFormat {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" | "" => Ok(Self::Jpeg),
            other => Err(PdfError::InvalidInput(format!(
                "Unsupported image format: {}",
                other
            ))),
        }
    }
}

fn render_err(e: mupdf::Error) -> PdfError {
    PdfError::Render(e.to_string())
}

fn open(bytes: &[u8]) -> PdfResult<Document> {
    let doc = Document::from_bytes(bytes, "application/pdf").map_err(|e| PdfError::Load(e.to_string()))?;
    if doc.needs_password().map_err(render_err)? {
        return Err(PdfError::InvalidInput(
            "PDF is password protected; unlock it first".to_string(),
        ));
    }
    Ok(doc)
}

/// Render page `index` (0-based) at `scale` pixels per point, turned
/// clockwise by `rotation` degrees on top of the page's own rotation
pub fn render_page(bytes: &[u8], index: usize, scale: f32, rotation: i64) -> PdfResult<RgbaImage> {
    let doc = open(bytes)?;
    render_loaded(&doc, index, scale, rotation)
}

fn render_loaded(doc: &Document, index: usize, scale: f32, rotation: i64) -> PdfResult<RgbaImage> {
    let count = doc.page_count().map_err(render_err)?.max(0) as usize;
    if index >= count {
        return Err(PdfError::InvalidInput(format!(
            "Page {} does not exist; the document has {} pages",
            index + 1,
            count
        )));
    }
    if !scale.is_finite() || scale <= 0.0 {
        return Err(PdfError::InvalidInput(format!("Invalid render scale: {}", scale)));
    }

    let page = doc.load_page(index as i32).map_err(render_err)?;
    let bounds = page.bounds().map_err(render_err)?;
    let (width, height) = ((bounds.x1 - bounds.x0) * scale, (bounds.y1 - bounds.y0) * scale);
    if width * height > MAX_PIXELS {
        return Err(PdfError::InvalidInput(
            "Page is too large to render at this scale".to_string(),
        ));
    }

    let mut matrix = Matrix::new_scale(scale, scale);
    let rotation = rotation.rem_euclid(360);
    if rotation != 0 {
        matrix.concat(Matrix::new_rotate(rotation as f32));
    }

    let pixmap = page
        .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
        .map_err(render_err)?;
    pixmap_to_rgba(&pixmap)
}

fn pixmap_to_rgba(pixmap: &mupdf::Pixmap) -> PdfResult<RgbaImage> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for i in 0..(width as usize * height as usize) {
        let offset = i * n;
        let r = samples.get(offset).copied().unwrap_or(0);
        let g = samples.get(offset + 1).copied().unwrap_or(0);
        let b = samples.get(offset + 2).copied().unwrap_or(0);
        let a = if n >= 4 {
            samples.get(offset + 3).copied().unwrap_or(255)
        } else {
            255
        };
        rgba.extend_from_slice(&[r, g, b, a]);
    }

    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| PdfError::Render("Failed to create image buffer".to_string()))
}

pub fn encode_image(image: &RgbaImage, format: RasterFormat) -> PdfResult<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        RasterFormat::Png => image
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|e| PdfError::Image(e.to_string()))?,
        RasterFormat::Jpeg => {
            let rgb: RgbImage = image.convert();
            JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
                .encode_image(&rgb)
                .map_err(|e| PdfError::Image(e.to_string()))?
        }
    }
    Ok(out)
}

/// Every page as an image, packed into a ZIP as `page-{n}.{ext}`
pub fn pdf_to_images(bytes: &[u8], format: RasterFormat, scale: f32) -> PdfResult<Vec<u8>> {
    let doc = open(bytes)?;
    let count = doc.page_count().map_err(render_err)?.max(0) as usize;

    let archive_err = |e: zip::result::ZipError| PdfError::Save(e.to_string());
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for index in 0..count {
        let image = render_loaded(&doc, index, scale, 0)?;
        let data = encode_image(&image, format)?;
        zip.start_file(format!("page-{}.{}", index + 1, format.extension()), options)
            .map_err(archive_err)?;
        zip.write_all(&data)
            .map_err(|e| PdfError::Save(e.to_string()))?;
    }

    tracing::debug!(pages = count, format = format.extension(), "Rasterized PDF pages");
    Ok(zip.finish().map_err(archive_err)?.into_inner())
}
