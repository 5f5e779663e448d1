//! Content drawn on top of existing pages

use std::str::FromStr;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::Deserialize;

use super::color::{parse_hex_color, Rgb};
use super::fonts::{encode_win_ansi, text_width, StandardFont};
use super::images::embed_rgba;
use super::pages::{inherited, page_box, page_dict, page_dict_mut, page_ids};
use super::{PdfError, PdfResult};

const WATERMARK_SIZE: f64 = 50.0;
const PAGE_NUMBER_SIZE: f64 = 12.0;
const PAGE_NUMBER_MARGIN: f64 = 20.0;
// Helvetica-Bold ascender minus descender, per 1000 em
const BOLD_LINE_HEIGHT: f64 = 925.0;

/// Watermark text and style
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkOptions {
    pub text: String,
    #[serde(default = "default_watermark_color")]
    pub color: String,
    #[serde(default = "default_watermark_opacity")]
    pub opacity: f32,
}

fn default_watermark_color() -> String {
    "#FF0000".to_string()
}

fn default_watermark_opacity() -> f32 {
    0.5
}

impl WatermarkOptions {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: default_watermark_color(),
            opacity: default_watermark_opacity(),
        }
    }
}

/// Where page numbers are drawn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageNumberPosition {
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

impl FromStr for PageNumberPosition {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-center" | "" => Ok(Self::BottomCenter),
            "bottom-right" => Ok(Self::BottomRight),
            other => Err(PdfError::InvalidInput(format!(
                "Unknown page number position: {}",
                other
            ))),
        }
    }
}

/// Where to stamp a signature, in PDF points from the page's lower-left corner
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePlacement {
    pub page_index: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Register `target` under `/Resources/<category>/<name>` of a page.
///
/// Resources shared with other pages or inherited from the tree are copied
/// onto the page first so the addition stays local.
pub(crate) fn add_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    target: ObjectId,
) -> PdfResult<()> {
    let mut resources = match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(|o| o.as_dict())
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };

    let mut entries = match resources.get(category.as_bytes()) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(|o| o.as_dict())
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };
    entries.set(name, target);
    resources.set(category, entries);

    page_dict_mut(doc, page_id)?.set("Resources", resources);
    Ok(())
}

/// Draw `content` above the page's existing content.
///
/// The original content is bracketed in `q`/`Q` so graphics state it
/// leaves behind does not leak into the overlay.
pub(crate) fn append_overlay(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> PdfResult<()> {
    let existing: Vec<Object> = match page_dict(doc, page_id)?.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(other) => vec![other.clone()],
        Err(_) => Vec::new(),
    };

    let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut closing = b"\nQ\n".to_vec();
    closing.extend(content);
    let overlay_id = doc.add_object(Stream::new(dictionary! {}, closing));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(overlay_id));

    page_dict_mut(doc, page_id)?.set("Contents", contents);
    Ok(())
}

pub(crate) fn encode(operations: Vec<Operation>) -> PdfResult<Vec<u8>> {
    Content { operations }
        .encode()
        .map_err(|e| PdfError::Structure(e.to_string()))
}

pub(crate) fn add_font(doc: &mut Document, font: StandardFont) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font(),
        "Encoding" => "WinAnsiEncoding",
    })
}

pub(crate) fn add_alpha_state(doc: &mut Document, alpha: f32, multiply: bool) -> ObjectId {
    let mut state = dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(alpha),
        "CA" => Object::Real(alpha),
    };
    if multiply {
        state.set("BM", "Multiply");
    }
    doc.add_object(state)
}

pub(crate) fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

pub(crate) fn color_operands(color: Rgb) -> Vec<Object> {
    vec![
        Object::Real(color.r),
        Object::Real(color.g),
        Object::Real(color.b),
    ]
}

/// Diagonal text across every page
pub fn watermark(mut doc: Document, options: &WatermarkOptions) -> PdfResult<Document> {
    let text = options.text.trim();
    if text.is_empty() {
        return Err(PdfError::InvalidInput("Watermark text is required".to_string()));
    }
    let color = parse_hex_color(&options.color)?;
    let opacity = options.opacity.clamp(0.0, 1.0);

    let font_id = add_font(&mut doc, StandardFont::HelveticaBold);
    let state_id = add_alpha_state(&mut doc, opacity, false);
    let font_name = format!("NbF{}", font_id.0);
    let state_name = format!("NbGs{}", state_id.0);

    let text_w = text_width(StandardFont::HelveticaBold, text, WATERMARK_SIZE);
    let text_h = BOLD_LINE_HEIGHT * WATERMARK_SIZE / 1000.0;
    let (sin, cos) = std::f64::consts::FRAC_PI_4.sin_cos();
    let encoded = encode_win_ansi(text);

    for page_id in page_ids(&doc) {
        let b = page_box(&doc, page_id);
        let x = b.llx + b.width() / 2.0 - text_w / 2.0;
        let y = b.lly + b.height() / 2.0 - text_h / 2.0;

        let ops = vec![
            Operation::new("gs", vec![state_name.as_str().into()]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font_name.as_str().into(), real(WATERMARK_SIZE)]),
            Operation::new("rg", color_operands(color)),
            Operation::new(
                "Tm",
                vec![real(cos), real(sin), real(-sin), real(cos), real(x), real(y)],
            ),
            Operation::new("Tj", vec![Object::string_literal(encoded.clone())]),
            Operation::new("ET", vec![]),
        ];

        add_page_resource(&mut doc, page_id, "Font", &font_name, font_id)?;
        add_page_resource(&mut doc, page_id, "ExtGState", &state_name, state_id)?;
        append_overlay(&mut doc, page_id, encode(ops)?)?;
    }

    Ok(doc)
}

/// "i / n" at the bottom of every page
pub fn add_page_numbers(mut doc: Document, position: PageNumberPosition) -> PdfResult<Document> {
    let font_id = add_font(&mut doc, StandardFont::Helvetica);
    let font_name = format!("NbF{}", font_id.0);
    let ids = page_ids(&doc);
    let total = ids.len();

    for (index, page_id) in ids.into_iter().enumerate() {
        let b = page_box(&doc, page_id);
        let label = format!("{} / {}", index + 1, total);
        let label_w = text_width(StandardFont::Helvetica, &label, PAGE_NUMBER_SIZE);

        let x = match position {
            PageNumberPosition::BottomLeft => PAGE_NUMBER_MARGIN,
            PageNumberPosition::BottomCenter => b.width() / 2.0 - label_w / 2.0,
            PageNumberPosition::BottomRight => b.width() - label_w - PAGE_NUMBER_MARGIN,
        };

        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font_name.as_str().into(), real(PAGE_NUMBER_SIZE)]),
            Operation::new("rg", color_operands(Rgb::BLACK)),
            Operation::new(
                "Td",
                vec![real(b.llx + x), real(b.lly + PAGE_NUMBER_MARGIN)],
            ),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(&label))]),
            Operation::new("ET", vec![]),
        ];

        add_page_resource(&mut doc, page_id, "Font", &font_name, font_id)?;
        append_overlay(&mut doc, page_id, encode(ops)?)?;
    }

    Ok(doc)
}

/// Stamp a PNG signature at each placement; placements on missing pages are skipped
pub fn sign(mut doc: Document, png: &[u8], placements: &[SignaturePlacement]) -> PdfResult<Document> {
    if placements.is_empty() {
        return Err(PdfError::InvalidInput("No signature placements given".to_string()));
    }
    let image = image::load_from_memory_with_format(png, image::ImageFormat::Png)
        .map_err(|e| PdfError::Image(e.to_string()))?
        .to_rgba8();
    let image_id = embed_rgba(&mut doc, &image);
    let image_name = format!("NbIm{}", image_id.0);
    let ids = page_ids(&doc);

    for placement in placements {
        let page_id = match usize::try_from(placement.page_index)
            .ok()
            .and_then(|i| ids.get(i))
        {
            Some(id) => *id,
            None => continue,
        };
        if placement.width <= 0.0 || placement.height <= 0.0 {
            return Err(PdfError::InvalidInput(
                "Signature width and height must be positive".to_string(),
            ));
        }

        let b = page_box(&doc, page_id);
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(placement.width),
                    0.into(),
                    0.into(),
                    real(placement.height),
                    real(b.llx + placement.x),
                    real(b.lly + placement.y),
                ],
            ),
            Operation::new("Do", vec![image_name.as_str().into()]),
            Operation::new("Q", vec![]),
        ];

        add_page_resource(&mut doc, page_id, "XObject", &image_name, image_id)?;
        append_overlay(&mut doc, page_id, encode(ops)?)?;
    }

    Ok(doc)
}
