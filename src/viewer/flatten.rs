//! Burn annotations into PDF pages as vector paths

use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, warn};

use super::annotation::{InkTool, PageAnnotations, Point, Stroke, HIGHLIGHTER_ALPHA};
use crate::pdf::{
    add_alpha_state, add_page_resource, append_overlay, encode, page_box, page_ids,
    page_rotation, parse_hex_color, real, PageBox, PdfResult,
};

/// Map a normalized point on the displayed page into PDF user space,
/// undoing the page's own /Rotate
fn to_user_space(p: &Point, b: &PageBox, rotate: i64) -> (f64, f64) {
    let (w, h) = (b.width(), b.height());
    match rotate {
        90 => (b.llx + p.y * w, b.lly + p.x * h),
        180 => (b.llx + (1.0 - p.x) * w, b.lly + p.y * h),
        270 => (b.llx + (1.0 - p.y) * w, b.lly + (1.0 - p.x) * h),
        _ => (b.llx + p.x * w, b.lly + (1.0 - p.y) * h),
    }
}

fn stroke_ops(stroke: &Stroke, b: &PageBox, rotate: i64, highlight_state: &str) -> PdfResult<Vec<Operation>> {
    let color = parse_hex_color(&stroke.color)?;
    let mut ops = vec![Operation::new("q", vec![])];
    if stroke.tool == InkTool::Highlighter {
        ops.push(Operation::new("gs", vec![highlight_state.into()]));
    }
    ops.push(Operation::new(
        "RG",
        vec![Object::Real(color.r), Object::Real(color.g), Object::Real(color.b)],
    ));
    ops.push(Operation::new("w", vec![real(stroke.width)]));
    ops.push(Operation::new("J", vec![1.into()]));
    ops.push(Operation::new("j", vec![1.into()]));

    let mut points = stroke.points.iter().map(|p| to_user_space(p, b, rotate));
    if let Some((x, y)) = points.next() {
        ops.push(Operation::new("m", vec![real(x), real(y)]));
        let mut drew = false;
        for (x, y) in points {
            ops.push(Operation::new("l", vec![real(x), real(y)]));
            drew = true;
        }
        // A lone point is a zero-length line; round caps make it a dot.
        if !drew {
            ops.push(Operation::new("l", vec![real(x), real(y)]));
        }
    }
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
    Ok(ops)
}

/// Draw every stroke onto its page; strokes for pages the document lacks are ignored
pub fn flatten_annotations(mut doc: Document, annotations: &PageAnnotations) -> PdfResult<Document> {
    let ids = page_ids(&doc);
    let needs_highlight = annotations
        .values()
        .flatten()
        .any(|s| s.tool == InkTool::Highlighter);

    let highlight: Option<(ObjectId, String)> = needs_highlight.then(|| {
        let id = add_alpha_state(&mut doc, HIGHLIGHTER_ALPHA, true);
        (id, format!("NbHl{}", id.0))
    });
    let state_name = highlight.as_ref().map(|(_, n)| n.as_str()).unwrap_or("");

    let mut drawn = 0usize;
    for (page, strokes) in annotations {
        let strokes: Vec<&Stroke> = strokes
            .iter()
            .filter(|s| s.tool != InkTool::Eraser && !s.points.is_empty())
            .collect();
        if strokes.is_empty() {
            continue;
        }
        let page_id = match (*page as usize).checked_sub(1).and_then(|i| ids.get(i)) {
            Some(id) => *id,
            None => {
                warn!(page, "Skipping annotations for a missing page");
                continue;
            }
        };

        let b = page_box(&doc, page_id);
        let rotate = page_rotation(&doc, page_id);
        let mut ops = Vec::new();
        for stroke in &strokes {
            ops.extend(stroke_ops(stroke, &b, rotate, state_name)?);
        }

        if let Some((state_id, name)) = &highlight {
            if strokes.iter().any(|s| s.tool == InkTool::Highlighter) {
                add_page_resource(&mut doc, page_id, "ExtGState", name, *state_id)?;
            }
        }
        append_overlay(&mut doc, page_id, encode(ops)?)?;
        drawn += strokes.len();
    }

    debug!(strokes = drawn, "Flattened annotations");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::{page_texts, roundtrip, sample_doc};
    use crate::viewer::annotation::StrokeBuilder;
    use lopdf::content::Content;

    fn stroke(tool: InkTool, points: &[(f64, f64)]) -> Stroke {
        let mut b = StrokeBuilder::begin(tool, None, None).unwrap();
        for (x, y) in points {
            b.push(Point::new(*x, *y)).unwrap();
        }
        b.finish().unwrap()
    }

    fn page_operators(doc: &Document, index: usize) -> Vec<String> {
        let id = page_ids(doc)[index];
        let content = doc.get_page_content(id).unwrap();
        Content::decode(&content)
            .unwrap()
            .operations
            .into_iter()
            .map(|op| op.operator)
            .collect()
    }

    #[test]
    fn test_user_space_mapping() {
        let b = PageBox { llx: 0.0, lly: 0.0, urx: 200.0, ury: 100.0 };
        let top_left = Point::new(0.0, 0.0);
        assert_eq!(to_user_space(&top_left, &b, 0), (0.0, 100.0));
        assert_eq!(to_user_space(&top_left, &b, 90), (0.0, 0.0));
        assert_eq!(to_user_space(&top_left, &b, 180), (200.0, 0.0));
        assert_eq!(to_user_space(&top_left, &b, 270), (200.0, 100.0));
    }

    #[test]
    fn test_strokes_become_paths() {
        let doc = sample_doc(&[(612.0, 792.0), (612.0, 792.0)]);
        let mut annotations = PageAnnotations::new();
        annotations.insert(
            2,
            vec![
                stroke(InkTool::Pen, &[(0.1, 0.1), (0.2, 0.2), (0.3, 0.1)]),
                stroke(InkTool::Highlighter, &[(0.5, 0.5)]),
            ],
        );
        annotations.insert(9, vec![stroke(InkTool::Pen, &[(0.1, 0.1)])]);

        let out = roundtrip(flatten_annotations(doc, &annotations).unwrap());

        assert!(!page_operators(&out, 0).contains(&"S".to_string()));
        let ops = page_operators(&out, 1);
        assert_eq!(ops.iter().filter(|o| *o == "S").count(), 2);
        assert_eq!(ops.iter().filter(|o| *o == "gs").count(), 1);
        assert_eq!(page_texts(&out)[1], "Page 2");
    }
}
