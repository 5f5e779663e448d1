//! Page tree helpers

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

use super::{PdfError, PdfResult};

/// Attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// US Letter, used when no MediaBox is found
const DEFAULT_BOX: PageBox = PageBox {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};

/// Page rectangle in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl PageBox {
    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }
}

/// Page object ids in document order
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

pub(crate) fn page_dict(doc: &Document, page_id: ObjectId) -> PdfResult<&Dictionary> {
    doc.get_object(page_id)
        .and_then(|o| o.as_dict())
        .map_err(|_| PdfError::Structure(format!("page {:?} is not a dictionary", page_id)))
}

pub(crate) fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> PdfResult<&mut Dictionary> {
    doc.get_object_mut(page_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|_| PdfError::Structure(format!("page {:?} is not a dictionary", page_id)))
}

pub(crate) fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Look up `key` on the page or the nearest ancestor that defines it
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        // Guard against cyclic Parent chains in broken files.
        if depth > 64 {
            return None;
        }
        depth += 1;

        let dict = doc.get_object(id).and_then(|o| o.as_dict()).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

fn box_from(doc: &Document, obj: &Object) -> Option<PageBox> {
    let arr = resolve(doc, obj).as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let values: Vec<f64> = arr
        .iter()
        .map(|o| obj_to_f64(resolve(doc, o)))
        .collect::<Option<_>>()?;
    Some(PageBox {
        llx: values[0].min(values[2]),
        lly: values[1].min(values[3]),
        urx: values[0].max(values[2]),
        ury: values[1].max(values[3]),
    })
}

/// Effective MediaBox of a page
pub fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| box_from(doc, obj))
        .unwrap_or(DEFAULT_BOX)
}

/// MediaBox of every page, in order
pub fn page_boxes(doc: &Document) -> Vec<PageBox> {
    page_ids(doc).into_iter().map(|id| page_box(doc, id)).collect()
}

/// Effective /Rotate of a page, normalized to 0, 90, 180 or 270
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    inherited(doc, page_id, b"Rotate")
        .and_then(|obj| resolve(doc, obj).as_i64().ok())
        .map(normalize_rotation)
        .unwrap_or(0)
}

pub(crate) fn normalize_rotation(degrees: i64) -> i64 {
    degrees.rem_euclid(360) / 90 * 90
}

/// Copy inherited attributes onto the page itself so it survives re-parenting
pub(crate) fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> PdfResult<()> {
    let mut missing = Vec::new();
    {
        let dict = page_dict(doc, page_id)?;
        for key in INHERITABLE {
            if dict.get(key).is_err() {
                if let Some(value) = inherited(doc, page_id, key) {
                    missing.push((key.to_vec(), value.clone()));
                }
            }
        }
    }

    let dict = page_dict_mut(doc, page_id)?;
    for (key, value) in missing {
        dict.set(key, value);
    }
    Ok(())
}

pub(crate) fn set_rotation(doc: &mut Document, page_id: ObjectId, degrees: i64) -> PdfResult<()> {
    let dict = page_dict_mut(doc, page_id)?;
    dict.set("Rotate", normalize_rotation(degrees));
    Ok(())
}

/// Replace the page tree with a single flat node listing `pages` in order.
///
/// A page id listed twice is cloned so every Kids entry is a distinct
/// object. Pages left out become unreachable and are pruned.
pub(crate) fn rebuild_page_tree(doc: &mut Document, pages: &[ObjectId]) -> PdfResult<Vec<ObjectId>> {
    if pages.is_empty() {
        return Err(PdfError::InvalidInput("No pages selected".to_string()));
    }

    for id in pages {
        flatten_inherited(doc, *id)?;
    }

    let root_id = doc.new_object_id();
    let mut seen = std::collections::HashSet::new();
    let mut kids = Vec::with_capacity(pages.len());

    for &page_id in pages {
        let id = if seen.insert(page_id) {
            page_id
        } else {
            let copy = page_dict(doc, page_id)?.clone();
            doc.add_object(copy)
        };
        page_dict_mut(doc, id)?.set("Parent", root_id);
        kids.push(id);
    }

    let mut root = Dictionary::new();
    root.set("Type", "Pages");
    root.set(
        "Kids",
        kids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
    );
    root.set("Count", kids.len() as i64);
    doc.objects.insert(root_id, Object::Dictionary(root));

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(|o| o.as_reference())
        .map_err(|_| PdfError::Structure("missing document catalog".to_string()))?;
    let catalog = doc
        .get_object_mut(catalog_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|_| PdfError::Structure("catalog is not a dictionary".to_string()))?;
    catalog.set("Pages", root_id);
    // Outlines and page labels point at the old tree.
    catalog.remove(b"Outlines");
    catalog.remove(b"PageLabels");

    doc.prune_objects();
    Ok(kids)
}
