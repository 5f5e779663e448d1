//! Merge, split, rotate and reorder

use std::collections::HashMap;

use lopdf::{Document, ObjectId};
use tracing::debug;

use super::pages::{
    flatten_inherited, normalize_rotation, page_ids, page_rotation, rebuild_page_tree, set_rotation,
};
use super::{PdfError, PdfResult};

/// Concatenate documents in input order
pub fn merge(docs: Vec<Document>) -> PdfResult<Document> {
    let mut docs = docs.into_iter();
    let mut merged = docs
        .next()
        .ok_or_else(|| PdfError::InvalidInput("At least one PDF is required".to_string()))?;
    let mut order = page_ids(&merged);

    for mut next in docs {
        // Attributes inherited from the old tree are lost once pages move.
        for id in page_ids(&next) {
            flatten_inherited(&mut next, id)?;
        }
        next.renumber_objects_with(merged.max_id + 1);
        let ids = page_ids(&next);

        merged.max_id = merged.max_id.max(next.max_id);
        merged.objects.extend(next.objects);
        order.extend(ids);
    }

    debug!(pages = order.len(), "Merged documents");
    rebuild_page_tree(&mut merged, &order)?;
    Ok(merged)
}

fn select(doc: &Document, indices: &[usize]) -> PdfResult<Vec<ObjectId>> {
    let ids = page_ids(doc);
    if indices.is_empty() {
        return Err(PdfError::InvalidInput("No pages selected".to_string()));
    }
    indices
        .iter()
        .map(|&i| {
            ids.get(i).copied().ok_or_else(|| {
                PdfError::InvalidInput(format!(
                    "Page {} is out of range (document has {} pages)",
                    i + 1,
                    ids.len()
                ))
            })
        })
        .collect()
}

/// Keep only the pages at `indices` (0-based), in that order
pub fn extract_pages(mut doc: Document, indices: &[usize]) -> PdfResult<Document> {
    let selected = select(&doc, indices)?;
    rebuild_page_tree(&mut doc, &selected)?;
    Ok(doc)
}

/// Parse a 1-based range list such as `1,3-5` into 0-based indices.
///
/// Input order is kept and repeated pages are dropped.
pub fn parse_page_range(input: &str, page_count: usize) -> PdfResult<Vec<usize>> {
    let bad = |msg: String| PdfError::InvalidInput(msg);
    let number = |s: &str| -> PdfResult<usize> {
        let s = s.trim();
        let page: usize = s
            .parse()
            .map_err(|_| bad(format!("Invalid page number: '{}'", s)))?;
        if page == 0 {
            return Err(bad("Page numbers start at 1".to_string()));
        }
        if page > page_count {
            return Err(bad(format!(
                "Page {} exceeds document page count ({})",
                page, page_count
            )));
        }
        Ok(page - 1)
    };

    let mut pages = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (number(a)?, number(b)?),
            None => {
                let p = number(part)?;
                (p, p)
            }
        };
        if start > end {
            return Err(bad(format!("Invalid range: '{}'", part)));
        }
        for p in start..=end {
            if !pages.contains(&p) {
                pages.push(p);
            }
        }
    }

    if pages.is_empty() {
        return Err(bad("No pages selected".to_string()));
    }
    Ok(pages)
}

fn check_quarter_turn(degrees: i64) -> PdfResult<()> {
    if degrees % 90 != 0 {
        return Err(PdfError::InvalidInput(format!(
            "Rotation must be a multiple of 90 degrees, got {}",
            degrees
        )));
    }
    Ok(())
}

/// Add `degrees` to the rotation of every page
pub fn rotate_all(mut doc: Document, degrees: i64) -> PdfResult<Document> {
    check_quarter_turn(degrees)?;
    let delta = normalize_rotation(degrees);
    for id in page_ids(&doc) {
        let current = page_rotation(&doc, id);
        set_rotation(&mut doc, id, current + delta)?;
    }
    Ok(doc)
}

/// Lay pages out in `order` (0-based original indices) and rotate them.
///
/// `rotations` is keyed by original page index; a page repeated in
/// `order` gets the same delta at each position.
pub fn reorder(
    mut doc: Document,
    order: &[usize],
    rotations: &HashMap<usize, i64>,
) -> PdfResult<Document> {
    for degrees in rotations.values() {
        check_quarter_turn(*degrees)?;
    }

    let selected = select(&doc, order)?;
    let kids = rebuild_page_tree(&mut doc, &selected)?;

    for (original, id) in order.iter().zip(kids) {
        if let Some(delta) = rotations.get(original).map(|d| normalize_rotation(*d)).filter(|d| *d != 0) {
            let current = page_rotation(&doc, id);
            set_rotation(&mut doc, id, current + delta)?;
        }
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::{page_texts, roundtrip, sample_doc};

    fn rotations(doc: &Document) -> Vec<i64> {
        page_ids(doc).into_iter().map(|id| page_rotation(doc, id)).collect()
    }

    #[test]
    fn test_merge_keeps_input_order() {
        let a = sample_doc(&[(612.0, 792.0), (612.0, 792.0)]);
        let b = sample_doc(&[(300.0, 400.0)]);

        let merged = roundtrip(merge(vec![a, b]).unwrap());

        assert_eq!(page_texts(&merged), vec!["Page 1", "Page 2", "Page 1"]);
        let boxes = crate::pdf::page_boxes(&merged);
        assert_eq!(boxes[2].width(), 300.0);
    }

    #[test]
    fn test_merge_requires_input() {
        assert!(merge(Vec::new()).is_err());
    }

    #[test]
    fn test_extract_keeps_order_and_duplicates() {
        let doc = sample_doc(&[(612.0, 792.0); 3]);
        let out = roundtrip(extract_pages(doc, &[2, 0, 2]).unwrap());
        assert_eq!(page_texts(&out), vec!["Page 3", "Page 1", "Page 3"]);
    }

    #[test]
    fn test_extract_out_of_range() {
        let doc = sample_doc(&[(612.0, 792.0)]);
        assert!(matches!(
            extract_pages(doc, &[1]),
            Err(PdfError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_page_range() {
        assert_eq!(parse_page_range("1,3-5", 5).unwrap(), vec![0, 2, 3, 4]);
        assert_eq!(parse_page_range(" 4, 2 ,4", 5).unwrap(), vec![3, 1]);
        assert!(parse_page_range("0", 5).is_err());
        assert!(parse_page_range("6", 5).is_err());
        assert!(parse_page_range("4-2", 5).is_err());
        assert!(parse_page_range("a", 5).is_err());
        assert!(parse_page_range(" , ", 5).is_err());
    }

    #[test]
    fn test_rotate_all_accumulates() {
        let doc = sample_doc(&[(612.0, 792.0); 2]);
        let doc = rotate_all(doc, 90).unwrap();
        let doc = rotate_all(doc, 270).unwrap();
        let doc = rotate_all(doc, 180).unwrap();
        assert_eq!(rotations(&roundtrip(doc)), vec![180, 180]);
    }

    #[test]
    fn test_rotate_rejects_odd_angles() {
        let doc = sample_doc(&[(612.0, 792.0)]);
        assert!(rotate_all(doc, 45).is_err());
    }

    #[test]
    fn test_rotate_handles_extreme_angles() {
        // A quarter turn short of a whole number of turns near i64::MAX
        let huge = i64::MAX / 360 * 360 - 270;

        let doc = rotate_all(sample_doc(&[(612.0, 792.0)]), 270).unwrap();
        let doc = rotate_all(doc, huge).unwrap();
        assert_eq!(rotations(&roundtrip(doc.clone())), vec![0]);

        let doc = rotate_all(doc, -huge).unwrap();
        assert_eq!(rotations(&roundtrip(doc)), vec![270]);
    }

    #[test]
    fn test_reorder_handles_extreme_angles() {
        let doc = rotate_all(sample_doc(&[(612.0, 792.0); 2]), 270).unwrap();
        let mut turns = HashMap::new();
        turns.insert(1, i64::MAX / 360 * 360 - 270);

        let out = roundtrip(reorder(doc, &[1, 0], &turns).unwrap());
        assert_eq!(rotations(&out), vec![0, 270]);
    }

    #[test]
    fn test_reorder_with_rotation() {
        let doc = sample_doc(&[(612.0, 792.0); 3]);
        let mut turns = HashMap::new();
        turns.insert(0, 90);

        let out = roundtrip(reorder(doc, &[2, 0, 1], &turns).unwrap());

        assert_eq!(page_texts(&out), vec!["Page 3", "Page 1", "Page 2"]);
        assert_eq!(rotations(&out), vec![0, 90, 0]);
    }
}
