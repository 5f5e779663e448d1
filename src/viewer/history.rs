//! Undo/redo over whole-document annotation snapshots

use super::annotation::{PageAnnotations, Stroke};

/// Oldest snapshots are dropped beyond this depth
pub const MAX_SNAPSHOTS: usize = 256;

/// Linear snapshot stack with a cursor.
///
/// Committing after an undo discards the redo tail.
#[derive(Debug, Clone)]
pub struct AnnotationHistory {
    snapshots: Vec<PageAnnotations>,
    cursor: usize,
}

impl Default for AnnotationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationHistory {
    pub fn new() -> Self {
        Self {
            snapshots: vec![PageAnnotations::new()],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &PageAnnotations {
        &self.snapshots[self.cursor]
    }

    pub fn page(&self, page: u32) -> &[Stroke] {
        self.current().get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn commit(&mut self, next: PageAnnotations) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(next);
        if self.snapshots.len() > MAX_SNAPSHOTS {
            self.snapshots.remove(0);
        }
        self.cursor = self.snapshots.len() - 1;
    }

    /// Commit a snapshot with one page's strokes replaced
    pub fn replace_page(&mut self, page: u32, strokes: Vec<Stroke>) {
        let mut next = self.current().clone();
        if strokes.is_empty() {
            next.remove(&page);
        } else {
            next.insert(page, strokes);
        }
        self.commit(next);
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Back to a single empty snapshot, as when a new file is opened
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::annotation::{InkTool, Point, StrokeBuilder};

    fn stroke() -> Stroke {
        let mut b = StrokeBuilder::begin(InkTool::Pen, None, None).unwrap();
        b.push(Point::new(0.5, 0.5)).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_undo_redo_walks_the_stack() {
        let mut history = AnnotationHistory::new();
        assert!(!history.undo());

        history.replace_page(1, vec![stroke()]);
        history.replace_page(2, vec![stroke()]);
        assert_eq!(history.current().len(), 2);

        assert!(history.undo());
        assert_eq!(history.current().len(), 1);
        assert!(history.undo());
        assert!(history.is_empty());
        assert!(!history.undo());

        assert!(history.redo());
        assert!(history.redo());
        assert!(!history.redo());
        assert_eq!(history.current().len(), 2);
    }

    #[test]
    fn test_commit_truncates_redo_tail() {
        let mut history = AnnotationHistory::new();
        history.replace_page(1, vec![stroke()]);
        history.replace_page(1, vec![stroke(), stroke()]);
        history.undo();

        history.replace_page(3, vec![stroke()]);

        assert!(!history.can_redo());
        assert_eq!(history.len(), 3);
        assert_eq!(history.page(1).len(), 1);
        assert_eq!(history.page(3).len(), 1);
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut history = AnnotationHistory::new();
        for _ in 0..MAX_SNAPSHOTS + 10 {
            history.replace_page(1, vec![stroke()]);
        }
        assert_eq!(history.len(), MAX_SNAPSHOTS);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_reset() {
        let mut history = AnnotationHistory::new();
        history.replace_page(1, vec![stroke()]);
        history.reset();
        assert_eq!(history.len(), 1);
        assert!(history.is_empty());
    }
}
