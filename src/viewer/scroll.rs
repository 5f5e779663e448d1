//! Current-page tracking for a vertically stacked page list

use std::time::{Duration, Instant};

use serde::Serialize;

/// Quiet period before a scroll position is evaluated
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(100);
/// Tracking is suppressed this long after a programmatic jump
pub const GOTO_LOCK: Duration = Duration::from_millis(1000);
/// Anchor line, as a fraction of the viewport height from its top
pub const ANCHOR_FRACTION: f64 = 0.3;

pub const PAGE_GAP: f64 = 16.0;
pub const LAYOUT_PADDING: f64 = 32.0;

/// Vertical extent of one page in the scroll container
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSlot {
    pub top: f64,
    pub height: f64,
}

/// Pages stacked top to bottom with a fixed gap
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageLayout {
    slots: Vec<PageSlot>,
}

impl PageLayout {
    pub fn new(heights: &[f64]) -> Self {
        let mut top = LAYOUT_PADDING;
        let slots = heights
            .iter()
            .map(|h| {
                let slot = PageSlot { top, height: *h };
                top += h + PAGE_GAP;
                slot
            })
            .collect();
        Self { slots }
    }

    pub fn page_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// 1-based page under the offset `y`; gaps belong to no page
    pub fn page_at(&self, y: f64) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| y >= s.top && y < s.top + s.height)
            .map(|i| i as u32 + 1)
    }

    /// Scroll offset that puts the top of `page` at the top of the viewport
    pub fn top_of(&self, page: u32) -> Option<f64> {
        let index = page.checked_sub(1)? as usize;
        self.slots.get(index).map(|s| s.top)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingScroll {
    due: Instant,
    scroll_top: f64,
    viewport_height: f64,
}

/// Debounced current-page detection.
///
/// Every scroll event restarts the debounce timer; when it elapses the page
/// under the anchor line becomes current. A jump to a page suppresses
/// tracking until the smooth scroll it triggers has settled.
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    layout: PageLayout,
    current_page: u32,
    pending: Option<PendingScroll>,
    locked_until: Option<Instant>,
}

impl ScrollTracker {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            current_page: 1,
            pending: None,
            locked_until: None,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Swap the layout after a zoom or rotation change
    pub fn set_layout(&mut self, layout: PageLayout) {
        self.layout = layout;
        self.pending = None;
        self.current_page = self.current_page.clamp(1, self.layout.page_count().max(1));
    }

    pub fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.map_or(false, |until| now < until)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a scroll event; ignored while a jump is in progress
    pub fn on_scroll(&mut self, scroll_top: f64, viewport_height: f64, now: Instant) -> bool {
        if self.is_locked(now) {
            return false;
        }
        self.pending = Some(PendingScroll {
            due: now + SCROLL_DEBOUNCE,
            scroll_top,
            viewport_height,
        });
        true
    }

    /// Evaluate a settled scroll event; returns the new page when it changed
    pub fn poll(&mut self, now: Instant) -> Option<u32> {
        let pending = self.pending?;
        if now < pending.due {
            return None;
        }
        self.pending = None;

        if self.is_locked(now) {
            return None;
        }

        let anchor = pending.scroll_top + pending.viewport_height * ANCHOR_FRACTION;
        match self.layout.page_at(anchor) {
            Some(page) if page != self.current_page => {
                self.current_page = page;
                Some(page)
            }
            _ => None,
        }
    }

    /// Jump to `page`, returning the scroll offset to animate to
    pub fn scroll_to_page(&mut self, page: u32, now: Instant) -> Option<f64> {
        let top = self.layout.top_of(page)?;
        self.current_page = page;
        self.pending = None;
        self.locked_until = Some(now + GOTO_LOCK);
        Some(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ScrollTracker {
        // Pages occupy 32..1032, 1048..2048, 2064..3064
        ScrollTracker::new(PageLayout::new(&[1000.0, 1000.0, 1000.0]))
    }

    #[test]
    fn test_layout_lookup() {
        let layout = PageLayout::new(&[1000.0, 500.0]);
        assert_eq!(layout.page_at(10.0), None);
        assert_eq!(layout.page_at(32.0), Some(1));
        assert_eq!(layout.page_at(1040.0), None);
        assert_eq!(layout.page_at(1100.0), Some(2));
        assert_eq!(layout.top_of(2), Some(1048.0));
        assert_eq!(layout.top_of(0), None);
        assert_eq!(layout.top_of(3), None);
    }

    #[test]
    fn test_debounce_uses_last_event() {
        let mut t = tracker();
        let start = Instant::now();

        t.on_scroll(900.0, 800.0, start);
        assert_eq!(t.poll(start + Duration::from_millis(50)), None);

        // A later event restarts the timer.
        t.on_scroll(1900.0, 800.0, start + Duration::from_millis(80));
        assert_eq!(t.poll(start + Duration::from_millis(150)), None);
        assert_eq!(t.poll(start + Duration::from_millis(180)), Some(3));
        assert_eq!(t.current_page(), 3);
        assert!(!t.has_pending());
    }

    #[test]
    fn test_anchor_line_at_thirty_percent() {
        let mut t = tracker();
        let start = Instant::now();

        // Anchor at 800 + 0.3 * 1000 = 1100, inside page 2
        t.on_scroll(800.0, 1000.0, start);
        assert_eq!(t.poll(start + SCROLL_DEBOUNCE), Some(2));
    }

    #[test]
    fn test_goto_suppresses_tracking() {
        let mut t = tracker();
        let start = Instant::now();

        assert_eq!(t.scroll_to_page(3, start), Some(2064.0));
        assert_eq!(t.current_page(), 3);

        // Smooth-scroll events pass page 2 on the way; they must not win.
        assert!(!t.on_scroll(1100.0, 800.0, start + Duration::from_millis(300)));
        assert_eq!(t.poll(start + Duration::from_millis(500)), None);
        assert_eq!(t.current_page(), 3);

        let later = start + GOTO_LOCK;
        assert!(t.on_scroll(100.0, 800.0, later));
        assert_eq!(t.poll(later + SCROLL_DEBOUNCE), Some(1));
    }

    #[test]
    fn test_goto_out_of_range() {
        let mut t = tracker();
        assert_eq!(t.scroll_to_page(4, Instant::now()), None);
        assert_eq!(t.current_page(), 1);
    }
}
