//! In-memory viewer sessions
//!
//! A session holds one opened PDF together with its annotation history,
//! scroll position and per-page render scheduler. Sessions expire after an
//! hour without access.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::annotation::{erase, InkTool, PageAnnotations, Point, Stroke, StrokeBuilder};
use super::flatten::flatten_annotations;
use super::history::AnnotationHistory;
use super::render::{
    encode_png, run_blocking, OverlayRenderer, RenderError, RenderScheduler, Viewport, CANVAS_RESOLUTION,
};
use super::scroll::{PageLayout, ScrollTracker};
use super::ViewerError;
use crate::pdf::{self, load_document, metadata, page_box, page_ids, page_rotation, PdfMetadata};

pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);
pub const MAX_SESSIONS: usize = 100;

/// Page size as displayed, in points, with the page's own rotation applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// New stroke submitted by a client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeInput {
    pub page: u32,
    pub tool: InkTool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub width: Option<f64>,
    pub points: Vec<Point>,
}

/// Client scroll position, optionally with the zoom and rotation in effect
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollUpdate {
    pub scroll_top: f64,
    pub viewport_height: f64,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub rotation: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub file_name: String,
    pub page_count: usize,
    pub pages: Vec<PageSize>,
    pub metadata: PdfMetadata,
    pub current_page: u32,
    pub viewport: Viewport,
    pub can_undo: bool,
    pub can_redo: bool,
    pub annotations: PageAnnotations,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStrokes {
    pub page: u32,
    pub strokes: Vec<Stroke>,
    pub changed: bool,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    pub moved: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub annotations: PageAnnotations,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollState {
    pub current_page: u32,
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_top: Option<f64>,
}

struct ViewerSession {
    id: Uuid,
    file_name: String,
    pdf: Arc<Vec<u8>>,
    pages: Vec<PageSize>,
    metadata: PdfMetadata,
    history: AnnotationHistory,
    tracker: ScrollTracker,
    viewport: Viewport,
    scheduler: RenderScheduler,
    created_at: DateTime<Utc>,
    last_access: Instant,
}

impl ViewerSession {
    fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            file_name: self.file_name.clone(),
            page_count: self.pages.len(),
            pages: self.pages.clone(),
            metadata: self.metadata.clone(),
            current_page: self.tracker.current_page(),
            viewport: self.viewport,
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            annotations: self.history.current().clone(),
            created_at: self.created_at,
        }
    }

    fn check_page(&self, page: u32) -> Result<PageSize, ViewerError> {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .copied()
            .ok_or(ViewerError::PageOutOfRange {
                page,
                count: self.pages.len() as u32,
            })
    }

    fn history_state(&self, moved: bool) -> HistoryState {
        HistoryState {
            moved,
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            annotations: self.history.current().clone(),
        }
    }

    fn page_strokes(&self, page: u32, changed: bool) -> PageStrokes {
        PageStrokes {
            page,
            strokes: self.history.page(page).to_vec(),
            changed,
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        }
    }

    fn relayout(&mut self, viewport: Viewport) -> Result<(), ViewerError> {
        self.tracker.set_layout(layout_for(&self.pages, viewport)?);
        self.viewport = viewport;
        Ok(())
    }
}

fn layout_for(pages: &[PageSize], viewport: Viewport) -> Result<PageLayout, ViewerError> {
    let heights = pages
        .iter()
        .map(|p| viewport.canvas_size(p.width, p.height).map(|(_, h)| f64::from(h)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PageLayout::new(&heights))
}

/// Session registry shared by the viewer routes
#[derive(Clone, Default)]
pub struct ViewerSessions {
    sessions: Arc<RwLock<HashMap<Uuid, ViewerSession>>>,
}

impl ViewerSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a PDF and start a session for it
    pub async fn create(&self, file_name: &str, bytes: Vec<u8>) -> Result<SessionSummary, ViewerError> {
        let (pages, metadata) = {
            let doc = load_document(&bytes)?;
            let pages: Vec<PageSize> = page_ids(&doc)
                .into_iter()
                .map(|id| {
                    let b = page_box(&doc, id);
                    match page_rotation(&doc, id) {
                        90 | 270 => PageSize { width: b.height(), height: b.width() },
                        _ => PageSize { width: b.width(), height: b.height() },
                    }
                })
                .collect();
            (pages, metadata(&doc))
        };

        let viewport = Viewport::default();
        let session = ViewerSession {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            pdf: Arc::new(bytes),
            tracker: ScrollTracker::new(layout_for(&pages, viewport)?),
            pages,
            metadata,
            history: AnnotationHistory::new(),
            viewport,
            scheduler: RenderScheduler::new(),
            created_at: Utc::now(),
            last_access: Instant::now(),
        };
        let summary = session.summary();

        let mut sessions = self.sessions.write().await;
        purge(&mut sessions, Instant::now());
        if sessions.len() >= MAX_SESSIONS {
            return Err(ViewerError::TooManySessions);
        }
        sessions.insert(session.id, session);

        tracing::info!(
            session_id = %summary.id,
            file_name = %summary.file_name,
            pages = summary.page_count,
            "Opened viewer session"
        );
        Ok(summary)
    }

    async fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ViewerSession) -> Result<T, ViewerError>,
    ) -> Result<T, ViewerError> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let session = sessions
            .get_mut(&id)
            .filter(|s| now.duration_since(s.last_access) < SESSION_TTL)
            .ok_or_else(|| ViewerError::SessionNotFound(id.to_string()))?;
        session.last_access = now;
        f(session)
    }

    pub async fn summary(&self, id: Uuid) -> Result<SessionSummary, ViewerError> {
        self.with_session(id, |s| {
            s.tracker.poll(Instant::now());
            Ok(s.summary())
        })
        .await
    }

    pub async fn add_stroke(&self, id: Uuid, input: StrokeInput) -> Result<PageStrokes, ViewerError> {
        self.with_session(id, |s| {
            s.check_page(input.page)?;
            let mut builder = StrokeBuilder::begin(input.tool, input.color.as_deref(), input.width)?;
            for point in input.points {
                builder.push(point)?;
            }
            let stroke = builder
                .finish()
                .ok_or_else(|| ViewerError::InvalidStroke("Stroke has no points".to_string()))?;

            let mut strokes = s.history.page(input.page).to_vec();
            strokes.push(stroke);
            s.history.replace_page(input.page, strokes);
            Ok(s.page_strokes(input.page, true))
        })
        .await
    }

    /// Erase strokes near `at`; history only moves when something was hit
    pub async fn erase(&self, id: Uuid, page: u32, at: Point) -> Result<PageStrokes, ViewerError> {
        self.with_session(id, |s| {
            s.check_page(page)?;
            match erase(s.history.page(page), &at) {
                Some(remaining) => {
                    s.history.replace_page(page, remaining);
                    Ok(s.page_strokes(page, true))
                }
                None => Ok(s.page_strokes(page, false)),
            }
        })
        .await
    }

    pub async fn undo(&self, id: Uuid) -> Result<HistoryState, ViewerError> {
        self.with_session(id, |s| {
            let moved = s.history.undo();
            Ok(s.history_state(moved))
        })
        .await
    }

    pub async fn redo(&self, id: Uuid) -> Result<HistoryState, ViewerError> {
        self.with_session(id, |s| {
            let moved = s.history.redo();
            Ok(s.history_state(moved))
        })
        .await
    }

    pub async fn scroll(&self, id: Uuid, update: ScrollUpdate, now: Instant) -> Result<ScrollState, ViewerError> {
        self.with_session(id, |s| {
            if update.scale.is_some() || update.rotation.is_some() {
                let viewport = Viewport::new(
                    update.scale.unwrap_or(s.viewport.scale),
                    update.rotation.unwrap_or(s.viewport.rotation),
                )?;
                if viewport != s.viewport {
                    s.relayout(viewport)?;
                }
            }
            s.tracker.poll(now);
            s.tracker
                .on_scroll(update.scroll_top, update.viewport_height, now);
            Ok(ScrollState {
                current_page: s.tracker.current_page(),
                pending: s.tracker.has_pending(),
                scroll_top: None,
            })
        })
        .await
    }

    pub async fn goto(&self, id: Uuid, page: u32, now: Instant) -> Result<ScrollState, ViewerError> {
        self.with_session(id, |s| {
            s.check_page(page)?;
            let top = s.tracker.scroll_to_page(page, now);
            Ok(ScrollState {
                current_page: s.tracker.current_page(),
                pending: false,
                scroll_top: top,
            })
        })
        .await
    }

    /// Rasterize one page's annotation layer to PNG.
    ///
    /// A newer render of the same page cancels this one.
    pub async fn render_overlay(&self, id: Uuid, page: u32, viewport: Viewport) -> Result<Vec<u8>, ViewerError> {
        let (size, strokes, scheduler) = self
            .with_session(id, |s| {
                let size = s.check_page(page)?;
                Ok((size, s.history.page(page).to_vec(), s.scheduler.clone()))
            })
            .await?;

        let renderer = OverlayRenderer::new(viewport, size.width, size.height)?;
        let png = scheduler
            .run(page, async move {
                run_blocking(move |cancelled| {
                    let image = renderer.rasterize(&strokes, cancelled)?;
                    encode_png(&image)
                })
                .await
            })
            .await?;
        Ok(png)
    }

    /// Render one page of the document to PNG at `viewport`, with the
    /// annotation layer composited over it when `annotations` is set.
    ///
    /// Shares the page's render slot with overlay renders.
    pub async fn render_page(
        &self,
        id: Uuid,
        page: u32,
        viewport: Viewport,
        annotations: bool,
    ) -> Result<Vec<u8>, ViewerError> {
        let (size, strokes, pdf, scheduler) = self
            .with_session(id, |s| {
                let size = s.check_page(page)?;
                let strokes = if annotations {
                    s.history.page(page).to_vec()
                } else {
                    Vec::new()
                };
                Ok((size, strokes, s.pdf.clone(), s.scheduler.clone()))
            })
            .await?;
        viewport.canvas_size(size.width, size.height)?;

        let scale = (viewport.scale * CANVAS_RESOLUTION) as f32;
        let png = scheduler
            .run(page, async move {
                run_blocking(move |cancelled| -> Result<Vec<u8>, ViewerError> {
                    let mut image = pdf::render_page(&pdf, page as usize - 1, scale, viewport.rotation)?;
                    if cancelled.load(Ordering::Relaxed) {
                        return Err(RenderError::Cancelled.into());
                    }
                    OverlayRenderer::with_canvas(viewport, image.dimensions())
                        .paint(&mut image, &strokes, cancelled)?;
                    Ok(encode_png(&image)?)
                })
                .await
            })
            .await?;

        tracing::debug!(session_id = %id, page, size = png.len(), "Rendered viewer page");
        Ok(png)
    }

    /// The PDF with the current annotations burned in
    pub async fn export(&self, id: Uuid) -> Result<(String, Vec<u8>), ViewerError> {
        let (file_name, pdf, annotations) = self
            .with_session(id, |s| {
                Ok((s.file_name.clone(), s.pdf.clone(), s.history.current().clone()))
            })
            .await?;

        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ViewerError> {
            let doc = load_document(&pdf)?;
            let doc = flatten_annotations(doc, &annotations)?;
            Ok(pdf::save_document(doc)?)
        })
        .await
        .map_err(|e| ViewerError::Export(e.to_string()))??;

        Ok((format!("annotated_{}", file_name), bytes))
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        match self.sessions.write().await.remove(&id) {
            Some(session) => {
                session.scheduler.cancel_all();
                tracing::info!(session_id = %id, "Closed viewer session");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop expired sessions, returning how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        purge(&mut *self.sessions.write().await, Instant::now())
    }

    /// Periodically drop expired sessions
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let sessions = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = sessions.cleanup_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "Expired viewer sessions");
                }
            }
        })
    }
}

fn purge(sessions: &mut HashMap<Uuid, ViewerSession>, now: Instant) -> usize {
    let before = sessions.len();
    sessions.retain(|_, s| {
        let alive = now.duration_since(s.last_access) < SESSION_TTL;
        if !alive {
            s.scheduler.cancel_all();
        }
        alive
    });
    before - sessions.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::sample_doc;

    async fn open(sessions: &ViewerSessions) -> SessionSummary {
        let bytes = pdf::save_document(sample_doc(&[(100.0, 200.0), (100.0, 200.0)])).unwrap();
        sessions.create("doc.pdf", bytes).await.unwrap()
    }

    fn pen(page: u32, points: &[(f64, f64)]) -> StrokeInput {
        StrokeInput {
            page,
            tool: InkTool::Pen,
            color: Some("#3B82F6".to_string()),
            width: Some(4.0),
            points: points.iter().map(|(x, y)| Point::new(*x, *y)).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_reports_pages() {
        let sessions = ViewerSessions::new();
        let summary = open(&sessions).await;
        assert_eq!(summary.page_count, 2);
        assert_eq!(summary.pages[0], PageSize { width: 100.0, height: 200.0 });
        assert_eq!(summary.current_page, 1);
        assert!(!summary.can_undo);
    }

    #[tokio::test]
    async fn test_create_rejects_garbage() {
        let sessions = ViewerSessions::new();
        let err = sessions.create("x.pdf", b"nope".to_vec()).await.err().unwrap();
        assert!(matches!(err, ViewerError::Pdf(_)));
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_draw_erase_undo_redo() {
        let sessions = ViewerSessions::new();
        let id = open(&sessions).await.id;

        sessions.add_stroke(id, pen(1, &[(0.1, 0.1), (0.2, 0.2)])).await.unwrap();
        let after = sessions.add_stroke(id, pen(1, &[(0.8, 0.8)])).await.unwrap();
        assert_eq!(after.strokes.len(), 2);

        let miss = sessions.erase(id, 1, Point::new(0.5, 0.5)).await.unwrap();
        assert!(!miss.changed);
        let hit = sessions.erase(id, 1, Point::new(0.8, 0.81)).await.unwrap();
        assert!(hit.changed);
        assert_eq!(hit.strokes.len(), 1);

        let undone = sessions.undo(id).await.unwrap();
        assert!(undone.moved);
        assert_eq!(undone.annotations[&1].len(), 2);

        let redone = sessions.redo(id).await.unwrap();
        assert_eq!(redone.annotations[&1].len(), 1);
        assert!(!sessions.redo(id).await.unwrap().moved);
    }

    #[tokio::test]
    async fn test_page_and_session_checks() {
        let sessions = ViewerSessions::new();
        let id = open(&sessions).await.id;

        let err = sessions.add_stroke(id, pen(3, &[(0.1, 0.1)])).await.unwrap_err();
        assert!(matches!(err, ViewerError::PageOutOfRange { page: 3, count: 2 }));

        let err = sessions.undo(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ViewerError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_scroll_and_goto() {
        let sessions = ViewerSessions::new();
        let id = open(&sessions).await.id;
        let start = Instant::now();

        // Page heights are 300px at 100 %: page 2 spans 348..648.
        let state = sessions
            .scroll(id, ScrollUpdate { scroll_top: 300.0, viewport_height: 200.0, scale: None, rotation: None }, start)
            .await
            .unwrap();
        assert!(state.pending);
        assert_eq!(state.current_page, 1);

        let settled = sessions
            .scroll(
                id,
                ScrollUpdate { scroll_top: 300.0, viewport_height: 200.0, scale: None, rotation: None },
                start + Duration::from_millis(150),
            )
            .await
            .unwrap();
        assert_eq!(settled.current_page, 2);

        let jumped = sessions.goto(id, 1, start + Duration::from_millis(200)).await.unwrap();
        assert_eq!(jumped.current_page, 1);
        assert_eq!(jumped.scroll_top, Some(32.0));
        assert!(sessions.goto(id, 5, start).await.is_err());
    }

    #[tokio::test]
    async fn test_overlay_and_export() {
        let sessions = ViewerSessions::new();
        let id = open(&sessions).await.id;
        sessions.add_stroke(id, pen(2, &[(0.1, 0.1), (0.9, 0.9)])).await.unwrap();

        let png = sessions
            .render_overlay(id, 2, Viewport::new(2.0, 90).unwrap())
            .await
            .unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert_eq!((image.width(), image.height()), (600, 300));

        let (name, bytes) = sessions.export(id).await.unwrap();
        assert_eq!(name, "annotated_doc.pdf");
        assert_eq!(load_document(&bytes).unwrap().get_pages().len(), 2);
    }

    #[tokio::test]
    async fn test_page_render_with_annotations() {
        let sessions = ViewerSessions::new();
        let id = open(&sessions).await.id;
        sessions.add_stroke(id, pen(1, &[(0.0, 0.5), (1.0, 0.5)])).await.unwrap();

        let viewport = Viewport::new(1.0, 0).unwrap();
        let plain = sessions.render_page(id, 1, viewport, false).await.unwrap();
        let inked = sessions.render_page(id, 1, viewport, true).await.unwrap();

        let plain = image::load_from_memory(&plain).unwrap().to_rgba8();
        let inked = image::load_from_memory(&inked).unwrap().to_rgba8();
        assert_eq!(plain.dimensions(), inked.dimensions());

        let (w, h) = inked.dimensions();
        assert_eq!(plain.get_pixel(w - 2, h / 2).0, [255, 255, 255, 255]);
        assert_ne!(inked.get_pixel(w - 2, h / 2).0, [255, 255, 255, 255]);
        assert!(sessions.render_page(id, 3, viewport, true).await.is_err());
    }

    #[tokio::test]
    async fn test_remove() {
        let sessions = ViewerSessions::new();
        let id = open(&sessions).await.id;
        assert!(sessions.remove(id).await);
        assert!(!sessions.remove(id).await);
        assert_eq!(sessions.cleanup_expired().await, 0);
    }
}
