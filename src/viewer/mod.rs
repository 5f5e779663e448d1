//! PDF viewer and ink annotation sessions
//!
//! Pages are annotated with freehand pen and highlighter strokes stored in
//! normalized page space. Each session keeps a linear undo/redo history of
//! whole-document snapshots, tracks the page in view, rasterizes the
//! annotation layer at any zoom and rotation, and can export the PDF with
//! the strokes burned in.

mod annotation;
mod flatten;
mod history;
mod render;
mod scroll;
mod sessions;

use thiserror::Error;

pub use annotation::{
    erase, InkTool, PageAnnotations, Point, Stroke, StrokeBuilder, DEFAULT_PEN_WIDTH,
    ERASER_RADIUS, HIGHLIGHTER_ALPHA, HIGHLIGHTER_COLORS, HIGHLIGHTER_WIDTH, PEN_COLORS,
};
pub use flatten::flatten_annotations;
pub use history::AnnotationHistory;
pub use render::{encode_png, OverlayRenderer, RenderError, RenderScheduler, Viewport};
pub use scroll::{PageLayout, ScrollTracker};
pub use sessions::{
    HistoryState, PageSize, PageStrokes, ScrollState, ScrollUpdate, SessionSummary, StrokeInput,
    ViewerSessions, SESSION_TTL,
};

use crate::pdf::PdfError;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Viewer session not found: {0}")]
    SessionNotFound(String),

    #[error("Page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error("{0}")]
    InvalidStroke(String),

    #[error("Too many open viewer sessions")]
    TooManySessions,

    #[error("Export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Pdf(#[from] PdfError),
}
