//! Annotation layer rasterization and render scheduling

use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};

use super::annotation::{InkTool, Point, Stroke, HIGHLIGHTER_ALPHA};
use crate::pdf::parse_hex_color;

/// Canvas pixels per PDF point at 100 % zoom
pub const CANVAS_RESOLUTION: f64 = 1.5;
pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 5.0;
const MAX_CANVAS_SIDE: u32 = 8192;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Render was superseded by a newer request")]
    Cancelled,

    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),

    #[error("Render failed: {0}")]
    Failed(String),
}

/// Zoom and rotation the page is displayed at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub scale: f64,
    pub rotation: i64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0,
        }
    }
}

impl Viewport {
    /// Validated viewport; zoom must be 10 % to 500 %, rotation a quarter turn
    pub fn new(scale: f64, rotation: i64) -> Result<Self, RenderError> {
        if !scale.is_finite() || !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
            return Err(RenderError::InvalidViewport(format!(
                "zoom must be between 10% and 500%, got {}%",
                (scale * 100.0).round()
            )));
        }
        if rotation % 90 != 0 {
            return Err(RenderError::InvalidViewport(format!(
                "rotation must be a multiple of 90, got {}",
                rotation
            )));
        }
        Ok(Self {
            scale,
            rotation: rotation.rem_euclid(360),
        })
    }

    fn is_sideways(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Canvas size for a page of `width` x `height` points
    pub fn canvas_size(&self, width: f64, height: f64) -> Result<(u32, u32), RenderError> {
        let factor = self.scale * CANVAS_RESOLUTION;
        let (w, h) = if self.is_sideways() {
            (height * factor, width * factor)
        } else {
            (width * factor, height * factor)
        };
        let (w, h) = (w.round().max(1.0), h.round().max(1.0));
        if w > f64::from(MAX_CANVAS_SIDE) || h > f64::from(MAX_CANVAS_SIDE) {
            return Err(RenderError::InvalidViewport(format!(
                "canvas {}x{} is too large",
                w, h
            )));
        }
        Ok((w as u32, h as u32))
    }

    pub fn line_width(&self, width: f64) -> f64 {
        width * self.scale * CANVAS_RESOLUTION
    }

    /// Normalized page point to canvas pixels
    pub fn to_canvas(&self, p: &Point, canvas: (u32, u32)) -> (f64, f64) {
        let (u, v) = match self.rotation {
            90 => (1.0 - p.y, p.x),
            180 => (1.0 - p.x, 1.0 - p.y),
            270 => (p.y, 1.0 - p.x),
            _ => (p.x, p.y),
        };
        (u * f64::from(canvas.0), v * f64::from(canvas.1))
    }

    /// Normalized canvas position back to a normalized page point
    pub fn to_page(&self, cx: f64, cy: f64) -> Point {
        match self.rotation {
            90 => Point::new(cy, 1.0 - cx),
            180 => Point::new(1.0 - cx, 1.0 - cy),
            270 => Point::new(1.0 - cy, cx),
            _ => Point::new(cx, cy),
        }
    }
}

/// Rasterizes the transparent annotation layer of one page
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    viewport: Viewport,
    canvas: (u32, u32),
}

impl OverlayRenderer {
    pub fn new(viewport: Viewport, page_width: f64, page_height: f64) -> Result<Self, RenderError> {
        let canvas = viewport.canvas_size(page_width, page_height)?;
        Ok(Self { viewport, canvas })
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas
    }

    /// Renderer drawing onto an existing canvas of `canvas` pixels
    pub fn with_canvas(viewport: Viewport, canvas: (u32, u32)) -> Self {
        Self { viewport, canvas }
    }

    /// Rasterize onto a transparent canvas
    pub fn rasterize(&self, strokes: &[Stroke], cancelled: &AtomicBool) -> Result<RgbaImage, RenderError> {
        let mut image = RgbaImage::new(self.canvas.0, self.canvas.1);
        self.paint(&mut image, strokes, cancelled)?;
        Ok(image)
    }

    /// Composite strokes over `image`; one coverage buffer serves all strokes
    pub fn paint(&self, image: &mut RgbaImage, strokes: &[Stroke], cancelled: &AtomicBool) -> Result<(), RenderError> {
        if image.dimensions() != self.canvas {
            return Err(RenderError::Failed(format!(
                "canvas is {}x{}, image is {}x{}",
                self.canvas.0,
                self.canvas.1,
                image.width(),
                image.height()
            )));
        }
        let mut covered = vec![false; self.canvas.0 as usize * self.canvas.1 as usize];
        for stroke in strokes {
            if cancelled.load(Ordering::Relaxed) {
                return Err(RenderError::Cancelled);
            }
            self.draw_stroke(image, &mut covered, stroke)?;
        }
        Ok(())
    }

    fn draw_stroke(&self, image: &mut RgbaImage, covered: &mut [bool], stroke: &Stroke) -> Result<(), RenderError> {
        if stroke.points.is_empty() || stroke.tool == InkTool::Eraser {
            return Ok(());
        }
        let color = parse_hex_color(&stroke.color)
            .map_err(|e| RenderError::Failed(e.to_string()))?
            .to_u8();
        let (alpha, multiply) = match stroke.tool {
            InkTool::Highlighter => (HIGHLIGHTER_ALPHA, true),
            _ => (1.0, false),
        };

        let radius = (self.viewport.line_width(stroke.width) / 2.0).max(0.5);
        let points: Vec<(f64, f64)> = stroke
            .points
            .iter()
            .map(|p| self.viewport.to_canvas(p, self.canvas))
            .collect();

        // Coverage is collected first so overlapping segments of one stroke
        // are composited once, as a canvas path would be.
        let (w, h) = self.canvas;
        let segments: Vec<((f64, f64), (f64, f64))> = if points.len() == 1 {
            vec![(points[0], points[0])]
        } else {
            points.windows(2).map(|pair| (pair[0], pair[1])).collect()
        };
        let mut bounds: Option<Bounds> = None;
        for (a, b) in segments {
            let marked = mark_segment(covered, w, h, a, b, radius);
            bounds = Some(bounds.map_or(marked, |acc| acc.union(marked)));
        }

        let Some(bounds) = bounds else {
            return Ok(());
        };
        for y in bounds.min_y..=bounds.max_y {
            for x in bounds.min_x..=bounds.max_x {
                let i = y as usize * w as usize + x as usize;
                if std::mem::take(&mut covered[i]) {
                    let px = image.get_pixel_mut(x, y);
                    *px = composite(*px, color, alpha, multiply);
                }
            }
        }
        Ok(())
    }
}

/// Run pixel work on the blocking pool. The flag handed to `work` is raised
/// when the returned future is dropped, so an aborted render stops at the
/// next check.
pub async fn run_blocking<T, E, F>(work: F) -> Result<T, E>
where
    F: FnOnce(&AtomicBool) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<RenderError> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let _cancel_on_drop = CancelOnDrop(cancelled.clone());

    tokio::task::spawn_blocking(move || work(&cancelled))
        .await
        .map_err(|e| E::from(RenderError::Failed(format!("Task join error: {}", e))))?
}

struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Inclusive pixel rectangle touched by a stroke
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Bounds {
    fn union(self, other: Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

fn mark_segment(covered: &mut [bool], w: u32, h: u32, a: (f64, f64), b: (f64, f64), r: f64) -> Bounds {
    let min_x = ((a.0.min(b.0) - r).floor().max(0.0) as u32).min(w.saturating_sub(1));
    let min_y = ((a.1.min(b.1) - r).floor().max(0.0) as u32).min(h.saturating_sub(1));
    let max_x = ((a.0.max(b.0) + r).ceil().max(0.0) as u32).min(w.saturating_sub(1));
    let max_y = ((a.1.max(b.1) + r).ceil().max(0.0) as u32).min(h.saturating_sub(1));

    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let (px, py) = (f64::from(x) + 0.5, f64::from(y) + 0.5);
            let t = if len2 == 0.0 {
                0.0
            } else {
                (((px - a.0) * dx + (py - a.1) * dy) / len2).clamp(0.0, 1.0)
            };
            let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
            if (px - cx).hypot(py - cy) <= r {
                covered[y as usize * w as usize + x as usize] = true;
            }
        }
    }
    Bounds { min_x, min_y, max_x, max_y }
}

/// Source-over of `color` at `alpha`, optionally multiply-blended with the backdrop
fn composite(backdrop: Rgba<u8>, color: [u8; 3], alpha: f32, multiply: bool) -> Rgba<u8> {
    let ab = f32::from(backdrop[3]) / 255.0;
    let ao = alpha + ab * (1.0 - alpha);
    if ao <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let cs = f32::from(color[c]) / 255.0;
        let cb = f32::from(backdrop[c]) / 255.0;
        let mixed = if multiply { (1.0 - ab) * cs + ab * cb * cs } else { cs };
        let co = (alpha * mixed + ab * cb * (1.0 - alpha)) / ao;
        out[c] = (co.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out[3] = (ao.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba(out)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| RenderError::Failed(e.to_string()))?;
    Ok(out.into_inner())
}

#[derive(Default)]
struct InFlight {
    next_generation: u64,
    pages: HashMap<u32, (u64, AbortHandle)>,
}

/// At most one in-flight render per page; scheduling a page aborts its
/// previous render
#[derive(Clone, Default)]
pub struct RenderScheduler {
    in_flight: Arc<Mutex<InFlight>>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `render` as the newest render of `page`. Generation and
    /// registration happen under one lock, so the last registered render is
    /// always the one left running.
    fn schedule<F, T, E>(&self, page: u32, render: F) -> (u64, JoinHandle<Result<T, E>>)
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut in_flight = self.in_flight.lock();
        let generation = in_flight.next_generation;
        in_flight.next_generation += 1;

        let handle = tokio::spawn(render);
        if let Some((_, previous)) = in_flight
            .pages
            .insert(page, (generation, handle.abort_handle()))
        {
            tracing::debug!(page, "Cancelling superseded render");
            previous.abort();
        }
        (generation, handle)
    }

    pub async fn run<F, T, E>(&self, page: u32, render: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<RenderError> + Send + 'static,
    {
        let (generation, handle) = self.schedule(page, render);
        let result = handle.await;

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.pages.get(&page).map(|(g, _)| *g) == Some(generation) {
                in_flight.pages.remove(&page);
            }
        }

        match result {
            Ok(output) => output,
            Err(e) if e.is_cancelled() => Err(RenderError::Cancelled.into()),
            Err(e) => Err(RenderError::Failed(e.to_string()).into()),
        }
    }

    pub fn is_rendering(&self, page: u32) -> bool {
        self.in_flight.lock().pages.contains_key(&page)
    }

    pub fn cancel_all(&self) {
        for (_, (_, handle)) in self.in_flight.lock().pages.drain() {
            handle.abort();
        }
    }
}
