//! Freehand ink annotations
//!
//! Points are normalized to the page as displayed with its own /Rotate
//! applied and no viewer rotation: `(0, 0)` is the top-left corner and
//! `(1, 1)` the bottom-right.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ViewerError;
use crate::pdf::parse_hex_color;

/// Eraser hit radius in normalized page units
pub const ERASER_RADIUS: f64 = 0.02;
pub const DEFAULT_PEN_WIDTH: f64 = 2.0;
pub const HIGHLIGHTER_WIDTH: f64 = 20.0;
pub const HIGHLIGHTER_ALPHA: f32 = 0.4;

pub const PEN_COLORS: [&str; 5] = ["#000000", "#EF4444", "#3B82F6", "#10B981", "#F59E0B"];
pub const HIGHLIGHTER_COLORS: [&str; 4] = ["#FEF08A", "#BFDBFE", "#BBF7D0", "#FBCFE8"];

/// Strokes per 1-based page number
pub type PageAnnotations = BTreeMap<u32, Vec<Stroke>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn in_unit_square(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InkTool {
    Pen,
    Highlighter,
    Eraser,
}

impl InkTool {
    pub fn default_color(&self) -> &'static str {
        match self {
            InkTool::Highlighter => HIGHLIGHTER_COLORS[0],
            _ => PEN_COLORS[0],
        }
    }
}

/// A finished stroke; only pens and highlighters leave one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: String,
    pub tool: InkTool,
    pub color: String,
    pub width: f64,
    pub points: Vec<Point>,
}

impl Stroke {
    /// Whether any point lies strictly within `radius` of `at`
    pub fn hit(&self, at: &Point, radius: f64) -> bool {
        self.points.iter().any(|p| p.distance(at) < radius)
    }
}

/// Collects points while the pointer is down
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    tool: InkTool,
    color: String,
    width: f64,
    points: Vec<Point>,
}

impl StrokeBuilder {
    /// Start a stroke; highlighters always use their fixed width
    pub fn begin(tool: InkTool, color: Option<&str>, width: Option<f64>) -> Result<Self, ViewerError> {
        if tool == InkTool::Eraser {
            return Err(ViewerError::InvalidStroke(
                "The eraser does not draw strokes".to_string(),
            ));
        }

        let color = color
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| tool.default_color());
        parse_hex_color(color).map_err(|e| ViewerError::InvalidStroke(e.to_string()))?;

        let width = match tool {
            InkTool::Highlighter => HIGHLIGHTER_WIDTH,
            _ => width.filter(|w| *w > 0.0).unwrap_or(DEFAULT_PEN_WIDTH),
        };
        if width > 100.0 {
            return Err(ViewerError::InvalidStroke("Stroke width is too large".to_string()));
        }

        Ok(Self {
            tool,
            color: color.to_string(),
            width,
            points: Vec::new(),
        })
    }

    pub fn push(&mut self, point: Point) -> Result<(), ViewerError> {
        if !point.x.is_finite() || !point.y.is_finite() || !point.in_unit_square() {
            return Err(ViewerError::InvalidStroke(format!(
                "Point ({}, {}) is outside the page",
                point.x, point.y
            )));
        }
        self.points.push(point);
        Ok(())
    }

    /// The finished stroke, or `None` when no point was recorded
    pub fn finish(self) -> Option<Stroke> {
        if self.points.is_empty() {
            return None;
        }
        Some(Stroke {
            id: Uuid::new_v4().to_string(),
            tool: self.tool,
            color: self.color,
            width: self.width,
            points: self.points,
        })
    }
}

/// Remove every stroke touched by the eraser at `at`.
///
/// Returns the remaining strokes only when something was erased.
pub fn erase(strokes: &[Stroke], at: &Point) -> Option<Vec<Stroke>> {
    let remaining: Vec<Stroke> = strokes
        .iter()
        .filter(|s| !s.hit(at, ERASER_RADIUS))
        .cloned()
        .collect();
    (remaining.len() != strokes.len()).then_some(remaining)
}
