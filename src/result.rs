use crate::raster::{Channels, RasterImage};

/// Detected line segment in image pixel space (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn start(&self) -> (i32, i32) {
        (self.x1, self.y1)
    }

    pub fn end(&self) -> (i32, i32) {
        (self.x2, self.y2)
    }

    pub fn length(&self) -> f64 {
        let dx = (self.x2 - self.x1) as f64;
        let dy = (self.y2 - self.y1) as f64;
        dx.hypot(dy)
    }

    /// Angle from the horizontal axis in a y-up frame, normalized into (-90, 90].
    pub fn angle_degrees(&self) -> f64 {
        let dy = -(self.y2 - self.y1) as f64;
        let dx = (self.x2 - self.x1) as f64;
        let mut angle = dy.atan2(dx).to_degrees();
        if angle <= -90.0 {
            angle += 180.0;
        } else if angle > 90.0 {
            angle -= 180.0;
        }
        angle
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSelection {
    pub line: LineSegment,
    pub detected_angle_degrees: f64,
    pub rotation_angle_degrees: f64,
    /// Set when no horizontal candidate existed and the longest segment was used instead.
    pub used_fallback: bool,
}

impl LineSelection {
    pub fn length(&self) -> f64 {
        self.line.length()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeskewDiagnostics {
    pub edge_pixel_count: usize,
    pub lines_found: usize,
    pub horizontal_lines_found: usize,
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
}

#[derive(Debug, Clone)]
pub struct DeskewResult {
    pub image: RasterImage,
    pub rotation_angle_degrees: f64,
    pub line_info: Option<LineSelection>,
    pub diagnostics: DeskewDiagnostics,
}

#[derive(Debug, Clone)]
pub struct EncodedDeskew {
    pub png: Vec<u8>,
    pub rotation_angle_degrees: f64,
    pub line_info: Option<LineSelection>,
    pub diagnostics: DeskewDiagnostics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenConfidence {
    pub confidence: f64,
    pub token_probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceResult {
    pub confidence: f64,
    pub token_confidence: Option<f64>,
    pub heuristic_confidence: f64,
    pub used_token_scores: bool,
}
