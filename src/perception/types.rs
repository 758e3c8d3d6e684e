use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// A point in global (virtual desktop) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, p: Point) -> bool {
        (p.x as i64) >= self.x as i64
            && (p.x as i64) < self.right()
            && (p.y as i64) >= self.y as i64
            && (p.y as i64) < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.x as i64) < other.right()
            && (other.x as i64) < self.right()
            && (self.y as i64) < other.bottom()
            && (other.y as i64) < self.bottom()
    }
}

/// One physical display as placed on the virtual desktop.
///
/// `width`/`height` are in global units; the captured buffer for the
/// monitor is `scale_factor` times larger on HiDPI displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: u32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f32,
}

impl Monitor {
    pub fn rect(&self) -> Rect {
        Rect::new(self.origin_x, self.origin_y, self.width, self.height)
    }

    /// Maps a pixel of this monitor's capture buffer to global coordinates.
    pub fn local_to_global(&self, local_x: i64, local_y: i64) -> Point {
        let s = self.effective_scale() as f64;
        Point {
            x: self.origin_x + (local_x as f64 / s).round() as i32,
            y: self.origin_y + (local_y as f64 / s).round() as i32,
        }
    }

    /// Maps a global point onto this monitor's capture buffer, if it lies
    /// on this monitor.
    pub fn global_to_local(&self, p: Point) -> Option<(u32, u32)> {
        if !self.rect().contains(p) {
            return None;
        }
        let s = self.effective_scale() as f64;
        let lx = ((p.x - self.origin_x) as f64 * s).floor() as u32;
        let ly = ((p.y - self.origin_y) as f64 * s).floor() as u32;
        Some((lx, ly))
    }

    fn effective_scale(&self) -> f32 {
        if self.scale_factor.is_finite() && self.scale_factor > 0.0 {
            self.scale_factor
        } else {
            1.0
        }
    }
}

/// A live capture of one monitor.
#[derive(Debug, Clone)]
pub struct MonitorCapture {
    pub monitor: Monitor,
    pub image: RgbaImage,
}

/// Outcome of a single anchor lookup. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub found: bool,
    /// Action point in global coordinates (meaningful only when `found`).
    pub global_point: Point,
    /// Best normalized cross-correlation seen, even when rejected.
    pub score: f32,
    pub scale: f32,
    pub monitor_id: Option<u32>,
}

impl MatchResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            global_point: Point::default(),
            score: 0.0,
            scale: 1.0,
            monitor_id: None,
        }
    }
}
