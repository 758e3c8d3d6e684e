/// Virtual desktop model: every monitor placed in one global coordinate
/// space, so a capture pixel can be addressed either as
/// (monitor, local x, local y) or as a single global (x, y).
use crate::errors::{ReplayError, ReplayResult};
use crate::perception::types::{Monitor, MonitorCapture, Point};

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenGeometry {
    monitors: Vec<Monitor>,
}

impl ScreenGeometry {
    /// Builds the desktop from monitor placements. Monitors keep the given
    /// order; the first is treated as primary.
    pub fn new(monitors: Vec<Monitor>) -> ReplayResult<Self> {
        for (i, m) in monitors.iter().enumerate() {
            if m.width == 0 || m.height == 0 {
                return Err(ReplayError::Geometry(format!(
                    "monitor {} has empty size {}x{}",
                    m.id, m.width, m.height
                )));
            }
            if !(m.scale_factor.is_finite() && m.scale_factor > 0.0) {
                return Err(ReplayError::Geometry(format!(
                    "monitor {} has invalid scale factor {}",
                    m.id, m.scale_factor
                )));
            }
            for other in &monitors[..i] {
                if other.id == m.id {
                    return Err(ReplayError::Geometry(format!("duplicate monitor id {}", m.id)));
                }
                if other.rect().intersects(&m.rect()) {
                    return Err(ReplayError::Geometry(format!(
                        "monitors {} and {} overlap",
                        other.id, m.id
                    )));
                }
            }
        }
        Ok(Self { monitors })
    }

    pub fn from_captures(captures: &[MonitorCapture]) -> ReplayResult<Self> {
        Self::new(captures.iter().map(|c| c.monitor.clone()).collect())
    }

    /// Which monitor a global point falls on, with its capture pixel.
    pub fn to_local(&self, p: Point) -> Option<(u32, u32, u32)> {
        self.monitors
            .iter()
            .find_map(|m| m.global_to_local(p).map(|(lx, ly)| (m.id, lx, ly)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mon(id: u32, x: i32, y: i32, w: u32, h: u32, s: f32) -> Monitor {
        Monitor { id, origin_x: x, origin_y: y, width: w, height: h, scale_factor: s }
    }

    #[test]
    fn side_by_side_monitors_map_both_ways() {
        let geo = ScreenGeometry::new(vec![
            mon(0, 0, 0, 1920, 1080, 1.0),
            mon(1, 1920, 0, 1280, 1024, 1.0),
        ])
        .unwrap();
        assert_eq!(geo.to_local(Point::new(1930, 20)), Some((1, 10, 20)));
        assert_eq!(geo.to_local(Point::new(100, 1070)), Some((0, 100, 1070)));
        assert_eq!(geo.to_local(Point::new(2000, 1050)), None);
    }

    #[test]
    fn negative_origin_monitor_left_of_primary() {
        let geo = ScreenGeometry::new(vec![
            mon(0, 0, 0, 1920, 1080, 1.0),
            mon(1, -1280, 0, 1280, 720, 1.0),
        ])
        .unwrap();
        assert_eq!(geo.to_local(Point::new(-1, 0)), Some((1, 1279, 0)));
        assert_eq!(geo.to_local(Point::new(-1281, 0)), None);
    }

    #[test]
    fn hidpi_capture_pixels_are_divided_by_scale() {
        let geo = ScreenGeometry::new(vec![mon(7, 100, 0, 1440, 900, 2.0)]).unwrap();
        assert_eq!(geo.to_local(Point::new(200, 50)), Some((7, 200, 100)));
        assert_eq!(geo.to_local(Point::new(100, 0)), Some((7, 0, 0)));
    }

    #[test]
    fn overlapping_monitors_are_rejected() {
        let err = ScreenGeometry::new(vec![
            mon(0, 0, 0, 1920, 1080, 1.0),
            mon(1, 1900, 0, 1280, 1024, 1.0),
        ])
        .unwrap_err();
        assert!(matches!(err, ReplayError::Geometry(_)));
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        assert!(ScreenGeometry::new(vec![
            mon(0, 0, 0, 100, 100, 1.0),
            mon(1, 0, 100, 100, 100, 1.0),
        ])
        .is_ok());
    }

    #[test]
    fn empty_geometry_locates_nothing() {
        let geo = ScreenGeometry::new(Vec::new()).unwrap();
        assert!(geo.to_local(Point::new(0, 0)).is_none());
    }
}
