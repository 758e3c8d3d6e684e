/// Screen capture providers and region cropping.
use image::RgbaImage;

use crate::errors::{ReplayError, ReplayResult};
use crate::perception::traits::ScreenCapturer;
use crate::perception::types::{MonitorCapture, Point, Rect};

/// A region cut out of one monitor capture.
#[derive(Debug, Clone)]
pub struct RegionPixels {
    pub image: RgbaImage,
    pub monitor_id: u32,
    /// Capture-pixel position of the crop's top-left on that monitor.
    pub local_x: u32,
    pub local_y: u32,
}

/// Crops a global rectangle out of `captures`. The rectangle is clipped to
/// the monitor containing its top-left corner; a region whose corner lies
/// off-screen is first clamped onto the nearest monitor edge.
pub fn crop_region(captures: &[MonitorCapture], region: Rect) -> ReplayResult<RegionPixels> {
    if region.is_empty() {
        return Err(ReplayError::Geometry("empty capture region".into()));
    }
    let corner = Point::new(region.x, region.y);
    let capture = captures
        .iter()
        .find(|c| c.monitor.rect().contains(corner))
        .or_else(|| {
            captures
                .iter()
                .find(|c| c.monitor.rect().intersects(&region))
        })
        .ok_or_else(|| {
            ReplayError::Geometry(format!(
                "region {}x{} at ({}, {}) is not on any monitor",
                region.width, region.height, region.x, region.y
            ))
        })?;

    let m = &capture.monitor;
    let clamped = Point::new(
        region.x.clamp(m.origin_x, m.origin_x + m.width as i32 - 1),
        region.y.clamp(m.origin_y, m.origin_y + m.height as i32 - 1),
    );
    let (lx, ly) = m
        .global_to_local(clamped)
        .ok_or_else(|| ReplayError::Geometry("region corner outside monitor".into()))?;
    let end = Point::new(
        (region.right().min(m.rect().right())) as i32,
        (region.bottom().min(m.rect().bottom())) as i32,
    );
    let scale = if m.scale_factor > 0.0 { m.scale_factor as f64 } else { 1.0 };
    let (img_w, img_h) = capture.image.dimensions();
    let rx = (((end.x - m.origin_x) as f64 * scale).round() as u32).min(img_w);
    let ry = (((end.y - m.origin_y) as f64 * scale).round() as u32).min(img_h);
    if rx <= lx || ry <= ly {
        return Err(ReplayError::Geometry("capture region is empty after clipping".into()));
    }

    let image = image::imageops::crop_imm(&capture.image, lx, ly, rx - lx, ry - ly).to_image();
    Ok(RegionPixels {
        image,
        monitor_id: m.id,
        local_x: lx,
        local_y: ly,
    })
}

/// Stand-in used when the binary is built without native providers.
pub struct UnavailableCapturer;

impl ScreenCapturer for UnavailableCapturer {
    fn capture_all(&self) -> ReplayResult<Vec<MonitorCapture>> {
        Err(ReplayError::ProviderUnavailable(
            "screen capture (build with the `native` feature)".into(),
        ))
    }
}

// ── xcap implementation ─────────────────────────────────────────────────────

#[cfg(feature = "native")]
mod native {
    use super::*;
    use crate::perception::types::Monitor;

    /// Multi-monitor capture through `xcap`.
    pub struct XcapCapturer;

    impl ScreenCapturer for XcapCapturer {
        fn capture_all(&self) -> ReplayResult<Vec<MonitorCapture>> {
            let mut monitors = xcap::Monitor::all()
                .map_err(|e| ReplayError::ProviderUnavailable(format!("xcap monitors: {e}")))?;
            monitors.sort_by_key(|m| !m.is_primary());

            let mut captures = Vec::with_capacity(monitors.len());
            for m in monitors {
                let image = m
                    .capture_image()
                    .map_err(|e| ReplayError::Provider(format!("capture monitor {}: {e}", m.id())))?;
                // Buffer size over logical size gives the effective DPI scale on
                // every platform, whatever `xcap` reports as width.
                let scale_factor = if m.width() > 0 {
                    image.width() as f32 / m.width() as f32
                } else {
                    1.0
                };
                captures.push(MonitorCapture {
                    monitor: Monitor {
                        id: m.id(),
                        origin_x: m.x(),
                        origin_y: m.y(),
                        width: m.width(),
                        height: m.height(),
                        scale_factor,
                    },
                    image,
                });
            }
            tracing::trace!(monitors = captures.len(), "screens captured");
            Ok(captures)
        }
    }
}

#[cfg(feature = "native")]
pub use native::XcapCapturer;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::Monitor;
    use image::Rgba;

    fn cap(id: u32, x: i32, w: u32, h: u32, scale: f32) -> MonitorCapture {
        let pw = (w as f32 * scale) as u32;
        let ph = (h as f32 * scale) as u32;
        MonitorCapture {
            monitor: Monitor { id, origin_x: x, origin_y: 0, width: w, height: h, scale_factor: scale },
            image: RgbaImage::from_fn(pw, ph, |px, py| Rgba([px as u8, py as u8, id as u8, 255])),
        }
    }

    #[test]
    fn crops_from_the_monitor_holding_the_corner() {
        let caps = [cap(0, 0, 100, 100, 1.0), cap(1, 100, 100, 100, 1.0)];
        let r = crop_region(&caps, Rect::new(110, 20, 30, 10)).unwrap();
        assert_eq!(r.monitor_id, 1);
        assert_eq!((r.local_x, r.local_y), (10, 20));
        assert_eq!(r.image.dimensions(), (30, 10));
        assert_eq!(r.image.get_pixel(0, 0), &Rgba([10, 20, 1, 255]));
    }

    #[test]
    fn clips_at_monitor_edges() {
        let caps = [cap(0, 0, 100, 100, 1.0)];
        let r = crop_region(&caps, Rect::new(-20, 90, 70, 70)).unwrap();
        assert_eq!((r.local_x, r.local_y), (0, 90));
        assert_eq!(r.image.dimensions(), (50, 10));
    }

    #[test]
    fn hidpi_regions_are_in_physical_pixels() {
        let caps = [cap(0, 0, 100, 100, 2.0)];
        let r = crop_region(&caps, Rect::new(10, 10, 20, 20)).unwrap();
        assert_eq!((r.local_x, r.local_y), (20, 20));
        assert_eq!(r.image.dimensions(), (40, 40));
    }

    #[test]
    fn off_screen_region_is_an_error() {
        let caps = [cap(0, 0, 100, 100, 1.0)];
        assert!(crop_region(&caps, Rect::new(500, 500, 10, 10)).is_err());
        assert!(crop_region(&caps, Rect::new(5, 5, 0, 10)).is_err());
        assert!(UnavailableCapturer.capture_all().unwrap_err().is_unavailable());
    }
}
