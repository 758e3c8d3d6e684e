use async_trait::async_trait;
use image::RgbaImage;

use crate::errors::ReplayResult;
use crate::perception::screenshot::crop_region;
use crate::perception::types::{MonitorCapture, Rect};

/// Live pixel source for every attached monitor.
pub trait ScreenCapturer: Send + Sync {
    /// One capture per monitor, primary first.
    fn capture_all(&self) -> ReplayResult<Vec<MonitorCapture>>;

    /// Pixels of a global rectangle, clipped to the monitor holding its
    /// top-left corner.
    fn capture_region(&self, region: Rect) -> ReplayResult<RgbaImage> {
        let captures = self.capture_all()?;
        Ok(crop_region(&captures, region)?.image)
    }
}

/// Text extraction from a pixel buffer.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &RgbaImage) -> ReplayResult<String>;
}
