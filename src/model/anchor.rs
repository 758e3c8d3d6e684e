/// Visual anchors: small PNG patches captured around a press point and
/// stored base64-encoded inside the macro file.
use base64::Engine as _;
use image::RgbaImage;

use crate::errors::{ReplayError, ReplayResult};

/// Side length of patches captured by the recorder.
pub const ANCHOR_SIZE: u32 = 70;

#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSpec {
    /// Base64 of a single-frame PNG, kept verbatim for lossless round-trips.
    pub patch_b64: String,
    /// Vector from the patch's top-left to the action point, in pixels of
    /// the patch as captured (scale 1.0).
    pub offset: (i32, i32),
}

impl AnchorSpec {
    /// `None` for an empty patch: a click without a patch has no anchor.
    pub fn new(patch_b64: impl Into<String>, offset: (i32, i32)) -> Option<Self> {
        let patch_b64 = patch_b64.into();
        if patch_b64.is_empty() {
            return None;
        }
        Some(Self { patch_b64, offset })
    }

    /// Encodes `patch` as PNG and wraps it as an anchor.
    pub fn from_image(patch: &RgbaImage, offset: (i32, i32)) -> ReplayResult<Self> {
        if patch.width() == 0 || patch.height() == 0 {
            return Err(ReplayError::Image("empty anchor patch".into()));
        }
        Self::new(encode_png_b64(patch)?, offset)
            .ok_or_else(|| ReplayError::Image("empty anchor patch".into()))
    }

    pub fn decode(&self) -> ReplayResult<RgbaImage> {
        decode_png_b64(&self.patch_b64)
    }
}

pub fn encode_png_b64(img: &RgbaImage) -> ReplayResult<String> {
    let mut png_bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut png_bytes),
        image::ImageFormat::Png,
    )?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&png_bytes))
}

pub fn decode_png_b64(b64: &str) -> ReplayResult<RgbaImage> {
    let raw = base64::engine::general_purpose::STANDARD.decode(b64.trim())?;
    let img = image::load_from_memory(&raw)?;
    let rgba = img.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(ReplayError::Image("anchor image is empty".into()));
    }
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_round_trip_preserves_pixels() {
        let img = RgbaImage::from_fn(7, 5, |x, y| Rgba([x as u8 * 30, y as u8 * 40, 9, 255]));
        let anchor = AnchorSpec::from_image(&img, (3, 2)).unwrap();
        assert_eq!(anchor.decode().unwrap(), img);
        assert_eq!(anchor.offset, (3, 2));
    }

    #[test]
    fn garbage_base64_is_an_error() {
        assert!(matches!(decode_png_b64("not base64!"), Err(ReplayError::Base64(_))));
        let not_png = base64::engine::general_purpose::STANDARD.encode(b"hello");
        assert!(matches!(decode_png_b64(&not_png), Err(ReplayError::Image(_))));
    }

    #[test]
    fn empty_patches_are_not_anchors() {
        assert_eq!(AnchorSpec::new("", (35, 35)), None);
        assert!(AnchorSpec::from_image(&RgbaImage::new(0, 0), (0, 0)).is_err());
        assert!(AnchorSpec::new("AAAA", (0, 0)).is_some());
    }
}
