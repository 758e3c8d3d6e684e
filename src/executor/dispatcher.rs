// Per-event provider dispatch.
use std::sync::Arc;

use crate::errors::ReplayResult;
use crate::executor::clipboard::{ClipboardWriter, SystemClipboard};
use crate::executor::input::InputInjector;
use crate::executor::keys::parse_recorded_key;
use crate::model::MouseButton;
use crate::perception::ocr::{TesseractOcr, UnavailableOcr};
use crate::perception::traits::{ScreenCapturer, TextRecognizer};
use crate::perception::types::Point;
use crate::playback::state::StepOutcome;
use crate::window::WindowManager;

/// The platform collaborators one player drives.
#[derive(Clone)]
pub struct Providers {
    pub input: Arc<dyn InputInjector>,
    pub capture: Arc<dyn ScreenCapturer>,
    pub windows: Arc<dyn WindowManager>,
    pub ocr: Arc<dyn TextRecognizer>,
    pub clipboard: Arc<dyn ClipboardWriter>,
}

impl Providers {
    /// Providers for the machine this binary runs on. Without the `native`
    /// feature, input and capture report themselves unavailable; without a
    /// `tesseract` binary, so does OCR.
    pub fn system() -> ReplayResult<Self> {
        #[cfg(feature = "native")]
        let (input, capture): (Arc<dyn InputInjector>, Arc<dyn ScreenCapturer>) = {
            let input: Arc<dyn InputInjector> = match crate::executor::input::EnigoInjector::new() {
                Ok(i) => Arc::new(i),
                Err(e) => {
                    tracing::warn!("input injection disabled: {e}");
                    Arc::new(crate::executor::input::UnavailableInjector)
                }
            };
            (input, Arc::new(crate::perception::screenshot::XcapCapturer))
        };
        #[cfg(not(feature = "native"))]
        let (input, capture): (Arc<dyn InputInjector>, Arc<dyn ScreenCapturer>) = (
            Arc::new(crate::executor::input::UnavailableInjector),
            Arc::new(crate::perception::screenshot::UnavailableCapturer),
        );

        let tesseract = TesseractOcr::default();
        let ocr: Arc<dyn TextRecognizer> = if tesseract.is_installed() {
            Arc::new(tesseract)
        } else {
            tracing::warn!("tesseract not found; OCR steps will be skipped");
            Arc::new(UnavailableOcr)
        };

        Ok(Self {
            input,
            capture,
            windows: crate::window::system_window_manager(),
            ocr,
            clipboard: Arc::new(SystemClipboard::default()),
        })
    }
}

/// Presses or releases `button` at `point`, moving there first.
pub fn pointer_button(
    input: &dyn InputInjector,
    point: Point,
    button: MouseButton,
    down: bool,
) -> ReplayResult<()> {
    input.move_to(point.x, point.y)?;
    input.button(point.x, point.y, button, down)
}

pub fn scroll_at(input: &dyn InputInjector, point: Point, dx: i32, dy: i32) -> ReplayResult<()> {
    input.move_to(point.x, point.y)?;
    input.scroll(dx, dy)
}

/// Sends a recorded key; names with no injectable equivalent are skipped.
pub fn key_event(input: &dyn InputInjector, raw: &str, down: bool) -> ReplayResult<StepOutcome> {
    match parse_recorded_key(raw) {
        Some(key) => {
            input.key(key, down)?;
            Ok(StepOutcome::Done)
        }
        None => {
            tracing::debug!(key = raw, "unmapped key skipped");
            Ok(StepOutcome::Skipped {
                reason: format!("unmapped key {raw:?}"),
            })
        }
    }
}
