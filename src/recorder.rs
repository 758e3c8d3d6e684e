//! Turns a live stream of timestamped input into a macro document.
//!
//! The hook that produces [`RawInput`] is platform-specific and lives outside
//! this crate; the recorder only assigns delays and attaches anchors.
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ReplayResult;
use crate::model::anchor::{AnchorSpec, ANCHOR_SIZE};
use crate::model::{ClickAction, MacroAction, MacroDocument, MacroEvent, MouseButton, WindowGeometrySnapshot};
use crate::perception::geometry::ScreenGeometry;
use crate::perception::screenshot::crop_region;
use crate::perception::traits::ScreenCapturer;
use crate::perception::types::{Point, Rect};
use crate::window::WindowManager;

/// Delay given to the leading window-restore event.
const RESTORE_EVENT_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum RawInputKind {
    Move { x: i32, y: i32 },
    Button { x: i32, y: i32, button: MouseButton, pressed: bool },
    Scroll { x: i32, y: i32, dx: i32, dy: i32 },
    KeyDown { key: String },
    KeyUp { key: String },
}

/// One hooked input, `at` measured from the start of recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInput {
    pub at: Duration,
    pub kind: RawInputKind,
}

#[derive(Debug, Clone)]
pub struct RecorderOptions {
    pub capture_anchors: bool,
    pub anchor_size: u32,
    pub snapshot_window: bool,
    pub record_moves: bool,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            capture_anchors: true,
            anchor_size: ANCHOR_SIZE,
            snapshot_window: true,
            record_moves: true,
        }
    }
}

pub struct MacroRecorder {
    capture: Arc<dyn ScreenCapturer>,
    options: RecorderOptions,
    events: Vec<MacroEvent>,
    last_at: Duration,
}

impl MacroRecorder {
    /// Starts a recording. With `snapshot_window`, the foreground window's
    /// geometry becomes a leading `window_restore` event.
    pub fn start(
        capture: Arc<dyn ScreenCapturer>,
        windows: &dyn WindowManager,
        options: RecorderOptions,
    ) -> Self {
        let mut events = Vec::new();
        if options.snapshot_window {
            match windows.foreground_window() {
                Ok(Some(w)) if !w.title.is_empty() => {
                    tracing::debug!(title = %w.title, "foreground window captured");
                    events.push(MacroEvent::new(
                        RESTORE_EVENT_DELAY,
                        MacroAction::WindowRestore(WindowGeometrySnapshot {
                            title: w.title,
                            x: w.rect.x,
                            y: w.rect.y,
                            width: w.rect.width,
                            height: w.rect.height,
                        }),
                    ));
                }
                Ok(_) => tracing::debug!("no titled foreground window to snapshot"),
                Err(e) => tracing::warn!("window snapshot skipped: {e}"),
            }
        }
        Self {
            capture,
            options,
            events,
            last_at: Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn record(&mut self, input: RawInput) {
        let action = match input.kind {
            RawInputKind::Move { x, y } => {
                if !self.options.record_moves {
                    return;
                }
                MacroAction::MouseMove { x, y }
            }
            RawInputKind::Button { x, y, button, pressed } => {
                let anchor = if pressed && self.options.capture_anchors {
                    match self.capture_anchor(Point::new(x, y)) {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(x, y, "anchor capture failed: {e}");
                            None
                        }
                    }
                } else {
                    None
                };
                MacroAction::MouseClick(ClickAction {
                    x,
                    y,
                    button,
                    pressed,
                    anchor,
                })
            }
            RawInputKind::Scroll { x, y, dx, dy } => MacroAction::MouseScroll { x, y, dx, dy },
            RawInputKind::KeyDown { key } => MacroAction::KeyDown { key },
            RawInputKind::KeyUp { key } => MacroAction::KeyUp { key },
        };

        let delay = input.at.saturating_sub(self.last_at);
        self.last_at = self.last_at.max(input.at);
        self.events.push(MacroEvent::new(delay, action));
    }

    pub fn finish(self) -> MacroDocument {
        tracing::info!(events = self.events.len(), "recording finished");
        MacroDocument::new(self.events)
    }

    /// Grabs the square patch centred on `at`, clipped to the monitor under
    /// `at`. The offset points from the clipped patch's corner back to `at`.
    fn capture_anchor(&self, at: Point) -> ReplayResult<Option<AnchorSpec>> {
        let size = self.options.anchor_size.max(1);
        let pad = (size / 2) as i32;
        let captures = self.capture.capture_all()?;
        let geometry = ScreenGeometry::from_captures(&captures)?;
        let Some((monitor_id, lx, ly)) = geometry.to_local(at) else {
            return Ok(None);
        };
        let Some(capture) = captures.iter().find(|c| c.monitor.id == monitor_id) else {
            return Ok(None);
        };
        // Crop from the press's own monitor even when the patch spills over.
        let region = crop_region(
            std::slice::from_ref(capture),
            Rect::new(at.x - pad, at.y - pad, size, size),
        )?;
        let offset = (lx as i32 - region.local_x as i32, ly as i32 - region.local_y as i32);
        Ok(Some(AnchorSpec::from_image(&region.image, offset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackConfig;
    use crate::playback::{Player, PlaybackState};
    use crate::testing::{texture, FakeDesktop, Injected};

    fn at(ms: u64, kind: RawInputKind) -> RawInput {
        RawInput {
            at: Duration::from_millis(ms),
            kind,
        }
    }

    fn button(x: i32, y: i32, pressed: bool) -> RawInputKind {
        RawInputKind::Button {
            x,
            y,
            button: MouseButton::Left,
            pressed,
        }
    }

    fn desk_with_editor() -> (Arc<FakeDesktop>, image::RgbaImage) {
        let desk = Arc::new(FakeDesktop::new(320, 240));
        let content = texture(320, 240, 4, 3);
        desk.add_window_with_content(1, "Editor", Rect::new(0, 0, 320, 240), Some(content.clone()));
        (desk, content)
    }

    #[test]
    fn delays_are_gaps_between_inputs() {
        let (desk, _) = desk_with_editor();
        let mut rec = MacroRecorder::start(desk.clone(), desk.as_ref(), RecorderOptions::default());
        rec.record(at(120, RawInputKind::Move { x: 1, y: 2 }));
        rec.record(at(400, RawInputKind::KeyDown { key: "a".into() }));
        rec.record(at(450, RawInputKind::KeyUp { key: "a".into() }));
        let doc = rec.finish();

        let delays: Vec<_> = doc.events().iter().map(|e| e.delay.as_millis()).collect();
        assert_eq!(delays, vec![50, 120, 280, 50]);
        assert!(matches!(
            &doc.events()[0].action,
            MacroAction::WindowRestore(s) if s.title == "Editor" && s.width == 320
        ));
    }

    #[test]
    fn presses_carry_a_centred_anchor_and_releases_do_not() {
        let (desk, content) = desk_with_editor();
        let options = RecorderOptions {
            snapshot_window: false,
            ..RecorderOptions::default()
        };
        let mut rec = MacroRecorder::start(desk.clone(), desk.as_ref(), options);
        rec.record(at(10, button(100, 50, true)));
        rec.record(at(20, button(100, 50, false)));
        let doc = rec.finish();

        let anchor = doc.events()[0].anchor().unwrap();
        assert_eq!(anchor.offset, (35, 35));
        let expected = image::imageops::crop_imm(&content, 65, 15, 70, 70).to_image();
        assert_eq!(anchor.decode().unwrap(), expected);
        assert!(doc.events()[1].anchor().is_none());
    }

    #[test]
    fn anchors_near_the_edge_are_clipped_with_matching_offset() {
        let (desk, _) = desk_with_editor();
        let options = RecorderOptions {
            snapshot_window: false,
            ..RecorderOptions::default()
        };
        let mut rec = MacroRecorder::start(desk.clone(), desk.as_ref(), options);
        rec.record(at(0, button(10, 12, true)));
        let doc = rec.finish();
        let anchor = doc.events()[0].anchor().unwrap();
        assert_eq!(anchor.offset, (10, 12));
        assert_eq!(anchor.decode().unwrap().dimensions(), (45, 47));
    }

    #[test]
    fn capture_failure_records_the_press_without_anchor() {
        let (desk, _) = desk_with_editor();
        desk.set_capture_available(false);
        let mut rec = MacroRecorder::start(desk.clone(), desk.as_ref(), RecorderOptions::default());
        rec.record(at(5, button(30, 30, true)));
        rec.record(at(6, RawInputKind::Scroll { x: 1, y: 1, dx: 0, dy: -1 }));
        let doc = rec.finish();
        assert_eq!(doc.len(), 3);
        assert!(doc.events()[1].anchor().is_none());
    }

    #[tokio::test]
    async fn recorded_macro_replays_onto_the_same_spot() {
        let (desk, _) = desk_with_editor();
        let mut rec = MacroRecorder::start(desk.clone(), desk.as_ref(), RecorderOptions::default());
        rec.record(at(0, button(200, 100, true)));
        rec.record(at(30, button(200, 100, false)));
        let doc = rec.finish();

        let mut cfg = PlaybackConfig::default();
        cfg.match_options.scales = vec![1.0];
        let mut player = Player::new(desk.providers());
        let report = player.play(&doc, &cfg).await;
        assert_eq!(report.state, PlaybackState::Completed);
        assert_eq!(report.anchors_matched, 1);
        assert!(desk
            .injected()
            .contains(&Injected::Button(200, 100, MouseButton::Left, true)));
    }
}
