use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::PlaybackConfig;
use crate::errors::{ReplayError, ReplayResult};
use crate::executor::dispatcher::{self, Providers};
use crate::model::anchor::decode_png_b64;
use crate::model::{ClickAction, MacroAction, MacroDocument, MacroEvent};
use crate::perception::types::{Point, Rect};
use crate::perception::wait_image::{locate_on_screen, wait_for_image};
use crate::playback::control::StopSignal;
use crate::playback::event_bus::{EventBus, PlaybackMessage};
use crate::playback::history::RunLog;
use crate::playback::state::{PlaybackReport, PlaybackState, Resolution, StepOutcome};
use crate::window::restore::WindowRestorer;

/// Per-run mutable bookkeeping.
struct Run {
    report: PlaybackReport,
    /// Provider errors already reported during this run.
    unavailable: HashSet<String>,
    /// Displacement applied to the last press, carried to moves and the
    /// release until the button comes back up.
    drag_shift: Option<(i32, i32)>,
    log: Option<RunLog>,
}

impl Run {
    fn shifted(&self, x: i32, y: i32) -> Point {
        let (dx, dy) = self.drag_shift.unwrap_or((0, 0));
        Point::new(x + dx, y + dy)
    }
}

/// Replays macro documents against one set of providers. Runs are
/// sequential: `play` borrows the player mutably for its whole duration.
pub struct Player {
    providers: Providers,
    restorer: WindowRestorer,
    stop: StopSignal,
    bus: EventBus,
    state: PlaybackState,
    run_log_dir: Option<PathBuf>,
}

impl Player {
    pub fn new(providers: Providers) -> Self {
        let restorer = WindowRestorer::new(providers.windows.clone());
        Self {
            providers,
            restorer,
            stop: StopSignal::new(),
            bus: EventBus::new(),
            state: PlaybackState::Idle,
            run_log_dir: None,
        }
    }

    /// Also write every progress message of each run to a JSONL file in `dir`.
    pub fn with_run_log(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_log_dir = Some(dir.into());
        self
    }

    /// Handle for stopping a run from another task.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackMessage> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Plays `document` from the first event to the last, `config.repeat`
    /// times. Step failures become warnings unless the config makes them
    /// fatal; the final state is in the returned report.
    pub async fn play(&mut self, document: &MacroDocument, config: &PlaybackConfig) -> PlaybackReport {
        self.stop.reset();
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let log = self.run_log_dir.as_deref().and_then(|dir| match RunLog::new(&run_id, dir) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "run log disabled: {e}");
                None
            }
        });
        let mut run = Run {
            report: PlaybackReport::new(run_id.clone()),
            unavailable: HashSet::new(),
            drag_shift: None,
            log,
        };

        self.set_state(PlaybackState::Running, &run);
        tracing::info!(
            run_id = %run_id,
            events = document.len(),
            repeat = config.repeat,
            speed = config.speed,
            "playback started"
        );

        let final_state = self.run_passes(document, config, &mut run).await;

        run.report.elapsed_ms = started.elapsed().as_millis() as u64;
        run.report.state = final_state.clone();
        self.set_state(final_state, &run);
        tracing::info!(
            run_id = %run_id,
            steps = run.report.steps_executed,
            matched = run.report.anchors_matched,
            fallbacks = run.report.anchor_fallbacks,
            warnings = run.report.warnings.len(),
            state = ?run.report.state,
            "playback finished"
        );
        run.report
    }

    async fn run_passes(
        &self,
        document: &MacroDocument,
        config: &PlaybackConfig,
        run: &mut Run,
    ) -> PlaybackState {
        for pass in 0..config.repeat.max(1) {
            run.drag_shift = None;
            for (index, event) in document.events().iter().enumerate() {
                if !self.stop.sleep(config.scaled_delay(event.delay)).await {
                    tracing::info!(index, "playback stopped");
                    return PlaybackState::Stopped;
                }

                let kind = event.kind().as_str();
                self.emit(
                    run,
                    PlaybackMessage::StepStarted {
                        pass,
                        index,
                        kind: kind.to_string(),
                    },
                );

                match self.execute(index, event, config, run).await {
                    Ok(outcome) => {
                        let timed_out = matches!(outcome, StepOutcome::ImageTimedOut { .. });
                        run.report.record(index, &outcome);
                        self.emit(run, PlaybackMessage::StepFinished { pass, index, outcome });
                        if timed_out {
                            if config.wait_for_image_fatal {
                                return PlaybackState::Failed {
                                    reason: format!("step {index}: image did not appear"),
                                };
                            }
                            self.warn(run, index, kind, "image did not appear; step skipped");
                        }
                    }
                    Err(ReplayError::Cancelled) => {
                        tracing::info!(index, "playback stopped");
                        return PlaybackState::Stopped;
                    }
                    Err(e) => {
                        self.step_failed(run, index, kind, &e);
                        if config.step_failures_fatal {
                            return PlaybackState::Failed {
                                reason: format!("step {index} ({kind}): {e}"),
                            };
                        }
                    }
                }
            }
        }

        if self.stop.is_stopped() {
            PlaybackState::Stopped
        } else {
            PlaybackState::Completed
        }
    }

    async fn execute(
        &self,
        index: usize,
        event: &MacroEvent,
        config: &PlaybackConfig,
        run: &mut Run,
    ) -> ReplayResult<StepOutcome> {
        let input = self.providers.input.as_ref();
        match &event.action {
            MacroAction::MouseMove { x, y } => {
                let p = run.shifted(*x, *y);
                input.move_to(p.x, p.y)?;
                Ok(StepOutcome::Done)
            }
            MacroAction::MouseClick(click) => self.click(index, click, config, run).await,
            MacroAction::MouseScroll { x, y, dx, dy } => {
                dispatcher::scroll_at(input, Point::new(*x, *y), *dx, *dy)?;
                Ok(StepOutcome::Done)
            }
            MacroAction::KeyDown { key } => dispatcher::key_event(input, key, true),
            MacroAction::KeyUp { key } => dispatcher::key_event(input, key, false),
            MacroAction::Text { text } => {
                input.type_text(text)?;
                Ok(StepOutcome::Done)
            }
            MacroAction::Wait => Ok(StepOutcome::Done),
            MacroAction::OpenUrl { url } => {
                input.open_url(url)?;
                Ok(StepOutcome::Done)
            }
            MacroAction::Screenshot { image_b64 } => {
                let path = save_screenshot(image_b64, &config.screenshot_dir)?;
                tracing::info!(path = %path.display(), "screenshot saved");
                Ok(StepOutcome::Screenshot { path })
            }
            MacroAction::OcrRegion { region } => {
                let text = self.ocr(*region).await?;
                tracing::info!(index, chars = text.chars().count(), "OCR: {text}");
                let copied = match self.providers.clipboard.set_text(&text) {
                    Ok(()) => true,
                    Err(e) => {
                        self.step_failed(run, index, event.kind().as_str(), &e);
                        false
                    }
                };
                Ok(StepOutcome::Ocr { text, copied })
            }
            MacroAction::WaitForImage { anchor_b64, timeout } => {
                let patch = Arc::new(decode_png_b64(anchor_b64)?);
                let centre = (patch.width() as i32 / 2, patch.height() as i32 / 2);
                let capture = self.providers.capture.clone();
                let options = config.match_options.clone();
                let all = config.search_all_monitors;
                let waited = wait_for_image(
                    || locate_on_screen(capture.clone(), patch.clone(), centre, options.clone(), all),
                    *timeout,
                    config.poll_interval,
                    &self.stop,
                )
                .await?;
                let elapsed_ms = waited.elapsed.as_millis() as u64;
                if waited.cancelled {
                    return Err(ReplayError::Cancelled);
                }
                Ok(match waited.found {
                    Some(result) => StepOutcome::ImageFound { result, elapsed_ms },
                    None => StepOutcome::ImageTimedOut {
                        best_score: waited.best_score,
                        elapsed_ms,
                    },
                })
            }
            MacroAction::WindowRestore(snapshot) => {
                if !config.restore_windows {
                    return Ok(StepOutcome::Skipped {
                        reason: "window restore disabled".into(),
                    });
                }
                let outcome = self
                    .restorer
                    .restore(snapshot, config.restore_timeout, &self.stop)
                    .await;
                if !outcome.applied {
                    if self.stop.is_stopped() {
                        return Err(ReplayError::Cancelled);
                    }
                    let reason = outcome.reason.clone().unwrap_or_default();
                    let err = ReplayError::RestoreFailed(reason);
                    self.warn(run, index, "window_restore", &format!("{err}; coordinates may be stale"));
                }
                Ok(StepOutcome::Restored(outcome))
            }
        }
    }

    async fn click(
        &self,
        index: usize,
        click: &ClickAction,
        config: &PlaybackConfig,
        run: &mut Run,
    ) -> ReplayResult<StepOutcome> {
        let input = self.providers.input.as_ref();
        if !click.pressed {
            let point = run.shifted(click.x, click.y);
            run.drag_shift = None;
            dispatcher::pointer_button(input, point, click.button, false)?;
            return Ok(StepOutcome::Pointer {
                point,
                resolution: Resolution::Recorded,
            });
        }

        let (point, resolution) = self.resolve_press(index, click, config, run).await;
        dispatcher::pointer_button(input, point, click.button, true)?;
        run.drag_shift = Some((point.x - click.x, point.y - click.y));
        Ok(StepOutcome::Pointer { point, resolution })
    }

    /// Where a press should land: the matched anchor when one is found,
    /// the recorded position otherwise.
    async fn resolve_press(
        &self,
        index: usize,
        click: &ClickAction,
        config: &PlaybackConfig,
        run: &mut Run,
    ) -> (Point, Resolution) {
        let recorded = Point::new(click.x, click.y);
        let anchor = match &click.anchor {
            Some(anchor) if config.matching_enabled => anchor,
            _ => return (recorded, Resolution::Recorded),
        };
        let patch = match anchor.decode() {
            Ok(p) => Arc::new(p),
            Err(e) => {
                self.warn(run, index, "mouse_click", &format!("anchor unreadable: {e}"));
                return (recorded, Resolution::Fallback { best_score: 0.0 });
            }
        };

        match locate_on_screen(
            self.providers.capture.clone(),
            patch,
            anchor.offset,
            config.match_options.clone(),
            config.search_all_monitors,
        )
        .await
        {
            Ok(m) if m.found => {
                tracing::info!(
                    index,
                    x = m.global_point.x,
                    y = m.global_point.y,
                    score = m.score,
                    scale = m.scale,
                    "anchor matched"
                );
                (
                    m.global_point,
                    Resolution::Matched {
                        score: m.score,
                        scale: m.scale,
                        monitor_id: m.monitor_id,
                    },
                )
            }
            Ok(m) => {
                tracing::warn!(
                    index,
                    best = m.score,
                    x = recorded.x,
                    y = recorded.y,
                    "anchor not found; using recorded position"
                );
                (recorded, Resolution::Fallback { best_score: m.score })
            }
            Err(e) => {
                self.step_failed(run, index, "mouse_click", &e);
                (recorded, Resolution::Fallback { best_score: 0.0 })
            }
        }
    }

    async fn ocr(&self, region: Rect) -> ReplayResult<String> {
        let capture = self.providers.capture.clone();
        let pixels = tokio::task::spawn_blocking(move || capture.capture_region(region))
            .await
            .map_err(|e| ReplayError::Provider(format!("capture task: {e}")))??;
        self.providers.ocr.recognize(&pixels).await
    }

    /// Records a step failure. Unavailable providers are reported once per run.
    fn step_failed(&self, run: &mut Run, index: usize, kind: &str, err: &ReplayError) {
        if err.is_unavailable() {
            if !run.unavailable.insert(err.to_string()) {
                tracing::debug!(index, kind, "step skipped: {err}");
                return;
            }
            tracing::warn!(index, kind, "{err}; affected steps will be skipped");
        } else {
            tracing::warn!(index, kind, "step failed: {err}");
        }
        run.report.warn(index, kind, err.to_string());
        self.emit(
            run,
            PlaybackMessage::Warning {
                index,
                message: err.to_string(),
            },
        );
    }

    fn warn(&self, run: &mut Run, index: usize, kind: &str, message: &str) {
        tracing::warn!(index, kind, "{message}");
        run.report.warn(index, kind, message);
        self.emit(
            run,
            PlaybackMessage::Warning {
                index,
                message: message.to_string(),
            },
        );
    }

    fn set_state(&mut self, state: PlaybackState, run: &Run) {
        self.state = state.clone();
        self.emit(run, PlaybackMessage::StateChanged { state });
    }

    fn emit(&self, run: &Run, msg: PlaybackMessage) {
        if let Some(log) = &run.log {
            if let Err(e) = log.append(&msg) {
                tracing::debug!("run log append failed: {e}");
            }
        }
        self.bus.send(msg);
    }
}

/// Writes a recorded screenshot as `screenshot_<unix>[_n].png` in `dir`.
fn save_screenshot(image_b64: &str, dir: &Path) -> ReplayResult<PathBuf> {
    let image = decode_png_b64(image_b64)?;
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Utc::now().timestamp();
    let mut path = dir.join(format!("screenshot_{stamp}.png"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("screenshot_{stamp}_{n}.png"));
        n += 1;
    }
    image.save_with_format(&path, image::ImageFormat::Png)?;
    Ok(path)
}
