use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::model::WindowGeometrySnapshot;
use crate::perception::types::Rect;
use crate::playback::control::StopSignal;
use crate::window::traits::WindowManager;

const RESTORE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreOutcome {
    /// Whether the window was found and the recorded geometry requested.
    pub applied: bool,
    /// Geometry read back after the request, if any.
    pub actual: Option<Rect>,
    /// Why nothing was applied.
    pub reason: Option<String>,
}

impl RestoreOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            applied: false,
            actual: None,
            reason: Some(reason.into()),
        }
    }
}

/// Brings a recorded window back to its recorded position and size.
pub struct WindowRestorer {
    manager: Arc<dyn WindowManager>,
    poll: Duration,
}

impl WindowRestorer {
    pub fn new(manager: Arc<dyn WindowManager>) -> Self {
        Self {
            manager,
            poll: RESTORE_POLL,
        }
    }

    /// Waits up to `timeout` for a window matching the snapshot title, then
    /// applies the recorded geometry. Never fails the run; problems come
    /// back in the outcome.
    pub async fn restore(
        &self,
        snapshot: &WindowGeometrySnapshot,
        timeout: Duration,
        stop: &StopSignal,
    ) -> RestoreOutcome {
        if snapshot.title.is_empty() {
            return RestoreOutcome::failed("snapshot has no window title");
        }
        let deadline = Instant::now() + timeout;

        let target = loop {
            match self.manager.find_window(&snapshot.title) {
                Ok(Some(w)) => break w,
                Ok(None) => {}
                Err(e) if e.is_unavailable() => return RestoreOutcome::failed(e.to_string()),
                Err(e) => tracing::debug!("window lookup failed: {e}"),
            }
            let now = Instant::now();
            if now >= deadline {
                return RestoreOutcome::failed(format!(
                    "no window titled {:?} within {:?}",
                    snapshot.title, timeout
                ));
            }
            if !stop.sleep(self.poll.min(deadline - now)).await {
                return RestoreOutcome::failed("cancelled");
            }
        };

        let wanted = snapshot.rect();
        if let Err(e) = self.manager.set_geometry(target.handle, wanted) {
            return RestoreOutcome::failed(format!("move {:?}: {e}", target.title));
        }
        let actual = self.manager.geometry(target.handle).ok();
        if actual != Some(wanted) {
            tracing::debug!(title = %target.title, ?wanted, ?actual, "window geometry differs after restore");
        }
        tracing::info!(title = %target.title, "window restored");
        RestoreOutcome {
            applied: true,
            actual,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDesktop;
    use crate::window::traits::WindowHandle;

    fn snapshot(title: &str) -> WindowGeometrySnapshot {
        WindowGeometrySnapshot {
            title: title.into(),
            x: 10,
            y: 20,
            width: 640,
            height: 480,
        }
    }

    #[tokio::test]
    async fn moves_the_matching_window_and_reads_back() {
        let desk = Arc::new(FakeDesktop::new(800, 600));
        desk.add_window(7, "Untitled - Notepad", Rect::new(300, 200, 400, 300));
        let restorer = WindowRestorer::new(desk.clone());
        let out = restorer
            .restore(&snapshot("Notepad"), Duration::from_secs(1), &StopSignal::new())
            .await;
        assert!(out.applied);
        assert_eq!(out.actual, Some(Rect::new(10, 20, 640, 480)));
        assert_eq!(desk.window_rect(WindowHandle(7)), Some(Rect::new(10, 20, 640, 480)));
    }

    #[tokio::test]
    async fn missing_window_gives_up_at_the_timeout() {
        let desk = Arc::new(FakeDesktop::new(800, 600));
        let restorer = WindowRestorer::new(desk);
        let started = Instant::now();
        let out = restorer
            .restore(&snapshot("Notepad"), Duration::from_millis(250), &StopSignal::new())
            .await;
        assert!(!out.applied);
        assert!(out.reason.is_some());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(250) + RESTORE_POLL + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn window_appearing_late_is_still_restored() {
        let desk = Arc::new(FakeDesktop::new(800, 600));
        let later = desk.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            later.add_window(3, "Notepad", Rect::new(0, 0, 100, 100));
        });
        let out = WindowRestorer::new(desk)
            .restore(&snapshot("Notepad"), Duration::from_secs(3), &StopSignal::new())
            .await;
        assert!(out.applied);
    }

    #[tokio::test]
    async fn empty_title_is_not_restored() {
        let desk = Arc::new(FakeDesktop::new(800, 600));
        desk.add_window(1, "", Rect::new(0, 0, 100, 100));
        let out = WindowRestorer::new(desk)
            .restore(&snapshot(""), Duration::from_secs(1), &StopSignal::new())
            .await;
        assert!(!out.applied);
    }
}
