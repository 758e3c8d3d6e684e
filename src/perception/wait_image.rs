use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::errors::{ReplayError, ReplayResult};
use crate::perception::geometry::ScreenGeometry;
use crate::perception::matcher::{self, MatchOptions};
use crate::perception::traits::ScreenCapturer;
use crate::perception::types::MatchResult;
use crate::playback::control::StopSignal;

/// Result of polling the screen for an image.
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    /// The accepted match, if one appeared before the deadline.
    pub found: Option<MatchResult>,
    /// Best score seen across all attempts.
    pub best_score: f32,
    pub attempts: u32,
    pub elapsed: Duration,
    pub cancelled: bool,
}

/// Captures the live screen and looks for `patch` on it.
///
/// Capture and matching are CPU-bound and run on the blocking pool.
/// With `all_monitors == false` only the primary monitor is searched.
pub async fn locate_on_screen(
    capturer: Arc<dyn ScreenCapturer>,
    patch: Arc<RgbaImage>,
    offset: (i32, i32),
    options: MatchOptions,
    all_monitors: bool,
) -> ReplayResult<MatchResult> {
    tokio::task::spawn_blocking(move || {
        let mut captures = capturer.capture_all()?;
        if !all_monitors {
            captures.truncate(1);
        }
        // Matches are reported in global coordinates, which needs a
        // consistent monitor layout.
        ScreenGeometry::from_captures(&captures)?;
        Ok(matcher::locate(&patch, offset, &captures, &options))
    })
    .await
    .map_err(|e| ReplayError::Provider(format!("match task: {e}")))?
}

/// Repeats `attempt` until it reports a match, `timeout` elapses, or `stop`
/// fires. The first attempt runs immediately; the last sleep is shortened so
/// that no attempt starts after the deadline. Transient attempt errors are
/// logged and polling continues; an unavailable provider aborts the wait.
pub async fn wait_for_image<F, Fut>(
    mut attempt: F,
    timeout: Duration,
    poll: Duration,
    stop: &StopSignal,
) -> ReplayResult<WaitOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ReplayResult<MatchResult>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let poll = poll.max(Duration::from_millis(1));
    let mut attempts = 0u32;
    let mut best_score = 0.0f32;

    let outcome = |found, best_score, attempts, cancelled| WaitOutcome {
        found,
        best_score,
        attempts,
        elapsed: started.elapsed(),
        cancelled,
    };

    loop {
        if stop.is_stopped() {
            return Ok(outcome(None, best_score, attempts, true));
        }
        attempts += 1;
        match attempt().await {
            Ok(result) if result.found => {
                tracing::debug!(attempts, score = result.score, "image appeared");
                let score = result.score.max(best_score);
                return Ok(outcome(Some(result), score, attempts, false));
            }
            Ok(result) => best_score = best_score.max(result.score),
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => tracing::warn!(attempts, "wait_for_image attempt failed: {e}"),
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if !stop.sleep(poll.min(deadline - now)).await {
            return Ok(outcome(None, best_score, attempts, true));
        }
    }

    tracing::info!(attempts, best_score, "image did not appear within {:?}", timeout);
    Ok(outcome(None, best_score, attempts, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::Point;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn miss(score: f32) -> MatchResult {
        MatchResult {
            score,
            ..MatchResult::not_found()
        }
    }

    fn hit() -> MatchResult {
        MatchResult {
            found: true,
            global_point: Point::new(5, 6),
            score: 0.97,
            scale: 1.0,
            monitor_id: Some(0),
        }
    }

    #[tokio::test]
    async fn timeout_is_respected_within_one_poll_interval() {
        let stop = StopSignal::new();
        let timeout = Duration::from_millis(300);
        let poll = Duration::from_millis(100);
        let started = Instant::now();
        let out = wait_for_image(|| async { Ok(miss(0.4)) }, timeout, poll, &stop)
            .await
            .unwrap();
        let elapsed = started.elapsed();
        assert!(out.found.is_none());
        assert!(!out.cancelled);
        assert!(elapsed >= timeout, "{elapsed:?}");
        assert!(elapsed <= timeout + poll + Duration::from_millis(150), "{elapsed:?}");
        assert!(out.attempts >= 3);
        assert!((out.best_score - 0.4).abs() < 1e-6);
    }

    #[tokio::test]
    async fn returns_as_soon_as_the_image_appears() {
        let stop = StopSignal::new();
        let calls = AtomicU32::new(0);
        let out = wait_for_image(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(if n >= 2 { hit() } else { miss(0.1) }) }
            },
            Duration::from_secs(10),
            Duration::from_millis(10),
            &stop,
        )
        .await
        .unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(out.found.unwrap().global_point, Point::new(5, 6));
        assert!(out.elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn zero_timeout_makes_exactly_one_attempt() {
        let stop = StopSignal::new();
        let out = wait_for_image(
            || async { Ok(miss(0.0)) },
            Duration::ZERO,
            Duration::from_millis(200),
            &stop,
        )
        .await
        .unwrap();
        assert_eq!(out.attempts, 1);
        assert!(out.elapsed < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn stop_cancels_the_wait() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            remote.stop();
        });
        let out = wait_for_image(
            || async { Ok(miss(0.2)) },
            Duration::from_secs(30),
            Duration::from_millis(500),
            &stop,
        )
        .await
        .unwrap();
        assert!(out.cancelled);
        assert!(out.elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unavailable_capture_aborts_but_transient_errors_do_not() {
        let stop = StopSignal::new();
        let err = wait_for_image(
            || async { Err(ReplayError::ProviderUnavailable("screen".into())) },
            Duration::from_secs(5),
            Duration::from_millis(10),
            &stop,
        )
        .await
        .unwrap_err();
        assert!(err.is_unavailable());

        let calls = AtomicU32::new(0);
        let out = wait_for_image(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ReplayError::Provider("flaky".into()))
                    } else {
                        Ok(hit())
                    }
                }
            },
            Duration::from_secs(5),
            Duration::from_millis(10),
            &stop,
        )
        .await
        .unwrap();
        assert!(out.found.is_some());
        assert_eq!(out.attempts, 2);
    }
}
