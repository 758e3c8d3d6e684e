use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Cooperative stop request shared between a running player and whoever
/// controls it. Cloning yields another handle to the same flag.
#[derive(Clone, Debug)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Clears a previous request so the flag can guard a new run.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Sleeps for `duration` unless a stop arrives first.
    /// Returns `false` when the sleep was interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        let mut rx = self.tx.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_stopped(),
            _ = rx.wait_for(|stopped| *stopped) => false,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn sleep_runs_to_completion_without_a_stop() {
        let stop = StopSignal::new();
        let started = Instant::now();
        assert!(stop.sleep(Duration::from_millis(30)).await);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn stop_interrupts_a_long_sleep_promptly() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.stop();
        });
        let started = Instant::now();
        assert!(!stop.sleep(Duration::from_secs(10)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn stopped_flag_short_circuits_and_resets() {
        let stop = StopSignal::new();
        stop.stop();
        assert!(!stop.sleep(Duration::from_secs(10)).await);
        assert!(stop.is_stopped());
        stop.reset();
        assert!(!stop.is_stopped());
        assert!(stop.sleep(Duration::ZERO).await);
    }
}
