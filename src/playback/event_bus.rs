use serde::Serialize;
use tokio::sync::broadcast;

use crate::playback::state::{PlaybackState, StepOutcome};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackMessage {
    StateChanged {
        state: PlaybackState,
    },
    StepStarted {
        pass: u32,
        index: usize,
        kind: String,
    },
    StepFinished {
        pass: u32,
        index: usize,
        outcome: StepOutcome,
    },
    Warning {
        index: usize,
        message: String,
    },
}

/// Fan-out of playback progress to any number of observers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlaybackMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackMessage> {
        self.tx.subscribe()
    }

    /// Publishes `msg`; having no subscribers is not an error.
    pub fn send(&self, msg: PlaybackMessage) {
        let _ = self.tx.send(msg);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_messages_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.send(PlaybackMessage::StateChanged { state: PlaybackState::Running });
        bus.send(PlaybackMessage::StepStarted { pass: 0, index: 0, kind: "wait".into() });
        assert!(matches!(
            rx.recv().await.unwrap(),
            PlaybackMessage::StateChanged { state: PlaybackState::Running }
        ));
        assert!(matches!(rx.recv().await.unwrap(), PlaybackMessage::StepStarted { index: 0, .. }));
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        EventBus::new().send(PlaybackMessage::Warning { index: 0, message: "x".into() });
    }
}
