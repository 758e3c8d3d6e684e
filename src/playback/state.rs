/// Lifecycle and bookkeeping of one playback run.
use std::path::PathBuf;

use serde::Serialize;

use crate::perception::types::{MatchResult, Point};
use crate::window::restore::RestoreOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Running,
    Stopped,
    Completed,
    Failed { reason: String },
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackState::Stopped | PlaybackState::Completed | PlaybackState::Failed { .. }
        )
    }
}

/// How a pointer target was resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Resolution {
    /// No anchor, or matching disabled.
    Recorded,
    Matched { score: f32, scale: f32, monitor_id: Option<u32> },
    /// An anchor was searched for but not accepted.
    Fallback { best_score: f32 },
}

/// What a single step did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    Pointer { point: Point, resolution: Resolution },
    ImageFound { result: MatchResult, elapsed_ms: u64 },
    ImageTimedOut { best_score: f32, elapsed_ms: u64 },
    Restored(RestoreOutcome),
    Screenshot { path: PathBuf },
    /// `copied` is false when the clipboard could not take the text.
    Ocr { text: String, copied: bool },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepWarning {
    pub index: usize,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrText {
    pub index: usize,
    pub text: String,
    pub copied: bool,
}

/// Summary handed back when a run ends.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackReport {
    pub run_id: String,
    pub state: PlaybackState,
    pub steps_executed: usize,
    pub anchors_matched: usize,
    pub anchor_fallbacks: usize,
    pub warnings: Vec<StepWarning>,
    pub ocr: Vec<OcrText>,
    pub elapsed_ms: u64,
}

impl PlaybackReport {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            state: PlaybackState::Idle,
            steps_executed: 0,
            anchors_matched: 0,
            anchor_fallbacks: 0,
            warnings: Vec::new(),
            ocr: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn record(&mut self, index: usize, outcome: &StepOutcome) {
        self.steps_executed += 1;
        match outcome {
            StepOutcome::Pointer { resolution: Resolution::Matched { .. }, .. } => {
                self.anchors_matched += 1
            }
            StepOutcome::Pointer { resolution: Resolution::Fallback { .. }, .. } => {
                self.anchor_fallbacks += 1
            }
            StepOutcome::Ocr { text, copied } => self.ocr.push(OcrText {
                index,
                text: text.clone(),
                copied: *copied,
            }),
            _ => {}
        }
    }

    pub fn warn(&mut self, index: usize, kind: &str, message: impl Into<String>) {
        self.warnings.push(StepWarning {
            index,
            kind: kind.to_string(),
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_resolutions_and_ocr() {
        let mut report = PlaybackReport::new("r".into());
        let matched = StepOutcome::Pointer {
            point: Point::new(1, 1),
            resolution: Resolution::Matched { score: 0.95, scale: 1.0, monitor_id: Some(0) },
        };
        let fallback = StepOutcome::Pointer {
            point: Point::new(1, 1),
            resolution: Resolution::Fallback { best_score: 0.3 },
        };
        report.record(0, &matched);
        report.record(1, &fallback);
        report.record(2, &StepOutcome::Ocr { text: "hello".into(), copied: true });
        report.warn(3, "key_down", "unmapped key");
        assert_eq!(report.steps_executed, 3);
        assert_eq!((report.anchors_matched, report.anchor_fallbacks), (1, 1));
        assert_eq!(report.ocr, vec![OcrText { index: 2, text: "hello".into(), copied: true }]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn states_serialize_tagged() {
        let json = serde_json::to_string(&PlaybackState::Failed { reason: "x".into() }).unwrap();
        assert_eq!(json, r#"{"state":"failed","reason":"x"}"#);
        assert!(PlaybackState::Stopped.is_terminal());
        assert!(!PlaybackState::Running.is_terminal());
    }
}
