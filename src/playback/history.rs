use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::ReplayResult;
use crate::playback::event_bus::PlaybackMessage;

#[derive(Debug, Clone, Serialize)]
pub struct RunLogEntry<'a> {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub run_id: &'a str,
    #[serde(flatten)]
    pub message: &'a PlaybackMessage,
}

/// Append-only JSONL record of one playback run.
pub struct RunLog {
    pub run_id: String,
    file_path: PathBuf,
}

impl RunLog {
    pub fn new(run_id: &str, dir: &Path) -> ReplayResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            run_id: run_id.to_string(),
            file_path: dir.join(format!("run_{run_id}.jsonl")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn append(&self, message: &PlaybackMessage) -> ReplayResult<()> {
        let entry = RunLogEntry {
            ts: chrono::Utc::now(),
            run_id: &self.run_id,
            message,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// `<data dir>/anchorplay/runs`, falling back to the working directory.
pub fn default_run_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("anchorplay").join("runs"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::state::PlaybackState;

    #[test]
    fn appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new("abc", dir.path()).unwrap();
        log.append(&PlaybackMessage::StateChanged { state: PlaybackState::Running }).unwrap();
        log.append(&PlaybackMessage::Warning { index: 2, message: "slow".into() }).unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["run_id"], "abc");
        assert_eq!(lines[0]["type"], "state_changed");
        assert_eq!(lines[1]["message"], "slow");
        assert!(lines[1]["ts"].is_string());
    }
}
