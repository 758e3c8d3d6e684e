use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ReplayError, ReplayResult};
use crate::perception::matcher::{
    MatchOptions, DEFAULT_MAX_SEARCH_OPS, DEFAULT_SCALES, DEFAULT_THRESHOLD,
};

pub const CONFIG_FILE_NAME: &str = "anchorplay.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub playback: PlaybackSection,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Search every monitor, not only the primary one.
    #[serde(default = "default_true")]
    pub search_all_monitors: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_scales")]
    pub scales: Vec<f32>,
    /// Correlation multiply-adds per (monitor, scale) pair before the
    /// matcher switches to coarse-to-fine search.
    #[serde(default = "default_max_search_ops")]
    pub max_search_ops: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_all_monitors: true,
            threshold: DEFAULT_THRESHOLD,
            scales: DEFAULT_SCALES.to_vec(),
            max_search_ops: DEFAULT_MAX_SEARCH_OPS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSection {
    /// Delays are divided by `max(0.1, speed)`.
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_true")]
    pub restore_windows: bool,
    #[serde(default = "default_restore_timeout_ms")]
    pub restore_timeout_ms: u64,
    /// Turn a failed step into a failed run instead of a warning.
    #[serde(default)]
    pub step_failures_fatal: bool,
    /// Turn a wait_for_image timeout into a failed run.
    #[serde(default)]
    pub wait_for_image_fatal: bool,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            repeat: default_repeat(),
            poll_interval_ms: default_poll_interval_ms(),
            restore_windows: true,
            restore_timeout_ms: default_restore_timeout_ms(),
            step_failures_fatal: false,
            wait_for_image_fatal: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where screenshot steps write their PNGs. Defaults to the working directory.
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
    #[serde(default)]
    pub run_log: bool,
    /// Defaults to the user data directory.
    #[serde(default)]
    pub run_log_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_scales() -> Vec<f32> {
    DEFAULT_SCALES.to_vec()
}

fn default_max_search_ops() -> u64 {
    DEFAULT_MAX_SEARCH_OPS
}

fn default_speed() -> f64 {
    1.0
}

fn default_repeat() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_restore_timeout_ms() -> u64 {
    3000
}

impl AppConfig {
    pub fn validate(&self) -> ReplayResult<()> {
        let m = &self.matching;
        if !(0.0..1.0).contains(&m.threshold) {
            return Err(ReplayError::Config(format!(
                "matching.threshold must be in [0, 1), got {}",
                m.threshold
            )));
        }
        if m.scales.is_empty() {
            return Err(ReplayError::Config("matching.scales is empty".into()));
        }
        if let Some(bad) = m.scales.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(ReplayError::Config(format!(
                "matching.scales must be positive, got {bad}"
            )));
        }
        let p = &self.playback;
        if p.poll_interval_ms == 0 {
            return Err(ReplayError::Config("playback.poll_interval_ms must be > 0".into()));
        }
        if !p.speed.is_finite() || p.speed <= 0.0 {
            return Err(ReplayError::Config(format!(
                "playback.speed must be positive, got {}",
                p.speed
            )));
        }
        Ok(())
    }

    /// Freezes the settings one run needs.
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            matching_enabled: self.matching.enabled,
            search_all_monitors: self.matching.search_all_monitors,
            match_options: MatchOptions {
                scales: self.matching.scales.clone(),
                threshold: self.matching.threshold,
                max_search_ops: self.matching.max_search_ops,
            },
            speed: self.playback.speed,
            repeat: self.playback.repeat,
            poll_interval: Duration::from_millis(self.playback.poll_interval_ms),
            restore_windows: self.playback.restore_windows,
            restore_timeout: Duration::from_millis(self.playback.restore_timeout_ms),
            step_failures_fatal: self.playback.step_failures_fatal,
            wait_for_image_fatal: self.playback.wait_for_image_fatal,
            screenshot_dir: self
                .output
                .screenshot_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Immutable settings for one playback run.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub matching_enabled: bool,
    pub search_all_monitors: bool,
    pub match_options: MatchOptions,
    pub speed: f64,
    pub repeat: u32,
    pub poll_interval: Duration,
    pub restore_windows: bool,
    pub restore_timeout: Duration,
    pub step_failures_fatal: bool,
    pub wait_for_image_fatal: bool,
    pub screenshot_dir: PathBuf,
}

impl PlaybackConfig {
    /// A recorded delay adjusted for playback speed.
    pub fn scaled_delay(&self, delay: Duration) -> Duration {
        delay.div_f64(self.speed.max(0.1))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        AppConfig::default().playback_config()
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> ReplayResult<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ReplayError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE_NAME);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("anchorplay").join(CONFIG_FILE_NAME);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

pub fn load_config(explicit: Option<&Path>) -> ReplayResult<AppConfig> {
    let Some(path) = resolve_config_path(explicit)? else {
        tracing::debug!("no {CONFIG_FILE_NAME} found; using defaults");
        return Ok(AppConfig::default());
    };
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> ReplayResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> ReplayResult<()> {
    config.validate()?;
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
