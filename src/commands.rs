use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::config::{self, AppConfig};
use crate::errors::ReplayResult;
use crate::executor::Providers;
use crate::model::document::SkippedRecord;
use crate::model::MacroDocument;
use crate::perception::matcher::MatchOptions;
use crate::perception::traits::ScreenCapturer;
use crate::perception::types::MatchResult;
use crate::perception::wait_image::locate_on_screen;
use crate::playback::event_bus::PlaybackMessage;
use crate::playback::history::default_run_log_dir;
use crate::playback::{PlaybackReport, PlaybackState, Player};

#[derive(Parser, Debug)]
#[command(name = "anchorplay")]
#[command(about = "Replay recorded desktop macros, relocating clicks by visual anchors")]
#[command(version)]
pub struct Cli {
    /// Config file (default: anchorplay.toml next to the binary, in the
    /// working directory, or in the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a macro file
    Play(PlayArgs),
    /// Validate a macro file and print a summary
    Check { file: PathBuf },
    /// Search the live screen for an image
    Locate(LocateArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PlayArgs {
    pub file: PathBuf,
    #[arg(long)]
    pub speed: Option<f64>,
    #[arg(long)]
    pub repeat: Option<u32>,
    #[arg(long)]
    pub threshold: Option<f32>,
    /// Click recorded coordinates, ignoring anchors
    #[arg(long)]
    pub no_match: bool,
    /// Search the primary monitor only
    #[arg(long)]
    pub primary_only: bool,
    /// Skip window_restore steps
    #[arg(long)]
    pub no_restore: bool,
    /// Stop the run at the first failing step
    #[arg(long)]
    pub fail_fast: bool,
    /// Write a JSONL run log
    #[arg(long)]
    pub run_log: bool,
}

impl PlayArgs {
    /// Folds command-line overrides into `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(speed) = self.speed {
            config.playback.speed = speed;
        }
        if let Some(repeat) = self.repeat {
            config.playback.repeat = repeat;
        }
        if let Some(threshold) = self.threshold {
            config.matching.threshold = threshold;
        }
        if self.no_match {
            config.matching.enabled = false;
        }
        if self.primary_only {
            config.matching.search_all_monitors = false;
        }
        if self.no_restore {
            config.playback.restore_windows = false;
        }
        if self.fail_fast {
            config.playback.step_failures_fatal = true;
            config.playback.wait_for_image_fatal = true;
        }
        if self.run_log {
            config.output.run_log = true;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LocateArgs {
    /// PNG (or any supported image) to look for
    pub image: PathBuf,
    /// Point inside the image to report, as X,Y from its top-left
    #[arg(long, value_parser = parse_offset, default_value = "0,0")]
    pub offset: (i32, i32),
    #[arg(long)]
    pub threshold: Option<f32>,
}

fn parse_offset(s: &str) -> Result<(i32, i32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let x = x.trim().parse().map_err(|e| format!("bad X: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad Y: {e}"))?;
    Ok((x, y))
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub events: usize,
    pub duration_ms: u64,
    pub anchored_clicks: usize,
    pub kinds: BTreeMap<&'static str, usize>,
    pub skipped: Vec<SkippedRecord>,
}

pub fn check(path: &Path) -> ReplayResult<DocumentSummary> {
    let loaded = MacroDocument::load(path)?;
    let doc = &loaded.document;
    let mut kinds = BTreeMap::new();
    for event in doc.events() {
        *kinds.entry(event.kind().as_str()).or_insert(0) += 1;
    }
    Ok(DocumentSummary {
        events: doc.len(),
        duration_ms: doc.duration().as_millis() as u64,
        anchored_clicks: doc.events().iter().filter(|e| e.anchor().is_some()).count(),
        kinds,
        skipped: loaded.skipped,
    })
}

/// Loads and plays a macro. Ctrl-C stops the run at the next safe point.
pub async fn play(args: &PlayArgs, mut config: AppConfig, providers: Providers) -> ReplayResult<PlaybackReport> {
    args.apply(&mut config);
    config.validate()?;
    let loaded = MacroDocument::load(&args.file)?;
    let document = loaded.document;
    let total = document.len();
    let run_config = config.playback_config();

    let mut player = Player::new(providers);
    if config.output.run_log {
        let dir = config
            .output
            .run_log_dir
            .clone()
            .unwrap_or_else(default_run_log_dir);
        player = player.with_run_log(dir);
    }

    let mut rx = player.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PlaybackMessage::StepStarted { pass, index, kind }) => {
                    eprintln!("[pass {} {}/{}] {}", pass + 1, index + 1, total, kind);
                }
                Ok(PlaybackMessage::Warning { index, message }) => {
                    eprintln!("  warning at step {}: {}", index + 1, message);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => tracing::debug!(missed = n, "progress printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stop = player.stop_signal();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; stopping playback");
            stop.stop();
        }
    });

    let report = player.play(&document, &run_config).await;
    interrupt.abort();
    drop(player);
    let _ = printer.await;
    Ok(report)
}

/// Captures the screen once and reports where `args.image` appears.
pub async fn locate(
    args: &LocateArgs,
    config: &AppConfig,
    capture: Arc<dyn ScreenCapturer>,
) -> ReplayResult<MatchResult> {
    let patch = image::open(&args.image)?.to_rgba8();
    let options = MatchOptions {
        scales: config.matching.scales.clone(),
        threshold: args.threshold.unwrap_or(config.matching.threshold),
        max_search_ops: config.matching.max_search_ops,
    };
    locate_on_screen(
        capture,
        Arc::new(patch),
        args.offset,
        options,
        config.matching.search_all_monitors,
    )
    .await
}

fn print_json<T: Serialize>(value: &T) -> ReplayResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runs one parsed command line and maps its result to an exit code.
pub async fn execute(cli: Cli) -> ReplayResult<ExitCode> {
    let config = config::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Check { file } => {
            print_json(&check(&file)?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Locate(args) => {
            let providers = Providers::system()?;
            let result = locate(&args, &config, providers.capture).await?;
            print_json(&result)?;
            Ok(if result.found { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
        Command::Play(args) => {
            let report = play(&args, config, Providers::system()?).await?;
            print_json(&report)?;
            Ok(match report.state {
                PlaybackState::Completed => ExitCode::SUCCESS,
                PlaybackState::Stopped => ExitCode::from(130),
                _ => ExitCode::FAILURE,
            })
        }
    }
}
