// Clipboard output for OCR results.
use std::io::Write;
use std::process::{Command, Stdio};

use crate::errors::{ReplayError, ReplayResult};

pub trait ClipboardWriter: Send + Sync {
    /// Replaces the clipboard contents with `text`.
    fn set_text(&self, text: &str) -> ReplayResult<()>;
}

/// The desktop clipboard, fed through the platform's copy tool on stdin.
#[derive(Debug, Clone)]
pub struct SystemClipboard {
    program: String,
    args: Vec<String>,
}

impl SystemClipboard {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        #[cfg(target_os = "windows")]
        return Self::new("clip", Vec::new());
        #[cfg(target_os = "macos")]
        return Self::new("pbcopy", Vec::new());
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            if std::env::var_os("WAYLAND_DISPLAY").is_some() {
                Self::new("wl-copy", Vec::new())
            } else {
                Self::new("xclip", vec!["-selection".into(), "clipboard".into()])
            }
        }
    }
}

impl ClipboardWriter for SystemClipboard {
    fn set_text(&self, text: &str) -> ReplayResult<()> {
        // xclip and wl-copy fork to serve the selection: keep their output unpiped.
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ReplayError::ProviderUnavailable(format!("clipboard tool `{}` not found", self.program))
                }
                _ => ReplayError::Provider(format!("spawn {}: {e}", self.program)),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(ReplayError::Provider(format!("{} exited with {status}", self.program)));
        }
        tracing::debug!(chars = text.chars().count(), tool = %self.program, "clipboard updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_reports_unavailable() {
        let clip = SystemClipboard::new("anchorplay-no-such-clipboard", Vec::new());
        let err = clip.set_text("x").unwrap_err();
        assert!(err.is_unavailable(), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn text_is_written_to_the_tool_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.txt");
        let clip = SystemClipboard::new(
            "sh",
            vec![
                "-c".into(),
                "cat > \"$0\"".into(),
                out.to_string_lossy().into_owned(),
            ],
        );
        clip.set_text("Total: 42").unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "Total: 42");
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_a_provider_error() {
        let clip = SystemClipboard::new("sh", vec!["-c".into(), "cat > /dev/null; exit 3".into()]);
        let err = clip.set_text("x").unwrap_err();
        assert!(!err.is_unavailable());
        assert!(matches!(err, ReplayError::Provider(_)), "{err}");
    }
}
