/// Text recognition through the `tesseract` command-line tool.
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::{ReplayError, ReplayResult};
use crate::perception::traits::TextRecognizer;

#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    language: Option<String>,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>, language: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            language,
        }
    }
}

impl TesseractOcr {
    /// Whether the binary can be started at all.
    pub fn is_installed(&self) -> bool {
        std::process::Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract", None)
    }
}

#[async_trait]
impl TextRecognizer for TesseractOcr {
    async fn recognize(&self, image: &RgbaImage) -> ReplayResult<String> {
        let mut png = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin").arg("stdout");
        if let Some(lang) = &self.language {
            cmd.arg("-l").arg(lang);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ReplayError::ProviderUnavailable(format!("OCR engine `{}` not found", self.binary))
                }
                _ => ReplayError::Provider(format!("spawn {}: {e}", self.binary)),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReplayError::Provider(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Stand-in used when no OCR engine is installed.
pub struct UnavailableOcr;

#[async_trait]
impl TextRecognizer for UnavailableOcr {
    async fn recognize(&self, _image: &RgbaImage) -> ReplayResult<String> {
        Err(ReplayError::ProviderUnavailable("OCR engine not installed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_reports_unavailable() {
        let ocr = TesseractOcr::new("anchorplay-no-such-ocr-binary", None);
        let img = RgbaImage::new(4, 4);
        let err = ocr.recognize(&img).await.unwrap_err();
        assert!(err.is_unavailable(), "{err}");
        assert!(!ocr.is_installed());
    }

    #[tokio::test]
    async fn unavailable_stub_always_fails() {
        let err = UnavailableOcr.recognize(&RgbaImage::new(1, 1)).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
