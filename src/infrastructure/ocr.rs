//! OCR engine adapter
//!
//! Recognition is delegated to the `tesseract` executable, restricted to the
//! CAPTCHA alphabet and to single-line segmentation. Accuracy is best effort;
//! the retry loop upstream exists because it is unreliable.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::domain::constants::captcha;

/// Image -> best-effort text
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &DynamicImage) -> Result<String>;
}

/// Runs `tesseract stdin stdout --psm 7 -c tessedit_char_whitelist=...`
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    whitelist: String,
}

impl TesseractCli {
    pub fn new() -> Self {
        Self::with_binary("tesseract")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            whitelist: captcha::CHAR_WHITELIST.to_string(),
        }
    }

    /// Check whether the executable can be launched at all
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    fn arguments(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            captcha::PAGE_SEGMENTATION_MODE.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", self.whitelist),
        ]
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &DynamicImage) -> Result<String> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("Failed to re-encode CAPTCHA as PNG")?;

        let mut child = Command::new(&self.binary)
            .args(self.arguments())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to launch '{}'; is tesseract-ocr installed?", self.binary))?;

        let mut stdin = child.stdin.take().context("tesseract stdin unavailable")?;
        stdin.write_all(&png).await.context("Failed to feed image to tesseract")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to read tesseract output")?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract raw output: {:?}", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_restrict_alphabet_and_layout() {
        let args = TesseractCli::new().arguments();
        assert_eq!(args[..4], ["stdin", "stdout", "--psm", "7"]);
        assert_eq!(
            args[5],
            "tessedit_char_whitelist=0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_an_error_not_a_panic() {
        let engine = TesseractCli::with_binary("definitely-not-tesseract-7f3a");
        assert!(!engine.is_available().await);

        let image = DynamicImage::new_luma8(8, 8);
        assert!(engine.recognize(&image).await.is_err());
    }
}
