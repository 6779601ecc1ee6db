//! CAPTCHA challenge retrieval and solving

use std::sync::Arc;

use tracing::{debug, warn};

use super::AttemptFailure;
use crate::domain::constants::download;
use crate::infrastructure::{HttpSession, OcrEngine};

/// Fetch a fresh challenge image over `session`.
///
/// Every attempt must call this; challenges are single-use server side.
pub async fn fetch_captcha_image<S>(session: &S) -> Result<Vec<u8>, AttemptFailure>
where
    S: HttpSession + ?Sized,
{
    let response = session.get(download::CAPTCHA_PATH, &[]).await?;
    if !response.is_success() {
        return Err(AttemptFailure::transient(format!(
            "CAPTCHA request returned HTTP {}",
            response.status
        )));
    }
    if response.body.is_empty() {
        return Err(AttemptFailure::transient("CAPTCHA response was empty"));
    }
    Ok(response.body)
}

/// Wraps an [`OcrEngine`]; never fails, an unreadable challenge is an empty guess
#[derive(Clone)]
pub struct CaptchaSolver {
    engine: Arc<dyn OcrEngine>,
}

impl CaptchaSolver {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    /// Decode the challenge and return the trimmed OCR text, or `""`
    pub async fn solve(&self, image_bytes: &[u8]) -> String {
        let image = match image::load_from_memory(image_bytes) {
            Ok(image) => image,
            Err(e) => {
                warn!("Could not decode CAPTCHA image ({} bytes): {}", image_bytes.len(), e);
                return String::new();
            }
        };

        match self.engine.recognize(&image).await {
            Ok(text) => {
                let guess = text.trim().to_string();
                debug!("OCR guess: '{}'", guess);
                guess
            }
            Err(e) => {
                warn!("OCR failed: {:#}", e);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    struct FixedOcr(Option<&'static str>);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn recognize(&self, _image: &DynamicImage) -> anyhow::Result<String> {
            match self.0 {
                Some(text) => Ok(text.to_string()),
                None => bail!("engine crashed"),
            }
        }
    }

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(8, 4))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn trims_recognized_text() {
        let solver = CaptchaSolver::new(Arc::new(FixedOcr(Some(" AB12\n"))));
        assert_eq!(solver.solve(&png()).await, "AB12");
    }

    #[tokio::test]
    async fn failures_collapse_to_empty_guess() {
        let crashing = CaptchaSolver::new(Arc::new(FixedOcr(None)));
        assert_eq!(crashing.solve(&png()).await, "");

        let fine = CaptchaSolver::new(Arc::new(FixedOcr(Some("AB12"))));
        assert_eq!(fine.solve(b"not an image").await, "");
    }
}
