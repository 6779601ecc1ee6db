//! 재시도 오케스트레이터 - solve → validate → fetch under a fixed attempt budget
//!
//! Each attempt starts from a fresh CAPTCHA on the item's session. The backoff
//! between attempts is fixed: failures come from OCR misses, not server load.
//! An exhausted image is appended to the failure log and the caller moves on.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    AcquisitionOutcome, AttemptFailure, CaptchaSolver, ImageFetcher, ValidationHandshake,
    fetch_captcha_image, pause,
};
use crate::domain::{FailureRecord, ImageDescriptor};
use crate::infrastructure::config::AcquisitionConfig;
use crate::infrastructure::storage::{StorageError, write_atomic};
use crate::infrastructure::{FailureLog, HttpSession};

/// What to acquire and where it goes
#[derive(Debug, Clone, Copy)]
pub struct ImageTarget<'a> {
    pub item_id: &'a str,
    pub image: &'a ImageDescriptor,
    pub destination: &'a Path,
    /// Detail page the image was listed on; sent as `Referer`
    pub detail_page_url: &'a str,
    /// Recorded in failure records when set
    pub index: Option<usize>,
}

#[derive(Clone)]
pub struct RetryOrchestrator {
    solver: CaptchaSolver,
    handshake: ValidationHandshake,
    fetcher: ImageFetcher,
    max_attempts: u32,
    backoff: Duration,
    shutdown: CancellationToken,
}

impl RetryOrchestrator {
    pub fn new(solver: CaptchaSolver, config: &AcquisitionConfig, shutdown: CancellationToken) -> Self {
        Self {
            solver,
            handshake: ValidationHandshake::new(),
            fetcher: ImageFetcher::new(),
            max_attempts: config.max_attempts,
            backoff: config.retry_backoff(),
            shutdown,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 이미지 하나를 획득 - drive attempts until one saves the image or the budget runs out.
    ///
    /// Only local storage problems (writing the image or the failure record)
    /// are returned as errors.
    pub async fn acquire_image<S>(
        &self,
        session: &S,
        target: ImageTarget<'_>,
        failure_sink: &FailureLog,
    ) -> Result<AcquisitionOutcome, StorageError>
    where
        S: HttpSession + ?Sized,
    {
        let name = &target.image.name;

        for attempt in 1..=self.max_attempts {
            if self.shutdown.is_cancelled() {
                return Ok(AcquisitionOutcome::Cancelled);
            }
            info!("🔄 [{}] attempt {}/{}", name, attempt, self.max_attempts);

            match self.attempt(session, &target).await {
                Ok(bytes) => {
                    write_atomic(target.destination, &bytes).await?;
                    info!("💾 [{}] saved to {}", name, target.destination.display());
                    return Ok(AcquisitionOutcome::Saved);
                }
                Err(AttemptFailure::Cancelled) => return Ok(AcquisitionOutcome::Cancelled),
                Err(AttemptFailure::EmptyGuess) => {
                    info!("[{}] OCR returned nothing, skipping validation", name);
                }
                Err(AttemptFailure::Rejected { message }) => {
                    info!("[{}] validation rejected: {}", name, message);
                }
                Err(AttemptFailure::Transient { cause }) => {
                    warn!("[{}] transient failure: {}", name, cause);
                }
            }

            if attempt < self.max_attempts && !pause(self.backoff, &self.shutdown).await {
                return Ok(AcquisitionOutcome::Cancelled);
            }
        }

        warn!("❌ [{}] giving up after {} attempts", name, self.max_attempts);
        let record = FailureRecord::new(target.detail_page_url, target.image, target.index);
        failure_sink.append(&record).await?;
        Ok(AcquisitionOutcome::Exhausted)
    }

    /// One full cycle on `session`; the CAPTCHA is never reused
    async fn attempt<S>(&self, session: &S, target: &ImageTarget<'_>) -> Result<Vec<u8>, AttemptFailure>
    where
        S: HttpSession + ?Sized,
    {
        let challenge = fetch_captcha_image(session).await?;

        let guess = self.solver.solve(&challenge).await;
        if guess.is_empty() {
            return Err(AttemptFailure::EmptyGuess);
        }

        let params = self
            .handshake
            .validate(session, target.item_id, target.image, &guess, target.detail_page_url)
            .await?;

        self.fetcher.fetch(session, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::testing::{
        ScriptedOcr, ScriptedSession, accepted_reply, count, rejected_reply,
    };
    use crate::domain::constants::download;
    use crate::infrastructure::RawResponse;
    use crate::infrastructure::storage::part_path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const PAGE: &str = "https://digitalarchive.npm.gov.tw/Painting/Detail/2903";

    fn orchestrator(guesses: &[&str], max_attempts: u32) -> RetryOrchestrator {
        let solver = CaptchaSolver::new(Arc::new(ScriptedOcr::new(guesses)));
        RetryOrchestrator::new(
            solver,
            &AcquisitionConfig::default().without_pauses(),
            CancellationToken::new(),
        )
        .with_max_attempts(max_attempts)
    }

    fn target<'a>(image: &'a ImageDescriptor, destination: &'a Path) -> ImageTarget<'a> {
        ImageTarget {
            item_id: "2903",
            image,
            destination,
            detail_page_url: PAGE,
            index: None,
        }
    }

    #[tokio::test]
    async fn empty_guesses_never_reach_validation() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession::new(1, Arc::clone(&calls));
        let log = FailureLog::new(dir.path().join("failed_images.log"));
        let image = ImageDescriptor::new("img1", "1", "AB");
        let destination = dir.path().join("img1.jpg");

        let outcome = orchestrator(&[""], 3)
            .acquire_image(&session, target(&image, &destination), &log)
            .await
            .unwrap();

        assert_eq!(outcome, AcquisitionOutcome::Exhausted);
        assert_eq!(count(&calls, "GET", download::CAPTCHA_PATH), 3);
        assert_eq!(count(&calls, "POST", download::VALIDATION_PATH), 0);
        assert_eq!(log.count().await.unwrap(), 1);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn every_attempt_fetches_a_new_captcha() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession::new(1, Arc::clone(&calls));
        let log = FailureLog::new(dir.path().join("failed_images.log"));
        let image = ImageDescriptor::new("img1", "1", "AB");
        let destination = dir.path().join("img1.jpg");

        orchestrator(&["AB12"], 4)
            .acquire_image(&session, target(&image, &destination), &log)
            .await
            .unwrap();

        // challenge, then its validation; never two validations per challenge
        let sequence: Vec<_> = calls.lock().unwrap().iter().map(|c| c.path.clone()).collect();
        let expected: Vec<_> = (0..4)
            .flat_map(|_| [download::CAPTCHA_PATH, download::VALIDATION_PATH])
            .map(String::from)
            .collect();
        assert_eq!(sequence, expected);
    }

    #[tokio::test]
    async fn rejection_then_success_saves_image() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession::new(7, Arc::clone(&calls))
            .with_validation(vec![rejected_reply("CAPTCHA mismatch"), accepted_reply()]);
        let log = FailureLog::new(dir.path().join("failed_images.log"));
        let image = ImageDescriptor::new("img1", "1", "AB");
        let destination = dir.path().join("img1.jpg");

        let outcome = orchestrator(&["ZZ99", "AB12"], 10)
            .acquire_image(&session, target(&image, &destination), &log)
            .await
            .unwrap();

        assert_eq!(outcome, AcquisitionOutcome::Saved);
        assert_eq!(std::fs::read(&destination).unwrap(), b"\xFF\xD8\xFF\xE0jpeg");
        assert_eq!(log.count().await.unwrap(), 0);

        let calls = calls.lock().unwrap();
        let post = calls.iter().rfind(|c| c.method == "POST").unwrap();
        assert_eq!(post.referer.as_deref(), Some(PAGE));
        assert!(post.params.contains(&("CaptchaCode".to_string(), "AB12".to_string())));
        assert!(post.params.contains(&("Dep".to_string(), "U".to_string())));
        assert!(post.params.contains(&("RandomCode".to_string(), "AB".to_string())));

        let fetch = calls.last().unwrap();
        assert_eq!(fetch.path, download::IMAGE_PATH);
        assert!(fetch.params.contains(&("capchaCode".to_string(), "AB12".to_string())));
        assert!(calls.iter().all(|c| c.session == 7));
    }

    #[tokio::test]
    async fn cancelled_before_start_records_nothing() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession::new(1, Arc::clone(&calls));
        let log = FailureLog::new(dir.path().join("failed_images.log"));
        let image = ImageDescriptor::new("img1", "1", "AB");
        let destination = dir.path().join("img1.jpg");

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let orchestrator = RetryOrchestrator::new(
            CaptchaSolver::new(Arc::new(ScriptedOcr::new(&["AB12"]))),
            &AcquisitionConfig::default(),
            shutdown,
        );

        let outcome = orchestrator
            .acquire_image(&session, target(&image, &destination), &log)
            .await
            .unwrap();
        assert_eq!(outcome, AcquisitionOutcome::Cancelled);
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transient_validation_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession::new(1, Arc::clone(&calls)).with_validation(vec![
            RawResponse::new(500, Vec::new()),
            RawResponse::ok(b"{not json".to_vec()),
            RawResponse::ok(br#"{"result": true, "ImageId": 1, "Dep": "U"}"#.to_vec()),
            accepted_reply(),
        ]);
        let log = FailureLog::new(dir.path().join("failed_images.log"));
        let image = ImageDescriptor::new("img1", "1", "AB");
        let destination = dir.path().join("img1.jpg");

        let outcome = orchestrator(&["AB12"], 10)
            .acquire_image(&session, target(&image, &destination), &log)
            .await
            .unwrap();

        assert_eq!(outcome, AcquisitionOutcome::Saved);
        assert_eq!(count(&calls, "GET", download::CAPTCHA_PATH), 4);
        assert_eq!(count(&calls, "POST", download::VALIDATION_PATH), 4);
        assert_eq!(count(&calls, "GET", download::IMAGE_PATH), 1);
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_image_downloads_start_over_with_a_new_captcha() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession::new(1, Arc::clone(&calls))
            .with_validation(vec![accepted_reply(), accepted_reply(), accepted_reply()])
            .with_image_replies(vec![RawResponse::new(503, Vec::new()), RawResponse::ok(Vec::new())]);
        let log = FailureLog::new(dir.path().join("failed_images.log"));
        let image = ImageDescriptor::new("img1", "1", "AB");
        let destination = dir.path().join("img1.jpg");

        let outcome = orchestrator(&["AB12"], 10)
            .acquire_image(&session, target(&image, &destination), &log)
            .await
            .unwrap();

        assert_eq!(outcome, AcquisitionOutcome::Saved);
        assert_eq!(count(&calls, "GET", download::CAPTCHA_PATH), 3);
        assert_eq!(count(&calls, "GET", download::IMAGE_PATH), 3);
        assert_eq!(std::fs::read(&destination).unwrap(), b"\xFF\xD8\xFF\xE0jpeg");
        assert!(!part_path(&destination).exists());
    }

    #[tokio::test]
    async fn transient_failures_exhaust_the_same_budget() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession::new(1, Arc::clone(&calls))
            .with_validation(vec![accepted_reply(), accepted_reply()])
            .with_image_replies(vec![RawResponse::new(502, Vec::new()), RawResponse::new(502, Vec::new())]);
        let log = FailureLog::new(dir.path().join("failed_images.log"));
        let image = ImageDescriptor::new("img1", "1", "AB");
        let destination = dir.path().join("img1.jpg");

        let outcome = orchestrator(&["AB12"], 2)
            .acquire_image(&session, target(&image, &destination), &log)
            .await
            .unwrap();

        assert_eq!(outcome, AcquisitionOutcome::Exhausted);
        assert_eq!(count(&calls, "GET", download::CAPTCHA_PATH), 2);
        assert_eq!(log.count().await.unwrap(), 1);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn shutdown_during_backoff_records_nothing() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let session = ScriptedSession::new(1, Arc::clone(&calls));
        let log = FailureLog::new(dir.path().join("failed_images.log"));
        let image = ImageDescriptor::new("img1", "1", "AB");
        let destination = dir.path().join("img1.jpg");

        let shutdown = CancellationToken::new();
        let config = AcquisitionConfig {
            retry_backoff_ms: 600_000,
            ..AcquisitionConfig::default()
        };
        let orchestrator = RetryOrchestrator::new(
            CaptchaSolver::new(Arc::new(ScriptedOcr::new(&["AB12"]))),
            &config,
            shutdown.clone(),
        );

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            orchestrator.acquire_image(&session, target(&image, &destination), &log),
        )
        .await
        .expect("backoff was not interrupted")
        .unwrap();

        assert_eq!(outcome, AcquisitionOutcome::Cancelled);
        assert_eq!(count(&calls, "POST", download::VALIDATION_PATH), 1);
        assert_eq!(log.count().await.unwrap(), 0);
        assert!(!log.path().exists());
        assert!(!destination.exists());
    }
}
