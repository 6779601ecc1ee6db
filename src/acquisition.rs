//! CAPTCHA-gated image acquisition
//!
//! Leaves first: [`CaptchaSolver`] turns a challenge into a guess,
//! [`ValidationHandshake`] trades the guess for download parameters,
//! [`ImageFetcher`] pulls the payload, [`RetryOrchestrator`] loops those three
//! under a fixed attempt budget, and [`ResumableBatchRunner`] walks detail
//! pages and hands it only the images missing on disk.
//!
//! Everything here is sequential per session. Cross-item parallelism would
//! need one session (and one rate budget) per worker and disjoint folders.

pub mod batch_runner;
pub mod captcha_solver;
pub mod error;
pub mod image_fetcher;
pub mod retry_orchestrator;
pub mod validation;

pub use batch_runner::{ArchiveMode, BatchSummary, ItemReport, ResumableBatchRunner};
pub use captcha_solver::{CaptchaSolver, fetch_captcha_image};
pub use error::{AcquisitionOutcome, AttemptFailure, ItemError};
pub use image_fetcher::ImageFetcher;
pub use retry_orchestrator::{ImageTarget, RetryOrchestrator};
pub use validation::ValidationHandshake;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless shutdown fires first. Returns `false` when
/// cancelled.
pub async fn pause(duration: Duration, shutdown: &CancellationToken) -> bool {
    if shutdown.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.cancelled() => false,
    }
}
