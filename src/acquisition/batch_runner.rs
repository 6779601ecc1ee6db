//! Resumable batch runner
//!
//! One fresh session per item. The detail page is fetched once, the expected
//! file names are diffed against the destination folder, and only the
//! difference goes through the retry loop. An item whose files are all
//! present costs exactly one page fetch.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{AcquisitionOutcome, ImageTarget, ItemError, RetryOrchestrator, pause};
use crate::domain::ItemDetailPage;
use crate::domain::constants::markup;
use crate::infrastructure::config::AcquisitionConfig;
use crate::infrastructure::storage::{
    ensure_dir, existing_file_names, missing_images, sanitize_folder_name,
};
use crate::infrastructure::{
    DetailPageParser, FailureLog, HttpSession, ParsingError, SessionFactory, TransportError,
};

/// Where images land and which ones an item contributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Every gallery image, into `<root>/<sanitized title>/<name>.jpg`
    Gallery { root: PathBuf },
    /// The first gallery image only, into `<dir>/<index:05>_<sanitized title>.jpg`
    MainImage { dir: PathBuf },
}

impl ArchiveMode {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Gallery { .. } => "gallery",
            Self::MainImage { .. } => "main-image",
        }
    }
}

/// Result of one `process_item` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemReport {
    pub item_id: String,
    pub images_expected: usize,
    pub images_missing: usize,
    pub images_saved: usize,
    pub images_failed: usize,
}

impl ItemReport {
    /// Nothing needed downloading
    pub const fn already_complete(&self) -> bool {
        self.images_missing == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub items_total: usize,
    pub items_processed: usize,
    pub items_skipped: usize,
    pub items_malformed: usize,
    pub items_failed: usize,
    pub images_saved: usize,
    pub images_failed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    fn record(&mut self, report: &ItemReport) {
        self.items_processed += 1;
        if report.already_complete() {
            self.items_skipped += 1;
        }
        self.images_saved += report.images_saved;
        self.images_failed += report.images_failed;
    }
}

pub struct ResumableBatchRunner<F: SessionFactory> {
    factory: F,
    parser: DetailPageParser,
    orchestrator: RetryOrchestrator,
    mode: ArchiveMode,
    failure_log: Arc<FailureLog>,
    pacing: AcquisitionConfig,
    shutdown: CancellationToken,
}

impl<F: SessionFactory> ResumableBatchRunner<F> {
    pub fn new(
        factory: F,
        parser: DetailPageParser,
        orchestrator: RetryOrchestrator,
        mode: ArchiveMode,
        failure_log: Arc<FailureLog>,
        pacing: AcquisitionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            factory,
            parser,
            orchestrator,
            mode,
            failure_log,
            pacing,
            shutdown,
        }
    }

    pub fn failure_log(&self) -> &FailureLog {
        &self.failure_log
    }

    /// Process detail pages strictly in order; `index` is 1-based.
    ///
    /// Item-level errors are logged and counted, never propagated.
    pub async fn run_batch(&self, urls: &[String]) -> BatchSummary {
        let mut summary = BatchSummary {
            items_total: urls.len(),
            ..BatchSummary::default()
        };
        info!("🚀 Starting {} archive of {} items", self.mode.label(), urls.len());

        for (position, url) in urls.iter().enumerate() {
            let index = position + 1;
            if self.shutdown.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            info!("📄 [{}/{}] {}", index, urls.len(), url);

            let delay = match self.process_item(url, index).await {
                Ok(report) => {
                    summary.record(&report);
                    self.pacing.item_pause()
                }
                Err(ItemError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) if e.is_structural() => {
                    error!("Skipping malformed page (index {}) {}: {}", index, url, e);
                    summary.items_malformed += 1;
                    self.pacing.item_pause()
                }
                Err(e) => {
                    error!("Item (index {}) {} failed: {}", index, url, e);
                    summary.items_failed += 1;
                    self.pacing.item_error_pause()
                }
            };

            if index < urls.len() && !pause(delay, &self.shutdown).await {
                summary.cancelled = true;
                break;
            }
        }

        info!(
            "🏁 {} archive finished: {} processed ({} already complete), {} malformed, {} failed, {} images saved, {} images failed{}",
            self.mode.label(),
            summary.items_processed,
            summary.items_skipped,
            summary.items_malformed,
            summary.items_failed,
            summary.images_saved,
            summary.images_failed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        summary
    }

    /// Fetch one detail page and acquire whatever it declares that is not on disk
    pub async fn process_item(&self, detail_page_url: &str, index: usize) -> Result<ItemReport, ItemError> {
        let session = self.factory.open_session()?;

        let response = session.get(detail_page_url, &[]).await.map_err(|e| match e {
            TransportError::Cancelled => ItemError::Cancelled,
            other => ItemError::Transport(other),
        })?;
        if !response.is_success() {
            return Err(ItemError::HttpStatus {
                status: response.status,
            });
        }

        let page = self.parser.parse(&response.text(), detail_page_url)?;

        match &self.mode {
            ArchiveMode::Gallery { root } => self.archive_gallery(&session, &page, root.clone()).await,
            ArchiveMode::MainImage { dir } => {
                self.archive_main_image(&session, &page, dir.clone(), index).await
            }
        }
    }

    async fn archive_gallery(
        &self,
        session: &F::Session,
        page: &ItemDetailPage,
        root: PathBuf,
    ) -> Result<ItemReport, ItemError> {
        let folder_name = sanitize_folder_name(&page.title);
        let folder = root.join(&folder_name);
        ensure_dir(&folder).await?;

        let existing = existing_file_names(&folder).await?;
        let missing = missing_images(&page.images, &existing);

        let mut report = ItemReport {
            item_id: page.item_id.clone(),
            images_expected: page.images.len(),
            images_missing: missing.len(),
            ..ItemReport::default()
        };

        if missing.is_empty() {
            info!("✅ '{}' already complete, skipping", folder_name);
            return Ok(report);
        }
        info!(
            "📁 '{}': {} / {} files to download",
            folder_name,
            missing.len(),
            page.images.len()
        );

        for (position, image) in missing.iter().copied().enumerate() {
            let destination = folder.join(image.file_name());
            let target = ImageTarget {
                item_id: &page.item_id,
                image,
                destination: &destination,
                detail_page_url: &page.page_url,
                index: None,
            };

            match self.orchestrator.acquire_image(session, target, &self.failure_log).await? {
                AcquisitionOutcome::Saved => report.images_saved += 1,
                AcquisitionOutcome::Exhausted => {
                    warn!(
                        "Image {} could not be downloaded, see {}",
                        image.name,
                        self.failure_log.path().display()
                    );
                    report.images_failed += 1;
                }
                AcquisitionOutcome::Cancelled => return Err(ItemError::Cancelled),
            }

            if position + 1 < missing.len() && !pause(self.pacing.image_pause(), &self.shutdown).await {
                return Err(ItemError::Cancelled);
            }
        }

        Ok(report)
    }

    async fn archive_main_image(
        &self,
        session: &F::Session,
        page: &ItemDetailPage,
        dir: PathBuf,
        index: usize,
    ) -> Result<ItemReport, ItemError> {
        let mut report = ItemReport {
            item_id: page.item_id.clone(),
            images_expected: 1,
            images_missing: 1,
            ..ItemReport::default()
        };

        let image = page.main_image().ok_or_else(|| ParsingError::NoImagesFound {
            url: page.page_url.clone(),
        })?;

        let file_name = format!(
            "{:05}_{}.{}",
            index,
            sanitize_folder_name(&page.title),
            markup::IMAGE_EXTENSION
        );
        let destination = dir.join(&file_name);

        ensure_dir(&dir).await?;
        if existing_file_names(&dir).await?.contains(&file_name) {
            info!("✅ Main image '{}' already present, skipping", file_name);
            report.images_missing = 0;
            return Ok(report);
        }

        let target = ImageTarget {
            item_id: &page.item_id,
            image,
            destination: &destination,
            detail_page_url: &page.page_url,
            index: Some(index),
        };

        match self.orchestrator.acquire_image(session, target, &self.failure_log).await? {
            AcquisitionOutcome::Saved => report.images_saved = 1,
            AcquisitionOutcome::Exhausted => {
                warn!(
                    "Main image {} (index {}) could not be downloaded, see {}",
                    image.name,
                    index,
                    self.failure_log.path().display()
                );
                report.images_failed = 1;
            }
            AcquisitionOutcome::Cancelled => return Err(ItemError::Cancelled),
        }

        Ok(report)
    }
}
