//! Artifact metadata scraping
//!
//! Walks the URL list, parses each detail page's `details-N` sections and
//! persists them through [`MetadataStore`]. Pages whose JSON document already
//! exists are skipped without a request, so an interrupted run resumes where
//! it stopped.

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::acquisition::pause;
use crate::infrastructure::config::MetadataConfig;
use crate::infrastructure::{HttpSession, MetadataParser, MetadataStore, SessionFactory};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSummary {
    pub total: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

pub struct MetadataScraper<F: SessionFactory> {
    factory: F,
    parser: MetadataParser,
    store: MetadataStore,
    config: MetadataConfig,
    shutdown: CancellationToken,
}

impl<F: SessionFactory> MetadataScraper<F> {
    pub fn new(
        factory: F,
        parser: MetadataParser,
        store: MetadataStore,
        config: MetadataConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            factory,
            parser,
            store,
            config,
            shutdown,
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub async fn run(&self, urls: &[String]) -> Result<MetadataSummary> {
        let session = self.factory.open_session().context("Failed to open metadata session")?;
        let mut summary = MetadataSummary {
            total: urls.len(),
            ..MetadataSummary::default()
        };

        info!("🚀 Scraping metadata for {} detail pages", urls.len());
        for (position, url) in urls.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            if let Some(id) = self.parser.id_from_url(url) {
                if self.store.contains(&id).await {
                    summary.skipped += 1;
                    continue;
                }
            }

            match self.scrape_one(&session, url).await {
                Ok(()) => summary.saved += 1,
                Err(e) => {
                    error!("Metadata for {} failed: {:#}", url, e);
                    summary.failed += 1;
                }
            }

            if position + 1 < urls.len() && !pause(self.config.request_pause(), &self.shutdown).await {
                summary.cancelled = true;
                break;
            }
        }

        if summary.cancelled {
            warn!("🛑 Metadata scraping cancelled");
        }
        info!(
            "🏁 Metadata done: {} saved, {} already present, {} failed",
            summary.saved, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    async fn scrape_one(&self, session: &F::Session, url: &str) -> Result<()> {
        let response = session.get(url, &[]).await?;
        if !response.is_success() {
            bail!("HTTP {}", response.status);
        }

        let metadata = self.parser.parse(&response.text(), url)?;
        let path = self.store.save(&metadata).await?;
        info!("💾 {} -> {}", metadata.unique_id, path.display());
        Ok(())
    }
}
