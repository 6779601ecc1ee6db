//! Detail page URL harvesting
//!
//! Pages through the open-data catalog search (`POST /opendata/Pub/Search`)
//! for one category and collects every item's detail page link. The first
//! page announces the total page count; a page that fails later is logged
//! and skipped rather than aborting the crawl.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::acquisition::pause;
use crate::domain::constants::site;
use crate::infrastructure::config::HarvestConfig;
use crate::infrastructure::storage::write_atomic;
use crate::infrastructure::{HttpSession, SearchPageParser, SessionFactory};

pub struct UrlHarvester<F: SessionFactory> {
    factory: F,
    parser: SearchPageParser,
    config: HarvestConfig,
    shutdown: CancellationToken,
}

impl<F: SessionFactory> UrlHarvester<F> {
    pub fn new(factory: F, parser: SearchPageParser, config: HarvestConfig, shutdown: CancellationToken) -> Self {
        Self {
            factory,
            parser,
            config,
            shutdown,
        }
    }

    /// Collect detail URLs for `category`, in catalog order
    pub async fn harvest(&self, category: &str) -> Result<Vec<String>> {
        let session = self.factory.open_session().context("Failed to open search session")?;

        info!("🔍 Reading page count for category '{}'", category);
        let first_page = self
            .search_page(&session, category, 1)
            .await
            .context("Failed to fetch the first search page")?;
        let total_pages = self
            .parser
            .total_pages(&first_page)
            .context("Failed to read the total page count")?;
        info!("Category '{}' has {} pages", category, total_pages);

        let mut urls = Vec::new();
        let mut first_page = Some(first_page);

        for page_index in 1..=total_pages {
            if self.shutdown.is_cancelled() {
                warn!("🛑 Harvest cancelled at page {}/{}", page_index, total_pages);
                break;
            }
            info!("📄 Harvesting page {}/{}", page_index, total_pages);

            let html = match first_page.take() {
                Some(html) => Ok(html),
                None => self.search_page(&session, category, page_index).await,
            };

            let delay = match html {
                Ok(html) => {
                    let links = self.parser.detail_urls(&html);
                    if links.is_empty() {
                        warn!("No detail links on page {}", page_index);
                    }
                    urls.extend(links);
                    self.config.page_pause()
                }
                Err(e) => {
                    error!("Search page {} failed: {:#}", page_index, e);
                    self.config.page_error_pause()
                }
            };

            if page_index < total_pages && !pause(delay, &self.shutdown).await {
                warn!("🛑 Harvest cancelled after page {}/{}", page_index, total_pages);
                break;
            }
        }

        info!("✅ Harvested {} detail URLs", urls.len());
        Ok(urls)
    }

    async fn search_page(&self, session: &F::Session, category: &str, page_index: u32) -> Result<String> {
        let body = json!({
            "RegisterType": category,
            "PageInfo": { "PageIndex": page_index, "PageSize": self.config.page_size },
        });

        let response = session.post_json(site::SEARCH_PATH, &body).await?;
        if !response.is_success() {
            bail!("search page {} returned HTTP {}", page_index, response.status);
        }
        Ok(response.text())
    }
}

/// Write one URL per line, replacing any previous list
pub async fn save_url_list(path: &Path, urls: &[String]) -> Result<()> {
    let mut contents = String::with_capacity(urls.iter().map(|u| u.len() + 1).sum());
    for url in urls {
        contents.push_str(url);
        contents.push('\n');
    }
    write_atomic(path, contents.as_bytes())
        .await
        .with_context(|| format!("Failed to write URL list {}", path.display()))
}

/// Trimmed, non-empty lines of a URL list
pub async fn load_url_list(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("URL list {} not found; run `harvest` first", path.display()))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}
