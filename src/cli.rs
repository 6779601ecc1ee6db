//! Command line surface
//!
//! `harvest` → `urls.txt`, then `download` / `main-images` / `metadata` over
//! that list. Every command is resumable: re-running skips work already on
//! disk.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acquisition::{ArchiveMode, CaptchaSolver, ResumableBatchRunner, RetryOrchestrator};
use crate::harvest::{UrlHarvester, load_url_list, save_url_list};
use crate::infrastructure::{
    ArchiverConfig, DetailPageParser, FailureLog, MetadataParser, MetadataStore,
    ReqwestSessionFactory, SearchPageParser, TesseractCli,
};
use crate::metadata::MetadataScraper;

#[derive(Parser, Debug)]
#[command(name = "palace-archiver", version)]
#[command(about = "National Palace Museum open-data image and metadata archiver", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output root directory (overrides `paths.output_root`)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Debug level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Collect detail page URLs for a catalog category into the URL list
    Harvest {
        /// Catalog category (`RegisterType`)
        #[arg(long)]
        category: Option<String>,

        /// Results per search page
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Download every gallery image of every listed item
    Download {
        /// URL list (default: `<output>/urls.txt`)
        #[arg(long)]
        urls: Option<PathBuf>,

        /// Solve/validate/fetch cycles per image
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Download only the first gallery image of each item, numbered by list position
    MainImages {
        /// URL list (default: `<output>/urls.txt`)
        #[arg(long)]
        urls: Option<PathBuf>,

        /// Solve/validate/fetch cycles per image
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Scrape metadata sections into JSON files and a CSV table
    Metadata {
        /// URL list (default: `<output>/urls.txt`)
        #[arg(long)]
        urls: Option<PathBuf>,
    },
}

impl Cli {
    /// Layered configuration with command line overrides applied on top
    pub fn load_config(&self) -> Result<ArchiverConfig> {
        let mut config = ArchiverConfig::load(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(output) = &self.output {
            config.paths.output_root = output.clone();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }

        match &self.command {
            Commands::Harvest { category, page_size } => {
                if let Some(category) = category {
                    config.harvest.category = category.clone();
                }
                if let Some(page_size) = page_size {
                    config.harvest.page_size = *page_size;
                }
            }
            Commands::Download { max_attempts, .. } | Commands::MainImages { max_attempts, .. } => {
                if let Some(max_attempts) = max_attempts {
                    config.acquisition.max_attempts = *max_attempts;
                }
            }
            Commands::Metadata { .. } => {}
        }

        config.validate()?;
        Ok(config)
    }
}

/// Run one command to completion or until `shutdown` fires
pub async fn run(command: Commands, config: ArchiverConfig, shutdown: CancellationToken) -> Result<()> {
    let config = Arc::new(config);
    let factory = ReqwestSessionFactory::new(Arc::clone(&config), shutdown.clone());

    match command {
        Commands::Harvest { .. } => {
            let parser = SearchPageParser::new(&config.site.base_url)?;
            let harvester = UrlHarvester::new(factory, parser, config.harvest.clone(), shutdown);

            let urls = harvester.harvest(&config.harvest.category).await?;
            let path = config.paths.urls_file();
            save_url_list(&path, &urls).await?;
            println!("✅ {} URLs saved to {}", urls.len(), path.display());
        }

        Commands::Download { urls, .. } => {
            let mode = ArchiveMode::Gallery {
                root: config.paths.gallery_dir(),
            };
            let log = config.paths.failed_images_log();
            download(&config, factory, mode, log, urls, shutdown).await?;
        }

        Commands::MainImages { urls, .. } => {
            let mode = ArchiveMode::MainImage {
                dir: config.paths.main_image_dir(),
            };
            let log = config.paths.failed_main_images_log();
            download(&config, factory, mode, log, urls, shutdown).await?;
        }

        Commands::Metadata { urls } => {
            let urls = load_url_list(&urls.unwrap_or_else(|| config.paths.urls_file())).await?;
            let store = MetadataStore::new(config.paths.metadata_json_dir(), config.paths.metadata_csv());
            let scraper = MetadataScraper::new(
                factory,
                MetadataParser::new()?,
                store,
                config.metadata.clone(),
                shutdown,
            );

            let summary = scraper.run(&urls).await?;
            println!(
                "✅ Metadata: {} saved, {} already present, {} failed ({})",
                summary.saved,
                summary.skipped,
                summary.failed,
                scraper.store().csv_path().display()
            );
        }
    }

    Ok(())
}

async fn download(
    config: &ArchiverConfig,
    factory: ReqwestSessionFactory,
    mode: ArchiveMode,
    failure_log_path: PathBuf,
    urls: Option<PathBuf>,
    shutdown: CancellationToken,
) -> Result<()> {
    let urls = load_url_list(&urls.unwrap_or_else(|| config.paths.urls_file())).await?;
    info!("Loaded {} URLs", urls.len());

    let ocr = TesseractCli::new();
    if !ocr.is_available().await {
        bail!("tesseract is not installed or not on PATH; it is needed to read CAPTCHAs");
    }

    let orchestrator = RetryOrchestrator::new(
        CaptchaSolver::new(Arc::new(ocr)),
        &config.acquisition,
        shutdown.clone(),
    );
    let failure_log = Arc::new(FailureLog::new(failure_log_path));
    let runner = ResumableBatchRunner::new(
        factory,
        DetailPageParser::new()?,
        orchestrator,
        mode,
        Arc::clone(&failure_log),
        config.acquisition.clone(),
        shutdown,
    );

    let summary = runner.run_batch(&urls).await;

    println!(
        "✅ {} items processed ({} already complete), {} images saved",
        summary.items_processed, summary.items_skipped, summary.images_saved
    );
    if summary.items_malformed + summary.items_failed > 0 {
        println!(
            "⚠️  {} items skipped ({} malformed pages)",
            summary.items_malformed + summary.items_failed,
            summary.items_malformed
        );
    }
    if summary.images_failed > 0 {
        println!(
            "⚠️  {} images failed, see {}",
            summary.images_failed,
            failure_log.path().display()
        );
    }
    if summary.cancelled {
        warn!("Run interrupted; re-run the same command to resume");
    }

    Ok(())
}
