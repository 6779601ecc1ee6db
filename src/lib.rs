//! Palace Archiver - National Palace Museum open-data archiver
//!
//! Harvests item detail URLs from the open-data catalog, downloads the
//! CAPTCHA-gated gallery images of each item, and scrapes item metadata into
//! JSON and CSV. Runs are resumable: files already on disk are never fetched
//! again.

// Module declarations
pub mod acquisition;
pub mod cli;
pub mod domain;
pub mod harvest;
pub mod infrastructure;
pub mod metadata;

pub use acquisition::{
    AcquisitionOutcome, ArchiveMode, AttemptFailure, BatchSummary, ItemError, ResumableBatchRunner,
    RetryOrchestrator,
};
pub use infrastructure::config::ArchiverConfig;
