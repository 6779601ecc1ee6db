//! Infrastructure layer: configuration, logging, HTTP sessions, OCR, HTML
//! parsing and local archive storage.

pub mod config;
pub mod failure_log;
pub mod http_client;
pub mod logging;
pub mod metadata_store;
pub mod ocr;
pub mod parsing;
pub mod storage;

// Re-export commonly used items
pub use config::{ArchiverConfig, ConfigError};
pub use failure_log::FailureLog;
pub use http_client::{
    ArchiveSession, HttpSession, RawResponse, ReqwestSessionFactory, SessionFactory, SessionId,
    TransportError,
};
pub use logging::{init_logging_with_config, log_system_info};
pub use metadata_store::{MetadataStore, MetadataStoreError};
pub use ocr::{OcrEngine, TesseractCli};
pub use parsing::{DetailPageParser, MetadataParser, ParsingError, ParsingResult, SearchPageParser};
pub use storage::StorageError;
