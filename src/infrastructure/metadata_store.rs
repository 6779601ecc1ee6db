//! Metadata persistence: one pretty JSON document per artifact plus a shared
//! CSV table with one row per artifact.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::storage::{StorageError, ensure_dir, write_atomic};
use crate::domain::ArtifactMetadata;

#[derive(Error, Debug)]
pub enum MetadataStoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
}

pub struct MetadataStore {
    json_dir: PathBuf,
    csv_path: PathBuf,
    csv_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(json_dir: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            json_dir: json_dir.into(),
            csv_path: csv_path.into(),
            csv_lock: Mutex::new(()),
        }
    }

    pub fn json_path(&self, unique_id: &str) -> PathBuf {
        self.json_dir.join(format!("artifact_{unique_id}.json"))
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Whether a JSON document for `unique_id` is already on disk
    pub async fn contains(&self, unique_id: &str) -> bool {
        tokio::fs::try_exists(self.json_path(unique_id)).await.unwrap_or(false)
    }

    pub async fn save(&self, metadata: &ArtifactMetadata) -> Result<PathBuf, MetadataStoreError> {
        let path = self.json_path(&metadata.unique_id);
        write_atomic(&path, &pretty_json(metadata)?).await?;
        self.append_csv_row(metadata).await?;
        debug!("Saved metadata for {} to {}", metadata.unique_id, path.display());
        Ok(path)
    }

    async fn append_csv_row(&self, metadata: &ArtifactMetadata) -> Result<(), MetadataStoreError> {
        let _guard = self.csv_lock.lock().await;

        let needs_header = match tokio::fs::metadata(&self.csv_path).await {
            Ok(existing) => existing.len() == 0,
            Err(_) => true,
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        if needs_header {
            writer.write_record(ArtifactMetadata::csv_headers())?;
        }
        writer.write_record(metadata.csv_record()?)?;
        let bytes = writer
            .into_inner()
            .map_err(|e| StorageError::new("csv", &self.csv_path, e.into_error()))?;

        if let Some(parent) = self.csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .await
            .map_err(|e| StorageError::new("open", &self.csv_path, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| StorageError::new("append", &self.csv_path, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::new("flush", &self.csv_path, e))?;
        Ok(())
    }
}

/// Four-space indented UTF-8 JSON
fn pretty_json(value: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(buf)
}
