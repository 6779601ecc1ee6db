//! Append-only failure log
//!
//! One JSON object per line. Lines are only ever appended; the file is the
//! record of images that need manual follow-up.

use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use super::storage::{StorageError, ensure_dir};
use crate::domain::FailureRecord;

#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    // held for the whole open/append/flush
    write_lock: Mutex<()>,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &FailureRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| StorageError::new("serialize", &self.path, e.into()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StorageError::new("open", &self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::new("append", &self.path, e))?;
        file.flush().await.map_err(|e| StorageError::new("flush", &self.path, e))?;

        info!(
            "📝 Recorded failure for {} ({}) in {}",
            record.image_info.name,
            record.detail_page_url,
            self.path.display()
        );
        Ok(())
    }

    /// Number of records currently in the log
    pub async fn count(&self) -> Result<usize, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents.lines().filter(|l| !l.trim().is_empty()).count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StorageError::new("read", &self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ImageDescriptor;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let log = FailureLog::new(dir.path().join("out").join("failed_images.log"));
        assert_eq!(log.count().await.unwrap(), 0);

        let image = ImageDescriptor::new("img1", "1", "AB");
        log.append(&FailureRecord::new("https://x/Detail/1", &image, None)).await.unwrap();
        log.append(&FailureRecord::new("https://x/Detail/2", &image, Some(2))).await.unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["image_info"]["name"], "img1");
        assert!(first.get("index").is_none());
        let second: FailureRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.index, Some(2));
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(FailureLog::new(dir.path().join("failed.log")));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let image = ImageDescriptor::new(format!("img{i}"), i.to_string(), "C");
                    log.append(&FailureRecord::new("u", &image, Some(i))).await.unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 16);
        for line in contents.lines() {
            serde_json::from_str::<FailureRecord>(line).unwrap();
        }
    }
}
