//! Local archive storage
//!
//! The archive directory is its own checkpoint: a file named `<image>.jpg`
//! in an item folder means that image was fetched. Payloads land under a
//! `.part` name first and are renamed into place once flushed, so a crash
//! mid-write never leaves a file that looks complete.

use std::collections::HashSet;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::ImageDescriptor;

/// Characters Windows and friends refuse in path components
const UNSAFE_PATH_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Name used when a title sanitizes to nothing
pub const UNTITLED: &str = "untitled";

const PART_SUFFIX: &str = ".part";

#[derive(Error, Debug)]
#[error("{operation} failed for {}: {source}", path.display())]
pub struct StorageError {
    pub operation: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl StorageError {
    pub(crate) fn new(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Turn a page title into a single safe path component.
///
/// Each whitespace character (including the ideographic space U+3000) and each
/// of `\ / : * ? " < > |` becomes `_`; control characters are dropped. The
/// mapping is deterministic so re-runs land in the same folder.
pub fn sanitize_folder_name(title: &str) -> String {
    let sanitized: String = title
        .trim()
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .map(|c| {
            if c.is_whitespace() || UNSAFE_PATH_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        UNTITLED.to_string()
    } else {
        sanitized
    }
}

/// Whether a server-supplied image name can be used as a file stem as is.
///
/// Rejects separators, `..`, reserved and control characters so that
/// `<name>.jpg` always lands directly inside the item folder.
pub fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.chars().any(|c| UNSAFE_PATH_CHARS.contains(&c) || c.is_control())
}

/// Names of the regular files currently in `dir`; a missing directory is empty
pub async fn existing_file_names(dir: &Path) -> Result<HashSet<String>, StorageError> {
    let mut names = HashSet::new();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(StorageError::new("read_dir", dir, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::new("read_dir", dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| StorageError::new("file_type", &entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(raw) => debug!("Ignoring non UTF-8 entry {:?} in {}", raw, dir.display()),
        }
    }

    Ok(names)
}

/// Images whose `<name>.jpg` is absent from `existing`, in gallery order.
///
/// Works on the exact name sets; a descriptor repeated on the page is
/// returned once.
pub fn missing_images<'a>(
    expected: &'a [ImageDescriptor],
    existing: &HashSet<String>,
) -> Vec<&'a ImageDescriptor> {
    let mut seen = HashSet::new();
    expected
        .iter()
        .filter(|image| {
            let file_name = image.file_name();
            !existing.contains(&file_name) && seen.insert(file_name)
        })
        .collect()
}

pub async fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| StorageError::new("create_dir_all", dir, e))
}

/// Sibling path the payload is staged under
pub fn part_path(path: &Path) -> PathBuf {
    let mut staged = OsString::from(path.as_os_str());
    staged.push(PART_SUFFIX);
    PathBuf::from(staged)
}

/// Write `bytes` to `path` via a flushed `.part` file and a rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent).await?;
    }

    let staged = part_path(path);
    if let Err(e) = write_and_flush(&staged, bytes).await {
        if let Err(cleanup) = fs::remove_file(&staged).await {
            warn!("Could not remove partial file {}: {}", staged.display(), cleanup);
        }
        return Err(e);
    }

    fs::rename(&staged, path)
        .await
        .map_err(|e| StorageError::new("rename", path, e))
}

async fn write_and_flush(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| StorageError::new("create", path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StorageError::new("write", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::new("sync", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(items: &[&str]) -> HashSet<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn missing_is_the_exact_name_difference() {
        let expected = vec![
            ImageDescriptor::new("a", "1", "x"),
            ImageDescriptor::new("b", "2", "y"),
            ImageDescriptor::new("c", "3", "z"),
        ];
        let missing = missing_images(&expected, &names(&["a.jpg", "c.jpg"]));
        assert_eq!(missing, vec![&expected[1]]);
    }

    #[test]
    fn unrelated_files_do_not_count_as_present() {
        let expected = vec![ImageDescriptor::new("a", "1", "x"), ImageDescriptor::new("b", "2", "y")];
        // same count as expected, wrong names
        let existing = names(&["a.jpg.part", "notes.txt"]);
        assert_eq!(missing_images(&expected, &existing).len(), 2);
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_folder_name(" My/Title:*? "), "My_Title___");
        assert_eq!(sanitize_folder_name("宋　范寬 谿山行旅圖"), "宋_范寬_谿山行旅圖");
        assert_eq!(sanitize_folder_name("   "), UNTITLED);
        assert_eq!(sanitize_folder_name(".."), UNTITLED);
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_part_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("item").join("img1.jpg");

        write_atomic(&target, b"\xFF\xD8payload").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"\xFF\xD8payload");
        assert!(!part_path(&target).exists());
        assert_eq!(
            existing_file_names(target.parent().unwrap()).await.unwrap(),
            names(&["img1.jpg"])
        );
    }

    #[test]
    fn image_names_that_would_leave_the_folder_are_unsafe() {
        assert!(is_safe_file_stem("K2A000001N000000000PAB"));
        assert!(is_safe_file_stem("img 1.v2"));
        for name in ["", "sub/img", "..\\x", "../../escaped", "..", "a:b", "tab\tname"] {
            assert!(!is_safe_file_stem(name), "{name:?} accepted");
        }
    }

    #[tokio::test]
    async fn directories_do_not_count_as_downloaded() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("img1.jpg")).unwrap();
        std::fs::write(dir.path().join("img2.jpg"), b"x").unwrap();

        let existing = existing_file_names(dir.path()).await.unwrap();
        assert_eq!(existing, names(&["img2.jpg"]));

        let expected = vec![ImageDescriptor::new("img1", "1", "x"), ImageDescriptor::new("img2", "2", "y")];
        assert_eq!(missing_images(&expected, &existing), vec![&expected[0]]);
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let names = existing_file_names(&dir.path().join("nope")).await.unwrap();
        assert!(names.is_empty());
    }
}
