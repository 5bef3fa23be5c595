//! services/api/src/adapters/store.rs
//!
//! Local-disk implementation of the `DocumentStore` port. Uploaded novels and
//! generated illustrations live under the configured upload directory.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use visnovel_core::ports::{DocumentStore, FileStamp, PortError, PortResult};

#[derive(Clone, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PortError {
    match e.kind() {
        ErrorKind::NotFound => PortError::NotFound(format!("File {} not found", path.display())),
        _ => PortError::Unexpected(format!("{}: {}", path.display(), e)),
    }
}

#[async_trait]
impl DocumentStore for LocalFileStore {
    async fn stamp(&self, path: &Path) -> PortResult<FileStamp> {
        let metadata = fs::metadata(path).await.map_err(|e| io_error(path, e))?;
        Ok(FileStamp {
            path: path.to_path_buf(),
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    /// Reads the file as UTF-8, replacing invalid sequences rather than failing.
    async fn read_text(&self, path: &Path) -> PortResult<String> {
        let bytes = fs::read(path).await.map_err(|e| io_error(path, e))?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> PortResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        fs::write(path, bytes).await.map_err(|e| io_error(path, e))
    }

    /// Removing a file that is already gone is not an error.
    async fn remove(&self, path: &Path) -> PortResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("visnovel-store-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn write_creates_directories_and_round_trips_text() {
        let dir = scratch_dir();
        let path = dir.join("novels").join("a.txt");
        let store = LocalFileStore::new();

        store.write(&path, "one two three".as_bytes()).await.unwrap();
        assert_eq!(store.read_text(&path).await.unwrap(), "one two three");

        let stamp = store.stamp(&path).await.unwrap();
        assert_eq!(stamp.len, 13);
        assert_eq!(stamp.path, path);

        store.write(&path, "one two three four".as_bytes()).await.unwrap();
        assert_ne!(store.stamp(&path).await.unwrap(), stamp);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let dir = scratch_dir();
        let path = dir.join("latin1.txt");
        let store = LocalFileStore::new();

        store.write(&path, &[b'c', b'a', b'f', 0xE9]).await.unwrap();
        assert_eq!(store.read_text(&path).await.unwrap(), "caf\u{FFFD}");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn missing_files_are_not_found_and_removal_is_idempotent() {
        let store = LocalFileStore::new();
        let path = scratch_dir().join("gone.txt");

        assert!(matches!(store.stamp(&path).await, Err(PortError::NotFound(_))));
        assert!(matches!(store.read_text(&path).await, Err(PortError::NotFound(_))));
        store.remove(&path).await.unwrap();
    }
}
