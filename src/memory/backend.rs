//! Storage backends for the conversation document
//!
//! A backend only moves opaque documents around; decoding and the size bound
//! live in [`MemoryStore`](super::MemoryStore).

use crate::{HalcyonError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Durable home of the serialized conversation log
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Read the whole document. `Ok(None)` when no document exists.
    async fn read(&self) -> Result<Option<String>>;

    /// Replace the whole document.
    async fn write(&self, document: &str) -> Result<()>;

    /// Remove the document. Removing an absent document is not an error.
    async fn remove(&self) -> Result<()>;

    /// Whether a document currently exists
    async fn exists(&self) -> bool;

    /// Short human-readable description for health output and logs
    fn describe(&self) -> String;
}

/// JSON document on the local filesystem
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp path, distinct for every write in this process
    fn temp_path(&self) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "memory".into());
        name.push(format!(".{}.{}.tmp", std::process::id(), seq));
        self.path.with_file_name(name)
    }

    fn storage_error(&self, action: &str, e: std::io::Error) -> HalcyonError {
        HalcyonError::Storage(format!("failed to {} {}: {}", action, self.path.display(), e))
    }
}

#[async_trait]
impl MemoryBackend for FileBackend {
    async fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.storage_error("read", e)),
        }
    }

    async fn write(&self, document: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.storage_error("create directory for", e))?;
            }
        }

        // Write beside the target, then rename over it.
        let temp = self.temp_path();
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .await
            .map_err(|e| self.storage_error("open temp file for", e))?;
        file.write_all(document.as_bytes())
            .await
            .map_err(|e| self.storage_error("write", e))?;
        file.flush().await.map_err(|e| self.storage_error("flush", e))?;
        file.sync_all().await.map_err(|e| self.storage_error("sync", e))?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.storage_error("replace", e));
        }
        debug!("Wrote {} bytes to {}", document.len(), self.path.display());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_error("remove", e)),
        }
    }

    async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Process-local backend; nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    document: Mutex<Option<String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing document, e.g. to simulate corruption in tests
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Some(document.into())),
        }
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn read(&self) -> Result<Option<String>> {
        Ok(self.document.lock().await.clone())
    }

    async fn write(&self, document: &str) -> Result<()> {
        *self.document.lock().await = Some(document.to_string());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        *self.document.lock().await = None;
        Ok(())
    }

    async fn exists(&self) -> bool {
        self.document.lock().await.is_some()
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_backend_missing_document() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("memory.json"));
        assert!(backend.read().await.unwrap().is_none());
        assert!(!backend.exists().await);
    }

    #[tokio::test]
    async fn test_file_backend_write_creates_parents_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("memory.json");
        let backend = FileBackend::new(&path);

        backend.write("[1]").await.unwrap();
        backend.write("[2]").await.unwrap();

        assert_eq!(backend.read().await.unwrap().as_deref(), Some("[2]"));
        assert_eq!(leftover_temp_files(&path), 0);
    }

    fn leftover_temp_files(path: &Path) -> usize {
        std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn test_temp_paths_are_distinct_siblings() {
        let backend = FileBackend::new("/data/memory.json");
        let first = backend.temp_path();
        let second = backend.temp_path();
        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(Path::new("/data")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_backend_concurrent_writes_all_succeed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.json");
        let backend = std::sync::Arc::new(FileBackend::new(&path));
        let documents: Vec<String> = (0..16).map(|i| format!("[{}]", "7,".repeat(500 + i) + "7")).collect();

        let tasks: Vec<_> = documents
            .iter()
            .cloned()
            .map(|doc| {
                let backend = backend.clone();
                tokio::spawn(async move { backend.write(&doc).await })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let stored = backend.read().await.unwrap().unwrap();
        assert!(documents.contains(&stored));
        assert_eq!(leftover_temp_files(&path), 0);
    }

    #[tokio::test]
    async fn test_file_backend_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("memory.json"));
        backend.write("[]").await.unwrap();

        backend.remove().await.unwrap();
        backend.remove().await.unwrap();
        assert!(!backend.exists().await);
    }

    #[tokio::test]
    async fn test_file_backend_unwritable_location() {
        let dir = TempDir::new().unwrap();
        // A regular file cannot act as a parent directory.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let backend = FileBackend::new(blocker.join("memory.json"));

        let err = backend.write("[]").await.unwrap_err();
        assert!(matches!(err, HalcyonError::Storage(_)));
    }

    #[tokio::test]
    async fn test_in_memory_backend() {
        let backend = InMemoryBackend::new();
        assert!(!backend.exists().await);
        backend.write("doc").await.unwrap();
        assert_eq!(backend.read().await.unwrap().as_deref(), Some("doc"));
        backend.remove().await.unwrap();
        assert!(backend.read().await.unwrap().is_none());
    }
}
