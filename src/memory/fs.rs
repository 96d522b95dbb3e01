//! File-system collaborator used by citation validation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Existence and content lookup by path.
/// Real implementation: `LocalFileSystem`. Test double: `InMemoryFileSystem`.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// File contents, or `None` if the file does not exist.
    async fn read_to_string(&self, path: &Path) -> Result<Option<String>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))
    }

    async fn read_to_string(&self, path: &Path) -> Result<Option<String>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}
