//! Durable storage for downloaded audio payloads

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Filesystem collaborator: files are addressed by a name relative to the
/// storage root and written from base64 data.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `base64_data` to `path` and return the URI the file can be
    /// opened with.
    async fn write_file(&self, path: &str, base64_data: &str) -> Result<String>;
    async fn delete_file(&self, path: &str) -> Result<()>;
}

/// Stores files in a directory on the local filesystem.
pub struct DataDirectory {
    root: PathBuf,
}

impl DataDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !plain {
            bail!("refusing to touch {:?} outside the data directory", path);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Storage for DataDirectory {
    async fn write_file(&self, path: &str, base64_data: &str) -> Result<String> {
        let target = self.resolve(path)?;
        let bytes = STANDARD
            .decode(base64_data)
            .context("payload is not valid base64")?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating {}", self.root.display()))?;
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("writing {}", target.display()))?;

        tracing::debug!(path = %target.display(), "Wrote file");
        Ok(target.to_string_lossy().into_owned())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        tokio::fs::remove_file(&target)
            .await
            .with_context(|| format!("deleting {}", target.display()))?;
        tracing::debug!(path = %target.display(), "Deleted file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DataDirectory::new(dir.path().join("songs"));

        let uri = storage
            .write_file("abc", &STANDARD.encode(b"ID3 audio"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&uri).unwrap(), b"ID3 audio");

        storage.delete_file("abc").await.unwrap();
        assert!(!Path::new(&uri).exists());
        assert!(storage.delete_file("abc").await.is_err());
    }

    #[tokio::test]
    async fn rejects_paths_escaping_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DataDirectory::new(dir.path());
        assert!(storage.write_file("../evil", "").await.is_err());
        assert!(storage.delete_file("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn rejects_invalid_base64() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DataDirectory::new(dir.path());
        assert!(storage.write_file("abc", "***").await.is_err());
    }
}
