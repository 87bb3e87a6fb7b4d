//! Typed key/value persistence on top of a string store

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::LibraryError;

/// Durable string store keyed by name.
#[async_trait]
pub trait PreferenceBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// One JSON document per key inside a directory.
pub struct FilePreferences {
    dir: PathBuf,
}

impl FilePreferences {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl PreferenceBackend for FilePreferences {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        // Write then rename so a crash never leaves half a snapshot behind.
        // Each write gets its own tmp file; a shared one can be renamed away
        // under a concurrent writer.
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Process-local store, handy for tests and embedding.
#[derive(Clone, Default)]
pub struct MemoryPreferences {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn insert_raw(&self, key: &str, value: impl Into<String>) {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.into());
    }
}

#[async_trait]
impl PreferenceBackend for MemoryPreferences {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.insert_raw(key, value);
        Ok(())
    }
}

/// A single typed record stored under `key`.
///
/// Saves of one record never overlap: each waits for the previous one to
/// reach the backend.
pub struct Preference<T> {
    key: String,
    backend: Arc<dyn PreferenceBackend>,
    writing: AsyncMutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> Preference<T> {
    pub fn new(key: impl Into<String>, backend: Arc<dyn PreferenceBackend>) -> Self {
        Self {
            key: key.into(),
            backend,
            writing: AsyncMutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Persist `data`. Failures are logged and reported as `false`.
    pub async fn save(&self, data: &T) -> bool {
        let _writing = self.writing.lock().await;
        self.write(data).await
    }

    /// Persist the value `snapshot` returns. The snapshot is taken once the
    /// earlier saves are done, so the last save to finish always carries the
    /// newest state.
    pub async fn save_with(&self, snapshot: impl FnOnce() -> T) -> bool {
        let _writing = self.writing.lock().await;
        let data = snapshot();
        self.write(&data).await
    }

    async fn write(&self, data: &T) -> bool {
        let value = match serde_json::to_string(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Preference failed to serialize");
                return false;
            }
        };

        match self.backend.set(&self.key, value).await {
            Ok(()) => {
                tracing::debug!(key = %self.key, "Saved preference");
                true
            }
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Preference failed to save");
                false
            }
        }
    }

    /// Load the record. `Ok(None)` when nothing has been stored yet; a record
    /// that does not parse is a hard error.
    pub async fn load(&self) -> Result<Option<T>, LibraryError> {
        let raw = self.backend.get(&self.key).await?;
        match raw {
            Some(value) if !value.is_empty() => {
                let parsed = serde_json::from_str(&value).map_err(|source| {
                    tracing::error!(key = %self.key, error = %source, "Preference failed to parse");
                    LibraryError::CorruptPreference {
                        key: self.key.clone(),
                        source,
                    }
                })?;
                tracing::debug!(key = %self.key, "Loaded preference");
                Ok(Some(parsed))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_of_missing_key_is_absent() {
        let pref: Preference<Vec<String>> =
            Preference::new("songs", Arc::new(MemoryPreferences::new()));
        assert!(pref.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let backend = MemoryPreferences::new();
        backend.insert_raw("songs", "{not json");
        let pref: Preference<Vec<String>> = Preference::new("songs", Arc::new(backend));

        let err = pref.load().await.unwrap_err();
        assert!(matches!(err, LibraryError::CorruptPreference { ref key, .. } if key == "songs"));
    }

    #[tokio::test]
    async fn file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FilePreferences::new(dir.path().join("prefs")));
        let pref: Preference<Vec<String>> = Preference::new("playlists", backend.clone());

        assert!(pref.save(&vec!["a".to_string(), "b".to_string()]).await);
        let loaded = pref.load().await.unwrap().unwrap();
        assert_eq!(loaded, vec!["a", "b"]);
        assert!(dir.path().join("prefs/playlists.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_file_saves_keep_the_newest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FilePreferences::new(dir.path()));
        let pref: Arc<Preference<Vec<u32>>> = Arc::new(Preference::new("songs", backend));
        let latest = Arc::new(std::sync::Mutex::new(Vec::new()));

        let saves: Vec<_> = (0..20u32)
            .map(|n| {
                let pref = pref.clone();
                let latest = latest.clone();
                tokio::spawn(async move {
                    pref.save_with(|| {
                        let mut latest = latest.lock().unwrap();
                        latest.push(n);
                        latest.clone()
                    })
                    .await
                })
            })
            .collect();
        for save in saves {
            assert!(save.await.unwrap());
        }

        let stored = pref.load().await.unwrap().unwrap();
        assert_eq!(stored.len(), 20);
        assert_eq!(stored, *latest.lock().unwrap());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "tmp files left behind");
    }

    struct FailingBackend;

    #[async_trait]
    impl PreferenceBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: String) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test]
    async fn save_failure_reports_false() {
        let pref: Preference<u32> = Preference::new("n", Arc::new(FailingBackend));
        assert!(!pref.save(&3).await);
    }
}
