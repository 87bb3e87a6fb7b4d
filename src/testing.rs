//! Fixtures and in-memory collaborators shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::{mpsc, watch};

use crate::audio::{
    MediaFactory, MediaHandle, MediaMetadata, MediaSession, MediaStatus, PlaybackState,
    PositionState, SessionAction,
};
use crate::controller::{Library, PLAYLISTS_KEY, SONGS_KEY};
use crate::model::{
    CatalogEntry, MemoryPreferences, PlaylistPreference, PreferenceBackend, Song, SongPreference,
};
use crate::storage::Storage;

pub fn entry(id: &str, author: &str) -> CatalogEntry {
    CatalogEntry {
        author: author.to_string(),
        channel_id: format!("ch-{}", author),
        time: "3:07".to_string(),
        thumbnail: format!("https://img/{}.jpg", id),
        title: format!("Title {}", id),
        video_id: id.to_string(),
        view_count: "42".to_string(),
    }
}

pub fn song(id: &str, author: &str) -> Song {
    Song::new(SongPreference::from_entry(
        entry(id, author),
        format!("/data/{}", id),
    ))
}

/// An activated library whose persisted state holds `songs` (id, author)
/// and `playlists` (id, song ids). Every song has a stored file.
pub async fn seeded_library(
    songs: &[(&str, &str)],
    playlists: &[(&str, &[&str])],
) -> (Library, MemoryPreferences, Arc<MemoryStorage>) {
    let prefs = MemoryPreferences::new();
    let storage = Arc::new(MemoryStorage::default());
    seed(&prefs, &storage, songs, playlists);

    let library = Library::new(Arc::new(prefs.clone()), storage.clone());
    library.activate().await.unwrap();
    (library, prefs, storage)
}

/// Write song and playlist records into `prefs` and a file per song into
/// `storage`.
pub fn seed(
    prefs: &MemoryPreferences,
    storage: &MemoryStorage,
    songs: &[(&str, &str)],
    playlists: &[(&str, &[&str])],
) {
    let song_records: Vec<SongPreference> = songs
        .iter()
        .map(|(id, author)| {
            storage.insert(id, b"audio");
            song(id, author).export()
        })
        .collect();
    let playlist_records: Vec<PlaylistPreference> = playlists
        .iter()
        .map(|(id, ids)| PlaylistPreference {
            id: id.to_string(),
            name: format!("Playlist {}", id),
            songs: ids.iter().map(|s| s.to_string()).collect(),
        })
        .collect();
    prefs.insert_raw(SONGS_KEY, serde_json::to_string(&song_records).unwrap());
    prefs.insert_raw(
        PLAYLISTS_KEY,
        serde_json::to_string(&playlist_records).unwrap(),
    );
}

/// Memory preferences that yield to the scheduler before every write, so
/// other tasks run while a save is in flight.
pub struct YieldingPreferences(pub MemoryPreferences);

#[async_trait]
impl PreferenceBackend for YieldingPreferences {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        tokio::task::yield_now().await;
        self.0.set(key, value).await
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryStorage {
    pub fn insert(&self, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }

    /// Drop a file behind the library's back so deleting it fails.
    pub fn forget(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write_file(&self, path: &str, base64_data: &str) -> Result<String> {
        tokio::task::yield_now().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        let bytes = STANDARD.decode(base64_data)?;
        self.insert(path, &bytes);
        Ok(format!("mem://{}", path))
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("permission denied");
        }
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no such file: {}", path))
    }
}

// ============================================================================
// Native player
// ============================================================================

pub struct FakeHandle {
    status: watch::Sender<MediaStatus>,
    seeks: watch::Sender<Vec<f64>>,
    position: Mutex<f64>,
    duration: f64,
    stopped: AtomicBool,
}

impl FakeHandle {
    pub fn set_position(&self, seconds: f64) {
        *self.position.lock().unwrap() = seconds;
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.borrow().clone()
    }

    pub fn subscribe_seeks(&self) -> watch::Receiver<Vec<f64>> {
        self.seeks.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MediaStatus> {
        self.status.subscribe()
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaHandle for FakeHandle {
    fn play(&self) -> Result<()> {
        self.status.send_replace(MediaStatus::Running);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.status.send_replace(MediaStatus::Paused);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.status.send_replace(MediaStatus::Stopped);
        Ok(())
    }

    fn seek_to(&self, position_ms: f64) -> Result<()> {
        self.seeks.send_modify(|seeks| seeks.push(position_ms));
        Ok(())
    }

    async fn current_position(&self) -> Result<f64> {
        Ok(*self.position.lock().unwrap())
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn status(&self) -> watch::Receiver<MediaStatus> {
        self.status.subscribe()
    }
}

/// Hands out [`FakeHandle`]s of a fixed duration and remembers them.
pub struct FakeMedia {
    duration: f64,
    handles: Mutex<Vec<(String, Arc<FakeHandle>)>>,
    fail_next: AtomicBool,
}

impl FakeMedia {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            handles: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Make the next `create` fail as if the file could not be opened.
    pub fn fail_next_create(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<String> {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn last_handle(&self) -> Option<Arc<FakeHandle>> {
        self.handles
            .lock()
            .unwrap()
            .last()
            .map(|(_, handle)| handle.clone())
    }
}

impl MediaFactory for FakeMedia {
    fn create(&self, path: &str) -> Result<Arc<dyn MediaHandle>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("cannot open {}", path);
        }
        let handle = Arc::new(FakeHandle {
            status: watch::Sender::new(MediaStatus::None),
            seeks: watch::Sender::new(Vec::new()),
            position: Mutex::new(0.0),
            duration: self.duration,
            stopped: AtomicBool::new(false),
        });
        self.handles
            .lock()
            .unwrap()
            .push((path.to_string(), handle.clone()));
        Ok(handle)
    }
}

// ============================================================================
// Media session
// ============================================================================

pub struct FakeSession {
    metadata: Mutex<Vec<MediaMetadata>>,
    states: watch::Sender<Vec<PlaybackState>>,
    positions: watch::Sender<Vec<PositionState>>,
    actions: Mutex<Option<mpsc::UnboundedReceiver<SessionAction>>>,
}

impl FakeSession {
    pub fn new() -> (Self, mpsc::UnboundedSender<SessionAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            metadata: Mutex::new(Vec::new()),
            states: watch::Sender::new(Vec::new()),
            positions: watch::Sender::new(Vec::new()),
            actions: Mutex::new(Some(rx)),
        };
        (session, tx)
    }

    pub fn metadata(&self) -> Vec<MediaMetadata> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn subscribe_states(&self) -> watch::Receiver<Vec<PlaybackState>> {
        self.states.subscribe()
    }

    pub fn subscribe_positions(&self) -> watch::Receiver<Vec<PositionState>> {
        self.positions.subscribe()
    }
}

impl MediaSession for FakeSession {
    fn set_metadata(&self, metadata: MediaMetadata) {
        self.metadata.lock().unwrap().push(metadata);
    }

    fn set_playback_state(&self, state: PlaybackState) {
        self.states.send_modify(|states| states.push(state));
    }

    fn set_position_state(&self, state: PositionState) {
        self.positions.send_modify(|positions| positions.push(state));
    }

    fn take_actions(&self) -> Option<mpsc::UnboundedReceiver<SessionAction>> {
        self.actions.lock().unwrap().take()
    }
}
