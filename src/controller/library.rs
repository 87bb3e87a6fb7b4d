//! Library manager: owns songs, playlists and channels
//!
//! Every mutation goes through here. Entity methods that need persistence
//! (`Song::destroy`, `Playlist::add`, ...) take a `&Library` and delegate to
//! the matching method below.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::broadcast;

use crate::error::{LibraryError, LibraryResult};
use crate::model::{
    CatalogEntry, Channel, Observable, Playlist, PlaylistPreference, Preference,
    PreferenceBackend, RemoveMode, Song, SongPreference,
};
use crate::storage::Storage;
use crate::utils::generate_unique_string;

/// Preference key of the song record.
pub const SONGS_KEY: &str = "songs";
/// Preference key of the playlist record.
pub const PLAYLISTS_KEY: &str = "playlists";

const NOTIFICATION_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// User-visible outcome of a library operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NotificationLevel::Info => write!(f, "{}", self.message),
            NotificationLevel::Error => write!(f, "error: {}", self.message),
        }
    }
}

struct LibraryInner {
    songs: Observable<Vec<Song>>,
    playlists: Observable<Vec<Playlist>>,
    channels: Arc<Observable<Vec<Channel>>>,
    songs_preference: Preference<Vec<SongPreference>>,
    playlists_preference: Preference<Vec<PlaylistPreference>>,
    storage: Arc<dyn Storage>,
    notifications: broadcast::Sender<Notification>,
    activated: AtomicBool,
    /// Held while a check and the in-memory mutation it guards run, never
    /// across an `.await`.
    edits: Mutex<()>,
}

/// Authoritative song, playlist and channel collections.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Library {
    inner: Arc<LibraryInner>,
}

impl Library {
    pub fn new(preferences: Arc<dyn PreferenceBackend>, storage: Arc<dyn Storage>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            inner: Arc::new(LibraryInner {
                songs: Observable::new(Vec::new()),
                playlists: Observable::new(Vec::new()),
                channels: Arc::new(Observable::new(Vec::new())),
                songs_preference: Preference::new(SONGS_KEY, preferences.clone()),
                playlists_preference: Preference::new(PLAYLISTS_KEY, preferences),
                storage,
                notifications,
                activated: AtomicBool::new(false),
                edits: Mutex::new(()),
            }),
        }
    }

    pub fn songs(&self) -> &Observable<Vec<Song>> {
        &self.inner.songs
    }

    pub fn playlists(&self) -> &Observable<Vec<Playlist>> {
        &self.inner.playlists
    }

    pub fn channels(&self) -> &Observable<Vec<Channel>> {
        &self.inner.channels
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    pub fn find_song(&self, id: &str) -> Option<Song> {
        self.inner
            .songs
            .with(|songs| songs.iter().find(|song| song.id() == id).cloned())
    }

    pub fn find_playlist(&self, id: &str) -> Option<Playlist> {
        self.inner
            .playlists
            .with(|playlists| playlists.iter().find(|p| p.id() == id).cloned())
    }

    /// Ids of the playlists containing the song, or empty if unknown.
    pub fn song_playlists(&self, id: &str) -> Vec<String> {
        self.find_song(id)
            .map(|song| song.playlists().to_vec())
            .unwrap_or_default()
    }

    fn edit(&self) -> MutexGuard<'_, ()> {
        self.inner.edits.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, notification: Notification) {
        // Nobody listening is fine
        let _ = self.inner.notifications.send(notification);
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Load persisted songs and playlists and start deriving channels.
    ///
    /// Must be called once per library; a second call fails with
    /// [`LibraryError::AlreadyActivated`].
    pub async fn activate(&self) -> LibraryResult<()> {
        if self.inner.activated.swap(true, Ordering::SeqCst) {
            tracing::error!("Library activated twice");
            return Err(LibraryError::AlreadyActivated);
        }

        let song_records = self
            .inner
            .songs_preference
            .load()
            .await?
            .unwrap_or_default();
        let mut songs: Vec<Song> = song_records.into_iter().map(Song::new).collect();

        let playlist_records = self
            .inner
            .playlists_preference
            .load()
            .await?
            .unwrap_or_default();
        let playlists = playlist_records
            .into_iter()
            .map(|record| Playlist::new(record, &songs))
            .collect::<LibraryResult<Vec<_>>>()?;

        for song in &mut songs {
            song.generate_playlists(&playlists);
        }

        tracing::info!(
            songs = songs.len(),
            playlists = playlists.len(),
            "Library loaded"
        );

        self.inner.channels.set(Channel::create(&songs));
        self.inner.songs.set(songs);
        self.inner.playlists.set(playlists);
        self.spawn_channel_listener();
        Ok(())
    }

    /// Rebuild channels on every song change. The task ends once the
    /// library (and with it the song sender) is dropped.
    fn spawn_channel_listener(&self) {
        let mut songs = self.inner.songs.subscribe();
        let channels = self.inner.channels.clone();
        tokio::spawn(async move {
            while songs.changed().await.is_ok() {
                let derived = {
                    let current = songs.borrow_and_update();
                    Channel::create(&current)
                };
                tracing::trace!(channels = derived.len(), "Channels rebuilt");
                channels.set(derived);
            }
            tracing::debug!("Channel listener stopped");
        });
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub async fn songs_save(&self) -> bool {
        let songs = &self.inner.songs;
        self.inner
            .songs_preference
            .save_with(|| songs.with(|songs| songs.iter().map(Song::export).collect()))
            .await
    }

    pub async fn playlists_save(&self) -> bool {
        let playlists = &self.inner.playlists;
        self.inner
            .playlists_preference
            .save_with(|| {
                playlists.with(|playlists| playlists.iter().map(Playlist::export).collect())
            })
            .await
    }

    /// Recompute playlist membership of the given songs from the current
    /// playlist table.
    fn regenerate_membership(&self, song_ids: &[String]) {
        let playlists = self.inner.playlists.get();
        self.inner.songs.modify(|songs| {
            for song in songs
                .iter_mut()
                .filter(|song| song_ids.iter().any(|id| id == song.id()))
            {
                song.generate_playlists(&playlists);
            }
        });
    }

    // ========================================================================
    // Songs
    // ========================================================================

    /// Store a downloaded payload and add the song to the library.
    ///
    /// On failure the song is not left in the library.
    pub async fn song_save(&self, payload: &[u8], entry: CatalogEntry) -> bool {
        let id = entry.video_id.clone();
        let title = entry.title.clone();

        if self.find_song(&id).is_some() {
            let err = LibraryError::DuplicateSong(id.clone());
            tracing::warn!(error = %err, "Refusing to save song");
            self.notify(Notification::error(format!("{} is already downloaded", title)));
            return false;
        }

        let data = STANDARD.encode(payload);
        let uri = match self.inner.storage.write_file(&id, &data).await {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(song_id = %id, error = %e, "Failed to write song");
                self.notify(Notification::error(format!("Unable to save {}", title)));
                return false;
            }
        };

        let song = Song::new(SongPreference::from_entry(entry, uri));
        let added = {
            let _edit = self.edit();
            self.inner.songs.modify(|songs| {
                let duplicate = songs.iter().any(|s| s.id() == id);
                if !duplicate {
                    songs.push(song);
                }
                !duplicate
            })
        };
        if !added {
            // The file under this id now belongs to the song saved first
            tracing::warn!(song_id = %id, "Song was saved concurrently");
            self.notify(Notification::error(format!("{} is already downloaded", title)));
            return false;
        }

        if !self.songs_save().await {
            {
                let _edit = self.edit();
                self.inner
                    .songs
                    .modify(|songs| songs.retain(|song| song.id() != id));
            }
            if let Err(e) = self.inner.storage.delete_file(&id).await {
                tracing::warn!(song_id = %id, error = %e, "Could not clean up orphaned file");
            }
            self.notify(Notification::error(format!("Unable to save {}", title)));
            return false;
        }

        tracing::info!(song_id = %id, title = %title, "Song saved");
        self.notify(Notification::info(format!("{} downloaded", title)));
        true
    }

    /// Delete a song: file first, then playlists, then the song table.
    ///
    /// Returns `false` only when the file could not be deleted, in which case
    /// nothing else changes.
    pub async fn song_delete(&self, id: &str) -> bool {
        let Some(song) = self.find_song(id) else {
            tracing::warn!(song_id = %id, "Asked to delete unknown song");
            return false;
        };

        if let Err(e) = self.inner.storage.delete_file(song.id()).await {
            tracing::error!(song_id = %id, error = %e, "Failed to delete song file");
            self.notify(Notification::error(format!(
                "Unable to delete {}",
                song.title()
            )));
            return false;
        }

        // Both collections change before anything is persisted. Membership
        // of the deleted song is not recomputed: it is gone.
        let touched_playlists = {
            let _edit = self.edit();
            let catalog = self.inner.songs.get();
            let touched = self.inner.playlists.modify(|playlists| {
                let mut touched = false;
                for playlist in playlists.iter_mut().filter(|p| p.contains(id)) {
                    playlist.remove_song(id, RemoveMode::All);
                    playlist.generate_thumbnails(&catalog);
                    touched = true;
                }
                touched
            });
            self.inner
                .songs
                .modify(|songs| songs.retain(|s| s.id() != id));
            touched
        };

        if touched_playlists && !self.playlists_save().await {
            self.notify(Notification::error("Unable to save playlists"));
        }
        if !self.songs_save().await {
            self.notify(Notification::error("Unable to save songs"));
        }

        tracing::info!(song_id = %id, "Song deleted");
        self.notify(Notification::info(format!("{} deleted", song.title())));
        true
    }

    // ========================================================================
    // Playlists
    // ========================================================================

    /// Create a playlist and return it right away. Persisting happens in the
    /// background; its outcome is reported through [`Library::notifications`].
    pub fn playlist_create(
        &self,
        name: impl Into<String>,
        song_ids: Option<Vec<String>>,
    ) -> LibraryResult<Playlist> {
        let record = PlaylistPreference {
            id: generate_unique_string(),
            name: name.into(),
            songs: song_ids.unwrap_or_default(),
        };
        let playlist = {
            let _edit = self.edit();
            let playlist = self
                .inner
                .songs
                .with(|songs| Playlist::new(record, songs))?;
            self.inner
                .playlists
                .modify(|playlists| playlists.push(playlist.clone()));
            self.regenerate_membership(playlist.song_ids());
            playlist
        };
        tracing::info!(playlist_id = %playlist.id(), name = %playlist.name(), "Playlist created");

        let library = self.clone();
        let name = playlist.name().to_string();
        tokio::spawn(async move {
            if library.playlists_save().await {
                library.notify(Notification::info(format!("{} created", name)));
            } else {
                library.notify(Notification::error(format!("Unable to create {}", name)));
            }
        });

        Ok(playlist)
    }

    pub async fn playlist_add(&self, playlist_id: &str, song_id: &str) -> bool {
        {
            let _edit = self.edit();
            let catalog = self.inner.songs.get();
            if !catalog.iter().any(|song| song.id() == song_id) {
                tracing::warn!(song_id, "Cannot add unknown song to playlist");
                return false;
            }

            let found = self.inner.playlists.modify(|playlists| {
                match playlists.iter_mut().find(|p| p.id() == playlist_id) {
                    Some(playlist) => {
                        playlist.push_song(song_id);
                        playlist.generate_thumbnails(&catalog);
                        true
                    }
                    None => false,
                }
            });
            if !found {
                tracing::warn!(playlist_id, "Playlist not found");
                return false;
            }
            self.regenerate_membership(&[song_id.to_string()]);
        }
        self.playlists_save().await
    }

    pub async fn playlist_remove(&self, playlist_id: &str, song_id: &str, mode: RemoveMode) -> bool {
        {
            let _edit = self.edit();
            let catalog = self.inner.songs.get();
            let removed = self.inner.playlists.modify(|playlists| {
                playlists
                    .iter_mut()
                    .find(|p| p.id() == playlist_id)
                    .map(|playlist| {
                        let removed = playlist.remove_song(song_id, mode);
                        playlist.generate_thumbnails(&catalog);
                        removed
                    })
            });
            let Some(removed) = removed else {
                tracing::warn!(playlist_id, "Playlist not found");
                return false;
            };

            tracing::debug!(playlist_id, song_id, removed, "Removed song from playlist");
            self.regenerate_membership(&[song_id.to_string()]);
        }
        self.playlists_save().await
    }

    pub async fn playlist_rename(&self, playlist_id: &str, name: String) -> bool {
        let found = {
            let _edit = self.edit();
            self.inner.playlists.modify(|playlists| {
                match playlists.iter_mut().find(|p| p.id() == playlist_id) {
                    Some(playlist) => {
                        playlist.set_name(name);
                        true
                    }
                    None => false,
                }
            })
        };
        if !found {
            tracing::warn!(playlist_id, "Playlist not found");
            return false;
        }
        self.playlists_save().await
    }

    /// Remove a playlist, refresh membership of its songs and persist.
    pub async fn playlist_delete(&self, playlist_id: &str) -> bool {
        let removed = {
            let _edit = self.edit();
            let removed = self.inner.playlists.modify(|playlists| {
                let index = playlists.iter().position(|p| p.id() == playlist_id)?;
                Some(playlists.remove(index))
            });
            if let Some(playlist) = &removed {
                self.regenerate_membership(playlist.song_ids());
            }
            removed
        };
        let Some(playlist) = removed else {
            tracing::warn!(playlist_id, "Playlist not found");
            return false;
        };

        tracing::info!(playlist_id, name = %playlist.name(), "Playlist deleted");

        let saved = self.playlists_save().await;
        if saved {
            self.notify(Notification::info(format!("{} deleted", playlist.name())));
        } else {
            self.notify(Notification::error(format!(
                "Unable to delete {}",
                playlist.name()
            )));
        }
        saved
    }
}
