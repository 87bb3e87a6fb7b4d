//! User playlists

use serde::{Deserialize, Serialize};

use super::song::Song;
use crate::controller::Library;
use crate::error::{LibraryError, LibraryResult};

/// Shown in place of song artwork when a playlist is empty.
pub const PLACEHOLDER_THUMBNAIL: &str = "assets/images/placeholder.png";

/// Persisted form of a [`Playlist`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistPreference {
    pub id: String,
    pub name: String,
    /// Catalog ids, in playlist order. May repeat.
    pub songs: Vec<String>,
}

/// How many occurrences [`Playlist::remove`] drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    /// Only the first occurrence
    First,
    /// Every occurrence
    All,
}

/// An ordered, user-named list of songs.
///
/// The song sequence is stored as catalog ids only; [`Playlist::songs`]
/// resolves it against the library's song table on demand, so the persisted
/// and materialized views cannot drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    id: String,
    name: String,
    songs: Vec<String>,
    thumbnails: Vec<String>,
}

impl Playlist {
    /// Materialize a playlist from its persisted record, resolving every
    /// song id against `catalog`.
    pub fn new(init: PlaylistPreference, catalog: &[Song]) -> LibraryResult<Self> {
        let mut playlist = Self {
            id: init.id,
            name: init.name,
            songs: init.songs,
            thumbnails: Vec::new(),
        };
        playlist.generate_songs(catalog)?;
        Ok(playlist)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn song_ids(&self) -> &[String] {
        &self.songs
    }

    pub fn thumbnails(&self) -> &[String] {
        &self.thumbnails
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn contains(&self, song_id: &str) -> bool {
        self.songs.iter().any(|id| id == song_id)
    }

    /// The songs of this playlist, in order, looked up in `catalog`.
    pub fn songs<'a>(&self, catalog: &'a [Song]) -> Vec<&'a Song> {
        self.songs
            .iter()
            .filter_map(|id| catalog.iter().find(|song| song.id() == id))
            .collect()
    }

    pub fn export(&self) -> PlaylistPreference {
        PlaylistPreference {
            id: self.id.clone(),
            name: self.name.clone(),
            songs: self.songs.clone(),
        }
    }

    /// Check that every song id resolves in `catalog`, then rebuild the
    /// thumbnails.
    ///
    /// A dangling id means the song and playlist records drifted apart and
    /// is reported as [`LibraryError::MissingSong`].
    pub fn generate_songs(&mut self, catalog: &[Song]) -> LibraryResult<()> {
        if let Some(missing) = self
            .songs
            .iter()
            .find(|id| !catalog.iter().any(|song| song.id() == id.as_str()))
        {
            return Err(LibraryError::MissingSong {
                playlist: self.id.clone(),
                song: missing.clone(),
            });
        }
        self.generate_thumbnails(catalog);
        Ok(())
    }

    /// Must run after every change to the song sequence.
    pub fn generate_thumbnails(&mut self, catalog: &[Song]) {
        self.thumbnails = self
            .songs(catalog)
            .into_iter()
            .map(|song| song.thumbnail().to_string())
            .collect();
        if self.thumbnails.is_empty() {
            self.thumbnails.push(PLACEHOLDER_THUMBNAIL.to_string());
        }
    }

    pub(crate) fn push_song(&mut self, song_id: &str) {
        self.songs.push(song_id.to_string());
    }

    /// Returns how many entries were dropped.
    pub(crate) fn remove_song(&mut self, song_id: &str, mode: RemoveMode) -> usize {
        match mode {
            RemoveMode::First => match self.songs.iter().position(|id| id == song_id) {
                Some(index) => {
                    self.songs.remove(index);
                    1
                }
                None => 0,
            },
            RemoveMode::All => {
                let before = self.songs.len();
                self.songs.retain(|id| id != song_id);
                before - self.songs.len()
            }
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Append `song` and persist.
    pub async fn add(&self, library: &Library, song: &Song) -> bool {
        library.playlist_add(&self.id, song.id()).await
    }

    /// Drop `song` (first or every occurrence) and persist.
    pub async fn remove(&self, library: &Library, song: &Song, mode: RemoveMode) -> bool {
        library.playlist_remove(&self.id, song.id(), mode).await
    }

    pub async fn rename(&self, library: &Library, name: impl Into<String>) -> bool {
        library.playlist_rename(&self.id, name.into()).await
    }

    /// Remove this playlist from the library and persist the rest.
    pub async fn destroy(&self, library: &Library) -> bool {
        library.playlist_delete(&self.id).await
    }

    pub async fn save(&self, library: &Library) -> bool {
        library.playlists_save().await
    }
}
