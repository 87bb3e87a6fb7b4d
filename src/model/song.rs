//! Downloaded songs and their persisted form

use serde::{Deserialize, Serialize};

use super::playlist::Playlist;
use crate::controller::Library;

/// A track as returned by the catalog search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub author: String,
    pub channel_id: String,
    /// Human readable duration, e.g. `"3:07"`
    pub time: String,
    pub thumbnail: String,
    pub title: String,
    pub video_id: String,
    pub view_count: String,
}

/// Persisted form of a [`Song`]: the catalog entry plus where it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongPreference {
    pub author: String,
    pub channel_id: String,
    pub time: String,
    pub thumbnail: String,
    pub title: String,
    pub video_id: String,
    pub view_count: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<bool>,
}

impl SongPreference {
    pub fn from_entry(entry: CatalogEntry, path: String) -> Self {
        Self {
            author: entry.author,
            channel_id: entry.channel_id,
            time: entry.time,
            thumbnail: entry.thumbnail,
            title: entry.title,
            video_id: entry.video_id,
            view_count: entry.view_count,
            path,
            downloaded: Some(true),
        }
    }
}

/// A song stored on this device.
///
/// `playlists` is derived: the ids of the playlists that currently contain
/// this song. It is never persisted and is recomputed with
/// [`Song::generate_playlists`] whenever playlist contents change.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    init: SongPreference,
    playlists: Vec<String>,
}

impl Song {
    pub fn new(init: SongPreference) -> Self {
        Self {
            init,
            playlists: Vec::new(),
        }
    }

    /// Catalog id of this song.
    pub fn id(&self) -> &str {
        &self.init.video_id
    }

    pub fn init(&self) -> &SongPreference {
        &self.init
    }

    pub fn title(&self) -> &str {
        &self.init.title
    }

    pub fn author(&self) -> &str {
        &self.init.author
    }

    pub fn thumbnail(&self) -> &str {
        &self.init.thumbnail
    }

    pub fn path(&self) -> &str {
        &self.init.path
    }

    /// Ids of the playlists this song is part of.
    pub fn playlists(&self) -> &[String] {
        &self.playlists
    }

    pub fn export(&self) -> SongPreference {
        self.init.clone()
    }

    /// Recompute [`Song::playlists`] from the given playlist table.
    pub fn generate_playlists(&mut self, playlists: &[Playlist]) {
        self.playlists = playlists
            .iter()
            .filter(|playlist| playlist.contains(self.id()))
            .map(|playlist| playlist.id().to_string())
            .collect();
    }

    /// Delete the backing file, drop the song from every playlist and from
    /// the library, then persist.
    ///
    /// Returns `false` when the file could not be deleted; nothing else is
    /// touched in that case.
    pub async fn destroy(&self, library: &Library) -> bool {
        library.song_delete(self.id()).await
    }

    pub async fn save(&self, library: &Library) -> bool {
        library.songs_save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlaylistPreference;
    use crate::testing::song;

    #[test]
    fn export_is_the_persisted_record() {
        let s = song("abc", "A");
        let exported = s.export();
        assert_eq!(exported.video_id, "abc");
        assert_eq!(exported.path, "/data/abc");
        assert_eq!(Song::new(exported.clone()).export(), exported);
    }

    #[test]
    fn generate_playlists_lists_each_containing_playlist_once() {
        let catalog = vec![song("s1", "A"), song("s2", "B")];
        let p1 = Playlist::new(
            PlaylistPreference {
                id: "p1".into(),
                name: "One".into(),
                songs: vec!["s1".into(), "s1".into()],
            },
            &catalog,
        )
        .unwrap();
        let p2 = Playlist::new(
            PlaylistPreference {
                id: "p2".into(),
                name: "Two".into(),
                songs: vec!["s2".into()],
            },
            &catalog,
        )
        .unwrap();

        let mut s1 = catalog[0].clone();
        s1.generate_playlists(&[p1, p2]);
        assert_eq!(s1.playlists(), ["p1".to_string()]);
    }

    #[test]
    fn catalog_entry_parses_search_payload() {
        let json = r#"{"author":"A","channel_id":"c","time":"1:00","thumbnail":"t",
            "title":"T","video_id":"v","view_count":"10"}"#;
        let entry: CatalogEntry = serde_json::from_str(json).unwrap();
        let pref = SongPreference::from_entry(entry, "/data/v".into());
        assert_eq!(pref.downloaded, Some(true));
        assert_eq!(pref.path, "/data/v");
    }
}
