//! Per-artist groupings derived from the song table

use futures::stream::{self, StreamExt};

use super::playlist::Playlist;
use super::song::Song;
use crate::controller::Library;
use crate::error::LibraryResult;

/// All songs of one author. Rebuilt from scratch whenever the songs change;
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    name: String,
    songs: Vec<Song>,
    thumbnails: Vec<String>,
}

impl Channel {
    /// Group `songs` by author, keeping the order in which authors first
    /// appear and the insertion order inside each group.
    pub fn create(songs: &[Song]) -> Vec<Channel> {
        let mut channels: Vec<Channel> = Vec::new();
        for song in songs {
            match channels.iter_mut().find(|c| c.name == song.author()) {
                Some(channel) => channel.songs.push(song.clone()),
                None => channels.push(Channel {
                    name: song.author().to_string(),
                    songs: vec![song.clone()],
                    thumbnails: Vec::new(),
                }),
            }
        }
        for channel in &mut channels {
            channel.thumbnails = channel
                .songs
                .iter()
                .map(|song| song.thumbnail().to_string())
                .collect();
        }
        channels
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn thumbnails(&self) -> &[String] {
        &self.thumbnails
    }

    /// Delete every song of this channel, one after another. One result per
    /// song, in order.
    pub async fn destroy(&self, library: &Library) -> Vec<bool> {
        stream::iter(&self.songs)
            .then(|song| song.destroy(library))
            .collect::<Vec<_>>()
            .await
    }

    /// Snapshot the channel's songs into a new playlist of the same name.
    pub fn create_playlist(&self, library: &Library) -> LibraryResult<Playlist> {
        library.playlist_create(
            self.name.clone(),
            Some(self.songs.iter().map(|song| song.id().to_string()).collect()),
        )
    }
}
