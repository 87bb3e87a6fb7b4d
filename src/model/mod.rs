//! Model module - Library entities and state containers
//!
//! - `song`: downloaded songs and the catalog entry they come from
//! - `playlist`: user playlists and their persisted form
//! - `channel`: per-artist groupings derived from the songs
//! - `observable`: snapshot + subscribe state cell
//! - `preference`: typed key/value persistence

mod channel;
mod observable;
mod playlist;
mod preference;
mod song;

pub use channel::Channel;
pub use observable::Observable;
pub use playlist::{PLACEHOLDER_THUMBNAIL, Playlist, PlaylistPreference, RemoveMode};
pub use preference::{FilePreferences, MemoryPreferences, Preference, PreferenceBackend};
pub use song::{CatalogEntry, Song, SongPreference};
