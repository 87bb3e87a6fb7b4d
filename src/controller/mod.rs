//! Controller module - Library and playback logic
//!
//! Everything that mutates application state lives here. It is organized
//! into submodules by responsibility:
//!
//! - `library`: song/playlist/channel collections and their persistence
//! - `playback`: the playback engine driving a native player
//! - `player_events`: native status, position polling and media-session listeners

mod library;
mod playback;
mod player_events;

pub use library::{Library, Notification, NotificationLevel, PLAYLISTS_KEY, SONGS_KEY};
pub use playback::{DEFAULT_POLL_INTERVAL, Player};
