//! Core of the Amerpire music player: a persisted library of downloaded
//! songs, playlists and per-artist channels, and a playback engine over a
//! native audio player.

pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;

pub use controller::{Library, Notification, Player};
pub use error::{LibraryError, LibraryResult};
