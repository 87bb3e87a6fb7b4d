//! OS media-session surface (lock screen, media keys)

use std::sync::Mutex;

use tokio::sync::mpsc;

/// Artwork sizes published for every loaded song, in pixels.
pub const ARTWORK_SIZES: [u32; 6] = [96, 128, 192, 256, 384, 512];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub src: String,
    /// `"<w>x<h>"`
    pub sizes: String,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork: Vec<Artwork>,
}

impl MediaMetadata {
    /// Metadata with the same thumbnail offered at every [`ARTWORK_SIZES`].
    pub fn new(title: &str, artist: &str, thumbnail: &str) -> Self {
        let artwork = ARTWORK_SIZES
            .iter()
            .map(|size| Artwork {
                src: thumbnail.to_string(),
                sizes: format!("{}x{}", size, size),
                mime: "image/jpeg".to_string(),
            })
            .collect();
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            album: String::new(),
            artwork,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    None,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionState {
    /// Seconds
    pub duration: f64,
    /// Seconds
    pub position: f64,
}

/// Transport requests raised from outside the app.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionAction {
    Play,
    Pause,
    NextTrack,
    PreviousTrack,
    Stop,
    /// Absolute position in seconds
    SeekTo(f64),
}

pub trait MediaSession: Send + Sync {
    fn set_metadata(&self, metadata: MediaMetadata);
    fn set_playback_state(&self, state: PlaybackState);
    fn set_position_state(&self, state: PositionState);
    /// Hand over the action stream. Only the first call gets it.
    fn take_actions(&self) -> Option<mpsc::UnboundedReceiver<SessionAction>>;
}

/// Session that only writes what it is told to the log, with an action
/// sender for feeding transport requests in by hand.
pub struct TracingSession {
    actions: Mutex<Option<mpsc::UnboundedReceiver<SessionAction>>>,
}

impl TracingSession {
    pub fn new() -> (Self, mpsc::UnboundedSender<SessionAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            actions: Mutex::new(Some(rx)),
        };
        (session, tx)
    }
}

impl MediaSession for TracingSession {
    fn set_metadata(&self, metadata: MediaMetadata) {
        tracing::info!(title = %metadata.title, artist = %metadata.artist, "Now playing");
    }

    fn set_playback_state(&self, state: PlaybackState) {
        tracing::debug!(?state, "Playback state");
    }

    fn set_position_state(&self, state: PositionState) {
        tracing::trace!(duration = state.duration, position = state.position, "Position");
    }

    fn take_actions(&self) -> Option<mpsc::UnboundedReceiver<SessionAction>> {
        self.actions.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
