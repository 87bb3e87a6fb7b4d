//! Native audio player abstraction
//!
//! The playback engine only talks to [`MediaFactory`] / [`MediaHandle`]. A
//! real output backend built on rodio is available behind the `rodio` feature.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

mod session;

#[cfg(feature = "rodio")]
mod rodio_backend;

#[cfg(feature = "rodio")]
pub use rodio_backend::RodioFactory;
pub use session::{
    ARTWORK_SIZES, Artwork, MediaMetadata, MediaSession, PlaybackState, PositionState,
    SessionAction, TracingSession,
};

/// Coarse state reported by a native player handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaStatus {
    #[default]
    None,
    Starting,
    Running,
    Paused,
    Stopped,
}

/// One loaded audio file.
#[async_trait]
pub trait MediaHandle: Send + Sync {
    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    /// Jump to an absolute offset in milliseconds.
    fn seek_to(&self, position_ms: f64) -> Result<()>;
    /// Current position in seconds.
    async fn current_position(&self) -> Result<f64>;
    /// Total length in seconds; `0.0` while unknown.
    fn duration(&self) -> f64;
    /// Every status transition of this handle.
    fn status(&self) -> watch::Receiver<MediaStatus>;
}

/// Opens audio files for playback.
pub trait MediaFactory: Send + Sync {
    fn create(&self, path: &str) -> Result<Arc<dyn MediaHandle>>;
}
