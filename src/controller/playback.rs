//! Playback engine
//!
//! Wraps one native [`MediaHandle`] at a time and turns its status and
//! position into observable UI state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;

use super::Library;
use super::player_events::{AbortOnDrop, Binding};
use crate::audio::{MediaFactory, MediaHandle, MediaMetadata, MediaSession, PlaybackState};
use crate::model::{Observable, Song};
use crate::utils::seconds_to_time;

/// How often the position is sampled while playing.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub(super) struct PlayerInner {
    pub(super) library: Library,
    pub(super) media: Arc<dyn MediaFactory>,
    pub(super) session: Option<Arc<dyn MediaSession>>,
    pub(super) poll_interval: Duration,

    pub(super) song: Observable<Option<Song>>,
    pub(super) is_playing: Observable<bool>,
    pub(super) progress_time: Observable<String>,
    pub(super) duration_time: Observable<String>,
    pub(super) progress_control: Observable<f64>,
    /// Set while the user drags the progress control
    pub(super) progress_control_moving: AtomicBool,

    pub(super) binding: Mutex<Option<Binding>>,
    pub(super) session_listener: Mutex<Option<AbortOnDrop>>,
}

impl PlayerInner {
    fn binding(&self) -> MutexGuard<'_, Option<Binding>> {
        self.binding.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self) -> Option<Arc<dyn MediaHandle>> {
        self.binding().as_ref().map(|b| b.handle().clone())
    }
}

/// Cheap to clone; clones drive the same native player.
#[derive(Clone)]
pub struct Player {
    pub(super) inner: Arc<PlayerInner>,
}

impl Player {
    pub fn new(
        library: Library,
        media: Arc<dyn MediaFactory>,
        session: Option<Arc<dyn MediaSession>>,
        poll_interval: Duration,
    ) -> Self {
        let player = Self {
            inner: Arc::new(PlayerInner {
                library,
                media,
                session,
                poll_interval,
                song: Observable::new(None),
                is_playing: Observable::new(false),
                progress_time: Observable::new(seconds_to_time(0.0)),
                duration_time: Observable::new(seconds_to_time(0.0)),
                progress_control: Observable::new(0.0),
                progress_control_moving: AtomicBool::new(false),
                binding: Mutex::new(None),
                session_listener: Mutex::new(None),
            }),
        };
        player.start_session_listener();
        player
    }

    pub fn song(&self) -> &Observable<Option<Song>> {
        &self.inner.song
    }

    pub fn is_playing(&self) -> &Observable<bool> {
        &self.inner.is_playing
    }

    /// `mm:ss` of the current position.
    pub fn progress_time(&self) -> &Observable<String> {
        &self.inner.progress_time
    }

    /// `mm:ss` of the loaded song's length.
    pub fn duration_time(&self) -> &Observable<String> {
        &self.inner.duration_time
    }

    /// Position as a percentage of the duration.
    pub fn progress_control(&self) -> &Observable<f64> {
        &self.inner.progress_control
    }

    pub fn is_progress_control_moving(&self) -> bool {
        self.inner.progress_control_moving.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load `song` without starting it. Any previously loaded song is stopped
    /// and its listeners dropped first.
    ///
    /// If the native player cannot open the song, nothing is loaded afterwards.
    pub fn initiate(&self, song: &Song) -> Result<()> {
        let previous = self.inner.binding().take();
        if let Some(previous) = previous {
            let handle = previous.release();
            if let Err(e) = handle.stop() {
                tracing::warn!(error = %e, "Failed to stop previous song");
            }
        }
        // The released listener never sees the stop, so report it here
        self.set_stopped();

        tracing::info!(song_id = %song.id(), title = %song.title(), "Loading song");
        let handle = match self.inner.media.create(song.path()) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(song_id = %song.id(), error = %e, "Failed to open song");
                self.inner.song.set(None);
                return Err(e);
            }
        };
        self.inner.song.set(Some(song.clone()));

        if let Some(session) = &self.inner.session {
            session.set_metadata(MediaMetadata::new(
                song.title(),
                song.author(),
                song.thumbnail(),
            ));
        }

        let binding = Binding::attach(&self.inner, handle);
        *self.inner.binding() = Some(binding);
        Ok(())
    }

    /// Load `song` and start playing it.
    pub fn play(&self, song: &Song) -> Result<()> {
        self.initiate(song)?;
        self.resume()
    }

    /// Play the song at `index` of the library, or the first song when the
    /// index is out of range. Does nothing on an empty library.
    pub fn play_index(&self, index: usize) -> Result<()> {
        let songs = self.inner.library.songs().get();
        match songs.get(index).or_else(|| songs.first()) {
            Some(song) => self.play(song),
            None => {
                tracing::debug!(index, "No songs to play");
                Ok(())
            }
        }
    }

    /// Move to the next or previous library song relative to the loaded one,
    /// wrapping at both ends. Starts from the first song when the loaded song
    /// is no longer in the library.
    pub fn change_track(&self, forward: bool) -> Result<()> {
        let Some(current) = self.inner.song.get() else {
            return Ok(());
        };
        let songs = self.inner.library.songs().get();
        if songs.is_empty() {
            return Ok(());
        }

        let last = songs.len() - 1;
        let target = match songs.iter().position(|s| s.id() == current.id()) {
            None => 0,
            Some(index) if forward => {
                if index == last {
                    0
                } else {
                    index + 1
                }
            }
            Some(index) => {
                if index == 0 {
                    last
                } else {
                    index - 1
                }
            }
        };
        tracing::debug!(forward, target, "Changing track");
        self.play_index(target)
    }

    // ========================================================================
    // Transport
    // ========================================================================

    pub fn resume(&self) -> Result<()> {
        match self.inner.handle() {
            Some(handle) => handle.play(),
            None => Ok(()),
        }
    }

    pub fn pause(&self) -> Result<()> {
        match self.inner.handle() {
            Some(handle) => handle.pause(),
            None => Ok(()),
        }
    }

    pub fn toggle_player(&self) -> Result<()> {
        if self.inner.is_playing.get() {
            self.pause()
        } else {
            self.resume()
        }
    }

    /// Seek to `percentage` (0-100) of the song. `0` is treated as `0.1`.
    /// Always ends the progress control drag.
    pub fn seek_to(&self, percentage: f64) -> Result<()> {
        let percentage = if percentage == 0.0 { 0.1 } else { percentage };
        let result = match self.inner.handle() {
            Some(handle) => {
                let position_ms = handle.duration() * (percentage / 100.0) * 1000.0;
                tracing::debug!(percentage, position_ms, "Seeking");
                handle.seek_to(position_ms)
            }
            None => Ok(()),
        };
        self.inner
            .progress_control_moving
            .store(false, Ordering::SeqCst);
        result
    }

    /// Flip the drag flag. While it is set, position samples leave
    /// `progress_control` and `progress_time` alone.
    pub fn toggle_progress_control_status(&self) {
        let was = self
            .inner
            .progress_control_moving
            .fetch_xor(true, Ordering::SeqCst);
        tracing::trace!(moving = !was, "Progress control status");
    }

    /// Preview the time under the progress control while it is dragged.
    pub fn update_progress_control(&self, progress: f64) {
        if !self.is_progress_control_moving() {
            return;
        }
        if let Some(handle) = self.inner.handle() {
            let seconds = handle.duration() / 100.0 * progress;
            self.inner.progress_time.set(seconds_to_time(seconds));
        }
    }

    /// Unload the current song, stopping it if it is playing.
    pub fn destroy(&self) {
        let was_playing = self.inner.is_playing.get();
        self.inner.song.set(None);

        let binding = self.inner.binding().take();
        if let Some(binding) = binding {
            let handle = binding.release();
            if was_playing {
                if let Err(e) = handle.stop() {
                    tracing::warn!(error = %e, "Failed to stop song");
                }
            }
        }

        self.set_stopped();
        tracing::info!(was_playing, "Player destroyed");
    }

    fn set_stopped(&self) {
        self.inner.is_playing.set(false);
        if let Some(session) = &self.inner.session {
            session.set_playback_state(PlaybackState::None);
        }
    }
}
