//! Listeners that connect a native player handle and the media session to
//! the playback engine

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::playback::{Player, PlayerInner};
use crate::audio::{MediaHandle, MediaStatus, PlaybackState, PositionState, SessionAction};
use crate::utils::seconds_to_time;

/// Aborts the task when dropped.
pub(crate) struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A native handle together with the task listening to its status. The
/// status task in turn owns the position poll task, so dropping the binding
/// tears both down.
pub(crate) struct Binding {
    handle: Arc<dyn MediaHandle>,
    _status_task: AbortOnDrop,
}

impl Binding {
    pub(crate) fn attach(player: &Arc<PlayerInner>, handle: Arc<dyn MediaHandle>) -> Self {
        let status = handle.status();
        let task = tokio::spawn(watch_status(
            Arc::downgrade(player),
            status,
            handle.clone(),
            player.poll_interval,
        ));
        Self {
            handle,
            _status_task: AbortOnDrop(task),
        }
    }

    pub(crate) fn handle(&self) -> &Arc<dyn MediaHandle> {
        &self.handle
    }

    /// Stop listening and hand back the native handle.
    pub(crate) fn release(self) -> Arc<dyn MediaHandle> {
        self.handle
    }
}

async fn watch_status(
    player: Weak<PlayerInner>,
    mut status: watch::Receiver<MediaStatus>,
    handle: Arc<dyn MediaHandle>,
    poll_interval: Duration,
) {
    let mut poll: Option<AbortOnDrop> = None;

    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        let Some(inner) = player.upgrade() else {
            break;
        };
        tracing::debug!(?current, "Media status changed");

        // Replacing the previous poll task aborts it
        poll = (current == MediaStatus::Running).then(|| {
            AbortOnDrop(tokio::spawn(poll_position(
                player.clone(),
                handle.clone(),
                poll_interval,
            )))
        });

        if let Some(session) = &inner.session {
            session.set_playback_state(match current {
                MediaStatus::Running => PlaybackState::Playing,
                MediaStatus::Paused => PlaybackState::Paused,
                _ => PlaybackState::None,
            });
        }
        inner.is_playing.set(current == MediaStatus::Running);
    }

    drop(poll);
    tracing::trace!("Media status listener stopped");
}

async fn poll_position(
    player: Weak<PlayerInner>,
    handle: Arc<dyn MediaHandle>,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    // The first tick completes immediately; samples start one interval in
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = player.upgrade() else {
            break;
        };
        inner.sample(handle.as_ref()).await;
    }
}

impl PlayerInner {
    async fn sample(&self, handle: &dyn MediaHandle) {
        let position = match handle.current_position().await {
            Ok(position) => position,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read position");
                return;
            }
        };
        let duration = handle.duration();

        self.duration_time.set(seconds_to_time(duration));
        if !self
            .progress_control_moving
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            let progress = if duration > 0.0 {
                position / duration * 100.0
            } else {
                0.0
            };
            self.progress_time.set(seconds_to_time(position));
            self.progress_control.set(progress);
        }

        if let Some(session) = &self.session {
            session.set_position_state(PositionState { duration, position });
        }
    }
}

impl Player {
    /// Forward media-session actions to this player for as long as it lives.
    pub(super) fn start_session_listener(&self) {
        let Some(actions) = self.inner.session.as_ref().and_then(|s| s.take_actions()) else {
            return;
        };
        tracing::info!("Starting media session listener");
        let task = tokio::spawn(listen_for_actions(Arc::downgrade(&self.inner), actions));
        *self
            .inner
            .session_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(AbortOnDrop(task));
    }
}

async fn listen_for_actions(
    player: Weak<PlayerInner>,
    mut actions: mpsc::UnboundedReceiver<SessionAction>,
) {
    while let Some(action) = actions.recv().await {
        let Some(inner) = player.upgrade() else {
            break;
        };
        let player = Player { inner };
        tracing::debug!(?action, "Media session action");

        let result = match action {
            SessionAction::Play => player.resume(),
            SessionAction::Pause => player.pause(),
            SessionAction::NextTrack => player.change_track(true),
            SessionAction::PreviousTrack => player.change_track(false),
            SessionAction::Stop => {
                player.destroy();
                Ok(())
            }
            SessionAction::SeekTo(seconds) => {
                let duration = player
                    .inner
                    .binding
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .as_ref()
                    .map(|b| b.handle().duration())
                    .unwrap_or_default();
                if duration > 0.0 {
                    player.seek_to(seconds / duration * 100.0)
                } else {
                    Ok(())
                }
            }
        };

        if let Err(e) = result {
            tracing::error!(?action, error = %e, "Media session action failed");
        }
    }
    tracing::trace!("Media session listener stopped");
}
