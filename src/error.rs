//! Error types shared by the library core

use thiserror::Error;

/// Errors that abort a library operation.
///
/// Recoverable failures (a preference write that did not go through, a file
/// that could not be written or deleted) are reported as `false` plus a
/// [`Notification`](crate::controller::Notification) instead.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The stored value exists but does not parse: the record is corrupted.
    #[error("preference `{key}` is corrupted: {source}")]
    CorruptPreference {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A playlist refers to a song the song record does not contain.
    #[error("playlist `{playlist}` references unknown song `{song}`")]
    MissingSong { playlist: String, song: String },

    #[error("library has already been activated")]
    AlreadyActivated,

    #[error("song `{0}` is already in the library")]
    DuplicateSong(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type LibraryResult<T, E = LibraryError> = Result<T, E>;
