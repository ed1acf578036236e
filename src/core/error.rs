//! Error types for session orchestration and persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by the session reducers and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A response is still streaming; new submissions are rejected, not queued.
    #[error("A response is still in progress")]
    Busy,

    /// The submission was empty after trimming.
    #[error("Nothing to send")]
    EmptyInput,

    /// The session already reached its terminal state.
    #[error("Session is already complete")]
    SessionComplete,

    /// The reducer received an event that does not apply to its current state.
    #[error("Unexpected event '{event}' in state '{state}'")]
    UnexpectedEvent { event: &'static str, state: String },

    /// An operation needs a finished Ikigai profile.
    #[error("Ikigai profile is incomplete: {0}")]
    ProfileIncomplete(String),

    /// A snapshot was restored into the wrong kind of session.
    #[error("Snapshot is for a {found} session, expected {expected}")]
    SnapshotMismatch { expected: String, found: String },

    /// No model or service is configured for the current action.
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}

/// Result type for profile store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while saving or loading profiles.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// No profile with the given id.
    #[error("Profile not found: {0}")]
    NotFound(String),

    /// No data directory could be determined.
    #[error("Could not determine data directory")]
    NoDataDir,
}
