use thiserror::Error;

/// Failure taxonomy for the sync engine.
///
/// `Transport` is the only retryable variant; everything else is terminal for
/// the operation that produced it. Webhook and scheduler entry points catch
/// and log, the edit path propagates to the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network-level failure talking to the remote API. Safe to retry.
    #[error("could not reach the remote API: {0}")]
    Transport(String),

    /// The remote API answered with a non-2xx status or a fatal GraphQL
    /// error. Carries the remote detail verbatim.
    #[error("remote API rejected the request: {0}")]
    RemoteRejected(String),

    /// A malformed local changeset, rejected before any remote call.
    #[error("{0}")]
    Validation(String),

    /// The remote copy is newer than the state the caller edited against.
    #[error("item changed remotely; refetch before editing")]
    Conflict,

    /// A required field or option could not be resolved on the remote
    /// project. The board needs to be configured, this is not a bug.
    #[error("project is not configured for this operation: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}
