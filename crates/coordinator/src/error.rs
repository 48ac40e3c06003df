use thiserror::Error;

/// Why the player could not be reached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Unavailable {
    #[error("player isn't running")]
    HostNotRunning,

    #[error("local control helper isn't running")]
    HelperNotRunning,

    #[error("couldn't connect to the player")]
    ConnectRefused,

    #[error("couldn't connect to the player: {0}")]
    ConnectFailed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Recoverable by the user; the caller decides whether to retry.
    #[error("player unavailable: {reason}")]
    PlayerUnavailable { reason: Unavailable },

    #[error("no track is currently playing")]
    NoActiveTrack,

    #[error("recorder launch failed for session {session_id}: {reason}")]
    RecorderLaunchFailed { session_id: u64, reason: String },
}

impl CoordinatorError {
    pub fn unavailable(reason: Unavailable) -> Self {
        CoordinatorError::PlayerUnavailable { reason }
    }
}
