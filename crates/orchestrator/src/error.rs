use thiserror::Error;

/// Failure of one remote adapter call.
///
/// Adapters never retry; every failure surfaces here and is handled by the
/// state machine (timeline entry plus no-op or a defined fallback
/// transition).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Network or HTTP-level failure. Non-fatal; the next natural poller
    /// tick or operator action retries.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// No reachable exit from the requested start node.
    #[error("No safe path found")]
    NotFound,

    /// The voice session is gone. Terminal for the current session only.
    #[error("Voice session expired")]
    SessionExpired,

    /// The backend answered with a body the adapter could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Graph error: {0}")]
    Core(#[from] incident_core::CoreError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to build HTTP client: {0}")]
    ClientSetup(String),

    #[error("Orchestrator is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
