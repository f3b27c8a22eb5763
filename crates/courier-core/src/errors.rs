use crate::domain::Identity;

/// Core error type for courier.
///
/// Adapter crates map their specific errors into this type so the engine and
/// the HTTP layer can treat failures consistently (caller error vs transport).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("identity {0} is already registered")]
    AlreadyActive(Identity),

    #[error("an active session already exists for {0}")]
    SessionExists(Identity),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no active session for {0}")]
    NoActiveSession(Identity),

    #[error("no usable messages (all lines are blank)")]
    EmptyMessageSet,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Failures caused by the remote side rather than the request itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
