use thiserror::Error;

/// Errors surfaced by the session core.
///
/// Fetch-level `Network` failures are normally swallowed (and logged) at the
/// refresh coordinator boundary; the lifecycle and toggle operations return
/// them to the caller so destructive actions can be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A backend call or fetch failed
    #[error("network failure: {0}")]
    Network(String),

    /// The requested operation is not allowed in the current state
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The push connection could not be established or dropped
    #[error("channel failure: {0}")]
    Channel(String),

    /// The durable intent store could not be read or written
    #[error("storage failure: {0}")]
    Storage(String),

    /// The desktop host could not carry out a bridge request
    #[error("bridge failure: {0}")]
    Bridge(String),

    /// A payload could not be decoded
    #[error("decode failure: {format} - {message}")]
    Decode {
        format: &'static str,
        message: String,
    },
}

impl SessionError {
    pub fn precondition(message: impl Into<String>) -> Self {
        SessionError::PreconditionFailed(message.into())
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, SessionError::PreconditionFailed(_))
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Decode {
            format: "JSON",
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
