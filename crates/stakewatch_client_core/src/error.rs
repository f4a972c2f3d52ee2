//! Error type shared by every module of the client core.

use crate::requests::ValidationError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("not logged in")]
    NotAuthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A conditional write matched no row: someone else changed the record first.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("local storage: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("realtime channel: {0}")]
    Realtime(String),
}

impl Error {
    /// Network failures, rate limiting and 5xx responses. Worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Status { status, .. } => *status == 429 || *status >= 500,
            Error::Realtime(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Realtime(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        let e = Error::Status { status: 503, body: String::new() };
        assert!(e.is_transient());
        let e = Error::Status { status: 429, body: "Too Many Requests".into() };
        assert!(e.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let e = Error::Status { status: 400, body: "bad".into() };
        assert!(!e.is_transient());
        assert!(!Error::Conflict("stale".into()).is_transient());
        assert!(!Error::NotAuthenticated.is_transient());
    }
}
