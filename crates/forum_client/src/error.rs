//! Error types for the session store, the REST collaborators and the chat channel.

use tokio_tungstenite::tungstenite;

/// Transport-level failure on a REST call (connection refused, timeout, broken body).
#[derive(Debug, thiserror::Error)]
#[error("network error: {0}")]
pub struct NetworkError(#[from] reqwest::Error);

/// Login failed. The session store is left untouched in every case.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The auth service answered non-2xx; `message` is its body text.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// 2xx answer that is not a usable login response.
    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    /// A logout happened while the login request was in flight.
    #[error("login superseded by logout")]
    Superseded,

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("failed to persist session: {0}")]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(NetworkError::from(e))
    }
}

/// Registration failed.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl From<reqwest::Error> for RegistrationError {
    fn from(e: reqwest::Error) -> Self {
        RegistrationError::Network(NetworkError::from(e))
    }
}

/// Failure of a forum or chat-history REST call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 401: the session has been invalidated as a side effect.
    #[error("not authorized")]
    Unauthorized,

    #[error("request failed ({status}): {message}")]
    Status { status: u16, message: String },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(NetworkError::from(e))
    }
}

/// Why a chat connection ended. Never surfaced to callers; the channel logs it
/// and schedules a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),

    #[error("connection lost: {0}")]
    Transport(#[source] tungstenite::Error),

    #[error("server closed the connection")]
    ClosedByPeer,
}

/// Persisted session read/write failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
