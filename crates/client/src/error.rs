use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server refused the credential. Reconnecting with it is pointless.
    #[error("{0}")]
    AuthRejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("client is closed")]
    Closed,
}

impl ClientError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::AuthRejected(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
