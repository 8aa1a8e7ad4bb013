use thiserror::Error;

/// Failures reported by the message and presence stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("receiver {0} not found")]
    ReceiverNotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),
    #[error("Receiver not found")]
    UnknownReceiver,
    #[error("Failed to send message")]
    Storage(#[source] StoreError),
}

impl RelayError {
    /// Text sent back to the originating session in `messageError`.
    pub fn client_message(&self) -> String {
        self.to_string()
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ReceiverNotFound(_) => RelayError::UnknownReceiver,
            other => RelayError::Storage(other),
        }
    }
}
