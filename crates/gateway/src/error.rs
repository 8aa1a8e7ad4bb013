//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use taskhub_auth::AuthError;
use taskhub_realtime::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    Authentication(#[from] AuthError),

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Storage(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine readable error kind placed in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Authentication(_) => "authentication_error",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Storage(_) => "storage_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) | StoreError::ReceiverNotFound(id) => {
                GatewayError::NotFound(format!("user {id}"))
            }
            StoreError::Backend(message) => GatewayError::Storage(message),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InvalidRequest(err.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
