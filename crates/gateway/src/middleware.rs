//! Request authentication and logging.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use taskhub_auth::Identity;

use crate::error::GatewayError;
use crate::state::GatewayState;

/// Raw credential from the `Authorization` header, falling back to the
/// `token` query parameter. Any `Bearer ` prefix is left in place.
pub fn request_credential(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty());
    if let Some(value) = header {
        return Some(value.to_string());
    }

    Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(mut params)| params.remove("token"))
        .filter(|token| !token.is_empty())
}

/// Caller identity verified from the request credential. Rejects with 401
/// before the handler runs.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<GatewayState>> for AuthenticatedUser {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState>,
    ) -> Result<Self, Self::Rejection> {
        let credential = request_credential(parts);
        match state.hub().authenticate(credential.as_deref()) {
            Ok(identity) => Ok(AuthenticatedUser(identity)),
            Err(err) => {
                tracing::debug!(uri = %parts.uri, error = %err, "request rejected");
                Err(err.into())
            }
        }
    }
}

pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
