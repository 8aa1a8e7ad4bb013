//! Credential verification for socket handshakes and REST calls.
//!
//! Token issuance belongs to the platform's login flow; this crate only
//! needs to turn a bearer credential into an [`Identity`]. [`JwtManager`]
//! can also mint tokens so that tests and the dev console have something
//! to connect with.

mod identity;
mod jwt;

pub use identity::{Identity, Role, UserId};
pub use jwt::{Claims, JwtManager};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication error: no token provided")]
    MissingCredential,
    #[error("jwt expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("Authentication error: token carries no user id")]
    MissingSubject,
    #[error("token creation failed: {0}")]
    Issue(String),
}

/// Turns a bearer credential into the identity it was issued for.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Strips an optional `Bearer ` prefix and surrounding whitespace.
///
/// ```
/// use taskhub_auth::strip_bearer;
///
/// assert_eq!(strip_bearer("Bearer abc.def"), Some("abc.def"));
/// assert_eq!(strip_bearer("abc.def"), Some("abc.def"));
/// assert_eq!(strip_bearer("Bearer "), None);
/// ```
pub fn strip_bearer(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .unwrap_or(trimmed)
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Verifies an optional raw credential, treating absence as a rejection.
pub fn authenticate(
    verifier: &dyn CredentialVerifier,
    raw: Option<&str>,
) -> Result<Identity, AuthError> {
    let token = raw.and_then(strip_bearer).ok_or(AuthError::MissingCredential)?;
    verifier.verify(token)
}
