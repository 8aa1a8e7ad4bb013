//! HS256 bearer tokens shared with the platform's login flow.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use taskhub_config::AuthConfig;
use tracing::debug;

use crate::{AuthError, CredentialVerifier, Identity, Role, UserId};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// JWT token manager
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_duration: Duration,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_duration: Duration::hours(24),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let seconds = i64::try_from(config.token_ttl_seconds).unwrap_or(i64::MAX / 1_000);
        Self::new(&config.jwt_secret).with_duration(Duration::seconds(seconds))
    }

    /// Set custom token duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.token_duration = duration;
        self
    }

    /// Mint a token for `identity` valid for the configured duration.
    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.token_duration)
            .ok_or_else(|| AuthError::Issue("token duration overflows".to_string()))?;

        let claims = Claims {
            id: identity.user_id.to_string(),
            role: identity.role,
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        self.encode_claims(&claims)
    }

    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| AuthError::Issue(err.to_string()))
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(err.to_string()),
            })
    }
}

impl CredentialVerifier for JwtManager {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let claims = self.validate_token(credential).map_err(|err| {
            debug!(error = %err, "rejected bearer credential");
            err
        })?;

        let user_id = UserId::new(claims.id);
        if user_id.is_empty() {
            return Err(AuthError::MissingSubject);
        }

        Ok(Identity {
            user_id,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticate;

    fn manager() -> JwtManager {
        JwtManager::new("test_secret_key_that_is_long_enough_for_hs256")
    }

    #[test]
    fn issued_token_round_trips_identity() {
        let jwt = manager();
        let identity = Identity::new("u-42", Role::Admin);

        let token = jwt.issue(&identity).expect("token should be issued");
        let verified = jwt.verify(&token).expect("token should verify");

        assert_eq!(verified, identity);
        assert!(verified.is_admin());
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let jwt = manager();
        let now = Utc::now().timestamp();
        let token = jwt
            .encode_claims(&Claims {
                id: "u-1".to_string(),
                role: Role::User,
                iat: now - 600,
                exp: now - 300,
            })
            .unwrap();

        assert_eq!(jwt.verify(&token), Err(AuthError::Expired));
        assert_eq!(AuthError::Expired.to_string(), "jwt expired");
    }

    #[test]
    fn token_signed_with_another_secret_is_invalid() {
        let other = JwtManager::new("some_other_secret_that_does_not_match");
        let token = other.issue(&Identity::new("u-1", Role::User)).unwrap();

        match manager().verify(&token) {
            Err(AuthError::Invalid(_)) => {}
            other => panic!("expected invalid token, got {other:?}"),
        }
    }

    #[test]
    fn token_without_user_id_is_rejected() {
        let jwt = manager();
        let now = Utc::now().timestamp();
        let token = jwt
            .encode_claims(&Claims {
                id: String::new(),
                role: Role::User,
                iat: now,
                exp: now + 60,
            })
            .unwrap();

        assert_eq!(jwt.verify(&token), Err(AuthError::MissingSubject));
    }

    #[test]
    fn authenticate_strips_bearer_prefix_and_rejects_absence() {
        let jwt = manager();
        let token = jwt.issue(&Identity::new("u-7", Role::User)).unwrap();
        let header = format!("Bearer {token}");

        let identity = authenticate(&jwt, Some(&header)).expect("bearer header should verify");
        assert_eq!(identity.user_id.as_str(), "u-7");

        assert_eq!(authenticate(&jwt, None), Err(AuthError::MissingCredential));
        assert_eq!(
            authenticate(&jwt, Some("Bearer   ")),
            Err(AuthError::MissingCredential)
        );
    }

    #[test]
    fn config_ttl_controls_expiry() {
        let config = AuthConfig {
            jwt_secret: "configured_secret_value_for_tests".to_string(),
            token_ttl_seconds: 120,
        };
        let jwt = JwtManager::from_config(&config);
        let token = jwt.issue(&Identity::new("u-9", Role::User)).unwrap();
        let claims = jwt.validate_token(&token).unwrap();

        assert_eq!(claims.exp - claims.iat, 120);
    }
}
