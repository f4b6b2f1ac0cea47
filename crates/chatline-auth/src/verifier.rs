//! Token verification.

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;

use chatline_core::config::auth::AuthConfig;
use chatline_core::types::UserId;

use crate::claims::Claims;

/// Ways a token can fail verification. Each maps to a distinct rejection
/// message delivered to the client before the connection is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// No token was presented.
    #[error("Authentication token is required")]
    Missing,
    /// The token's expiry has passed.
    #[error("Authentication token has expired")]
    Expired,
    /// The token is not a valid JWT or its signature does not verify.
    #[error("Authentication token is malformed")]
    Malformed,
    /// The token decodes but its claims are not a valid identity.
    #[error("Authentication token payload is invalid")]
    InvalidPayload,
}

/// A verified identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The authenticated user.
    pub user_id: UserId,
    /// Display username.
    pub username: String,
    /// Optional account email.
    pub email: Option<String>,
}

/// Answers "who is this token?".
pub trait IdentityVerifier: Send + Sync + std::fmt::Debug {
    /// Verify a token and return the identity it asserts.
    fn verify(&self, token: Option<&str>) -> Result<Identity, TokenError>;
}

/// JWT-based identity verifier sharing an HMAC secret with the issuer.
#[derive(Clone)]
pub struct TokenVerifier {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("validation", &self.validation)
            .finish()
    }
}

impl TokenVerifier {
    /// Create a new verifier from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityVerifier for TokenVerifier {
    fn verify(&self, token: Option<&str>) -> Result<Identity, TokenError> {
        let token = match token {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(TokenError::Missing),
        };

        let data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    JwtErrorKind::ExpiredSignature => TokenError::Expired,
                    JwtErrorKind::Json(_) => TokenError::InvalidPayload,
                    _ => TokenError::Malformed,
                }
            })?;

        let claims = data.claims;
        if claims.username.trim().is_empty() {
            return Err(TokenError::InvalidPayload);
        }

        Ok(Identity {
            user_id: UserId::from_uuid(claims.sub),
            username: claims.username,
            email: claims.email,
        })
    }
}
