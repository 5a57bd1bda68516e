/// Access Token Issuer and Validator
///
/// Access tokens are HS256 JWTs. They are stateless: any process holding
/// the secret validates them without touching storage, and nothing can
/// revoke one before its `exp`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::clock::Clock;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

#[derive(Clone, Debug)]
pub struct AccessTokenIssuer {
    settings: JwtSettings,
    clock: Arc<dyn Clock>,
}

impl AccessTokenIssuer {
    pub fn new(settings: JwtSettings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    /// Lifetime of issued tokens, in seconds.
    pub fn expires_in(&self) -> i64 {
        self.settings.access_token_expiry
    }

    pub fn issue(&self, subject: Uuid) -> Result<String, AppError> {
        self.issue_at(subject, self.clock.now())
    }

    /// Issue a token as if the current instant were `now`.
    pub fn issue_at(&self, subject: Uuid, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims::new(
            subject,
            now,
            self.settings.access_token_expiry,
            self.settings.issuer.clone(),
        );

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.settings.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Validate a token and return its subject.
    pub fn validate(&self, token: &str) -> Result<Uuid, AuthError> {
        self.validate_at(token, self.clock.now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, AuthError> {
        let claims = self.decode_claims(token)?;

        if claims.is_expired_at(now, self.settings.leeway_seconds) {
            tracing::debug!(exp = claims.exp, "Access token expired");
            return Err(AuthError::TokenExpired);
        }

        claims.user_id()
    }

    /// Signature and issuer checks. Expiry is applied by the caller against
    /// the injected clock so the boundary rule is ours, not the library's.
    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.settings.issuer]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.settings.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::TokenSignatureInvalid,
            _ => {
                tracing::debug!(error = %e, "Access token rejected");
                AuthError::TokenMalformed
            }
        })
    }
}
