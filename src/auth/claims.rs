/// JWT Claims structure
///
/// The payload of an access token: who it is for, when it was issued,
/// when it stops being valid, and who issued it (RFC 7519 names).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    /// Claims for `user_id`, valid from `now` for `expiry_seconds`.
    pub fn new(user_id: Uuid, now: DateTime<Utc>, expiry_seconds: i64, issuer: String) -> Self {
        let iat = now.timestamp();
        Self {
            sub: user_id.to_string(),
            iat,
            exp: iat + expiry_seconds,
            iss: issuer,
        }
    }

    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenMalformed)
    }

    /// A token is expired from its `exp` second onwards, extended by `leeway_seconds`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        now.timestamp() >= self.exp + leeway_seconds
    }
}
