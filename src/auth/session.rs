/// Session lifecycle
///
/// Composes the credential verifier, the access token issuer and the
/// refresh token store into the four session operations the HTTP layer
/// exposes: login, refresh, revoke and logout.

use uuid::Uuid;

use crate::auth::credentials::CredentialVerifier;
use crate::auth::jwt::AccessTokenIssuer;
use crate::auth::refresh_token::RefreshTokenStore;
use crate::database::UserRecord;
use crate::error::AppError;

/// An access token and the refresh token that can replace it.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct SessionService {
    credentials: CredentialVerifier,
    issuer: AccessTokenIssuer,
    refresh_tokens: RefreshTokenStore,
}

impl SessionService {
    pub fn new(
        credentials: CredentialVerifier,
        issuer: AccessTokenIssuer,
        refresh_tokens: RefreshTokenStore,
    ) -> Self {
        Self {
            credentials,
            issuer,
            refresh_tokens,
        }
    }

    pub fn issuer(&self) -> &AccessTokenIssuer {
        &self.issuer
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserRecord, TokenPair), AppError> {
        let user = self.credentials.verify(username, password).await?;
        let pair = self.issue_pair(user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, pair))
    }

    /// Start a new session lineage for `user_id`.
    pub async fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let access_token = self.issuer.issue(user_id)?;
        let refresh = self.refresh_tokens.mint(user_id).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
            expires_in: self.issuer.expires_in(),
        })
    }

    /// Rotate `refresh_token` and mint a new access token for its owner.
    ///
    /// # Errors
    /// `TokenNotFound`, `TokenRevoked` or `TokenExpired`. A caller that lost a
    /// race for the same token sees the same errors as one replaying it later.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let successor = self.refresh_tokens.rotate(refresh_token).await?;
        let access_token = self.issuer.issue(successor.user_id)?;

        Ok(TokenPair {
            access_token,
            refresh_token: successor.token,
            expires_in: self.issuer.expires_in(),
        })
    }

    pub async fn revoke(&self, refresh_token: &str) -> Result<(), AppError> {
        self.refresh_tokens.revoke(refresh_token).await
    }

    /// End every session of `user_id`. Returns how many refresh tokens were live.
    pub async fn logout(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.refresh_tokens.revoke_all(user_id).await?;
        tracing::info!(user_id = %user_id, revoked = revoked, "User logged out");
        Ok(revoked)
    }
}
