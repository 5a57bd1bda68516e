/// Storage layer
///
/// Repository traits for users and refresh tokens, with a Postgres
/// implementation for deployments and an in-process one for local runs
/// and tests. Services hold them as `Arc<dyn ...>`.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;

/// A registered user as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A refresh token row. Only the SHA-256 digest of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// The row that replaces a rotated token. The owner is taken from the
/// token being rotated.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// # Errors
    /// `DatabaseError::UniqueConstraintViolation` if the username or email is taken.
    async fn insert_user(&self, user: &UserRecord) -> Result<(), AppError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, AppError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError>;
    /// Replace every mutable column of the user. Returns false if no such user.
    async fn update_user(&self, user: &UserRecord) -> Result<bool, AppError>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Revoke `token_hash` and insert `replacement` as one atomic step.
    ///
    /// Succeeds only if the row exists, is not revoked and `expires_at > now`.
    /// Of several concurrent callers on the same row at most one gets
    /// `Some(owner)`; everyone else gets `None`.
    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        replacement: &Replacement,
    ) -> Result<Option<Uuid>, AppError>;

    /// Revoke one live row. Returns false if it is absent or already revoked.
    async fn revoke_refresh_token(&self, token_hash: &str, now: DateTime<Utc>)
        -> Result<bool, AppError>;

    /// Revoke every non-revoked row of `user_id`, returning how many changed.
    async fn revoke_all_for_user(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<u64, AppError>;

    /// Delete rows that expired or were revoked before `cutoff`.
    async fn delete_stale_refresh_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}
