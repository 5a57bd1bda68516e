/// Refresh Token Management
///
/// Refresh tokens are:
/// - 64 random alphanumeric characters (~381 bits of entropy)
/// - Hashed with SHA-256 before storage (the plaintext is never stored)
/// - Single-use: rotating one revokes it and mints its successor atomically
/// - Revocable one at a time or per user

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::clock::Clock;
use crate::database::{RefreshTokenRecord, RefreshTokenRepository, Replacement};
use crate::error::{AppError, AuthError};

const REFRESH_TOKEN_LENGTH: usize = 64;

/// A freshly minted refresh token. `token` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Generate a new cryptographically secure refresh token
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest under which a token is stored and looked up.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    repository: Arc<dyn RefreshTokenRepository>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl RefreshTokenStore {
    pub fn new(
        repository: Arc<dyn RefreshTokenRepository>,
        clock: Arc<dyn Clock>,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            repository,
            clock,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Create and persist a new token for `user_id`.
    pub async fn mint(&self, user_id: Uuid) -> Result<IssuedRefreshToken, AppError> {
        let token = generate_refresh_token();
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        self.repository
            .insert_refresh_token(&RefreshTokenRecord {
                token_hash: hash_token(&token),
                user_id,
                created_at: now,
                expires_at,
                revoked_at: None,
            })
            .await?;

        tracing::debug!(user_id = %user_id, "Refresh token minted");

        Ok(IssuedRefreshToken {
            token,
            user_id,
            expires_at,
        })
    }

    /// Consume `token` and mint its successor for the same owner.
    ///
    /// # Errors
    /// `TokenNotFound`, `TokenRevoked` or `TokenExpired` when the token cannot
    /// be used, including when a concurrent caller rotated it first.
    pub async fn rotate(&self, token: &str) -> Result<IssuedRefreshToken, AppError> {
        let token_hash = hash_token(token);
        let now = self.clock.now();
        let successor = generate_refresh_token();
        let replacement = Replacement {
            token_hash: hash_token(&successor),
            created_at: now,
            expires_at: now + self.ttl,
        };

        match self
            .repository
            .rotate_refresh_token(&token_hash, now, &replacement)
            .await?
        {
            Some(user_id) => {
                tracing::info!(user_id = %user_id, "Refresh token rotated");
                Ok(IssuedRefreshToken {
                    token: successor,
                    user_id,
                    expires_at: replacement.expires_at,
                })
            }
            None => Err(self.classify_unusable(&token_hash, now).await?.into()),
        }
    }

    /// Revoke exactly this token.
    ///
    /// # Errors
    /// `TokenNotFound` if the token is unknown or already revoked.
    pub async fn revoke(&self, token: &str) -> Result<(), AppError> {
        let revoked = self
            .repository
            .revoke_refresh_token(&hash_token(token), self.clock.now())
            .await?;

        if revoked {
            Ok(())
        } else {
            Err(AuthError::TokenNotFound.into())
        }
    }

    /// Revoke every live token of `user_id`. Zero is a normal result.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let count = self
            .repository
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;

        tracing::info!(user_id = %user_id, revoked = count, "Refresh tokens revoked for user");
        Ok(count)
    }

    /// Delete rows revoked or expired more than `retention` ago.
    pub async fn cleanup(&self, retention: Duration) -> Result<u64, AppError> {
        let cutoff = self.clock.now() - retention;
        let deleted = self.repository.delete_stale_refresh_tokens(cutoff).await?;

        tracing::info!(deleted = deleted, "Stale refresh tokens deleted");
        Ok(deleted)
    }

    /// Why a rotation found nothing to consume.
    async fn classify_unusable(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthError, AppError> {
        let kind = match self.repository.find_refresh_token(token_hash).await? {
            None => AuthError::TokenNotFound,
            Some(row) if row.revoked_at.is_some() => {
                tracing::warn!(
                    user_id = %row.user_id,
                    "Attempt to use revoked refresh token"
                );
                AuthError::TokenRevoked
            }
            Some(row) if row.expires_at <= now => AuthError::TokenExpired,
            // Live again by the time we looked: cannot happen for a single-use
            // row, report it as consumed.
            Some(_) => AuthError::TokenRevoked,
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::MemoryStore;

    const TTL: i64 = 60 * 24 * 3600;

    fn store() -> (RefreshTokenStore, Arc<MemoryStore>, ManualClock) {
        let memory = Arc::new(MemoryStore::new());
        let clock = ManualClock::starting_now();
        let store = RefreshTokenStore::new(memory.clone(), Arc::new(clock.clone()), TTL);
        (store, memory, clock)
    }

    fn auth_kind(result: Result<IssuedRefreshToken, AppError>) -> Option<AuthError> {
        result.err().and_then(|e| e.auth_kind())
    }

    #[test]
    fn test_generate_refresh_token() {
        let token = generate_refresh_token();

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_refresh_token());
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_refresh_token();

        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(token, hash_token(&token));
        assert_eq!(hash_token(&token).len(), 64);
        assert_ne!(hash_token(&token), hash_token(&generate_refresh_token()));
    }

    #[tokio::test]
    async fn test_mint_persists_only_the_digest() {
        let (store, memory, clock) = store();
        let user_id = Uuid::new_v4();

        let issued = store.mint(user_id).await.unwrap();
        let rows = memory.refresh_tokens_for(user_id);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token_hash, hash_token(&issued.token));
        assert_eq!(rows[0].revoked_at, None);
        assert_eq!(rows[0].expires_at, clock.now() + Duration::seconds(TTL));
    }

    #[tokio::test]
    async fn test_rotate_succeeds_once() {
        let (store, memory, _) = store();
        let user_id = Uuid::new_v4();
        let original = store.mint(user_id).await.unwrap();

        let successor = store.rotate(&original.token).await.unwrap();
        assert_eq!(successor.user_id, user_id);
        assert_ne!(successor.token, original.token);

        let second = store.rotate(&original.token).await;
        assert_eq!(auth_kind(second), Some(AuthError::TokenRevoked));

        // The successor is the one live token.
        let live: Vec<_> = memory
            .refresh_tokens_for(user_id)
            .into_iter()
            .filter(|r| r.revoked_at.is_none())
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].token_hash, hash_token(&successor.token));
    }

    #[tokio::test]
    async fn test_rotate_unknown_token() {
        let (store, _, _) = store();

        let result = store.rotate("not-a-token-anyone-issued").await;

        assert_eq!(auth_kind(result), Some(AuthError::TokenNotFound));
    }

    #[tokio::test]
    async fn test_rotate_expired_token_at_boundary() {
        let (store, _, clock) = store();
        let issued = store.mint(Uuid::new_v4()).await.unwrap();

        clock.advance(Duration::seconds(TTL));

        assert_eq!(auth_kind(store.rotate(&issued.token).await), Some(AuthError::TokenExpired));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotation_has_one_winner() {
        let (store, _, _) = store();
        let original = store.mint(Uuid::new_v4()).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let token = original.token.clone();
                tokio::spawn(async move { store.rotate(&token).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert!(matches!(
                    e.auth_kind(),
                    Some(AuthError::TokenRevoked) | Some(AuthError::TokenNotFound)
                )),
            }
        }

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_revoke_single_token() {
        let (store, _, _) = store();
        let issued = store.mint(Uuid::new_v4()).await.unwrap();

        store.revoke(&issued.token).await.unwrap();

        let again = store.revoke(&issued.token).await;
        assert_eq!(again.err().and_then(|e| e.auth_kind()), Some(AuthError::TokenNotFound));
        assert_eq!(auth_kind(store.rotate(&issued.token).await), Some(AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn test_revoke_all_counts_and_is_idempotent() {
        let (store, _, _) = store();
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();
        let first = store.mint(user_id).await.unwrap();
        let second = store.mint(user_id).await.unwrap();
        let unrelated = store.mint(other_user).await.unwrap();

        assert_eq!(store.revoke_all(user_id).await.unwrap(), 2);
        assert_eq!(store.revoke_all(user_id).await.unwrap(), 0);

        assert_eq!(auth_kind(store.rotate(&first.token).await), Some(AuthError::TokenRevoked));
        assert_eq!(auth_kind(store.rotate(&second.token).await), Some(AuthError::TokenRevoked));
        assert!(store.rotate(&unrelated.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_old_rows() {
        let (store, memory, clock) = store();
        let user_id = Uuid::new_v4();
        let revoked_early = store.mint(user_id).await.unwrap();
        store.revoke(&revoked_early.token).await.unwrap();

        clock.advance(Duration::days(8));
        let _live = store.mint(user_id).await.unwrap();

        let deleted = store.cleanup(Duration::days(7)).await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(memory.refresh_token_count(), 1);
    }
}
