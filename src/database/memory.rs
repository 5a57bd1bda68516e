use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{RefreshTokenRecord, RefreshTokenRepository, Replacement, UserRecord, UserRepository};
use crate::error::{AppError, DatabaseError};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

/// In-process store. One mutex guards both tables, so every operation,
/// rotation included, is a single critical section.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables.lock().map_err(|_| {
            AppError::Database(DatabaseError::UnexpectedError(
                "memory store lock poisoned".to_string(),
            ))
        })
    }

    /// Number of refresh token rows, revoked ones included.
    pub fn refresh_token_count(&self) -> usize {
        self.lock().map(|t| t.refresh_tokens.len()).unwrap_or(0)
    }

    /// Refresh token rows owned by `user_id`.
    pub fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        self.lock()
            .map(|t| {
                t.refresh_tokens
                    .values()
                    .filter(|r| r.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn duplicate() -> AppError {
    AppError::Database(DatabaseError::UniqueConstraintViolation(
        "Username or email already registered".to_string(),
    ))
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), AppError> {
        let mut tables = self.lock()?;
        let taken = tables.users.values().any(|u| {
            u.id == user.id || u.username == user.username || u.email == user.email
        });
        if taken {
            return Err(duplicate());
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, AppError> {
        let tables = self.lock()?;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn update_user(&self, user: &UserRecord) -> Result<bool, AppError> {
        let mut tables = self.lock()?;
        let taken = tables.users.values().any(|u| {
            u.id != user.id && (u.username == user.username || u.email == user.email)
        });
        if taken {
            return Err(duplicate());
        }
        match tables.users.get_mut(&user.id) {
            Some(existing) => {
                existing.username = user.username.clone();
                existing.email = user.email.clone();
                existing.password_hash = user.password_hash.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        let mut tables = self.lock()?;
        if tables.refresh_tokens.contains_key(&record.token_hash) {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "refresh token".to_string(),
            )));
        }
        tables
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self.lock()?.refresh_tokens.get(token_hash).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        replacement: &Replacement,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tables = self.lock()?;

        let owner = match tables.refresh_tokens.get_mut(token_hash) {
            Some(row) if row.revoked_at.is_none() && row.expires_at > now => {
                row.revoked_at = Some(now);
                row.user_id
            }
            _ => return Ok(None),
        };

        tables.refresh_tokens.insert(
            replacement.token_hash.clone(),
            RefreshTokenRecord {
                token_hash: replacement.token_hash.clone(),
                user_id: owner,
                created_at: replacement.created_at,
                expires_at: replacement.expires_at,
                revoked_at: None,
            },
        );

        Ok(Some(owner))
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.lock()?;
        match tables.refresh_tokens.get_mut(token_hash) {
            Some(row) if row.revoked_at.is_none() => {
                row.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut tables = self.lock()?;
        let mut revoked = 0;
        for row in tables.refresh_tokens.values_mut() {
            if row.user_id == user_id && row.revoked_at.is_none() {
                row.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn delete_stale_refresh_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tables = self.lock()?;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, row| {
            let revoked_long_ago = row.revoked_at.map(|at| at < cutoff).unwrap_or(false);
            !(revoked_long_ago || row.expires_at < cutoff)
        });
        Ok((before - tables.refresh_tokens.len()) as u64)
    }
}
