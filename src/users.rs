/// User accounts
///
/// Registration, profile reads and the two writes that must end existing
/// sessions: a full profile update and a password reset.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{validate_password_strength, PasswordHasher, RefreshTokenStore};
use crate::clock::Clock;
use crate::database::{UserRecord, UserRepository};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::validators::{is_valid_email, is_valid_username};

/// Every user-editable field. Updates always carry all of them.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountDetails {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
    refresh_tokens: RefreshTokenStore,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: PasswordHasher,
        refresh_tokens: RefreshTokenStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            hasher,
            refresh_tokens,
            clock,
        }
    }

    pub async fn register(&self, details: &AccountDetails) -> Result<UserRecord, AppError> {
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: is_valid_username(&details.username)?,
            email: is_valid_email(&details.email)?,
            password_hash: self.hash_new_password(&details.password).await?,
            created_at: self.clock.now(),
        };

        self.users.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn get(&self, user_id: Uuid) -> Result<UserRecord, AppError> {
        self.users
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("User not found".to_string()).into())
    }

    /// Replace username, email and password, then revoke all refresh tokens.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        details: &AccountDetails,
    ) -> Result<UserRecord, AppError> {
        let current = self.get(user_id).await?;
        let updated = UserRecord {
            username: is_valid_username(&details.username)?,
            email: is_valid_email(&details.email)?,
            password_hash: self.hash_new_password(&details.password).await?,
            ..current
        };

        self.store_and_end_sessions(&updated).await?;

        tracing::info!(user_id = %user_id, "Profile updated");
        Ok(updated)
    }

    /// Set a new password after checking the current one, then revoke all
    /// refresh tokens.
    ///
    /// # Errors
    /// `InvalidCredentials` if `current_password` does not match.
    pub async fn reset_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self.get(user_id).await?;

        if !self.hasher.verify(current_password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let updated = UserRecord {
            password_hash: self.hash_new_password(new_password).await?,
            ..user
        };
        self.store_and_end_sessions(&updated).await?;

        tracing::info!(user_id = %user_id, "Password reset");
        Ok(())
    }

    async fn hash_new_password(&self, password: &str) -> Result<String, AppError> {
        validate_password_strength(password)?;
        self.hasher.hash(password).await
    }

    async fn store_and_end_sessions(&self, user: &UserRecord) -> Result<(), AppError> {
        if !self.users.update_user(user).await? {
            return Err(DatabaseError::NotFound("User not found".to_string()).into());
        }
        self.refresh_tokens.revoke_all(user.id).await?;
        Ok(())
    }
}
