use std::sync::Arc;

use crate::auth::password::PasswordHasher;
use crate::database::{UserRecord, UserRepository};
use crate::error::{AppError, AuthError};

/// Checks a username/password pair against stored credentials.
#[derive(Clone)]
pub struct CredentialVerifier {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
}

impl CredentialVerifier {
    pub fn new(users: Arc<dyn UserRepository>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    /// # Errors
    /// `InvalidCredentials` for an unknown username and for a wrong password
    /// alike. Both paths run one bcrypt verification, off the async worker.
    pub async fn verify(&self, username: &str, password: &str) -> Result<UserRecord, AppError> {
        let user = match self.users.find_user_by_username(username.trim()).await? {
            Some(user) => user,
            None => {
                self.hasher.verify_against_dummy(password).await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if self.hasher.verify(password, &user.password_hash).await? {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials.into())
        }
    }
}
