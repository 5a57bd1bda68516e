/// Password Hashing and Verification
///
/// bcrypt digests plus the strength rules applied when a password is set.
/// Hashing and verification run on the blocking thread pool so a slow cost
/// factor never stalls the worker serving other requests.

use actix_web::web;

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Plaintext hashed once at construction so that a login for an unknown
/// user still pays for one bcrypt verification.
const TIMING_PROBE: &str = "timing-equalization-probe";

#[derive(Clone, Debug)]
pub struct PasswordHasher {
    cost: u32,
    dummy_digest: String,
}

impl PasswordHasher {
    /// Runs once at startup, on the calling thread.
    ///
    /// # Errors
    /// Returns error if `cost` is outside bcrypt's accepted range (4..=31).
    pub fn new(cost: u32) -> Result<Self, AppError> {
        let dummy_digest = bcrypt::hash(TIMING_PROBE, cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(Self { cost, dummy_digest })
    }

    /// Hash a password that has already passed `validate_password_strength`.
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let cost = self.cost;
        let password = password.to_string();

        off_worker(move || {
            bcrypt::hash(password, cost)
                .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
        })
        .await
    }

    /// Verify a password against its digest
    ///
    /// # Errors
    /// Returns error if the digest is not a bcrypt digest
    pub async fn verify(&self, password: &str, digest: &str) -> Result<bool, AppError> {
        let password = password.to_string();
        let digest = digest.to_string();

        off_worker(move || {
            bcrypt::verify(password, &digest)
                .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
        })
        .await
    }

    /// Spend the same work as `verify` without a real digest.
    pub async fn verify_against_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_digest).await;
    }
}

async fn off_worker<T, F>(task: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    web::block(task)
        .await
        .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))?
}

/// Validate password strength requirements
///
/// Requirements:
/// - 8 to 128 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    // bcrypt only reads 72 bytes, the upper bound mostly guards hashing cost
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::WeakPassword);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4).expect("Failed to build hasher")
    }

    #[tokio::test]
    async fn test_hash_password() {
        let password = "ValidPassword123";
        let digest = hasher().hash(password).await.expect("Failed to hash password");

        assert_ne!(password, digest);
        assert!(digest.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_verify_password() {
        let hasher = hasher();
        let digest = hasher.hash("ValidPassword123").await.unwrap();

        assert!(hasher.verify("ValidPassword123", &digest).await.unwrap());
        assert!(!hasher.verify("WrongPassword123", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_against_garbage_digest_errors() {
        assert!(hasher().verify("ValidPassword123", "not-a-digest").await.is_err());
    }

    #[test]
    fn test_invalid_cost_is_rejected() {
        assert!(PasswordHasher::new(2).is_err());
    }

    #[tokio::test]
    async fn test_verification_does_not_block_the_runtime() {
        // Single-threaded runtime: a verify that ran inline would finish
        // before the timer task got polled again.
        let hasher = PasswordHasher::new(10).unwrap();
        let digest = hasher.hash("ValidPassword123").await.unwrap();

        let (verified_at, ticked_at) = tokio::join!(
            async {
                hasher.verify("ValidPassword123", &digest).await.unwrap();
                Instant::now()
            },
            async {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                Instant::now()
            },
        );

        assert!(ticked_at < verified_at);
    }

    #[test]
    fn test_strength_rules() {
        assert!(validate_password_strength("ValidPassword123").is_ok());
        assert_eq!(
            validate_password_strength("Short1"),
            Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH))
        );
        let long_password = "a".repeat(MAX_PASSWORD_LENGTH + 1) + "A1";
        assert!(validate_password_strength(&long_password).is_err());
        assert_eq!(
            validate_password_strength("NoDigitsPassword"),
            Err(ValidationError::WeakPassword)
        );
        assert!(validate_password_strength("NOLOWERCASE1").is_err());
        assert!(validate_password_strength("nouppercase1").is_err());
    }
}
