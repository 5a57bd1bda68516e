/// Authentication module
///
/// Access token issuance/validation, password hashing, credential checks,
/// refresh token storage and rotation, and the session operations built
/// on top of them.

mod claims;
mod credentials;
mod jwt;
mod password;
mod refresh_token;
mod session;

pub use claims::Claims;
pub use credentials::CredentialVerifier;
pub use jwt::AccessTokenIssuer;
pub use password::{validate_password_strength, PasswordHasher};
pub use refresh_token::{generate_refresh_token, hash_token, IssuedRefreshToken, RefreshTokenStore};
pub use session::{SessionService, TokenPair};
