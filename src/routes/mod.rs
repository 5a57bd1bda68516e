mod auth;
mod health_check;
mod users;

pub use auth::{login, logout, refresh, revoke, LoginRequest, LoginResponse, TokenResponse};
pub use health_check::health_check;
pub use users::{current_user, register, reset_password, update_profile, UserResponse};
