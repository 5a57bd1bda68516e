/// User Routes
///
/// Registration and the authenticated user's own account.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::database::UserRecord;
use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::users::{AccountDetails, UserService};

/// Public view of a user. The password digest is never serialized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            email: user.email,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub current_password: String,
    pub new_password: String,
}

/// POST /users
///
/// # Errors
/// - 400: invalid username, email or password
/// - 409: username or email already registered
pub async fn register(
    form: web::Json<AccountDetails>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let user = users.register(&form).await?;
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// GET /users/me
pub async fn current_user(
    user: web::ReqData<AuthenticatedUser>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let record = users.get(user.user_id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(record)))
}

/// PUT /users/me
///
/// Replaces username, email and password together and ends every session
/// of the user.
pub async fn update_profile(
    user: web::ReqData<AuthenticatedUser>,
    form: web::Json<AccountDetails>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    let record = users.update_profile(user.user_id, &form).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(record)))
}

/// PUT /users/me/password
///
/// # Errors
/// - 400: new password too weak
/// - 401: current password does not match
pub async fn reset_password(
    user: web::ReqData<AuthenticatedUser>,
    form: web::Json<PasswordResetRequest>,
    users: web::Data<UserService>,
) -> Result<HttpResponse, AppError> {
    users
        .reset_password(user.user_id, &form.current_password, &form.new_password)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
