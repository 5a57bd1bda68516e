/// Session Routes
///
/// Login, refresh, revoke and logout.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{SessionService, TokenPair};
use crate::error::{AppError, AuthError, DatabaseError, ErrorContext};
use crate::middleware::{bearer_token, AuthenticatedUser};
use crate::routes::users::UserResponse;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token pair as sent to clients
#[derive(Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
        }
    }
}

/// User fields followed by the token pair
#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

/// POST /auth/login
///
/// # Errors
/// - 401: unknown username or wrong password (indistinguishable)
/// - 500: storage failure
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("login");

    let (user, pair) = sessions
        .login(&form.username, &form.password)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    tracing::info!(request_id = %context.request_id, user_id = %user.id, "Login succeeded");

    Ok(HttpResponse::Created().json(LoginResponse {
        user: user.into(),
        tokens: pair.into(),
    }))
}

/// POST /auth/refresh
///
/// The refresh token travels as the bearer credential. The presented token
/// is revoked and replaced; replaying it afterwards fails.
///
/// # Errors
/// - 401: missing, unknown, revoked or expired refresh token
/// - 500: storage failure
pub async fn refresh(
    req: HttpRequest,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");
    let refresh_token = bearer_token(req.headers())?;

    let pair = sessions.refresh(&refresh_token).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    tracing::info!(request_id = %context.request_id, "Token refreshed");

    Ok(HttpResponse::Created().json(TokenResponse::from(pair)))
}

/// POST /auth/revoke
///
/// # Errors
/// - 401: no bearer credential
/// - 404: token unknown or already revoked
pub async fn revoke(
    req: HttpRequest,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let refresh_token = bearer_token(req.headers())?;

    match sessions.revoke(&refresh_token).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(AppError::Auth(AuthError::TokenNotFound | AuthError::TokenRevoked)) => Err(
            DatabaseError::NotFound("Refresh token not found".to_string()).into(),
        ),
        Err(e) => Err(e),
    }
}

/// POST /auth/logout
///
/// **Requires a valid access token.** Revokes every refresh token of the
/// caller. Succeeds with 204 even when nothing was left to revoke.
pub async fn logout(
    user: web::ReqData<AuthenticatedUser>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("logout").with_user_id(user.user_id);

    let revoked = sessions.logout(user.user_id).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    if revoked == 0 {
        tracing::debug!(request_id = %context.request_id, "Logout with no live refresh tokens");
    }

    Ok(HttpResponse::NoContent().finish())
}
