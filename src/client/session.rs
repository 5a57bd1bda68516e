/// Client Session Manager
///
/// Holds the current token pair and cached profile, attaches the access
/// token to outgoing calls and recovers from access token expiry by
/// refreshing once and retrying the call once.

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tokio::sync::{Mutex, RwLock};

use crate::client::error::{expect_status, ClientError};
use crate::routes::{LoginResponse, TokenResponse, UserResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    LoggedOut,
    Authenticating,
    Active,
    Refreshing,
    /// The refresh token was rejected. Terminal until the next login.
    Expired,
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    access_token: Option<String>,
    refresh_token: Option<String>,
    profile: Option<UserResponse>,
}

impl SessionState {
    fn logged_out() -> Self {
        Self {
            status: SessionStatus::LoggedOut,
            access_token: None,
            refresh_token: None,
            profile: None,
        }
    }

    fn clear(&mut self, status: SessionStatus) {
        self.status = status;
        self.access_token = None;
        self.refresh_token = None;
        if status == SessionStatus::LoggedOut {
            self.profile = None;
        }
    }

    fn no_session_error(&self) -> ClientError {
        match self.status {
            SessionStatus::Expired => ClientError::SessionExpired,
            _ => ClientError::NotLoggedIn,
        }
    }
}

/// Owns the session of one signed-in user.
///
/// Share it behind an `Arc`. Concurrent calls that are all rejected with
/// 401 wait on one refresh gate; whoever gets the gate first rotates the
/// refresh token and the others retry with the access token it obtained.
pub struct SessionManager {
    http: Client,
    base_url: String,
    state: RwLock<SessionState>,
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            state: RwLock::new(SessionState::logged_out()),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    pub async fn profile(&self) -> Option<UserResponse> {
        self.state.read().await.profile.clone()
    }

    pub(crate) async fn set_profile(&self, profile: UserResponse) {
        self.state.write().await.profile = Some(profile);
    }

    /// Snapshot of who was signed in, for a "welcome back" greeting.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        self.profile().await.map(|profile| SessionSnapshot {
            user_id: profile.id,
            username: profile.username,
            email: profile.email,
            saved_at: Utc::now(),
        })
    }

    /// Log in and start a new session, replacing any previous one.
    ///
    /// # Errors
    /// - `InvalidCredentials` on 401
    /// - `Status` for any other unexpected status
    pub async fn login(&self, username: &str, password: &str) -> Result<UserResponse, ClientError> {
        let _gate = self.refresh_gate.lock().await;
        self.state.write().await.clear(SessionStatus::Authenticating);

        let outcome = self.request_login(username, password).await;

        let mut state = self.state.write().await;
        match outcome {
            Ok(login) => {
                state.status = SessionStatus::Active;
                state.access_token = Some(login.tokens.access_token);
                state.refresh_token = Some(login.tokens.refresh_token);
                state.profile = Some(login.user.clone());
                tracing::info!(username = %login.user.username, "Logged in");
                Ok(login.user)
            }
            Err(e) => {
                state.clear(SessionStatus::LoggedOut);
                Err(e)
            }
        }
    }

    async fn request_login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::InvalidCredentials);
        }
        let response = expect_status(response, StatusCode::CREATED).await?;
        Ok(response.json::<LoginResponse>().await?)
    }

    /// End the session. Server calls are best effort; local state is
    /// cleared whatever they return.
    ///
    /// Waits for an in-flight refresh, so the tokens it mints are the ones
    /// revoked. If the access token is no longer accepted, the refresh token
    /// is revoked on its own instead.
    pub async fn logout(&self) {
        let _gate = self.refresh_gate.lock().await;

        let (access_token, refresh_token) = {
            let state = self.state.read().await;
            (state.access_token.clone(), state.refresh_token.clone())
        };

        let logged_out = match access_token {
            Some(token) => self.post_best_effort("/auth/logout", &token).await,
            None => false,
        };
        if !logged_out {
            if let Some(token) = refresh_token {
                self.post_best_effort("/auth/revoke", &token).await;
            }
        }

        self.state.write().await.clear(SessionStatus::LoggedOut);
        tracing::info!("Logged out");
    }

    /// POST with a bearer credential, reporting only whether it succeeded.
    async fn post_best_effort(&self, path: &str, token: &str) -> bool {
        match self.http.post(self.url(path)).bearer_auth(token).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(path = path, status = response.status().as_u16(), "Request not acknowledged");
                false
            }
            Err(e) => {
                tracing::debug!(path = path, error = %e, "Request failed");
                false
            }
        }
    }

    /// Rotate the refresh token now.
    ///
    /// # Errors
    /// - `SessionExpired` if the server rejected the refresh token
    /// - `RefreshFailed` or `Transport` otherwise; the session stays active
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await.map(|_| ())
    }

    /// Send an authorized request built by `build`.
    ///
    /// A 401 triggers one refresh and one retry of the request. Any other
    /// status, including the retry's, is returned as is.
    pub async fn send<F>(&self, build: F) -> Result<Response, ClientError>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let access_token = self.current_access_token().await?;

        let response = build(&self.http, &self.base_url)
            .bearer_auth(&access_token)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("Access token rejected, refreshing");
        let fresh = self.refresh_after_rejection(&access_token).await?;

        Ok(build(&self.http, &self.base_url)
            .bearer_auth(&fresh)
            .send()
            .await?)
    }

    /// Send a request that needs no session.
    pub async fn send_anonymous<F>(&self, build: F) -> Result<Response, ClientError>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        Ok(build(&self.http, &self.base_url).send().await?)
    }

    async fn current_access_token(&self) -> Result<String, ClientError> {
        let state = self.state.read().await;
        state
            .access_token
            .clone()
            .ok_or_else(|| state.no_session_error())
    }

    /// Obtain an access token newer than `rejected`, refreshing only if no
    /// other caller already did.
    async fn refresh_after_rejection(&self, rejected: &str) -> Result<String, ClientError> {
        let _gate = self.refresh_gate.lock().await;

        {
            let state = self.state.read().await;
            match state.access_token.as_deref() {
                None => return Err(state.no_session_error()),
                Some(current) if current != rejected => return Ok(current.to_string()),
                Some(_) => {}
            }
        }

        self.refresh_locked().await
    }

    /// Must be called with the refresh gate held. Login and logout take the
    /// same gate, so the state cannot change under a refresh in flight.
    async fn refresh_locked(&self) -> Result<String, ClientError> {
        let refresh_token = {
            let mut state = self.state.write().await;
            let token = state
                .refresh_token
                .clone()
                .ok_or_else(|| state.no_session_error())?;
            state.status = SessionStatus::Refreshing;
            token
        };

        let outcome = self.request_refresh(&refresh_token).await;

        let mut state = self.state.write().await;
        match outcome {
            Ok(tokens) => {
                state.status = SessionStatus::Active;
                state.access_token = Some(tokens.access_token.clone());
                state.refresh_token = Some(tokens.refresh_token);
                tracing::debug!("Session refreshed");
                Ok(tokens.access_token)
            }
            Err(ClientError::SessionExpired) => {
                state.clear(SessionStatus::Expired);
                tracing::info!("Refresh token rejected, session expired");
                Err(ClientError::SessionExpired)
            }
            Err(e) => {
                state.status = SessionStatus::Active;
                tracing::warn!(error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/refresh"))
            .bearer_auth(refresh_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(response.json::<TokenResponse>().await?),
            StatusCode::UNAUTHORIZED => Err(ClientError::SessionExpired),
            status => Err(ClientError::RefreshFailed {
                status: status.as_u16(),
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Who was last signed in, persisted between runs.
///
/// Holds no tokens. It is never used to restore a session; the server is
/// asked again on the next login.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Returns `None` if nothing was saved yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, ClientError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
