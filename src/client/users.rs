use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;

use crate::client::error::{expect_status, ClientError};
use crate::client::session::SessionManager;
use crate::routes::UserResponse;

/// User account calls
///
/// Profile and password changes revoke every refresh token on the server,
/// so both log in again with the new credentials before returning.
#[derive(Clone)]
pub struct UsersApi {
    session: Arc<SessionManager>,
}

impl UsersApi {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// POST /users. Does not log in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserResponse, ClientError> {
        let body = json!({ "username": username, "email": email, "password": password });
        let response = self
            .session
            .send_anonymous(|http, base| http.post(format!("{}/users", base)).json(&body))
            .await?;

        let response = expect_status(response, StatusCode::CREATED).await?;
        Ok(response.json::<UserResponse>().await?)
    }

    /// GET /users/me, refreshing the cached profile.
    pub async fn me(&self) -> Result<UserResponse, ClientError> {
        let response = self
            .session
            .send(|http, base| http.get(format!("{}/users/me", base)))
            .await?;

        let response = expect_status(response, StatusCode::OK).await?;
        let user = response.json::<UserResponse>().await?;
        self.session.set_profile(user.clone()).await;
        Ok(user)
    }

    /// PUT /users/me with every field replaced.
    pub async fn update_profile(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserResponse, ClientError> {
        let body = json!({ "username": username, "email": email, "password": password });
        let response = self
            .session
            .send(|http, base| http.put(format!("{}/users/me", base)).json(&body))
            .await?;

        expect_status(response, StatusCode::OK).await?;
        self.session.login(username, password).await
    }

    /// PUT /users/me/password
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ClientError> {
        let username = self
            .session
            .profile()
            .await
            .map(|profile| profile.username)
            .ok_or(ClientError::NotLoggedIn)?;

        let body = json!({ "current_password": current_password, "new_password": new_password });
        let response = self
            .session
            .send(|http, base| http.put(format!("{}/users/me/password", base)).json(&body))
            .await?;

        expect_status(response, StatusCode::NO_CONTENT).await?;
        self.session.login(&username, new_password).await?;
        Ok(())
    }
}
