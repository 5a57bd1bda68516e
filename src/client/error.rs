use reqwest::{Response, StatusCode};
use std::error::Error as StdError;
use std::fmt;

/// Errors seen by callers of the API client
#[derive(Debug)]
pub enum ClientError {
    /// Login rejected the username/password pair.
    InvalidCredentials,
    /// No session to authorize the call with.
    NotLoggedIn,
    /// The refresh token was rejected. A fresh login is required.
    SessionExpired,
    /// Refresh failed for a reason other than rejection; the session is kept.
    RefreshFailed { status: u16 },
    /// Unexpected status, passed through for display.
    Status { status: u16, body: String },
    Transport(reqwest::Error),
    Snapshot(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::InvalidCredentials => write!(f, "Invalid username or password"),
            ClientError::NotLoggedIn => write!(f, "Not logged in"),
            ClientError::SessionExpired => write!(f, "Session expired, please log in again"),
            ClientError::RefreshFailed { status } => {
                write!(f, "Token refresh failed with status {}", status)
            }
            ClientError::Status { status, body } => write!(f, "Server returned {}: {}", status, body),
            ClientError::Transport(e) => write!(f, "Request failed: {}", e),
            ClientError::Snapshot(msg) => write!(f, "Session snapshot error: {}", msg),
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Snapshot(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Snapshot(err.to_string())
    }
}

/// Pass `response` through if it has the `expected` status, otherwise turn
/// it into `ClientError::Status` carrying the body text.
pub(crate) async fn expect_status(
    response: Response,
    expected: StatusCode,
) -> Result<Response, ClientError> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}
