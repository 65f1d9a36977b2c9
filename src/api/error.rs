//! Error types for API, session, and cache operations.

use thiserror::Error;

/// Result type alias used throughout the library.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors that can occur while talking to the budget-tracker API.
///
/// The enum is `Clone` because a single refresh outcome is shared between
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
  /// The request never produced an HTTP response (connection refused, DNS, timeout).
  #[error("HTTP request failed: {0}")]
  Transport(String),

  /// The server rejected the access token on a call that was already retried.
  #[error("Unauthorized: {body}")]
  Unauthorized { body: String },

  /// The refresh token could not be exchanged. The session has been ended.
  #[error("Token refresh failed: {0}")]
  RefreshFailed(String),

  /// Any other non-success response, passed through untouched.
  #[error("Server returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Invalid response: {0}")]
  Decode(String),

  #[error("Invalid URL: {0}")]
  InvalidUrl(String),

  #[error("Credential storage error: {0}")]
  Storage(String),
}

impl ApiError {
  /// HTTP status carried by this error, if it came from a response.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Unauthorized { .. } => Some(401),
      Self::Status { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    Self::Decode(e.to_string())
  }
}

impl From<rusqlite::Error> for ApiError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Storage(e.to_string())
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    Self::Transport(e.to_string())
  }
}
