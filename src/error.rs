//! Error taxonomy for everything that talks to the backend.

use thiserror::Error;

/// Result type for API and cache operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by the API client and the query cache.
///
/// Cloneable so a single de-duplicated fetch can hand the same failure to
/// every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  #[error("network error: {0}")]
  Network(String),

  #[error("authentication required")]
  Unauthorized,

  #[error("{message}")]
  Validation { status: u16, message: String },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  #[error("failed to decode response: {0}")]
  Decode(String),

  #[error("query is disabled")]
  Disabled,

  #[error("request was cancelled")]
  Cancelled,

  #[error("invalid input: {0}")]
  InvalidInput(String),
}

impl ApiError {
  /// Map an HTTP status and optional server message into the taxonomy.
  pub fn from_status(status: u16, message: Option<String>) -> Self {
    let message = message.unwrap_or_else(|| format!("request failed with status {}", status));
    match status {
      401 => ApiError::Unauthorized,
      404 => ApiError::NotFound(message),
      400..=499 => ApiError::Validation { status, message },
      _ => ApiError::Server { status, message },
    }
  }

  /// Whether this failure should end the session.
  pub fn is_unauthorized(&self) -> bool {
    matches!(self, ApiError::Unauthorized)
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else {
      ApiError::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    ApiError::Decode(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert_eq!(ApiError::from_status(401, None), ApiError::Unauthorized);
    assert!(matches!(
      ApiError::from_status(404, None),
      ApiError::NotFound(_)
    ));
    assert_eq!(
      ApiError::from_status(422, Some("Subject is required".into())),
      ApiError::Validation {
        status: 422,
        message: "Subject is required".into()
      }
    );
    assert!(matches!(
      ApiError::from_status(503, None),
      ApiError::Server { status: 503, .. }
    ));
  }

  #[test]
  fn test_validation_message_is_displayed_verbatim() {
    let err = ApiError::from_status(400, Some("Email already exists".into()));
    assert_eq!(err.to_string(), "Email already exists");
  }
}
