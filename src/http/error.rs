use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Typed failures of a REST call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
  #[error("Request timed out after {0:?}")]
  Timeout(Duration),

  #[error("Unable to connect to server: {0}")]
  Network(String),

  #[error("Your session has expired. Please log in again.")]
  Unauthorized,

  #[error("You don't have permission to perform this action")]
  Forbidden,

  #[error("The requested resource was not found")]
  NotFound,

  #[error("{message}")]
  Validation {
    message: String,
    errors: BTreeMap<String, Vec<String>>,
  },

  #[error("Server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// HTTP success, but the envelope reported `success: false`
  #[error("{message}")]
  Rejected {
    message: String,
    errors: BTreeMap<String, Vec<String>>,
  },

  #[error("Unexpected response: {0}")]
  Decode(String),
}

/// Coarse category, used for toasts and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Transport,
  Auth,
  Validation,
  Server,
}

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ApiError::Timeout(_) | ApiError::Network(_) => ErrorKind::Transport,
      ApiError::Unauthorized | ApiError::Forbidden => ErrorKind::Auth,
      ApiError::Validation { .. } => ErrorKind::Validation,
      ApiError::NotFound
      | ApiError::Server { .. }
      | ApiError::Rejected { .. }
      | ApiError::Decode(_) => ErrorKind::Server,
    }
  }

  /// Worth retrying: the request may succeed unchanged.
  pub fn is_transient(&self) -> bool {
    match self {
      ApiError::Timeout(_) | ApiError::Network(_) => true,
      ApiError::Server { status, .. } => *status >= 500,
      _ => false,
    }
  }

  /// Field errors for inline display, when the server sent any.
  pub fn field_errors(&self) -> Option<&BTreeMap<String, Vec<String>>> {
    match self {
      ApiError::Validation { errors, .. } | ApiError::Rejected { errors, .. } => Some(errors),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transient_classification() {
    assert!(ApiError::Timeout(Duration::from_secs(30)).is_transient());
    assert!(ApiError::Network("refused".into()).is_transient());
    assert!(ApiError::Server {
      status: 503,
      message: "busy".into()
    }
    .is_transient());
    assert!(!ApiError::Server {
      status: 409,
      message: "conflict".into()
    }
    .is_transient());
    assert!(!ApiError::Unauthorized.is_transient());
    assert!(!ApiError::NotFound.is_transient());
  }

  #[test]
  fn test_kind() {
    assert_eq!(ApiError::Forbidden.kind(), ErrorKind::Auth);
    assert_eq!(ApiError::Network(String::new()).kind(), ErrorKind::Transport);
    assert_eq!(ApiError::Decode(String::new()).kind(), ErrorKind::Server);
  }
}
