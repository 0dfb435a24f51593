use async_trait::async_trait;
use std::sync::Arc;

use crate::http::error::{ApiError, ErrorKind};
use crate::http::transport::Handler;
use crate::http::types::{field_errors, ApiRequest, ApiResponse};
use crate::session::SessionStore;
use crate::toast::Toasts;

/// Turns non-2xx responses into typed errors. A 401 ends the session;
/// transport and auth failures are surfaced as error toasts.
pub struct ErrorInterceptor {
  inner: Arc<dyn Handler>,
  session: Arc<SessionStore>,
  toasts: Toasts,
}

impl ErrorInterceptor {
  pub fn new(inner: Arc<dyn Handler>, session: Arc<SessionStore>, toasts: Toasts) -> Self {
    Self {
      inner,
      session,
      toasts,
    }
  }
}

#[async_trait]
impl Handler for ErrorInterceptor {
  async fn handle(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
    let method = req.method;
    let path = req.path.clone();

    let err = match self.inner.handle(req).await {
      Ok(resp) if resp.is_success() => return Ok(resp),
      Ok(resp) => error_from_response(&resp),
      Err(e) => e,
    };

    tracing::warn!(%method, %path, error = %err, "request failed");

    if err == ApiError::Unauthorized {
      self.session.logout();
    }

    if matches!(err.kind(), ErrorKind::Transport | ErrorKind::Auth) {
      self.toasts.error(&err.to_string());
    }

    Err(err)
  }
}

/// Map a non-2xx response to its error.
pub fn error_from_response(resp: &ApiResponse) -> ApiError {
  let message = resp.message().map(str::to_string);
  match resp.status {
    0 => ApiError::Network(message.unwrap_or_else(|| "no response".to_string())),
    400 | 422 => ApiError::Validation {
      message: message.unwrap_or_else(|| "Invalid request".to_string()),
      errors: field_errors(resp.body.get("errors")),
    },
    401 => ApiError::Unauthorized,
    403 => ApiError::Forbidden,
    404 => ApiError::NotFound,
    408 | 504 => ApiError::Server {
      status: resp.status,
      message: message.unwrap_or_else(|| "Gateway timeout".to_string()),
    },
    status => ApiError::Server {
      status,
      message: message
        .or_else(|| resp.body.as_str().map(str::to_string))
        .unwrap_or_else(|| "An unexpected error occurred".to_string()),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::http::testing::MockTransport;
  use crate::http::types::Method;
  use crate::lms::types::User;
  use crate::toast::ToastKind;
  use serde_json::json;

  fn setup() -> (Arc<MockTransport>, Arc<SessionStore>, Toasts, ErrorInterceptor) {
    let mock = Arc::new(MockTransport::new());
    let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    let toasts = Toasts::new();
    let chain = ErrorInterceptor::new(mock.clone(), session.clone(), toasts.clone());
    (mock, session, toasts, chain)
  }

  #[tokio::test]
  async fn test_unauthorized_logs_out_and_toasts() {
    let (mock, session, toasts, chain) = setup();
    let mut sub = toasts.subscribe();
    session.set_session(User::sample("u1"), "tok".to_string(), None);
    mock.on(Method::Get, "users/u1", Ok(ApiResponse::new(401, json!({}))));

    let err = chain.handle(ApiRequest::get("users/u1")).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
    assert!(session.token().is_none());
    assert_eq!(sub.try_recv().unwrap().kind, ToastKind::Error);
  }

  #[tokio::test]
  async fn test_validation_error_is_not_toasted() {
    let (mock, _, toasts, chain) = setup();
    let mut sub = toasts.subscribe();
    mock.on(
      Method::Post,
      "auth/register",
      Ok(ApiResponse::new(
        422,
        json!({"message": "Invalid data", "errors": {"email": ["taken"]}}),
      )),
    );

    let err = chain
      .handle(ApiRequest::post("auth/register", json!({})))
      .await
      .unwrap_err();
    assert_eq!(err.field_errors().unwrap()["email"], vec!["taken"]);
    assert!(sub.try_recv().is_none());
  }

  #[test]
  fn test_server_error_keeps_text_body() {
    let err = error_from_response(&ApiResponse::from_text(502, "Bad Gateway"));
    assert_eq!(
      err,
      ApiError::Server {
        status: 502,
        message: "Bad Gateway".to_string()
      }
    );
  }
}
