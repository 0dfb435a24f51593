use async_trait::async_trait;
use std::sync::Arc;

use crate::http::error::ApiError;
use crate::http::interceptors::errors::error_from_response;
use crate::http::transport::Handler;
use crate::http::types::{ApiRequest, ApiResponse, Method};

/// Retries GETs that failed transiently. Sits below the error and loading
/// interceptors, so a call is toasted and counted once however many
/// attempts it took.
pub struct RetryInterceptor {
  inner: Arc<dyn Handler>,
  retries: u32,
}

impl RetryInterceptor {
  pub fn new(inner: Arc<dyn Handler>, retries: u32) -> Self {
    Self { inner, retries }
  }
}

fn is_transient(result: &Result<ApiResponse, ApiError>) -> bool {
  match result {
    Ok(resp) if resp.is_success() => false,
    Ok(resp) => error_from_response(resp).is_transient(),
    Err(e) => e.is_transient(),
  }
}

#[async_trait]
impl Handler for RetryInterceptor {
  async fn handle(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
    let attempts = if req.method == Method::Get {
      self.retries + 1
    } else {
      1
    };

    let mut attempt = 1;
    loop {
      let result = self.inner.handle(req.clone()).await;
      if attempt >= attempts || !is_transient(&result) {
        return result;
      }
      tracing::debug!(path = %req.path, attempt, "retrying request");
      attempt += 1;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::MockTransport;
  use serde_json::json;
  use std::time::Duration;

  fn chain(mock: &Arc<MockTransport>) -> RetryInterceptor {
    RetryInterceptor::new(mock.clone(), 2)
  }

  #[tokio::test]
  async fn test_get_retries_transient_failures() {
    let mock = Arc::new(MockTransport::new());
    mock
      .on(Method::Get, "courses", Err(ApiError::Timeout(Duration::from_secs(30))))
      .on(Method::Get, "courses", Ok(ApiResponse::new(503, json!({}))))
      .ok(Method::Get, "courses", json!([]));

    let resp = chain(&mock).handle(ApiRequest::get("courses")).await.unwrap();
    assert!(resp.is_success());
    assert_eq!(mock.calls(Method::Get, "courses"), 3);
  }

  #[tokio::test]
  async fn test_get_gives_up_after_retries() {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Get, "courses", Err(ApiError::Network("down".into())));

    let err = chain(&mock).handle(ApiRequest::get("courses")).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    assert_eq!(mock.calls(Method::Get, "courses"), 3);
  }

  #[tokio::test]
  async fn test_no_retry_for_permanent_errors_or_writes() {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Get, "courses/x", Ok(ApiResponse::new(404, json!({}))));
    mock.on(Method::Post, "notifications", Err(ApiError::Network("down".into())));

    let retry = chain(&mock);
    let resp = retry.handle(ApiRequest::get("courses/x")).await.unwrap();
    assert_eq!(resp.status, 404);
    assert!(retry
      .handle(ApiRequest::post("notifications", json!({})))
      .await
      .is_err());
    assert_eq!(mock.total_calls(), 2);
  }
}
