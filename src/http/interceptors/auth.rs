use async_trait::async_trait;
use std::sync::Arc;

use crate::http::error::ApiError;
use crate::http::transport::Handler;
use crate::http::types::{ApiRequest, ApiResponse};
use crate::session::SessionStore;

/// Attaches `Authorization: Bearer <token>` when a session is active.
pub struct AuthInterceptor {
  inner: Arc<dyn Handler>,
  session: Arc<SessionStore>,
}

impl AuthInterceptor {
  pub fn new(inner: Arc<dyn Handler>, session: Arc<SessionStore>) -> Self {
    Self { inner, session }
  }
}

#[async_trait]
impl Handler for AuthInterceptor {
  async fn handle(&self, mut req: ApiRequest) -> Result<ApiResponse, ApiError> {
    if let Some(token) = self.session.token() {
      if !req.has_header("Authorization") {
        req
          .headers
          .insert("Authorization".to_string(), format!("Bearer {}", token));
      }
    }
    self.inner.handle(req).await
  }
}
