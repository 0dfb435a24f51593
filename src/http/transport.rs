use async_trait::async_trait;
use std::time::Duration;

use super::error::ApiError;
use super::types::{ApiRequest, ApiResponse};

/// One link of the request pipeline. Interceptors wrap an inner handler;
/// the innermost handler is the network transport.
#[async_trait]
pub trait Handler: Send + Sync {
  async fn handle(&self, req: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// reqwest-backed transport. Returns every HTTP status as a response;
/// only connection failures and timeouts become errors here.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
  base_url: String,
  timeout: Duration,
}

impl ReqwestTransport {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      timeout,
    })
  }

  fn url_for(&self, req: &ApiRequest) -> String {
    format!("{}/{}", self.base_url, req.path)
  }

  fn map_error(&self, e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
      ApiError::Timeout(self.timeout)
    } else {
      ApiError::Network(e.to_string())
    }
  }
}

#[async_trait]
impl Handler for ReqwestTransport {
  async fn handle(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
    let url = self.url_for(&req);
    tracing::trace!(method = %req.method, %url, "sending request");

    let mut builder = self
      .client
      .request(req.method.into(), &url)
      .header("Content-Type", "application/json");

    if !req.params.is_empty() {
      builder = builder.query(&req.params);
    }

    for (k, v) in &req.headers {
      builder = builder.header(k.as_str(), v.as_str());
    }

    if let Some(body) = &req.body {
      let encoded =
        serde_json::to_string(body).map_err(|e| ApiError::Decode(format!("bad body: {}", e)))?;
      builder = builder.body(encoded);
    }

    let resp = builder.send().await.map_err(|e| self.map_error(e))?;
    let status = resp.status().as_u16();
    let text = resp.text().await.map_err(|e| self.map_error(e))?;

    tracing::trace!(method = %req.method, %url, status, "received response");
    Ok(ApiResponse::from_text(status, &text))
  }
}
