//! Scripted transport for unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::error::ApiError;
use super::transport::Handler;
use super::types::{ApiRequest, ApiResponse, Method};

type Reply = Result<ApiResponse, ApiError>;

/// Answers requests from per-route scripts. A route's last reply repeats;
/// unknown routes get a 404.
#[derive(Default)]
pub struct MockTransport {
  routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
  requests: Mutex<Vec<ApiRequest>>,
  delay: Option<Duration>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sleep this long (tokio time) before answering each request.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn on(&self, method: Method, path: &str, reply: Reply) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .entry((method, path.to_string()))
      .or_default()
      .push_back(reply);
    self
  }

  /// Script a successful envelope carrying `data`.
  pub fn ok(&self, method: Method, path: &str, data: Value) -> &Self {
    self.on(method, path, Ok(envelope(data)))
  }

  pub fn calls(&self, method: Method, path: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.method == method && r.path == path)
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub fn requests(&self) -> Vec<ApiRequest> {
    self.requests.lock().unwrap().clone()
  }
}

pub fn envelope(data: Value) -> ApiResponse {
  ApiResponse::ok(json!({"success": true, "data": data}))
}

#[async_trait]
impl Handler for MockTransport {
  async fn handle(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
    self.requests.lock().unwrap().push(req.clone());

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    let mut routes = self.routes.lock().unwrap();
    match routes.get_mut(&(req.method, req.path.clone())) {
      Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
      Some(queue) if !queue.is_empty() => queue[0].clone(),
      _ => Ok(ApiResponse::new(404, json!({"message": "not found"}))),
    }
  }
}
