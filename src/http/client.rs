use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::error::ApiError;
use super::interceptors::errors::error_from_response;
use super::transport::Handler;
use super::types::{field_errors, ApiRequest, Envelope, Page};

/// REST client over an interceptor chain. Unwraps the response envelope.
#[derive(Clone)]
pub struct ApiClient {
  handler: Arc<dyn Handler>,
}

impl ApiClient {
  pub fn new(handler: Arc<dyn Handler>) -> Self {
    Self { handler }
  }

  pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    self.execute(ApiRequest::get(path)).await
  }

  pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    self.execute(ApiRequest::post(path, encode(body)?)).await
  }

  pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    self.execute(ApiRequest::put(path, encode(body)?)).await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    self.execute(ApiRequest::delete(path)).await
  }

  /// Send `req` and decode the envelope's `data`.
  pub async fn execute<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
    let envelope = self.send(req).await?;
    decode_data(envelope.data)
  }

  /// Like `execute`, keeping the pagination block.
  pub async fn get_page<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<Page<T>, ApiError> {
    let envelope = self.send(req).await?;
    let pagination = envelope.pagination;
    let items = decode_data::<Option<Vec<T>>>(envelope.data)?.unwrap_or_default();
    Ok(Page { items, pagination })
  }

  async fn send(&self, req: ApiRequest) -> Result<Envelope<Value>, ApiError> {
    let resp = self.handler.handle(req).await?;
    if !resp.is_success() {
      return Err(error_from_response(&resp));
    }

    let envelope: Envelope<Value> = serde_json::from_value(resp.body)
      .map_err(|e| ApiError::Decode(format!("invalid envelope: {}", e)))?;

    if !envelope.success {
      return Err(ApiError::Rejected {
        message: envelope
          .message
          .unwrap_or_else(|| "API request failed".to_string()),
        errors: field_errors(envelope.errors.as_ref()),
      });
    }

    Ok(envelope)
  }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
  serde_json::to_value(body).map_err(|e| ApiError::Decode(format!("bad request body: {}", e)))
}

fn decode_data<T: DeserializeOwned>(data: Option<Value>) -> Result<T, ApiError> {
  serde_json::from_value(data.unwrap_or(Value::Null)).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::MockTransport;
  use crate::http::types::{ApiResponse, Method, Pagination};
  use serde_json::json;

  fn client(mock: &Arc<MockTransport>) -> ApiClient {
    ApiClient::new(mock.clone())
  }

  #[tokio::test]
  async fn test_unwraps_envelope_data() {
    let mock = Arc::new(MockTransport::new());
    mock.ok(Method::Get, "categories", json!(["rust", "go"]));

    let data: Vec<String> = client(&mock).get("categories").await.unwrap();
    assert_eq!(data, vec!["rust", "go"]);
  }

  #[tokio::test]
  async fn test_unsuccessful_envelope_is_rejected() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
      Method::Post,
      "enrollments",
      Ok(ApiResponse::ok(
        json!({"success": false, "message": "Already enrolled", "errors": ["duplicate"]}),
      )),
    );

    let err = client(&mock)
      .post::<Value, _>("enrollments", &json!({"courseId": "c1"}))
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "Already enrolled");
    assert_eq!(err.field_errors().unwrap()["general"], vec!["duplicate"]);
  }

  #[tokio::test]
  async fn test_get_page_keeps_pagination() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
      Method::Get,
      "courses",
      Ok(ApiResponse::ok(json!({
        "success": true,
        "data": [1, 2],
        "pagination": {"page": 1, "limit": 2, "total": 7, "totalPages": 4}
      }))),
    );

    let page: Page<u32> = client(&mock)
      .get_page(ApiRequest::get("courses").with_param("page", 1))
      .await
      .unwrap();
    assert_eq!(page.items, vec![1, 2]);
    assert_eq!(
      page.pagination,
      Some(Pagination {
        page: 1,
        limit: 2,
        total: 7,
        total_pages: 4
      })
    );
  }
}
