use chrono::Utc;
use serde_json::{json, Value};

use super::types::{Course, UserAnalytics, WeeklyActivity};
use crate::http::{ApiClient, ApiError, ApiRequest};

#[derive(Clone)]
pub struct AnalyticsService {
  http: ApiClient,
}

impl AnalyticsService {
  pub fn new(http: ApiClient) -> Self {
    Self { http }
  }

  pub async fn user_analytics(&self, user_id: &str) -> Result<UserAnalytics, ApiError> {
    self.http.get(&format!("users/{}/analytics", user_id)).await
  }

  pub async fn stats(&self, user_id: &str) -> Result<Value, ApiError> {
    self.http.get(&format!("users/{}/stats", user_id)).await
  }

  pub async fn weekly_activity(&self, user_id: &str, weeks: u32) -> Result<Vec<WeeklyActivity>, ApiError> {
    let req =
      ApiRequest::get(format!("users/{}/weekly-activity", user_id)).with_param("weeks", weeks);
    self.http.execute(req).await
  }

  pub async fn learning_streak(&self, user_id: &str) -> Result<Value, ApiError> {
    self
      .http
      .get(&format!("users/{}/learning-streak", user_id))
      .await
  }

  pub async fn skills_progress(&self, user_id: &str) -> Result<Value, ApiError> {
    self
      .http
      .get(&format!("users/{}/skills-progress", user_id))
      .await
  }

  pub async fn completion_rate(&self, user_id: &str) -> Result<f64, ApiError> {
    self
      .http
      .get(&format!("users/{}/completion-rate", user_id))
      .await
  }

  /// Recommended courses. Never fails: errors degrade to an empty list.
  pub async fn recommendations(&self, user_id: &str) -> Vec<Course> {
    match self
      .http
      .get::<Vec<Course>>(&format!("users/{}/recommendations", user_id))
      .await
    {
      Ok(courses) => courses,
      Err(e) => {
        tracing::warn!(user_id, error = %e, "recommendations unavailable");
        Vec::new()
      }
    }
  }

  pub async fn track_event(&self, user_id: &str, event_type: &str, data: Value) -> Result<(), ApiError> {
    let body = json!({
      "userId": user_id,
      "eventType": event_type,
      "eventData": data,
      "timestamp": Utc::now().to_rfc3339(),
    });
    self
      .http
      .post::<Value, _>("analytics/events", &body)
      .await
      .map(|_| ())
  }

  /// Fire-and-forget variant: failures are only logged.
  pub async fn track(&self, user_id: &str, event_type: &str, data: Value) {
    if let Err(e) = self.track_event(user_id, event_type, data).await {
      tracing::debug!(event_type, error = %e, "failed to track event");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::MockTransport;
  use crate::http::Method;
  use std::sync::Arc;

  #[tokio::test]
  async fn test_recommendations_degrade_to_empty() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
      Method::Get,
      "users/u1/recommendations",
      Err(ApiError::Network("down".into())),
    );
    let analytics = AnalyticsService::new(ApiClient::new(mock));
    assert!(analytics.recommendations("u1").await.is_empty());
  }

  #[tokio::test]
  async fn test_track_event_body() {
    let mock = Arc::new(MockTransport::new());
    mock.ok(Method::Post, "analytics/events", Value::Null);
    let analytics = AnalyticsService::new(ApiClient::new(mock.clone()));

    analytics
      .track_event("u1", "course_enrolled", json!({"courseId": "c1"}))
      .await
      .unwrap();

    let body = mock.requests()[0].body.clone().unwrap();
    assert_eq!(body["userId"], "u1");
    assert_eq!(body["eventType"], "course_enrolled");
    assert_eq!(body["eventData"]["courseId"], "c1");
    assert!(body["timestamp"].is_string());
  }
}
