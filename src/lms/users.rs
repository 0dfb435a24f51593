use serde_json::Value;
use std::sync::Arc;

use super::types::{User, UserPreferences};
use crate::http::{ApiClient, ApiError};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct UserService {
  http: ApiClient,
  session: Arc<SessionStore>,
}

impl UserService {
  pub fn new(http: ApiClient, session: Arc<SessionStore>) -> Self {
    Self { http, session }
  }

  pub async fn get(&self, user_id: &str) -> Result<User, ApiError> {
    self.http.get(&format!("users/{}", user_id)).await
  }

  /// Re-fetch the signed-in user's profile and store it in the session.
  pub async fn refresh_current(&self) -> Result<Option<User>, ApiError> {
    let Some(user_id) = self.session.user_id() else {
      return Ok(None);
    };
    let user = self.get(&user_id).await?;
    self.session.update_user(user.clone());
    Ok(Some(user))
  }

  pub async fn update(&self, user_id: &str, changes: &Value) -> Result<User, ApiError> {
    let user: User = self.http.put(&format!("users/{}", user_id), changes).await?;
    if self.session.user_id().as_deref() == Some(user_id) {
      self.session.update_user(user.clone());
    }
    Ok(user)
  }

  pub async fn update_preferences(
    &self,
    user_id: &str,
    preferences: &UserPreferences,
  ) -> Result<UserPreferences, ApiError> {
    self
      .http
      .put(&format!("users/{}/preferences", user_id), preferences)
      .await
  }

  pub async fn stats(&self, user_id: &str) -> Result<Value, ApiError> {
    self.http.get(&format!("users/{}/stats", user_id)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::http::testing::MockTransport;
  use crate::http::Method;
  use serde_json::json;

  #[tokio::test]
  async fn test_refresh_current_updates_session() {
    let mock = Arc::new(MockTransport::new());
    mock.ok(
      Method::Get,
      "users/u1",
      json!({"id": "u1", "firstName": "Grace", "role": "admin"}),
    );
    let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
    let users = UserService::new(ApiClient::new(mock), session.clone());

    assert!(users.refresh_current().await.unwrap().is_none());

    session.set_session(User::sample("u1"), "tok".to_string(), None);
    users.refresh_current().await.unwrap();
    assert_eq!(session.current_user().unwrap().first_name, "Grace");
    assert!(session.has_role(crate::lms::types::Role::Admin));
  }
}
