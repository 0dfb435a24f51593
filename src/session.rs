//! Authenticated session state and the auth endpoints that change it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::KeyValueStore;
use crate::http::{ApiClient, ApiError};
use crate::lms::types::{Role, User};

pub const TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "currentUser";
pub const USER_ID_KEY: &str = "userId";

/// Who is signed in, if anyone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
  pub user: Option<User>,
  pub token: Option<String>,
}

impl AuthState {
  pub fn is_authenticated(&self) -> bool {
    self.user.is_some() && self.token.is_some()
  }

  pub fn user_id(&self) -> Option<&str> {
    self.user.as_ref().map(|u| u.id.as_str())
  }
}

/// Persisted session, published as a watch so the WebSocket client and
/// views can follow sign-in and sign-out.
pub struct SessionStore {
  store: Arc<dyn KeyValueStore>,
  state: watch::Sender<AuthState>,
}

impl SessionStore {
  /// Build the store and restore a previous session if its token is
  /// still valid. An expired session that carries a refresh token stays in
  /// storage, unpublished, until [`AuthService::restore`] exchanges it.
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    let (state, _) = watch::channel(AuthState::default());
    let session = Self { store, state };
    session.initialize(Utc::now());
    session
  }

  fn initialize(&self, now: DateTime<Utc>) {
    let token = self.read_raw(TOKEN_KEY);
    let user: Option<User> = self.store.get_json(USER_KEY);

    match (token, user) {
      (Some(token), Some(user)) if !token_expired(&token, now) => {
        tracing::info!(user_id = %user.id, "restored session");
        self.state.send_replace(AuthState {
          user: Some(user),
          token: Some(token),
        });
      }
      (Some(_), Some(user)) if self.refresh_token().is_some() => {
        tracing::info!(user_id = %user.id, "stored token expired, refresh pending");
      }
      (Some(_), _) => {
        tracing::info!("stored session expired");
        self.logout();
      }
      _ => self.clear_storage(),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<AuthState> {
    self.state.subscribe()
  }

  pub fn snapshot(&self) -> AuthState {
    self.state.borrow().clone()
  }

  pub fn token(&self) -> Option<String> {
    self.state.borrow().token.clone()
  }

  pub fn refresh_token(&self) -> Option<String> {
    self.read_raw(REFRESH_TOKEN_KEY)
  }

  /// True when storage holds an expired session that a refresh could
  /// bring back.
  pub fn awaiting_refresh(&self) -> bool {
    !self.is_authenticated()
      && self.read_raw(TOKEN_KEY).is_some()
      && self.refresh_token().is_some()
  }

  pub fn current_user(&self) -> Option<User> {
    self.state.borrow().user.clone()
  }

  pub fn user_id(&self) -> Option<String> {
    self.state.borrow().user_id().map(str::to_string)
  }

  pub fn is_authenticated(&self) -> bool {
    self.state.borrow().is_authenticated()
  }

  pub fn has_role(&self, role: Role) -> bool {
    self
      .state
      .borrow()
      .user
      .as_ref()
      .map(|u| u.role == role)
      .unwrap_or(false)
  }

  /// Persist a fresh session and publish it.
  pub fn set_session(&self, user: User, token: String, refresh_token: Option<String>) {
    self.persist_tokens(&token, refresh_token.as_deref());
    self.store.set_json(USER_KEY, &user);
    if let Err(e) = self.store.set(USER_ID_KEY, &user.id) {
      tracing::error!(error = %e, "failed to persist user id");
    }

    self.state.send_replace(AuthState {
      user: Some(user),
      token: Some(token),
    });
  }

  /// Replace the tokens of the current session.
  pub fn set_tokens(&self, token: String, refresh_token: Option<String>) {
    self.persist_tokens(&token, refresh_token.as_deref());
    self.state.send_modify(|state| state.token = Some(token));
  }

  /// Replace the profile of the signed-in user.
  pub fn update_user(&self, user: User) {
    self.store.set_json(USER_KEY, &user);
    self.state.send_modify(|state| state.user = Some(user));
  }

  /// Forget the session. Subscribers are only woken if one was active.
  pub fn logout(&self) {
    self.clear_storage();
    let was_active = self.state.send_if_modified(|state| {
      if *state == AuthState::default() {
        return false;
      }
      *state = AuthState::default();
      true
    });
    if was_active {
      tracing::info!("logged out");
    }
  }

  fn persist_tokens(&self, token: &str, refresh_token: Option<&str>) {
    if let Err(e) = self.store.set(TOKEN_KEY, token) {
      tracing::error!(error = %e, "failed to persist auth token");
    }
    if let Some(refresh) = refresh_token {
      if let Err(e) = self.store.set(REFRESH_TOKEN_KEY, refresh) {
        tracing::error!(error = %e, "failed to persist refresh token");
      }
    }
  }

  fn clear_storage(&self) {
    for key in [TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY, USER_ID_KEY] {
      self.store.remove(key);
    }
  }

  fn read_raw(&self, key: &str) -> Option<String> {
    match self.store.get(key) {
      Ok(value) => value,
      Err(e) => {
        tracing::error!(key, error = %e, "failed to read session key");
        None
      }
    }
  }
}

/// True unless `token` is a JWT whose `exp` lies after `now`.
pub fn token_expired(token: &str, now: DateTime<Utc>) -> bool {
  let Some(payload) = token.split('.').nth(1) else {
    return true;
  };
  let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
    return true;
  };
  let Ok(claims) = serde_json::from_slice::<Value>(&bytes) else {
    return true;
  };
  match claims.get("exp").and_then(Value::as_i64) {
    Some(exp) => now.timestamp() >= exp,
    None => true,
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
  user: User,
  token: String,
  refresh_token: Option<String>,
  #[allow(dead_code)]
  expires_in: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub password: String,
  pub confirm_password: String,
}

/// Auth endpoints under `api.auth_url`.
#[derive(Clone)]
pub struct AuthService {
  http: ApiClient,
  session: Arc<SessionStore>,
}

impl AuthService {
  pub fn new(http: ApiClient, session: Arc<SessionStore>) -> Self {
    Self { http, session }
  }

  pub fn session(&self) -> &Arc<SessionStore> {
    &self.session
  }

  pub async fn login(&self, email: &str, password: &str, remember_me: bool) -> Result<User, ApiError> {
    let body = json!({"email": email, "password": password, "rememberMe": remember_me});
    let payload: AuthPayload = self.http.post("login", &body).await.map_err(|e| {
      tracing::error!(error = %e, "login failed");
      e
    })?;
    Ok(self.accept(payload))
  }

  pub async fn register(&self, data: &RegisterData) -> Result<User, ApiError> {
    if data.password != data.confirm_password {
      return Err(ApiError::Validation {
        message: "Passwords do not match".to_string(),
        errors: [("confirmPassword".to_string(), vec!["must match password".to_string()])]
          .into_iter()
          .collect(),
      });
    }
    let payload: AuthPayload = self.http.post("register", data).await?;
    Ok(self.accept(payload))
  }

  /// Exchange the refresh token for a new access token. Any failure ends
  /// the session.
  pub async fn refresh(&self) -> Result<String, ApiError> {
    let payload = self.exchange_refresh_token().await?;
    self
      .session
      .set_tokens(payload.token.clone(), payload.refresh_token);
    Ok(payload.token)
  }

  /// Bring back a session whose access token expired while the app was
  /// closed. The refresh response carries the user, so the whole session is
  /// republished.
  pub async fn restore(&self) -> Result<User, ApiError> {
    let payload = self.exchange_refresh_token().await?;
    Ok(self.accept(payload))
  }

  async fn exchange_refresh_token(&self) -> Result<AuthPayload, ApiError> {
    let Some(refresh_token) = self.session.refresh_token() else {
      self.session.logout();
      return Err(ApiError::Unauthorized);
    };

    self
      .http
      .post::<AuthPayload, _>("refresh", &json!({"refreshToken": refresh_token}))
      .await
      .map_err(|e| {
        tracing::error!(error = %e, "token refresh failed");
        self.session.logout();
        e
      })
  }

  pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
    self.post_ignoring("forgot-password", json!({"email": email})).await
  }

  pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), ApiError> {
    self
      .post_ignoring("reset-password", json!({"token": token, "password": password}))
      .await
  }

  pub async fn change_password(&self, current: &str, new: &str) -> Result<(), ApiError> {
    self
      .post_ignoring(
        "change-password",
        json!({"currentPassword": current, "newPassword": new}),
      )
      .await
  }

  pub async fn verify_email(&self, token: &str) -> Result<(), ApiError> {
    self.post_ignoring("verify-email", json!({"token": token})).await
  }

  pub fn logout(&self) {
    self.session.logout();
  }

  fn accept(&self, payload: AuthPayload) -> User {
    let user = payload.user.clone();
    tracing::info!(user_id = %user.id, "signed in");
    self
      .session
      .set_session(payload.user, payload.token, payload.refresh_token);
    user
  }

  async fn post_ignoring(&self, path: &str, body: Value) -> Result<(), ApiError> {
    self.http.post::<Value, _>(path, &body).await.map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::http::testing::MockTransport;
  use crate::http::Method;

  fn jwt_with_exp(exp: i64) -> String {
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{}}}"#, exp));
    format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", claims)
  }

  fn seeded_store(token: &str) -> Arc<dyn KeyValueStore> {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
    store.set(TOKEN_KEY, token).unwrap();
    store.set_json(USER_KEY, &User::sample("u1"));
    store
  }

  #[test]
  fn test_token_expiry() {
    let now = Utc::now();
    assert!(!token_expired(&jwt_with_exp(now.timestamp() + 60), now));
    assert!(token_expired(&jwt_with_exp(now.timestamp() - 60), now));
    assert!(token_expired("not-a-jwt", now));
    assert!(token_expired("a.!!!.c", now));
  }

  #[test]
  fn test_restores_unexpired_session() {
    let token = jwt_with_exp(Utc::now().timestamp() + 3600);
    let session = SessionStore::new(seeded_store(&token));
    assert!(session.is_authenticated());
    assert_eq!(session.user_id().as_deref(), Some("u1"));
    assert_eq!(session.token(), Some(token));
  }

  #[test]
  fn test_expired_session_is_cleared() {
    let store = seeded_store(&jwt_with_exp(Utc::now().timestamp() - 10));
    let session = SessionStore::new(store.clone());
    assert!(!session.is_authenticated());
    assert_eq!(store.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(store.get(USER_KEY).unwrap(), None);
  }

  #[test]
  fn test_expired_session_with_refresh_token_waits_for_refresh() {
    let store = seeded_store(&jwt_with_exp(Utc::now().timestamp() - 10));
    store.set(REFRESH_TOKEN_KEY, "r1").unwrap();

    let session = SessionStore::new(store.clone());

    assert!(!session.is_authenticated());
    assert!(session.awaiting_refresh());
    assert_eq!(session.refresh_token().as_deref(), Some("r1"));
    assert!(store.get(USER_KEY).unwrap().is_some());
  }

  #[test]
  fn test_logout_notifies_only_when_active() {
    let session = SessionStore::new(Arc::new(MemoryStorage::new()));
    let mut rx = session.subscribe();
    session.logout();
    assert!(!rx.has_changed().unwrap());

    session.set_session(User::sample("u1"), "tok".to_string(), None);
    rx.borrow_and_update();
    session.logout();
    assert!(rx.has_changed().unwrap());
    assert!(!rx.borrow().is_authenticated());
  }

  #[test]
  fn test_has_role() {
    let session = SessionStore::new(Arc::new(MemoryStorage::new()));
    assert!(!session.has_role(Role::Trainee));
    session.set_session(User::sample("u1"), "tok".to_string(), None);
    assert!(session.has_role(Role::Trainee));
    assert!(!session.has_role(Role::Admin));
  }

  fn auth_service() -> (Arc<MockTransport>, AuthService, Arc<dyn KeyValueStore>) {
    let mock = Arc::new(MockTransport::new());
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
    let session = Arc::new(SessionStore::new(store.clone()));
    let service = AuthService::new(ApiClient::new(mock.clone()), session);
    (mock, service, store)
  }

  #[tokio::test]
  async fn test_login_persists_session() {
    let (mock, auth, store) = auth_service();
    mock.ok(
      Method::Post,
      "login",
      json!({"user": {"id": "u1", "firstName": "Ada"}, "token": "t1", "refreshToken": "r1", "expiresIn": 3600}),
    );

    let user = auth.login("ada@example.com", "pw", false).await.unwrap();
    assert_eq!(user.first_name, "Ada");
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("t1"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
    assert_eq!(store.get(USER_ID_KEY).unwrap().as_deref(), Some("u1"));
    assert!(auth.session().is_authenticated());
  }

  #[tokio::test]
  async fn test_refresh_without_token_logs_out() {
    let (mock, auth, _) = auth_service();
    auth
      .session()
      .set_session(User::sample("u1"), "t1".to_string(), None);

    assert_eq!(auth.refresh().await.unwrap_err(), ApiError::Unauthorized);
    assert!(!auth.session().is_authenticated());
    assert_eq!(mock.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_refresh_replaces_token() {
    let (mock, auth, store) = auth_service();
    auth
      .session()
      .set_session(User::sample("u1"), "t1".to_string(), Some("r1".to_string()));
    mock.ok(
      Method::Post,
      "refresh",
      json!({"user": {"id": "u1"}, "token": "t2", "refreshToken": "r2"}),
    );

    assert_eq!(auth.refresh().await.unwrap(), "t2");
    assert_eq!(auth.session().token().as_deref(), Some("t2"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r2"));
  }

  #[tokio::test]
  async fn test_restore_republishes_expired_session() {
    let mock = Arc::new(MockTransport::new());
    let store = seeded_store(&jwt_with_exp(Utc::now().timestamp() - 10));
    store.set(REFRESH_TOKEN_KEY, "r1").unwrap();
    let session = Arc::new(SessionStore::new(store.clone()));
    let auth = AuthService::new(ApiClient::new(mock.clone()), session.clone());
    mock.ok(
      Method::Post,
      "refresh",
      json!({"user": {"id": "u1"}, "token": "t2", "refreshToken": "r2"}),
    );

    let user = auth.restore().await.unwrap();

    assert_eq!(user.id, "u1");
    assert!(session.is_authenticated());
    assert!(!session.awaiting_refresh());
    assert_eq!(session.token().as_deref(), Some("t2"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r2"));
  }

  #[tokio::test]
  async fn test_register_checks_password_confirmation() {
    let (mock, auth, _) = auth_service();
    let data = RegisterData {
      password: "a".into(),
      confirm_password: "b".into(),
      ..Default::default()
    };
    assert!(matches!(
      auth.register(&data).await,
      Err(ApiError::Validation { .. })
    ));
    assert_eq!(mock.total_calls(), 0);
  }
}
