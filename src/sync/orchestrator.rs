//! Keeps local state in step with the backend.
//!
//! Three inputs drive it: a fixed-interval poll, connectivity transitions
//! and pushed WebSocket events. Pushed events are treated as invalidation
//! signals only; the affected resource is always re-fetched.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::{CacheLayer, KeyValueStore};
use crate::http::interceptors::CacheInterceptor;
use crate::http::ApiError;
use crate::lms::enrollments::{EnrollmentQuery, PENDING_SYNC_KEY};
use crate::lms::notifications::NotificationQuery;
use crate::lms::{
  AnalyticsService, CourseService, EnrollmentService, NotificationService, Services, UserService,
};
use crate::session::SessionStore;
use crate::subject::{Subscription, Teardown};
use crate::toast::Toasts;
use crate::ws::{InboundMessage, ServerEvent};

/// Length of the rolling error log.
pub const MAX_SYNC_ERRORS: usize = 5;

/// Default age after which cached data counts as stale.
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
  pub is_online: bool,
  pub last_sync: Option<DateTime<Utc>>,
  /// A cycle is in flight
  pub pending_sync: bool,
  /// Most recent failures, oldest first
  pub errors: Vec<String>,
}

pub struct DataSync {
  status: watch::Sender<SyncStatus>,
  interval: Duration,
  session: Arc<SessionStore>,
  enrollments: Arc<EnrollmentService>,
  notifications: Arc<NotificationService>,
  courses: Arc<CourseService>,
  analytics: AnalyticsService,
  users: UserService,
  response_cache: Arc<CacheInterceptor>,
  object_cache: CacheLayer,
  store: Arc<dyn KeyValueStore>,
  toasts: Toasts,
}

impl DataSync {
  pub fn new(services: &Services, interval: Duration) -> Self {
    Self {
      status: watch::Sender::new(SyncStatus {
        is_online: true,
        ..Default::default()
      }),
      interval,
      session: services.session.clone(),
      enrollments: services.enrollments.clone(),
      notifications: services.notifications.clone(),
      courses: services.courses.clone(),
      analytics: services.analytics.clone(),
      users: services.users.clone(),
      response_cache: services.http.cache.clone(),
      object_cache: services.object_cache.clone(),
      store: services.store.clone(),
      toasts: services.toasts.clone(),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
    self.status.subscribe()
  }

  pub fn status(&self) -> SyncStatus {
    self.status.borrow().clone()
  }

  /// Atomically claim the in-flight flag.
  fn begin(&self, require_online: bool) -> bool {
    self.status.send_if_modified(|s| {
      if s.pending_sync || (require_online && !s.is_online) {
        return false;
      }
      s.pending_sync = true;
      true
    })
  }

  fn finish(&self, result: &Result<(), ApiError>) {
    self.status.send_modify(|s| {
      s.pending_sync = false;
      match result {
        Ok(()) => {
          s.last_sync = Some(Utc::now());
          s.errors.clear();
        }
        Err(e) => push_error(s, format!("User data sync failed: {}", e)),
      }
    });
  }

  /// One poll cycle: enrollments, then notifications, for the signed-in
  /// user. `Ok(false)` when skipped because the client is offline, nobody
  /// is signed in or another cycle is still running.
  pub async fn run_cycle(&self) -> Result<bool, ApiError> {
    self.cycle(true).await
  }

  async fn cycle(&self, require_online: bool) -> Result<bool, ApiError> {
    let Some(user_id) = self.session.user_id() else {
      return Ok(false);
    };
    if !self.begin(require_online) {
      tracing::debug!("sync skipped");
      return Ok(false);
    }

    let result = self.sync_user_data(&user_id).await;
    self.finish(&result);
    match result {
      Ok(()) => {
        tracing::debug!(user_id = %user_id, "sync cycle complete");
        Ok(true)
      }
      Err(e) => {
        tracing::warn!(user_id = %user_id, error = %e, "sync cycle failed");
        Err(e)
      }
    }
  }

  async fn sync_user_data(&self, user_id: &str) -> Result<(), ApiError> {
    self
      .enrollments
      .list(user_id, &EnrollmentQuery::default())
      .await?;
    self
      .notifications
      .load(user_id, &NotificationQuery::default())
      .await?;
    Ok(())
  }

  /// User-triggered sync, reported through toasts.
  pub async fn force_sync_all(&self) -> Result<(), ApiError> {
    match self.cycle(false).await {
      Ok(true) => {
        self.toasts.success("Data synchronized successfully!");
        Ok(())
      }
      Ok(false) => {
        if self.session.is_authenticated() {
          self.toasts.info("Sync", "A sync is already in progress");
        }
        Ok(())
      }
      Err(e) => {
        self.toasts.error("Sync failed. Please try again.");
        Err(e)
      }
    }
  }

  /// Record a connectivity change. Coming online flushes offline work;
  /// going offline only flips the flag.
  pub async fn set_online(&self, online: bool) {
    let changed = self.status.send_if_modified(|s| {
      if s.is_online == online {
        return false;
      }
      s.is_online = online;
      true
    });

    if changed {
      tracing::info!(online, "sync connectivity changed");
      if online {
        self.flush_offline().await;
      }
    }
  }

  pub fn has_offline_work(&self) -> bool {
    self.store.get_json::<bool>(PENDING_SYNC_KEY).unwrap_or(false)
      || !self.enrollments.offline_progress().is_empty()
  }

  /// Upload progress recorded while offline and clear the marker.
  pub async fn flush_offline(&self) {
    match self.enrollments.sync_offline_progress().await {
      Ok(count) => {
        if count > 0 {
          self
            .toasts
            .success("Your offline progress has been synced successfully!");
        }
        self.store.remove(PENDING_SYNC_KEY);
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to sync offline data");
        self
          .status
          .send_modify(|s| push_error(s, format!("Offline sync failed: {}", e)));
      }
    }
  }

  /// React to a pushed event by re-fetching what it touches.
  pub async fn handle_event(&self, msg: &InboundMessage) {
    tracing::debug!(kind = msg.event.kind(), "handling real-time update");

    match &msg.event {
      ServerEvent::EnrollmentUpdate { enrollment_id } => {
        if let Err(e) = self.enrollments.get(enrollment_id).await {
          tracing::warn!(enrollment_id = %enrollment_id, error = %e, "failed to refresh enrollment");
        }
      }
      ServerEvent::NewNotification { title, message } => {
        self.toasts.info(title, message);
        if let Some(user_id) = self.session.user_id() {
          if let Err(e) = self
            .notifications
            .load(&user_id, &NotificationQuery::default())
            .await
          {
            tracing::warn!(error = %e, "failed to refresh notifications");
          }
        }
      }
      ServerEvent::CourseUpdate {
        course_id,
        course_title,
      } => {
        self.response_cache.clear_for("courses");
        if let Err(e) = self.courses.get(course_id).await {
          tracing::warn!(course_id = %course_id, error = %e, "failed to refresh course");
        }
        let name = if course_title.is_empty() {
          "A course you follow"
        } else {
          course_title.as_str()
        };
        self.toasts.info(
          "Course Updated",
          &format!("{} has new content available!", name),
        );
      }
      ServerEvent::AchievementEarned { title, description } => {
        self
          .toasts
          .achievement(&format!("🏆 {}", title), description);
        if let Some(user_id) = self.session.user_id() {
          match self.analytics.user_analytics(&user_id).await {
            Ok(analytics) => {
              self
                .object_cache
                .set(&format!("analytics-{}", user_id), &analytics, None);
            }
            Err(e) => tracing::warn!(error = %e, "failed to refresh analytics"),
          }
        }
      }
      ServerEvent::UserUpdated { user_id } => {
        if self.session.user_id().as_deref() == Some(user_id.as_str()) {
          if let Err(e) = self.users.refresh_current().await {
            tracing::warn!(user_id = %user_id, error = %e, "failed to refresh user profile");
          }
        }
      }
    }
  }

  /// Run the poll loop until teardown. The first cycle runs immediately.
  pub fn spawn(
    self: &Arc<Self>,
    mut online: watch::Receiver<bool>,
    mut events: Subscription<InboundMessage>,
    teardown: Teardown,
  ) -> JoinHandle<()> {
    let sync = Arc::clone(self);

    tokio::spawn(async move {
      let initially_online = *online.borrow_and_update();
      sync.status.send_modify(|s| s.is_online = initially_online);
      if initially_online && sync.has_offline_work() {
        sync.flush_offline().await;
      }

      let mut ticker = tokio::time::interval(sync.interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      let mut watching_online = true;
      let mut watching_events = true;

      loop {
        tokio::select! {
          _ = teardown.fired() => break,
          _ = ticker.tick() => {
            // failures are already in the status error log
            let _ = sync.run_cycle().await;
          }
          changed = online.changed(), if watching_online => {
            if changed.is_err() {
              watching_online = false;
              continue;
            }
            let now_online = *online.borrow_and_update();
            sync.set_online(now_online).await;
          }
          event = events.recv(), if watching_events => match event {
            Some(msg) => sync.handle_event(&msg).await,
            None => watching_events = false,
          },
        }
      }
      tracing::debug!("sync loop stopped");
    })
  }
}

fn push_error(status: &mut SyncStatus, error: String) {
  status.errors.push(error);
  if status.errors.len() > MAX_SYNC_ERRORS {
    let excess = status.errors.len() - MAX_SYNC_ERRORS;
    status.errors.drain(..excess);
  }
}

/// True when `last_update` is more than `max_age` ago.
pub fn is_data_stale(last_update: DateTime<Utc>, max_age: Duration) -> bool {
  is_stale_at(last_update, max_age, Utc::now())
}

fn is_stale_at(last_update: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
  match (now - last_update).to_std() {
    Ok(age) => age > max_age,
    // timestamps from the future are fresh
    Err(_) => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::config::Config;
  use crate::http::testing::MockTransport;
  use crate::http::Method;
  use crate::lms::types::User;
  use crate::subject::Subject;
  use crate::toast::{Toast, ToastKind};
  use serde_json::json;

  fn services(api: Arc<MockTransport>) -> Services {
    let mut config = Config::default();
    config.api.retries = 0;
    let storage = Arc::new(MemoryStorage::new());
    let services = Services::with_transports(
      &config,
      storage.clone(),
      storage,
      api,
      Arc::new(MockTransport::new()),
    );
    services
      .session
      .set_session(User::sample("u1"), "tok".into(), None);
    services
  }

  fn script_user_data(api: &MockTransport) {
    api.ok(Method::Get, "enrollments", json!([{"id": "e1"}]));
    api.ok(Method::Get, "users/u1/notifications", json!([]));
  }

  fn drain(toasts: &mut Subscription<Toast>) -> Vec<Toast> {
    let mut seen = Vec::new();
    while let Some(toast) = toasts.try_recv() {
      seen.push(toast);
    }
    seen
  }

  #[tokio::test(start_paused = true)]
  async fn test_cycles_never_overlap() {
    let api = Arc::new(MockTransport::new().with_delay(Duration::from_secs(2)));
    script_user_data(&api);
    let sync = DataSync::new(&services(api.clone()), Duration::from_secs(30));

    let (first, second) = tokio::join!(sync.run_cycle(), sync.run_cycle());
    assert_eq!(first, Ok(true));
    assert_eq!(second, Ok(false));
    assert_eq!(api.calls(Method::Get, "enrollments"), 1);

    let status = sync.status();
    assert!(!status.pending_sync);
    assert!(status.last_sync.is_some());
  }

  #[tokio::test]
  async fn test_error_log_keeps_last_five_and_clears_on_success() {
    let api = Arc::new(MockTransport::new());
    for i in 0..7 {
      api.on(
        Method::Get,
        "enrollments",
        Err(ApiError::Server {
          status: 500,
          message: format!("boom {}", i),
        }),
      );
    }
    api.ok(Method::Get, "enrollments", json!([]));
    api.ok(Method::Get, "users/u1/notifications", json!([]));
    let sync = DataSync::new(&services(api), Duration::from_secs(30));

    for _ in 0..7 {
      assert!(sync.run_cycle().await.is_err());
    }
    let status = sync.status();
    assert_eq!(status.errors.len(), MAX_SYNC_ERRORS);
    assert!(status.errors[0].contains("boom 2"));
    assert!(status.errors[4].contains("boom 6"));
    assert!(!status.pending_sync);
    assert!(status.last_sync.is_none());

    assert_eq!(sync.run_cycle().await, Ok(true));
    let status = sync.status();
    assert!(status.errors.is_empty());
    assert!(status.last_sync.is_some());
  }

  #[tokio::test]
  async fn test_offline_skips_cycles_and_online_flushes_progress() {
    let api = Arc::new(MockTransport::new());
    script_user_data(&api);
    api.ok(Method::Post, "enrollments/sync-offline", json!({}));
    let services = services(api.clone());
    let mut toasts = services.toasts.subscribe();
    let sync = DataSync::new(&services, Duration::from_secs(30));

    sync.set_online(false).await;
    assert_eq!(sync.run_cycle().await, Ok(false));
    assert_eq!(api.total_calls(), 0);

    services
      .enrollments
      .save_progress_offline("e1", "l1", json!({"timeSpent": 4}));
    assert!(sync.has_offline_work());

    sync.set_online(true).await;
    assert_eq!(api.calls(Method::Post, "enrollments/sync-offline"), 1);
    assert!(!sync.has_offline_work());
    let shown = drain(&mut toasts);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].kind, ToastKind::Success);

    // repeated "online" is not a transition
    sync.set_online(true).await;
    assert_eq!(api.calls(Method::Post, "enrollments/sync-offline"), 1);
  }

  #[tokio::test]
  async fn test_force_sync_reports_through_toasts() {
    let api = Arc::new(MockTransport::new());
    api.on(Method::Get, "enrollments", Err(ApiError::Network("down".into())));
    api.ok(Method::Get, "enrollments", json!([]));
    api.ok(Method::Get, "users/u1/notifications", json!([]));
    let services = services(api);
    let mut toasts = services.toasts.subscribe();
    let sync = DataSync::new(&services, Duration::from_secs(30));

    assert!(sync.force_sync_all().await.is_err());
    let shown = drain(&mut toasts);
    assert!(shown
      .iter()
      .any(|t| t.kind == ToastKind::Error && t.message.contains("Sync failed")));

    sync.force_sync_all().await.unwrap();
    let shown = drain(&mut toasts);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].kind, ToastKind::Success);
  }

  #[tokio::test]
  async fn test_events_refetch_affected_resources() {
    let api = Arc::new(MockTransport::new());
    api.ok(Method::Get, "enrollments/e1", json!({"id": "e1", "progress": {"overallProgress": 40}}));
    api.ok(Method::Get, "users/u1/notifications", json!([{"id": "n1", "title": "Hi"}]));
    api.ok(Method::Get, "courses/c1", json!({"id": "c1"}));
    api.ok(Method::Get, "users/u1", json!({"id": "u1", "firstName": "Grace"}));
    api.ok(Method::Get, "users/u1/analytics", json!({"currentStreak": 3}));
    let services = services(api.clone());
    let mut toasts = services.toasts.subscribe();
    let sync = DataSync::new(&services, Duration::from_secs(30));

    let event = |event: ServerEvent| InboundMessage {
      event,
      timestamp: Utc::now(),
      user_id: None,
    };

    sync
      .handle_event(&event(ServerEvent::EnrollmentUpdate {
        enrollment_id: "e1".into(),
      }))
      .await;
    assert_eq!(api.calls(Method::Get, "enrollments/e1"), 1);

    sync
      .handle_event(&event(ServerEvent::NewNotification {
        title: "Hi".into(),
        message: "New lesson".into(),
      }))
      .await;
    assert_eq!(services.notifications.subscribe().borrow().len(), 1);

    // a cached course must be re-fetched after an update push
    services.courses.get("c1").await.unwrap();
    sync
      .handle_event(&event(ServerEvent::CourseUpdate {
        course_id: "c1".into(),
        course_title: "Rust".into(),
      }))
      .await;
    assert_eq!(api.calls(Method::Get, "courses/c1"), 2);

    sync
      .handle_event(&event(ServerEvent::UserUpdated {
        user_id: "someone-else".into(),
      }))
      .await;
    assert_eq!(api.calls(Method::Get, "users/u1"), 0);
    sync
      .handle_event(&event(ServerEvent::UserUpdated {
        user_id: "u1".into(),
      }))
      .await;
    assert_eq!(services.session.current_user().unwrap().first_name, "Grace");

    sync
      .handle_event(&event(ServerEvent::AchievementEarned {
        title: "Streak".into(),
        description: "3 days".into(),
      }))
      .await;
    assert_eq!(api.calls(Method::Get, "users/u1/analytics"), 1);
    assert!(services
      .object_cache
      .get::<crate::lms::types::UserAnalytics>("analytics-u1")
      .is_some());

    let kinds: Vec<ToastKind> = drain(&mut toasts).into_iter().map(|t| t.kind).collect();
    assert_eq!(
      kinds,
      vec![ToastKind::Info, ToastKind::Info, ToastKind::Achievement]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_loop_polls_and_follows_connectivity() {
    let api = Arc::new(MockTransport::new());
    script_user_data(&api);
    let services = services(api.clone());
    let sync = Arc::new(DataSync::new(&services, Duration::from_secs(30)));
    let (online_tx, online_rx) = watch::channel(true);
    let events: Subject<InboundMessage> = Subject::new();
    let teardown = Teardown::new();

    let handle = sync.spawn(online_rx, events.subscribe(), teardown.clone());
    let mut status = sync.subscribe();
    status.wait_for(|s| s.last_sync.is_some()).await.unwrap();
    assert_eq!(api.calls(Method::Get, "enrollments"), 1);

    online_tx.send_replace(false);
    status.wait_for(|s| !s.is_online).await.unwrap();

    // offline: the next ticks are skipped
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(api.calls(Method::Get, "enrollments"), 1);

    teardown.fire();
    handle.await.unwrap();
  }

  #[test]
  fn test_staleness() {
    let now = Utc::now();
    assert!(!is_stale_at(now - chrono::Duration::minutes(4), STALE_AFTER, now));
    assert!(is_stale_at(now - chrono::Duration::minutes(6), STALE_AFTER, now));
    assert!(!is_stale_at(now + chrono::Duration::minutes(1), STALE_AFTER, now));
    assert!(!is_data_stale(Utc::now(), STALE_AFTER));
  }
}
