use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::watch;

use super::types::{AppNotification, NotificationType, Priority};
use crate::http::{ApiClient, ApiError, ApiRequest};

#[derive(Debug, Clone, Default)]
pub struct NotificationQuery {
  pub unread_only: bool,
  pub kind: Option<String>,
  pub limit: Option<u32>,
  pub offset: Option<u32>,
}

/// Persistent (server-side) notifications. The list and its unread count
/// are kept as watches for the header badge.
pub struct NotificationService {
  http: ApiClient,
  list: watch::Sender<Vec<AppNotification>>,
  unread: watch::Sender<usize>,
}

impl NotificationService {
  pub fn new(http: ApiClient) -> Self {
    Self {
      http,
      list: watch::Sender::new(Vec::new()),
      unread: watch::Sender::new(0),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<Vec<AppNotification>> {
    self.list.subscribe()
  }

  pub fn subscribe_unread(&self) -> watch::Receiver<usize> {
    self.unread.subscribe()
  }

  pub fn unread_count(&self) -> usize {
    *self.unread.borrow()
  }

  pub async fn load(&self, user_id: &str, query: &NotificationQuery) -> Result<Vec<AppNotification>, ApiError> {
    let mut req = ApiRequest::get(format!("users/{}/notifications", user_id))
      .with_opt_param("type", query.kind.as_deref())
      .with_opt_param("limit", query.limit)
      .with_opt_param("offset", query.offset);
    if query.unread_only {
      req = req.with_param("unreadOnly", true);
    }

    let notifications: Vec<AppNotification> = self.http.execute(req).await?;
    self.publish(notifications.clone());
    Ok(notifications)
  }

  pub async fn mark_read(&self, notification_id: &str) -> Result<(), ApiError> {
    self
      .http
      .put::<Value, _>(&format!("notifications/{}/read", notification_id), &json!({}))
      .await?;
    self.update(|list| {
      for n in list.iter_mut().filter(|n| n.id == notification_id) {
        n.is_read = true;
      }
    });
    Ok(())
  }

  pub async fn mark_all_read(&self, user_id: &str) -> Result<(), ApiError> {
    self
      .http
      .put::<Value, _>(
        &format!("users/{}/notifications/read-all", user_id),
        &json!({}),
      )
      .await?;
    self.update(|list| list.iter_mut().for_each(|n| n.is_read = true));
    Ok(())
  }

  pub async fn delete(&self, notification_id: &str) -> Result<(), ApiError> {
    self
      .http
      .delete::<Value>(&format!("notifications/{}", notification_id))
      .await?;
    self.update(|list| list.retain(|n| n.id != notification_id));
    Ok(())
  }

  pub async fn create(
    &self,
    user_id: &str,
    kind: NotificationType,
    title: &str,
    message: &str,
    priority: Priority,
  ) -> Result<AppNotification, ApiError> {
    let body = json!({
      "userId": user_id,
      "type": kind,
      "title": title,
      "message": message,
      "priority": priority,
    });
    self.http.post("notifications", &body).await
  }

  pub async fn schedule_study_reminder(
    &self,
    user_id: &str,
    course_id: &str,
    at: DateTime<Utc>,
  ) -> Result<(), ApiError> {
    let body = json!({
      "userId": user_id,
      "courseId": course_id,
      "scheduledFor": at.to_rfc3339(),
      "type": "study_reminder",
    });
    self.http.post::<Value, _>("reminders", &body).await.map(|_| ())
  }

  pub async fn cancel_study_reminder(&self, reminder_id: &str) -> Result<(), ApiError> {
    self
      .http
      .delete::<Value>(&format!("reminders/{}", reminder_id))
      .await
      .map(|_| ())
  }

  fn publish(&self, list: Vec<AppNotification>) {
    self.unread.send_replace(count_unread(&list));
    self.list.send_replace(list);
  }

  fn update(&self, f: impl FnOnce(&mut Vec<AppNotification>)) {
    let mut list = self.list.borrow().clone();
    f(&mut list);
    self.publish(list);
  }
}

fn count_unread(list: &[AppNotification]) -> usize {
  list.iter().filter(|n| !n.is_read).count()
}
