//! Wire format of the real-time channel.
//!
//! Inbound frames are `{type, payload, timestamp, userId}` JSON objects.
//! They are decoded here into a closed set of [`ServerEvent`]s; anything
//! that does not match a known type and payload shape is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::WsError;

/// Key of the persisted outbound queue in the key-value store.
pub const QUEUE_KEY: &str = "queuedMessages";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Frame {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  payload: Value,
  timestamp: Option<DateTime<Utc>>,
  user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
  EnrollmentUpdate {
    enrollment_id: String,
  },
  NewNotification {
    title: String,
    message: String,
  },
  CourseUpdate {
    course_id: String,
    course_title: String,
  },
  AchievementEarned {
    title: String,
    description: String,
  },
  UserUpdated {
    user_id: String,
  },
}

impl ServerEvent {
  /// The wire `type` tag.
  pub fn kind(&self) -> &'static str {
    match self {
      ServerEvent::EnrollmentUpdate { .. } => "enrollment_update",
      ServerEvent::NewNotification { .. } => "new_notification",
      ServerEvent::CourseUpdate { .. } => "course_update",
      ServerEvent::AchievementEarned { .. } => "achievement_earned",
      ServerEvent::UserUpdated { .. } => "user_updated",
    }
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollmentPayload {
  enrollment_id: String,
}

#[derive(Deserialize)]
struct NotificationPayload {
  title: String,
  #[serde(default)]
  message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoursePayload {
  course_id: String,
  #[serde(default)]
  course_title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AchievementPayload {
  achievement_title: String,
  #[serde(default)]
  achievement_description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
  user_id: String,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
  pub event: ServerEvent,
  pub timestamp: DateTime<Utc>,
  pub user_id: Option<String>,
}

impl InboundMessage {
  pub fn decode(text: &str) -> Result<Self, WsError> {
    let frame: Frame =
      serde_json::from_str(text).map_err(|e| WsError::Malformed(e.to_string()))?;

    let event = match frame.kind.as_str() {
      "enrollment_update" => {
        let p: EnrollmentPayload = payload(frame.payload)?;
        ServerEvent::EnrollmentUpdate {
          enrollment_id: p.enrollment_id,
        }
      }
      "new_notification" => {
        let p: NotificationPayload = payload(frame.payload)?;
        ServerEvent::NewNotification {
          title: p.title,
          message: p.message,
        }
      }
      "course_update" => {
        let p: CoursePayload = payload(frame.payload)?;
        ServerEvent::CourseUpdate {
          course_id: p.course_id,
          course_title: p.course_title,
        }
      }
      "achievement_earned" => {
        let p: AchievementPayload = payload(frame.payload)?;
        ServerEvent::AchievementEarned {
          title: p.achievement_title,
          description: p.achievement_description,
        }
      }
      "user_updated" => {
        let p: UserPayload = payload(frame.payload)?;
        ServerEvent::UserUpdated { user_id: p.user_id }
      }
      _ => return Err(WsError::UnknownType(frame.kind)),
    };

    Ok(Self {
      event,
      timestamp: frame.timestamp.unwrap_or_else(Utc::now),
      user_id: frame.user_id,
    })
  }
}

fn payload<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, WsError> {
  serde_json::from_value(value).map_err(|e| WsError::Malformed(e.to_string()))
}

/// An outbound frame as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
  #[serde(rename = "type")]
  pub kind: String,
  pub payload: Value,
  pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
  pub fn new(kind: impl Into<String>, payload: Value) -> Self {
    Self {
      kind: kind.into(),
      payload,
      timestamp: Utc::now(),
    }
  }

  pub fn to_text(&self) -> Result<String, WsError> {
    serde_json::to_string(self).map_err(|e| WsError::Malformed(e.to_string()))
  }
}

/// A send recorded while the socket was down. Replayed with a fresh
/// timestamp once a connection opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
  #[serde(rename = "type")]
  pub kind: String,
  pub data: Value,
  pub timestamp: DateTime<Utc>,
}

impl From<OutboundMessage> for QueuedMessage {
  fn from(msg: OutboundMessage) -> Self {
    Self {
      kind: msg.kind,
      data: msg.payload,
      timestamp: msg.timestamp,
    }
  }
}

impl From<QueuedMessage> for OutboundMessage {
  fn from(queued: QueuedMessage) -> Self {
    OutboundMessage::new(queued.kind, queued.data)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_decodes_known_events() {
    let msg = InboundMessage::decode(
      r#"{"type":"course_update","payload":{"courseId":"c1","courseTitle":"Rust 101"},"timestamp":"2024-03-01T10:00:00Z","userId":"u1"}"#,
    )
    .unwrap();

    assert_eq!(
      msg.event,
      ServerEvent::CourseUpdate {
        course_id: "c1".into(),
        course_title: "Rust 101".into(),
      }
    );
    assert_eq!(msg.user_id.as_deref(), Some("u1"));
    assert_eq!(msg.timestamp.to_rfc3339(), "2024-03-01T10:00:00+00:00");

    let msg = InboundMessage::decode(
      r#"{"type":"achievement_earned","payload":{"achievementTitle":"First Steps"}}"#,
    )
    .unwrap();
    assert_eq!(msg.event.kind(), "achievement_earned");
  }

  #[test]
  fn test_rejects_unknown_and_malformed_frames() {
    assert!(matches!(
      InboundMessage::decode(r#"{"type":"mystery","payload":{}}"#),
      Err(WsError::UnknownType(kind)) if kind == "mystery"
    ));
    assert!(matches!(
      InboundMessage::decode("not json"),
      Err(WsError::Malformed(_))
    ));
    // known type, wrong payload shape
    assert!(matches!(
      InboundMessage::decode(r#"{"type":"enrollment_update","payload":{"id":"e1"}}"#),
      Err(WsError::Malformed(_))
    ));
    assert!(matches!(
      InboundMessage::decode(r#"{"type":"user_updated"}"#),
      Err(WsError::Malformed(_))
    ));
  }

  #[test]
  fn test_outbound_wire_shape() {
    let msg = OutboundMessage::new("join_room", json!({"roomId": "r1"}));
    let wire: Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
    assert_eq!(wire["type"], "join_room");
    assert_eq!(wire["payload"]["roomId"], "r1");
    assert!(wire["timestamp"].is_string());

    let queued = QueuedMessage::from(msg.clone());
    assert_eq!(queued.kind, "join_room");
    assert_eq!(queued.data, msg.payload);
  }
}
