//! Transient, auto-dismissing user notifications.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::subject::{Subject, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
  Info,
  Success,
  Warning,
  Error,
  Achievement,
}

impl ToastKind {
  /// How long a toast of this kind stays on screen unless overridden.
  pub fn default_duration(self) -> Duration {
    match self {
      ToastKind::Success => Duration::from_millis(4000),
      ToastKind::Error => Duration::from_millis(6000),
      ToastKind::Achievement => Duration::from_millis(8000),
      ToastKind::Info | ToastKind::Warning => Duration::from_millis(5000),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Toast {
  pub title: String,
  pub message: String,
  pub kind: ToastKind,
  pub duration: Duration,
  pub shown_at: DateTime<Utc>,
}

impl Toast {
  pub fn new(kind: ToastKind, title: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      message: message.into(),
      kind,
      duration: kind.default_duration(),
      shown_at: Utc::now(),
    }
  }

  pub fn with_duration(mut self, duration: Duration) -> Self {
    self.duration = duration;
    self
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    let elapsed = now.signed_duration_since(self.shown_at);
    elapsed.to_std().map(|e| e >= self.duration).unwrap_or(false)
  }
}

/// Toast publisher shared by services, interceptors and the sync agent.
#[derive(Clone, Default)]
pub struct Toasts {
  subject: Subject<Toast>,
}

impl Toasts {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self) -> Subscription<Toast> {
    self.subject.subscribe()
  }

  pub fn show(&self, toast: Toast) {
    tracing::debug!(title = %toast.title, kind = ?toast.kind, "toast");
    self.subject.emit(toast);
  }

  pub fn info(&self, title: &str, message: &str) {
    self.show(Toast::new(ToastKind::Info, title, message));
  }

  pub fn success(&self, message: &str) {
    self.show(Toast::new(ToastKind::Success, "Success", message));
  }

  pub fn error(&self, message: &str) {
    self.show(Toast::new(ToastKind::Error, "Error", message));
  }

  pub fn achievement(&self, title: &str, message: &str) {
    self.show(Toast::new(ToastKind::Achievement, title, message));
  }
}
