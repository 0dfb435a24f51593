use chrono::{DateTime, Utc};
use ratatui::prelude::Color;

use crate::lms::types::{EnrollmentStatus, Priority};

/// Truncate to `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    return s.to_string();
  }
  let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
  format!("{}...", kept)
}

pub fn status_color(status: EnrollmentStatus) -> Color {
  match status {
    EnrollmentStatus::Completed => Color::Green,
    EnrollmentStatus::Active => Color::Yellow,
    EnrollmentStatus::Paused => Color::Blue,
    EnrollmentStatus::Dropped => Color::DarkGray,
  }
}

pub fn priority_color(priority: Priority) -> Color {
  match priority {
    Priority::High => Color::Red,
    Priority::Medium => Color::Yellow,
    Priority::Low => Color::DarkGray,
  }
}

/// Text progress bar like `[#####-----]  50%`.
pub fn progress_bar(percent: f64, width: usize) -> String {
  let percent = percent.clamp(0.0, 100.0);
  let filled = ((percent / 100.0) * width as f64).round() as usize;
  format!(
    "[{}{}] {:>3}%",
    "#".repeat(filled),
    "-".repeat(width - filled),
    percent.round() as u32
  )
}

/// Minutes as `1h 30m`.
pub fn format_minutes(minutes: u32) -> String {
  match (minutes / 60, minutes % 60) {
    (0, m) => format!("{}m", m),
    (h, 0) => format!("{}h", h),
    (h, m) => format!("{}h {}m", h, m),
  }
}

pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let secs = (now - at).num_seconds();
  if secs < 60 {
    "just now".to_string()
  } else if secs < 3600 {
    format!("{}m ago", secs / 60)
  } else if secs < 86_400 {
    format!("{}h ago", secs / 3600)
  } else {
    format!("{}d ago", secs / 86_400)
  }
}
