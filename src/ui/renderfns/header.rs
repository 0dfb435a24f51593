use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::sync::SyncStatus;
use crate::ui::view::Shortcut;
use crate::ws::{ConnectionState, ConnectionStatus};

/// Everything the header shows, snapshotted once per frame
pub struct HeaderState<'a> {
  pub title: &'a str,
  pub user: Option<String>,
  pub connection: &'a ConnectionStatus,
  pub sync: &'a SyncStatus,
  pub busy: bool,
  pub unread: usize,
  pub shortcuts: &'a [Shortcut],
}

const SPINNER: &str = "⠿";

/// Draw the header bar with logo, context, live status and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, state: &HeaderState) {
  let sep = || Span::styled("│", Style::default().fg(Color::DarkGray));

  let mut spans = vec![
    Span::styled(" lms ", Style::default().fg(Color::Cyan).bold()),
    sep(),
    Span::styled(format!(" {} ", state.title), Style::default().fg(Color::White)),
    sep(),
    Span::styled(
      format!(" {} ", state.user.as_deref().unwrap_or("signed out")),
      Style::default().fg(Color::Yellow).bold(),
    ),
    sep(),
    connection_span(state.connection),
    sep(),
    sync_span(state.sync),
  ];

  if state.unread > 0 {
    spans.push(sep());
    spans.push(Span::styled(
      format!(" ✉ {} ", state.unread),
      Style::default().fg(Color::Magenta),
    ));
  }
  if state.busy {
    spans.push(Span::styled(
      format!(" {} ", SPINNER),
      Style::default().fg(Color::Cyan),
    ));
  }

  spans.push(Span::raw("  "));
  for shortcut in state.shortcuts {
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}   ", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

fn connection_label(status: &ConnectionStatus) -> (String, Color) {
  let label = match status.state {
    ConnectionState::Connected => ("● live".to_string(), Color::Green),
    ConnectionState::Connecting if status.reconnecting => {
      (format!("◌ retry {}", status.attempts), Color::Yellow)
    }
    ConnectionState::Connecting => ("◌ connecting".to_string(), Color::Yellow),
    ConnectionState::Disconnected => ("○ offline".to_string(), Color::Red),
  };
  if status.queued > 0 {
    (format!("{} ({} queued)", label.0, status.queued), label.1)
  } else {
    label
  }
}

fn connection_span(status: &ConnectionStatus) -> Span<'static> {
  let (label, color) = connection_label(status);
  Span::styled(format!(" {} ", label), Style::default().fg(color))
}

fn sync_span(status: &SyncStatus) -> Span<'static> {
  let (label, color) = if !status.is_online {
    ("no network".to_string(), Color::Red)
  } else if status.pending_sync {
    ("syncing".to_string(), Color::Yellow)
  } else if !status.errors.is_empty() {
    (format!("sync errors: {}", status.errors.len()), Color::Red)
  } else if let Some(at) = status.last_sync {
    (
      format!("synced {}", at.with_timezone(&chrono::Local).format("%H:%M")),
      Color::Green,
    )
  } else {
    ("not synced".to_string(), Color::DarkGray)
  };
  Span::styled(format!(" {} ", label), Style::default().fg(color))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_connection_label() {
    let mut status = ConnectionStatus::default();
    assert_eq!(connection_label(&status).0, "○ offline");

    status.state = ConnectionState::Connecting;
    status.reconnecting = true;
    status.attempts = 2;
    assert_eq!(connection_label(&status).0, "◌ retry 2");

    status.state = ConnectionState::Connected;
    status.queued = 3;
    assert_eq!(connection_label(&status).0, "● live (3 queued)");
  }
}
