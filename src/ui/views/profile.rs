use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Wrap};
use tokio::sync::watch;

use super::{label, panel, plain_panel};
use crate::commands::Action;
use crate::lms::types::User;
use crate::lms::Services;
use crate::query::Query;
use crate::sync::SyncStatus;
use crate::ui::renderfns::relative_time;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ws::{ConnectionState, ConnectionStatus};

/// Account details plus the health of the live channel and the sync loop.
pub struct ProfileView {
  services: Services,
  user: Query<Option<User>>,
  connection: watch::Receiver<ConnectionStatus>,
  sync: watch::Receiver<SyncStatus>,
}

impl ProfileView {
  pub fn new(
    services: Services,
    connection: watch::Receiver<ConnectionStatus>,
    sync: watch::Receiver<SyncStatus>,
  ) -> Self {
    let users = services.users.clone();
    let mut user = Query::new(move || {
      let users = users.clone();
      async move { users.refresh_current().await }
    });
    user.fetch();

    Self {
      services,
      user,
      connection,
      sync,
    }
  }

  fn account_lines(&self) -> Vec<Line<'static>> {
    let user = self
      .user
      .data()
      .cloned()
      .flatten()
      .or_else(|| self.services.session.current_user());
    let Some(user) = user else {
      return vec![Line::raw("Not signed in")];
    };
    let since = user
      .enrollment_date
      .map(|at| at.format("%Y-%m-%d").to_string())
      .unwrap_or_else(|| "-".to_string());
    vec![
      Line::from(Span::styled(user.full_name(), Style::default().bold())),
      Line::from(vec![label("Email"), Span::raw(user.email.clone())]),
      Line::from(vec![label("Role"), Span::raw(format!("{:?}", user.role).to_lowercase())]),
      Line::from(vec![label("Member since"), Span::raw(since)]),
    ]
  }

  fn connection_lines(&self) -> Vec<Line<'static>> {
    let status = self.connection.borrow().clone();
    let now = Utc::now();
    let (state, color) = match status.state {
      ConnectionState::Connected => ("connected", Color::Green),
      ConnectionState::Connecting => ("connecting", Color::Yellow),
      ConnectionState::Disconnected if status.reconnecting => ("reconnecting", Color::Yellow),
      ConnectionState::Disconnected => ("disconnected", Color::Red),
    };
    let last = status
      .last_connected
      .map(|at| relative_time(at, now))
      .unwrap_or_else(|| "never".to_string());
    vec![
      Line::from(vec![label("Live channel"), Span::styled(state, Style::default().fg(color))]),
      Line::from(vec![label("Last connected"), Span::raw(last)]),
      Line::from(vec![label("Retries"), Span::raw(status.attempts.to_string())]),
      Line::from(vec![label("Queued messages"), Span::raw(status.queued.to_string())]),
    ]
  }

  fn sync_lines(&self) -> Vec<Line<'static>> {
    let status = self.sync.borrow().clone();
    let now = Utc::now();
    let last = status
      .last_sync
      .map(|at| relative_time(at, now))
      .unwrap_or_else(|| "never".to_string());
    let offline = self.services.enrollments.offline_progress().len();
    let mut lines = vec![
      Line::from(vec![
        label("Network"),
        if status.is_online {
          Span::styled("online", Style::default().fg(Color::Green))
        } else {
          Span::styled("offline", Style::default().fg(Color::Red))
        },
      ]),
      Line::from(vec![
        label("Last sync"),
        Span::raw(last),
        Span::styled(
          if status.pending_sync { "  (syncing)" } else { "" },
          Style::default().fg(Color::Yellow),
        ),
      ]),
      Line::from(vec![label("Offline progress"), Span::raw(offline.to_string())]),
    ];
    if !status.errors.is_empty() {
      lines.push(Line::from(label("Recent errors")));
      for e in status.errors.iter().rev() {
        lines.push(Line::from(Span::styled(
          format!("  {}", e),
          Style::default().fg(Color::Red),
        )));
      }
    }
    lines
  }

  fn feature_lines(&self) -> Vec<Line<'static>> {
    self
      .services
      .features
      .snapshot()
      .into_iter()
      .map(|(name, enabled)| {
        let (mark, color) = if enabled { ("on ", Color::Green) } else { ("off", Color::DarkGray) };
        Line::from(vec![
          Span::styled(format!("{} ", mark), Style::default().fg(color)),
          Span::raw(name),
        ])
      })
      .collect()
  }
}

impl View for ProfileView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => self.user.refetch(),
      KeyCode::Char('s') => return ViewAction::Run(Action::Sync),
      KeyCode::Char('c') => return ViewAction::Run(Action::Reconnect),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(6), Constraint::Min(6)])
      .split(area);
    let cols = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([
        Constraint::Percentage(35),
        Constraint::Percentage(40),
        Constraint::Percentage(25),
      ])
      .split(rows[1]);

    frame.render_widget(
      Paragraph::new(self.account_lines()).block(panel("Profile", &self.user)),
      rows[0],
    );
    frame.render_widget(
      Paragraph::new(self.connection_lines()).block(plain_panel("Connection")),
      cols[0],
    );
    frame.render_widget(
      Paragraph::new(self.sync_lines())
        .block(plain_panel("Sync"))
        .wrap(Wrap { trim: true }),
      cols[1],
    );
    frame.render_widget(
      Paragraph::new(self.feature_lines()).block(plain_panel("Features")),
      cols[2],
    );
  }

  fn breadcrumb_label(&self) -> String {
    "Profile".to_string()
  }

  fn tick(&mut self) {
    self.user.poll();
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("s", "sync now"),
      Shortcut::new("c", "reconnect"),
      Shortcut::new("q", "back"),
    ]
  }
}
