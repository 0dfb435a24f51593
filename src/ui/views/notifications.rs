use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph, Wrap};
use tokio::sync::watch;

use super::{panel, plain_panel, render_empty};
use crate::lms::notifications::NotificationQuery;
use crate::lms::types::AppNotification;
use crate::lms::Services;
use crate::query::Query;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{priority_color, relative_time, truncate};
use crate::ui::spawn_action;
use crate::ui::view::{Shortcut, View, ViewAction};

/// Inbox. The list renders from the service's watch so reads, deletes and
/// pushes from the sync loop show up without a refetch.
pub struct NotificationsView {
  services: Services,
  user_id: String,
  query: Query<Vec<AppNotification>>,
  list: watch::Receiver<Vec<AppNotification>>,
  list_state: ListState,
  unread_only: bool,
}

impl NotificationsView {
  pub fn new(services: Services, user_id: String) -> Self {
    let mut view = Self {
      query: Self::load_query(&services, &user_id, false),
      list: services.notifications.subscribe(),
      services,
      user_id,
      list_state: ListState::default(),
      unread_only: false,
    };
    view.query.fetch();
    view
  }

  fn load_query(services: &Services, user_id: &str, unread_only: bool) -> Query<Vec<AppNotification>> {
    let notifications = services.notifications.clone();
    let user_id = user_id.to_string();
    Query::new(move || {
      let notifications = notifications.clone();
      let user_id = user_id.clone();
      let query = NotificationQuery {
        unread_only,
        ..Default::default()
      };
      async move { notifications.load(&user_id, &query).await }
    })
  }

  fn visible(&self) -> Vec<AppNotification> {
    self
      .list
      .borrow()
      .iter()
      .filter(|n| !self.unread_only || !n.is_read)
      .cloned()
      .collect()
  }

  fn selected(&self) -> Option<AppNotification> {
    self
      .list_state
      .selected()
      .and_then(|i| self.visible().into_iter().nth(i))
  }

  fn mark_read(&self) {
    let Some(n) = self.selected().filter(|n| !n.is_read) else {
      return;
    };
    let notifications = self.services.notifications.clone();
    spawn_action(self.services.toasts.clone(), None, async move {
      notifications.mark_read(&n.id).await
    });
  }

  fn mark_all_read(&self) {
    let notifications = self.services.notifications.clone();
    let user_id = self.user_id.clone();
    spawn_action(
      self.services.toasts.clone(),
      Some("All notifications marked as read".to_string()),
      async move { notifications.mark_all_read(&user_id).await },
    );
  }

  fn delete(&self) {
    let Some(n) = self.selected() else {
      return;
    };
    let notifications = self.services.notifications.clone();
    spawn_action(self.services.toasts.clone(), None, async move {
      notifications.delete(&n.id).await
    });
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let unread = self.services.notifications.unread_count();
    let title = if self.unread_only {
      format!("Notifications, unread only ({})", unread)
    } else {
      format!("Notifications ({} unread)", unread)
    };
    let block = panel(&title, &self.query);
    let visible = self.visible();

    if visible.is_empty() {
      render_empty(frame, area, block, &self.query, "You're all caught up.");
      return;
    }

    let now = Utc::now();
    let items: Vec<ListItem> = visible
      .iter()
      .map(|n| {
        let when = n.created_at.map(|at| relative_time(at, now)).unwrap_or_default();
        let title_style = if n.is_read {
          Style::default().fg(Color::DarkGray)
        } else {
          Style::default().fg(Color::White).bold()
        };
        ListItem::new(Line::from(vec![
          Span::styled(
            if n.is_read { "  " } else { "● " },
            Style::default().fg(priority_color(n.priority)),
          ),
          Span::styled(format!("{:<40}", truncate(&n.title, 40)), title_style),
          Span::styled(format!("{:>8}", when), Style::default().fg(Color::DarkGray)),
        ]))
      })
      .collect();

    ensure_valid_selection(&mut self.list_state, items.len());
    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let text = match self.selected() {
      Some(n) => format!("{}\n\n{}", n.title, n.message),
      None => String::new(),
    };
    let paragraph = Paragraph::new(text)
      .block(plain_panel("Message"))
      .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
  }
}

impl View for NotificationsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('m') | KeyCode::Enter => self.mark_read(),
      KeyCode::Char('M') => self.mark_all_read(),
      KeyCode::Char('d') => self.delete(),
      KeyCode::Char('u') => {
        self.unread_only = !self.unread_only;
        self.query = Self::load_query(&self.services, &self.user_id, self.unread_only);
        self.query.fetch();
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let cols = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
      .split(area);
    self.render_list(frame, cols[0]);
    self.render_detail(frame, cols[1]);
  }

  fn breadcrumb_label(&self) -> String {
    "Notifications".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("m", "read"),
      Shortcut::new("M", "read all"),
      Shortcut::new("d", "delete"),
      Shortcut::new("u", "unread"),
      Shortcut::new("q", "back"),
    ]
  }
}
