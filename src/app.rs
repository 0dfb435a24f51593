use crate::commands::Action;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::http::interceptors::loading::debounce_busy;
use crate::lms::Services;
use crate::runtime::Runtime;
use crate::subject::Subscription;
use crate::sync::SyncStatus;
use crate::toast::Toast;
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::{draw_footer, draw_header, HeaderState};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{
  AnalyticsView, CertificatesView, ChatView, CourseListView, DashboardView, NotificationsView,
  ProfileView,
};
use crate::ws::ConnectionStatus;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::watch;

const TICK_RATE: Duration = Duration::from_millis(250);
const BUSY_DEBOUNCE: Duration = Duration::from_millis(150);

/// How the TUI session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
  Quit,
  /// The user logged out, or the backend revoked the session
  SignedOut,
}

/// Main application state
pub struct App {
  runtime: Runtime,
  services: Services,
  user_id: String,
  title: String,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` prompt
  command_input: CommandInput,

  toasts: Subscription<Toast>,
  /// Toast currently shown in the footer
  toast: Option<Toast>,

  connection: watch::Receiver<ConnectionStatus>,
  sync: watch::Receiver<SyncStatus>,
  busy: watch::Receiver<bool>,

  exit: Option<Exit>,
}

impl App {
  pub fn new(config: &Config, runtime: Runtime) -> Result<Self> {
    let services = runtime.services.clone();
    let user_id = services
      .session
      .user_id()
      .ok_or_else(|| eyre!("Not signed in. Run `lms login` first."))?;

    let root: Box<dyn View> = Box::new(DashboardView::new(services.clone(), user_id.clone()));

    Ok(Self {
      toasts: services.toasts.subscribe(),
      connection: runtime.ws.subscribe_status(),
      sync: runtime.sync.subscribe(),
      busy: debounce_busy(services.http.loading.subscribe(), BUSY_DEBOUNCE),
      title: config.display_title(),
      view_stack: vec![root],
      command_input: CommandInput::new(),
      toast: None,
      exit: None,
      runtime,
      services,
      user_id,
    })
  }

  /// Run the UI until the user quits, then stop the background tasks.
  pub async fn run(mut self) -> Result<Exit> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let result = self.event_loop().await;

    // Cleanup terminal, even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    let exit = self.exit.unwrap_or(Exit::Quit);
    self.runtime.shutdown().await;
    result.map(|_| exit)
  }

  async fn event_loop(&mut self) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(TICK_RATE);

    while self.exit.is_none() {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        None => break,
      }
    }
    Ok(())
  }

  fn tick(&mut self) {
    for view in self.view_stack.iter_mut() {
      view.tick();
    }

    while let Some(toast) = self.toasts.try_recv() {
      self.toast = Some(toast);
    }
    if self.toast.as_ref().is_some_and(|t| t.is_expired(Utc::now())) {
      self.toast = None;
    }

    // a 401 clears the session behind our back
    if !self.services.session.is_authenticated() {
      tracing::warn!(user_id = %self.user_id, "session ended, leaving the TUI");
      self.exit = Some(Exit::SignedOut);
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.exit = Some(Exit::Quit);
      return;
    }

    if self.command_input.is_active() {
      if let KeyResult::Event(event) = self.command_input.handle_key(key) {
        match event {
          CommandEvent::Submitted(action) => self.execute(action),
          CommandEvent::Unknown(name) if !name.is_empty() => {
            self.services.toasts.error(&format!("Unknown command: {}", name));
          }
          CommandEvent::Unknown(_) | CommandEvent::Cancelled => {}
        }
      }
      return;
    }

    let captured = self.view_stack.last().is_some_and(|v| v.captures_input());
    if !captured && key.code == KeyCode::Char(':') {
      self.command_input.activate();
      return;
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => return,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.exit = Some(Exit::Quit);
        }
      }
      ViewAction::Run(action) => self.execute(action),
    }
  }

  /// Feature-gated views answer with a toast instead of opening.
  fn feature_enabled(&self, feature: &str, label: &str) -> bool {
    let enabled = self.services.features.is_enabled(feature);
    if !enabled {
      self
        .services
        .toasts
        .info("Unavailable", &format!("{} is disabled for this account.", label));
    }
    enabled
  }

  fn set_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
  }

  fn execute(&mut self, action: Action) {
    let services = self.services.clone();
    let user_id = self.user_id.clone();
    tracing::debug!(?action, "command");

    match action {
      Action::Dashboard => self.set_root(Box::new(DashboardView::new(services, user_id))),
      Action::Courses => self.set_root(Box::new(CourseListView::new(services, user_id))),
      Action::Certificates => self.set_root(Box::new(CertificatesView::new(services, user_id))),
      Action::Notifications => {
        if self.feature_enabled("notifications", "Notifications") {
          self.set_root(Box::new(NotificationsView::new(services, user_id)));
        }
      }
      Action::Analytics => {
        if self.feature_enabled("analytics", "Analytics") {
          self.set_root(Box::new(AnalyticsView::new(services, user_id)));
        }
      }
      Action::Chat => {
        if self.feature_enabled("chatSupport", "The learning assistant") {
          self.set_root(Box::new(ChatView::new(services, user_id)));
        }
      }
      Action::Profile => self.set_root(Box::new(ProfileView::new(
        services,
        self.runtime.ws.subscribe_status(),
        self.runtime.sync.subscribe(),
      ))),
      Action::Sync => {
        let sync = self.runtime.sync.clone();
        tokio::spawn(async move {
          // toasts its own outcome
          if let Err(e) = sync.force_sync_all().await {
            tracing::warn!(error = %e, "manual sync failed");
          }
        });
      }
      Action::Reconnect => {
        self.runtime.ws.reconnect();
        self.services.toasts.info("Reconnecting", "Opening a new live connection.");
      }
      Action::Logout => {
        self.services.auth.logout();
        self.exit = Some(Exit::SignedOut);
      }
      Action::Quit => self.exit = Some(Exit::Quit),
    }
  }

  // Rendering entry points used by `ui::draw`

  pub fn render_header(&self, frame: &mut Frame, area: Rect) {
    let connection = self.connection.borrow().clone();
    let sync = self.sync.borrow().clone();
    let shortcuts = self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default();
    let state = HeaderState {
      title: &self.title,
      user: self.services.session.current_user().map(|u| u.full_name()),
      connection: &connection,
      sync: &sync,
      busy: *self.busy.borrow(),
      unread: self.services.notifications.unread_count(),
      shortcuts: &shortcuts,
    };
    draw_header(frame, area, &state);
  }

  pub fn render_view(&mut self, frame: &mut Frame, area: Rect) {
    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, area);
    }
  }

  pub fn render_footer(&self, frame: &mut Frame, area: Rect) {
    draw_footer(frame, area, &self.view_breadcrumb(), self.toast.as_ref());
  }

  pub fn render_overlays(&self, frame: &mut Frame, area: Rect) {
    self.command_input.render_overlay(frame, area);
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::http::testing::MockTransport;
  use crate::http::Method;
  use crate::lms::types::User;
  use crate::sync::Probe;
  use crate::ws::{Channel, Connector, WsError};
  use async_trait::async_trait;
  use serde_json::json;
  use std::sync::Arc;
  use url::Url;

  // exp = 2100-01-01
  const TOKEN: &str = "x.eyJleHAiOjQxMDI0NDQ4MDB9.y";

  struct AlwaysUp;

  #[async_trait]
  impl Probe for AlwaysUp {
    async fn is_reachable(&self) -> bool {
      true
    }
  }

  struct Refused;

  #[async_trait]
  impl Connector for Refused {
    async fn connect(&self, _url: &Url) -> std::result::Result<Box<dyn Channel>, WsError> {
      Err(WsError::Connect("refused".to_string()))
    }
  }

  async fn app(features: serde_json::Value) -> App {
    let api = Arc::new(MockTransport::new());
    api.ok(Method::Get, "config/features", features);
    let auth = Arc::new(MockTransport::new());
    let storage = Arc::new(MemoryStorage::new());
    let config = Config::default();
    let services = Services::with_transports(&config, storage.clone(), storage, api, auth);
    services
      .session
      .set_session(User::sample("u1"), TOKEN.to_string(), None);

    let runtime = Runtime::start_with(&config, services, Arc::new(AlwaysUp), Arc::new(Refused))
      .await
      .unwrap();
    App::new(&config, runtime).unwrap()
  }

  fn press(app: &mut App, code: KeyCode) {
    app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
  }

  fn type_command(app: &mut App, command: &str) {
    press(app, KeyCode::Char(':'));
    for c in command.chars() {
      press(app, KeyCode::Char(c));
    }
    press(app, KeyCode::Enter);
  }

  #[tokio::test]
  async fn test_starts_on_dashboard() {
    let app = app(json!({})).await;
    assert_eq!(app.view_breadcrumb(), vec!["Dashboard".to_string()]);
    assert!(app.exit.is_none());
  }

  #[tokio::test]
  async fn test_command_replaces_root_view() {
    let mut app = app(json!({})).await;
    type_command(&mut app, "courses");
    assert_eq!(app.view_breadcrumb(), vec!["Courses".to_string()]);
    assert!(!app.command_input.is_active());
  }

  #[tokio::test]
  async fn test_disabled_feature_keeps_current_view() {
    let mut app = app(json!({"chatSupport": false})).await;
    type_command(&mut app, "chat");
    assert_eq!(app.view_breadcrumb(), vec!["Dashboard".to_string()]);

    let mut titles = Vec::new();
    while let Some(toast) = app.toasts.try_recv() {
      titles.push(toast.title);
    }
    assert!(titles.iter().any(|t| t == "Unavailable"));
  }

  #[tokio::test]
  async fn test_back_at_root_quits() {
    let mut app = app(json!({})).await;
    press(&mut app, KeyCode::Char('q'));
    assert_eq!(app.exit, Some(Exit::Quit));
  }

  #[tokio::test]
  async fn test_logout_clears_session() {
    let mut app = app(json!({})).await;
    type_command(&mut app, "logout");
    assert_eq!(app.exit, Some(Exit::SignedOut));
    assert!(!app.services.session.is_authenticated());
  }
}
