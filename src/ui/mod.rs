pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use ratatui::prelude::*;
use ratatui::widgets::ListState;
use std::future::Future;

use crate::app::App;
use crate::http::{ApiError, ErrorKind};
use crate::toast::Toasts;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  app.render_header(frame, chunks[0]);
  app.render_view(frame, chunks[1]);
  app.render_footer(frame, chunks[2]);
  app.render_overlays(frame, chunks[1]);
}

/// Clamp or initialise a list selection after the list changed length.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

/// Run a mutation off the render loop, reporting the outcome as a toast.
/// Transport and auth failures are already toasted by the HTTP layer.
pub fn spawn_action<F, T>(toasts: Toasts, success: Option<String>, fut: F)
where
  F: Future<Output = Result<T, ApiError>> + Send + 'static,
  T: Send + 'static,
{
  tokio::spawn(async move {
    match fut.await {
      Ok(_) => {
        if let Some(message) = success {
          toasts.success(&message);
        }
      }
      Err(e) => {
        tracing::warn!(error = %e, "action failed");
        if !matches!(e.kind(), ErrorKind::Transport | ErrorKind::Auth) {
          toasts.error(&e.to_string());
        }
      }
    }
  });
}
