use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::commands::Action;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortcut {
  pub key: &'static str,
  pub label: &'static str,
}

impl Shortcut {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self { key, label }
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view (go back)
  Pop,
  /// Run an app-level command as if typed after `:`
  Run(Action),
}

/// Trait for view behavior
///
/// Views handle their own input modes (search, compose) and return actions
/// for the App to execute: App → View → Components.
///
/// Views that load data asynchronously own `Query<T>` values and poll them
/// in `tick()`.
pub trait View {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  fn render(&mut self, frame: &mut Frame, area: Rect);

  fn breadcrumb_label(&self) -> String;

  /// Called on each tick to poll async queries
  fn tick(&mut self) {}

  /// While true every key goes to the view, including `:` and `q`
  fn captures_input(&self) -> bool {
    false
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![Shortcut::new("r", "refresh"), Shortcut::new("q", "back")]
  }
}
