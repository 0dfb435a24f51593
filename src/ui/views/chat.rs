use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Wrap};
use tokio::sync::{oneshot, Mutex};

use super::plain_panel;
use crate::chat::{Assistant, ChatMessage, MessageKind, QuickAction, Sender};
use crate::config;
use crate::lms::Services;
use crate::toast::Toasts;
use crate::ui::components::{InputResult, TextInput};
use crate::ui::view::{Shortcut, View, ViewAction};

type Snapshot = (Vec<ChatMessage>, Vec<String>);

enum Request {
  Message(String),
  Quick(QuickAction),
}

const EXPORT_FILE: &str = "chat-export.json";

pub struct ChatView {
  assistant: Arc<Mutex<Assistant>>,
  toasts: Toasts,
  messages: Vec<ChatMessage>,
  suggestions: Vec<String>,
  composer: TextInput,
  composing: bool,
  pending: Option<oneshot::Receiver<Snapshot>>,
  /// Lines scrolled up from the bottom
  scroll: u16,
}

impl ChatView {
  pub fn new(services: Services, user_id: String) -> Self {
    let assistant = Assistant::new(&services, &user_id);
    let messages = assistant.messages().to_vec();
    let suggestions = assistant.suggestions().to_vec();
    Self {
      assistant: Arc::new(Mutex::new(assistant)),
      toasts: services.toasts.clone(),
      messages,
      suggestions,
      composer: TextInput::new(),
      composing: false,
      pending: None,
      scroll: 0,
    }
  }

  fn is_waiting(&self) -> bool {
    self.pending.is_some()
  }

  fn submit(&mut self, text: String) {
    if text.trim().is_empty() {
      return;
    }
    self.dispatch(Request::Message(text));
  }

  /// Run the request against the assistant off the UI thread and hand back
  /// a snapshot of the conversation when it finishes.
  fn dispatch(&mut self, request: Request) {
    if self.is_waiting() {
      return;
    }
    let (tx, rx) = oneshot::channel();
    let assistant = self.assistant.clone();
    tokio::spawn(async move {
      let mut assistant = assistant.lock().await;
      match request {
        Request::Message(text) => assistant.send(&text).await,
        Request::Quick(action) => assistant.quick_action(action).await,
      };
      let _ = tx.send((assistant.messages().to_vec(), assistant.suggestions().to_vec()));
    });
    self.pending = Some(rx);
    self.scroll = 0;
  }

  fn clear(&mut self) {
    let Ok(mut assistant) = self.assistant.try_lock() else {
      return;
    };
    assistant.clear();
    self.messages = assistant.messages().to_vec();
    self.suggestions = assistant.suggestions().to_vec();
    self.scroll = 0;
  }

  fn export(&self) {
    let Ok(assistant) = self.assistant.try_lock() else {
      return;
    };
    let result = config::data_dir().and_then(|dir| {
      let path = dir.join(EXPORT_FILE);
      let body = serde_json::to_string_pretty(&assistant.export())?;
      std::fs::write(&path, body)?;
      Ok(path)
    });
    match result {
      Ok(path) => self.toasts.success(&format!("Chat exported to {}", path.display())),
      Err(e) => {
        tracing::warn!(error = %e, "chat export failed");
        self.toasts.error("Could not export the conversation");
      }
    }
  }

  fn message_lines(&self) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for msg in &self.messages {
      let (who, color) = match msg.sender {
        Sender::User => ("You", Color::Cyan),
        Sender::Assistant => ("Assistant", Color::Green),
      };
      let tag = match msg.kind {
        MessageKind::Progress => " [progress]",
        MessageKind::Recommendation => " [recommendation]",
        MessageKind::Achievement => " [achievement]",
        MessageKind::Text => "",
      };
      lines.push(Line::from(vec![
        Span::styled(who, Style::default().fg(color).bold()),
        Span::styled(
          format!("  {}{}", msg.timestamp.format("%H:%M"), tag),
          Style::default().fg(Color::DarkGray),
        ),
      ]));
      for text in msg.message.lines() {
        lines.push(Line::raw(text.to_string()));
      }
      lines.push(Line::raw(""));
    }
    if self.is_waiting() {
      lines.push(Line::from(Span::styled(
        "Assistant is typing...",
        Style::default().fg(Color::DarkGray).italic(),
      )));
    }
    lines
  }

  fn render_composer(&self, frame: &mut Frame, area: Rect) {
    let border = if self.composing { Color::Yellow } else { Color::DarkGray };
    let text = if self.composing || !self.composer.is_empty() {
      Line::raw(self.composer.value().to_string())
    } else {
      Line::from(Span::styled(
        "Press i to type a message",
        Style::default().fg(Color::DarkGray),
      ))
    };
    let block = plain_panel("Message").border_style(Style::default().fg(border));
    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(text).block(block), area);
    if self.composing {
      frame.set_cursor_position((inner.x + self.composer.cursor() as u16, inner.y));
    }
  }

  fn render_suggestions(&self, frame: &mut Frame, area: Rect) {
    let mut spans = Vec::new();
    for (i, action) in QuickAction::ALL.iter().enumerate() {
      spans.push(Span::styled(
        format!(" {} ", i + 1),
        Style::default().fg(Color::Black).bg(Color::Cyan),
      ));
      spans.push(Span::raw(format!(" {}  ", action.label())));
    }
    let mut lines = vec![Line::from(spans)];
    if !self.suggestions.is_empty() {
      let tries: Vec<&str> = self.suggestions.iter().take(3).map(String::as_str).collect();
      lines.push(Line::from(vec![
        Span::styled("Try: ", Style::default().fg(Color::DarkGray)),
        Span::raw(tries.join(" · ")),
      ]));
    }
    frame.render_widget(Paragraph::new(lines), area);
  }
}

impl View for ChatView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.composing {
      match self.composer.handle_key(key) {
        InputResult::Submitted(text) => {
          self.composer.clear();
          self.composing = false;
          self.submit(text);
        }
        InputResult::Cancelled => self.composing = false,
        InputResult::Consumed | InputResult::NotHandled => {}
      }
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('i') | KeyCode::Enter => self.composing = true,
      KeyCode::Char(c @ '1'..='4') => {
        let idx = c as usize - '1' as usize;
        self.dispatch(Request::Quick(QuickAction::ALL[idx]));
      }
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('x') => self.clear(),
      KeyCode::Char('e') => self.export(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Min(5),
        Constraint::Length(2),
        Constraint::Length(3),
      ])
      .split(area);

    let block = plain_panel("Learning assistant");
    let inner = block.inner(rows[0]);
    let lines = self.message_lines();
    // keep the newest message in view, `scroll` moves back from there
    let bottom = (lines.len() as u16).saturating_sub(inner.height);
    let offset = bottom.saturating_sub(self.scroll);
    let paragraph = Paragraph::new(lines)
      .block(block)
      .wrap(Wrap { trim: false })
      .scroll((offset, 0));
    frame.render_widget(paragraph, rows[0]);

    self.render_suggestions(frame, rows[1]);
    self.render_composer(frame, rows[2]);
  }

  fn breadcrumb_label(&self) -> String {
    "Assistant".to_string()
  }

  fn tick(&mut self) {
    let Some(rx) = self.pending.as_mut() else {
      return;
    };
    match rx.try_recv() {
      Ok((messages, suggestions)) => {
        self.messages = messages;
        self.suggestions = suggestions;
        self.pending = None;
      }
      Err(oneshot::error::TryRecvError::Empty) => {}
      Err(oneshot::error::TryRecvError::Closed) => self.pending = None,
    }
  }

  fn captures_input(&self) -> bool {
    self.composing
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("i", "type"),
      Shortcut::new("1-4", "quick"),
      Shortcut::new("x", "clear"),
      Shortcut::new("e", "export"),
      Shortcut::new("q", "back"),
    ]
  }
}
