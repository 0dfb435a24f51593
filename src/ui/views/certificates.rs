use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph, Wrap};

use super::{label, panel, plain_panel, render_empty};
use crate::lms::types::Certificate;
use crate::lms::Services;
use crate::query::Query;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_minutes, truncate};
use crate::ui::spawn_action;
use crate::ui::view::{Shortcut, View, ViewAction};

const SHARE_PLATFORM: &str = "linkedin";

pub struct CertificatesView {
  services: Services,
  query: Query<Vec<Certificate>>,
  list_state: ListState,
}

impl CertificatesView {
  pub fn new(services: Services, user_id: String) -> Self {
    let certificates = services.certificates.clone();
    let mut query = Query::new(move || {
      let certificates = certificates.clone();
      let user_id = user_id.clone();
      async move { certificates.list(&user_id).await }
    });
    query.fetch();

    Self {
      services,
      query,
      list_state: ListState::default(),
    }
  }

  fn certificates(&self) -> &[Certificate] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Certificate> {
    self.list_state.selected().and_then(|i| self.certificates().get(i))
  }

  fn share(&self) {
    let Some(cert) = self.selected() else {
      return;
    };
    let certificates = self.services.certificates.clone();
    let id = cert.id.clone();
    spawn_action(
      self.services.toasts.clone(),
      Some(format!("Shared to {}", SHARE_PLATFORM)),
      async move { certificates.share(&id, SHARE_PLATFORM).await },
    );
  }

  /// Round-trip the verification code through the public verify endpoint.
  fn verify(&self) {
    let Some(cert) = self.selected() else {
      return;
    };
    let certificates = self.services.certificates.clone();
    let toasts = self.services.toasts.clone();
    let code = cert.verification_code.clone();
    tokio::spawn(async move {
      match certificates.verify(&code).await {
        Ok(verified) => toasts.success(&format!("Verified: {}", verified.title)),
        Err(e) => {
          tracing::warn!(code = %code, error = %e, "certificate verification failed");
          toasts.error("Certificate could not be verified");
        }
      }
    });
  }

  fn detail(cert: &Certificate) -> Vec<Line<'static>> {
    let issued = cert
      .issued_at
      .map(|at| at.format("%Y-%m-%d").to_string())
      .unwrap_or_else(|| "-".to_string());
    vec![
      Line::from(Span::styled(cert.title.clone(), Style::default().bold())),
      Line::raw(""),
      Line::from(vec![label("Issued"), Span::raw(issued)]),
      Line::from(vec![label("Instructor"), Span::raw(cert.instructor.clone())]),
      Line::from(vec![
        label("Course length"),
        Span::raw(format_minutes(cert.course_duration)),
      ]),
      Line::from(vec![
        label("Final score"),
        Span::styled(
          format!("{:.0}%", cert.final_score),
          Style::default().fg(Color::Green),
        ),
      ]),
      Line::from(vec![
        label("Verification"),
        Span::styled(cert.verification_code.clone(), Style::default().fg(Color::Cyan)),
      ]),
      Line::from(vec![label("URL"), Span::raw(cert.certificate_url.clone())]),
      Line::raw(""),
      Line::raw(cert.description.clone()),
    ]
  }
}

impl View for CertificatesView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('s') => self.share(),
      KeyCode::Char('v') => self.verify(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let cols = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
      .split(area);

    let block = panel(
      &format!("Certificates ({})", self.certificates().len()),
      &self.query,
    );
    if self.certificates().is_empty() {
      render_empty(frame, cols[0], block, &self.query, "No certificates yet. Keep learning!");
      return;
    }

    let items: Vec<ListItem> = self
      .certificates()
      .iter()
      .map(|c| ListItem::new(format!("🎓 {}", truncate(&c.title, 44))))
      .collect();
    ensure_valid_selection(&mut self.list_state, items.len());
    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, cols[0], &mut self.list_state);

    let detail = self.selected().map(Self::detail).unwrap_or_default();
    let paragraph = Paragraph::new(detail)
      .block(plain_panel("Certificate"))
      .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, cols[1]);
  }

  fn breadcrumb_label(&self) -> String {
    "Certificates".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("s", "share"),
      Shortcut::new("v", "verify"),
      Shortcut::new("q", "back"),
    ]
  }
}
