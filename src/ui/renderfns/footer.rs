use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::toast::{Toast, ToastKind};

fn toast_color(kind: ToastKind) -> Color {
  match kind {
    ToastKind::Success => Color::Green,
    ToastKind::Error => Color::Red,
    ToastKind::Warning => Color::Yellow,
    ToastKind::Achievement => Color::Magenta,
    ToastKind::Info => Color::Cyan,
  }
}

/// Draw the footer bar: view breadcrumb on the left, newest toast on the right
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], toast: Option<&Toast>) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };
    spans.push(Span::styled(part.clone(), style));
  }

  let left = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(left, area);

  if let Some(toast) = toast {
    let color = toast_color(toast.kind);
    let text = if toast.title.is_empty() {
      format!(" {} ", toast.message)
    } else {
      format!(" {}: {} ", toast.title, toast.message)
    };
    let right = Paragraph::new(Line::from(Span::styled(
      text,
      Style::default().fg(Color::Black).bg(color),
    )))
    .alignment(Alignment::Right);
    frame.render_widget(right, area);
  }
}
