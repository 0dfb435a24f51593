mod analytics;
mod certificates;
mod chat;
mod course_detail;
mod course_list;
mod dashboard;
mod notifications;
mod profile;

pub use analytics::AnalyticsView;
pub use certificates::CertificatesView;
pub use chat::ChatView;
pub use course_detail::CourseDetailView;
pub use course_list::CourseListView;
pub use dashboard::DashboardView;
pub use notifications::NotificationsView;
pub use profile::ProfileView;

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::query::{Query, QueryState};

/// Bordered panel; the title carries the query state like `Courses (loading...)`.
fn panel<T: Send + 'static>(title: &str, query: &Query<T>) -> Block<'static> {
  let title = match query.state() {
    QueryState::Loading => format!(" {} (loading...) ", title),
    QueryState::Error(e) => format!(" {} (error: {}) ", title, e),
    _ => format!(" {} ", title),
  };
  Block::default()
    .title(title)
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue))
}

fn plain_panel(title: &str) -> Block<'static> {
  Block::default()
    .title(format!(" {} ", title))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray))
}

/// Placeholder text when a query has nothing to show yet.
fn render_empty<T: Send + 'static>(frame: &mut Frame, area: Rect, block: Block, query: &Query<T>, empty: &str) {
  let content = if query.is_loading() {
    "Loading..."
  } else if query.is_error() {
    "Failed to load. Press 'r' to retry."
  } else {
    empty
  };
  let paragraph = Paragraph::new(content)
    .block(block)
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(Color::DarkGray));
  frame.render_widget(paragraph, area);
}

fn label(text: &str) -> Span<'static> {
  Span::styled(format!("{}: ", text), Style::default().fg(Color::DarkGray))
}
