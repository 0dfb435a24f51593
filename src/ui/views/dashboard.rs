use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState, Paragraph};

use super::{label, panel, plain_panel, render_empty};
use crate::lms::enrollments::overall_progress;
use crate::lms::types::{Course, Enrollment};
use crate::lms::{DashboardData, Services};
use crate::query::Query;
use crate::sync::{is_data_stale, STALE_AFTER};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_minutes, progress_bar, status_color, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::CourseDetailView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
  Learning,
  Trending,
}

/// Landing view: stats, current enrollments and what's trending
pub struct DashboardView {
  services: Services,
  user_id: String,
  query: Query<DashboardData>,
  section: Section,
  learning_state: ListState,
  trending_state: ListState,
}

impl DashboardView {
  pub fn new(services: Services, user_id: String) -> Self {
    let dashboard = services.dashboard.clone();
    let uid = user_id.clone();
    let mut query = Query::new(move || {
      let dashboard = dashboard.clone();
      let uid = uid.clone();
      async move { dashboard.load(&uid).await }
    })
    .with_stale_time(STALE_AFTER);
    query.fetch();

    Self {
      services,
      user_id,
      query,
      section: Section::Learning,
      learning_state: ListState::default(),
      trending_state: ListState::default(),
    }
  }

  fn learning(&self) -> Vec<(&Enrollment, Option<&Course>)> {
    let Some(data) = self.query.data() else {
      return Vec::new();
    };
    data
      .enrollments
      .iter()
      .map(|e| {
        let course = data.enrolled_courses.iter().find(|c| c.id == e.course_id);
        (e, course)
      })
      .collect()
  }

  fn trending(&self) -> &[Course] {
    self.query.data().map(|d| d.trending.as_slice()).unwrap_or(&[])
  }

  fn render_stats(&self, frame: &mut Frame, area: Rect) {
    let Some(data) = self.query.data() else {
      return;
    };
    let stats = &data.stats;
    let stale = data
      .loaded_at
      .map(|at| is_data_stale(at, STALE_AFTER))
      .unwrap_or(true);

    let mut spans = vec![
      label("Enrolled"),
      Span::styled(stats.enrolled_courses.to_string(), Style::default().fg(Color::Cyan)),
      Span::raw("   "),
      label("Completed"),
      Span::styled(stats.completed_courses.to_string(), Style::default().fg(Color::Green)),
      Span::raw("   "),
      label("Certificates"),
      Span::styled(stats.certificates.to_string(), Style::default().fg(Color::Magenta)),
      Span::raw("   "),
      label("Hours"),
      Span::raw(format!("{:.1}", stats.hours_learned)),
      Span::raw("   "),
      label("Streak"),
      Span::styled(
        format!("{} days", stats.current_streak),
        Style::default().fg(Color::Yellow),
      ),
    ];
    if data.from_cache {
      spans.push(Span::styled("   (cached)", Style::default().fg(Color::DarkGray)));
    }
    if stale {
      spans.push(Span::styled("   (stale, press r)", Style::default().fg(Color::Red)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(plain_panel("Overview"));
    frame.render_widget(paragraph, area);
  }

  fn render_learning(&mut self, frame: &mut Frame, area: Rect) {
    let focused = self.section == Section::Learning;
    let block = panel("Continue learning", &self.query)
      .border_style(Style::default().fg(if focused { Color::Blue } else { Color::DarkGray }));

    let rows: Vec<ListItem> = self
      .learning()
      .into_iter()
      .map(|(enrollment, course)| {
        let title = course
          .map(|c| c.title.as_str())
          .unwrap_or(enrollment.course_id.as_str());
        ListItem::new(Line::from(vec![
          Span::raw(format!("{:<36}", truncate(title, 36))),
          Span::raw(progress_bar(overall_progress(enrollment, course) as f64, 12)),
          Span::raw(" "),
          Span::styled(
            format!("{:<10}", enrollment.status.as_str()),
            Style::default().fg(status_color(enrollment.status)),
          ),
          Span::styled(
            format_minutes(enrollment.time_spent),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    if rows.is_empty() {
      render_empty(frame, area, block, &self.query, "No enrollments yet. Try :courses");
      return;
    }

    ensure_valid_selection(&mut self.learning_state, rows.len());
    let list = List::new(rows)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol(if focused { "> " } else { "  " });
    frame.render_stateful_widget(list, area, &mut self.learning_state);
  }

  fn render_trending(&mut self, frame: &mut Frame, area: Rect) {
    let focused = self.section == Section::Trending;
    let block = plain_panel("Trending")
      .border_style(Style::default().fg(if focused { Color::Blue } else { Color::DarkGray }));

    let mut rows: Vec<ListItem> = self
      .trending()
      .iter()
      .map(|course| {
        ListItem::new(Line::from(vec![
          Span::raw(truncate(&course.title, 30)),
          Span::styled(
            format!("  ★ {:.1}", course.rating),
            Style::default().fg(Color::Yellow),
          ),
        ]))
      })
      .collect();

    let recommended: Vec<ListItem> = self
      .query
      .data()
      .map(|d| {
        d.recommendations
          .iter()
          .map(|c| {
            ListItem::new(Span::styled(
              format!("✦ {}", truncate(&c.title, 34)),
              Style::default().fg(Color::Cyan),
            ))
          })
          .collect()
      })
      .unwrap_or_default();

    ensure_valid_selection(&mut self.trending_state, rows.len());
    if !recommended.is_empty() {
      rows.push(ListItem::new(Span::styled(
        "Recommended for you",
        Style::default().fg(Color::DarkGray),
      )));
      rows.extend(recommended);
    }

    let list = List::new(rows)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray))
      .highlight_symbol(if focused { "> " } else { "  " });
    frame.render_stateful_widget(list, area, &mut self.trending_state);
  }

  fn open_selected(&self) -> ViewAction {
    let target = match self.section {
      Section::Learning => self
        .learning_state
        .selected()
        .and_then(|i| self.learning().get(i).map(|(e, _)| (e.course_id.clone(), Some((*e).clone())))),
      Section::Trending => self
        .trending_state
        .selected()
        .and_then(|i| self.trending().get(i))
        .map(|c| (c.id.clone(), None)),
    };
    match target {
      Some((course_id, enrollment)) => ViewAction::Push(Box::new(CourseDetailView::new(
        self.services.clone(),
        self.user_id.clone(),
        course_id,
        enrollment,
      ))),
      None => ViewAction::None,
    }
  }
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    let state = match self.section {
      Section::Learning => &mut self.learning_state,
      Section::Trending => &mut self.trending_state,
    };
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => state.select_previous(),
      KeyCode::Tab | KeyCode::Char('l') | KeyCode::Char('h') => {
        self.section = match self.section {
          Section::Learning => Section::Trending,
          Section::Trending => Section::Learning,
        };
      }
      KeyCode::Char('r') => {
        self.services.dashboard.invalidate(&self.user_id);
        self.query.refetch();
      }
      KeyCode::Enter => return self.open_selected(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(3), Constraint::Min(3)])
      .split(area);
    let cols = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
      .split(rows[1]);

    self.render_stats(frame, rows[0]);
    self.render_learning(frame, cols[0]);
    self.render_trending(frame, cols[1]);
  }

  fn breadcrumb_label(&self) -> String {
    "Dashboard".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
    self.query.refresh_if_stale();
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command"),
      Shortcut::new("tab", "switch"),
      Shortcut::new("r", "refresh"),
      Shortcut::new("q", "quit"),
    ]
  }
}
