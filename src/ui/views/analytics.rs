use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Bar, BarChart, BarGroup, Gauge, Paragraph, Wrap};

use super::{label, panel, plain_panel, render_empty};
use crate::lms::types::{UserAnalytics, WeeklyActivity};
use crate::lms::Services;
use crate::query::Query;
use crate::ui::view::{View, ViewAction};

const WEEKS: u32 = 8;

/// Analytics plus weekly activity, fetched together
struct Report {
  analytics: UserAnalytics,
  weekly: Vec<WeeklyActivity>,
}

pub struct AnalyticsView {
  query: Query<Report>,
}

impl AnalyticsView {
  pub fn new(services: Services, user_id: String) -> Self {
    let tracker = services.analytics.clone();
    let uid = user_id.clone();
    tokio::spawn(async move {
      tracker
        .track(&uid, "page_view", serde_json::json!({"page": "analytics"}))
        .await;
    });

    let analytics = services.analytics.clone();
    let mut query = Query::new(move || {
      let analytics = analytics.clone();
      let user_id = user_id.clone();
      async move {
        let summary = analytics.user_analytics(&user_id).await?;
        // the summary may already carry recent weeks
        let weekly = match analytics.weekly_activity(&user_id, WEEKS).await {
          Ok(weeks) => weeks,
          Err(e) => {
            tracing::warn!(error = %e, "weekly activity unavailable");
            summary.weekly_activity.clone()
          }
        };
        Ok(Report {
          analytics: summary,
          weekly,
        })
      }
    });
    query.fetch();

    Self { query }
  }

  fn render_summary(&self, frame: &mut Frame, area: Rect, a: &UserAnalytics) {
    let lines = vec![
      Line::from(vec![
        label("Courses enrolled"),
        Span::raw(a.total_courses_enrolled.to_string()),
        Span::raw("   "),
        label("Completed"),
        Span::styled(
          a.total_courses_completed.to_string(),
          Style::default().fg(Color::Green),
        ),
        Span::raw("   "),
        label("Certificates"),
        Span::raw(a.total_certificates_earned.to_string()),
      ]),
      Line::from(vec![
        label("Hours learned"),
        Span::raw(format!("{:.1}", a.total_hours_learned)),
        Span::raw("   "),
        label("Streak"),
        Span::styled(
          format!("{} (best {})", a.current_streak, a.longest_streak),
          Style::default().fg(Color::Yellow),
        ),
        Span::raw("   "),
        label("Avg quiz"),
        Span::raw(format!("{:.0}%", a.average_quiz_score)),
      ]),
      Line::from(vec![
        label("Skills"),
        Span::styled(a.skills_acquired.join(", "), Style::default().fg(Color::Cyan)),
      ]),
    ];
    let paragraph = Paragraph::new(lines)
      .block(plain_panel("Summary"))
      .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
  }

  fn render_weekly(&self, frame: &mut Frame, area: Rect, weekly: &[WeeklyActivity]) {
    let bars: Vec<Bar> = weekly
      .iter()
      .map(|w| {
        // tenths of an hour so short weeks still show
        Bar::default()
          .value((w.hours_spent * 10.0).round().max(0.0) as u64)
          .text_value(format!("{:.1}h", w.hours_spent))
          .label(Line::from(w.week.clone()))
      })
      .collect();

    let chart = BarChart::default()
      .block(plain_panel("Hours per week"))
      .bar_width(7)
      .bar_gap(1)
      .bar_style(Style::default().fg(Color::Cyan))
      .value_style(Style::default().fg(Color::Black).bg(Color::Cyan))
      .data(BarGroup::default().bars(&bars));
    frame.render_widget(chart, area);
  }

  fn render_paths(&self, frame: &mut Frame, area: Rect, a: &UserAnalytics) {
    let block = plain_panel("Learning paths");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let shown = a.learning_path.len().min(inner.height as usize / 2);
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints(vec![Constraint::Length(2); shown])
      .split(inner);

    for (path, row) in a.learning_path.iter().zip(rows.iter()) {
      let gauge = Gauge::default()
        .label(format!("{} {:.0}%", path.path_name, path.progress))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio((path.progress / 100.0).clamp(0.0, 1.0));
      frame.render_widget(gauge, *row);
    }
  }
}

impl View for AnalyticsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let Some(report) = self.query.data() else {
      render_empty(frame, area, panel("Analytics", &self.query), &self.query, "No data.");
      return;
    };

    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(5), Constraint::Min(8)])
      .split(area);
    let cols = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
      .split(rows[1]);

    self.render_summary(frame, rows[0], &report.analytics);
    self.render_weekly(frame, cols[0], &report.weekly);
    self.render_paths(frame, cols[1], &report.analytics);
  }

  fn breadcrumb_label(&self) -> String {
    "Analytics".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
  }
}
