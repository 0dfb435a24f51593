use chrono::{Duration, Utc};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, Paragraph, Wrap};

use super::{label, panel, plain_panel};
use crate::lms::enrollments::{final_score, overall_progress, EnrollmentRequest};
use crate::lms::types::{Course, CourseReview, Enrollment, EnrollmentStatus};
use crate::lms::Services;
use crate::query::Query;
use crate::ui::renderfns::{format_minutes, progress_bar, relative_time, status_color};
use crate::ui::spawn_action;
use crate::ui::view::{Shortcut, View, ViewAction};

const REVIEWS_PAGE: u32 = 1;

/// Course outline, the learner's enrollment and recent reviews
pub struct CourseDetailView {
  services: Services,
  user_id: String,
  course_id: String,
  course: Query<Course>,
  reviews: Query<Vec<CourseReview>>,
  enrollment: Option<Enrollment>,
  scroll: u16,
}

impl CourseDetailView {
  pub fn new(
    services: Services,
    user_id: String,
    course_id: String,
    enrollment: Option<Enrollment>,
  ) -> Self {
    let courses = services.courses.clone();
    let id = course_id.clone();
    let mut course = Query::new(move || {
      let courses = courses.clone();
      let id = id.clone();
      async move { courses.get(&id).await }
    });
    course.fetch();

    let courses = services.courses.clone();
    let id = course_id.clone();
    let mut reviews = Query::new(move || {
      let courses = courses.clone();
      let id = id.clone();
      async move { courses.reviews(&id, REVIEWS_PAGE).await }
    });
    reviews.fetch();

    let mut view = Self {
      services,
      user_id,
      course_id,
      course,
      reviews,
      enrollment,
      scroll: 0,
    };
    view.sync_enrollment();
    view
  }

  /// Pick up enrollment changes made by actions or the sync loop.
  fn sync_enrollment(&mut self) {
    let known = self
      .services
      .enrollments
      .subscribe()
      .borrow()
      .iter()
      .find(|e| e.course_id == self.course_id)
      .cloned();
    if known.is_some() {
      self.enrollment = known;
    }
  }

  fn enroll(&self) {
    if self.enrollment.is_some() {
      self.services.toasts.info("Already enrolled", "You are already enrolled in this course.");
      return;
    }
    let enrollments = self.services.enrollments.clone();
    let request = EnrollmentRequest {
      user_id: self.user_id.clone(),
      course_id: self.course_id.clone(),
      discount_code: None,
    };
    spawn_action(
      self.services.toasts.clone(),
      Some("Enrolled! Happy learning.".to_string()),
      async move { enrollments.enroll(&request).await },
    );
  }

  fn toggle_pause(&self) {
    let Some(enrollment) = &self.enrollment else {
      return;
    };
    let enrollments = self.services.enrollments.clone();
    let id = enrollment.id.clone();
    match enrollment.status {
      EnrollmentStatus::Active => spawn_action(
        self.services.toasts.clone(),
        Some("Enrollment paused".to_string()),
        async move { enrollments.pause(&id, None).await },
      ),
      EnrollmentStatus::Paused => spawn_action(
        self.services.toasts.clone(),
        None,
        async move { enrollments.resume(&id).await },
      ),
      _ => {}
    }
  }

  fn claim_certificate(&self) {
    let Some(enrollment) = &self.enrollment else {
      return;
    };
    if enrollment.status != EnrollmentStatus::Completed {
      self
        .services
        .toasts
        .info("Not yet", "Finish the course to earn its certificate.");
      return;
    }
    let certificates = self.services.certificates.clone();
    let id = enrollment.id.clone();
    spawn_action(
      self.services.toasts.clone(),
      Some("Certificate generated".to_string()),
      async move { certificates.generate(&id).await },
    );
  }

  fn remind_tomorrow(&self) {
    let notifications = self.services.notifications.clone();
    let user_id = self.user_id.clone();
    let course_id = self.course_id.clone();
    let at = Utc::now() + Duration::days(1);
    spawn_action(
      self.services.toasts.clone(),
      Some("Study reminder set for tomorrow".to_string()),
      async move {
        notifications
          .schedule_study_reminder(&user_id, &course_id, at)
          .await
      },
    );
  }

  fn summary_lines(&self, course: &Course) -> Vec<Line<'static>> {
    let mut lines = vec![
      Line::from(vec![
        label("Instructor"),
        Span::raw(course.instructor.full_name()),
        Span::raw("   "),
        label("Level"),
        Span::styled(course.level.as_str(), Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        label("Duration"),
        Span::raw(format_minutes(course.duration)),
        Span::raw("   "),
        label("Rating"),
        Span::styled(
          format!("★ {:.1} ({})", course.rating, course.review_count),
          Style::default().fg(Color::Yellow),
        ),
      ]),
      Line::from(vec![
        label("Lessons"),
        Span::raw(course.lesson_count().to_string()),
        Span::raw("   "),
        label("Learners"),
        Span::raw(course.enrollment_count.to_string()),
        Span::raw("   "),
        label("Tags"),
        Span::styled(course.tags.join(", "), Style::default().fg(Color::DarkGray)),
      ]),
    ];

    match &self.enrollment {
      Some(enrollment) => {
        let mut spans = vec![
          label("Progress"),
          Span::raw(progress_bar(overall_progress(enrollment, Some(course)) as f64, 20)),
          Span::raw("  "),
          Span::styled(
            enrollment.status.as_str(),
            Style::default().fg(status_color(enrollment.status)),
          ),
        ];
        if !enrollment.progress.quiz_scores.is_empty() {
          spans.push(Span::raw("   "));
          spans.push(label("Quiz avg"));
          spans.push(Span::raw(format!("{}%", final_score(enrollment))));
        }
        lines.push(Line::from(spans));
      }
      None => lines.push(Line::from(Span::styled(
        "Not enrolled. Press 'e' to enroll.",
        Style::default().fg(Color::Green),
      ))),
    }
    lines.push(Line::raw(""));
    lines.push(Line::raw(course.description.clone()));
    lines
  }

  fn outline_items(&self, course: &Course) -> Vec<ListItem<'static>> {
    let done = self
      .enrollment
      .as_ref()
      .map(|e| e.progress.completed_lessons.clone())
      .unwrap_or_default();
    let mut items = Vec::new();
    let mut modules = course.modules.clone();
    modules.sort_by_key(|m| m.order_index);
    for module in modules {
      items.push(ListItem::new(Span::styled(
        module.title.clone(),
        Style::default().fg(Color::Cyan).bold(),
      )));
      let mut lessons = module.lessons.clone();
      lessons.sort_by_key(|l| l.order_index);
      for lesson in &lessons {
        let (mark, color) = if done.contains(&lesson.id) {
          ("✓", Color::Green)
        } else {
          ("·", Color::DarkGray)
        };
        items.push(ListItem::new(Line::from(vec![
          Span::styled(format!("  {} ", mark), Style::default().fg(color)),
          Span::raw(lesson.title.clone()),
          Span::styled(
            format!("  {}", format_minutes(lesson.duration)),
            Style::default().fg(Color::DarkGray),
          ),
        ])));
      }
    }
    items
  }

  fn review_items(&self) -> Vec<ListItem<'static>> {
    let now = Utc::now();
    self
      .reviews
      .data()
      .map(|reviews| {
        reviews
          .iter()
          .map(|r| {
            let when = r.created_at.map(|at| relative_time(at, now)).unwrap_or_default();
            ListItem::new(Line::from(vec![
              Span::styled(
                format!("★ {:.0} ", r.rating),
                Style::default().fg(Color::Yellow),
              ),
              Span::raw(r.comment.clone()),
              Span::styled(format!("  {}", when), Style::default().fg(Color::DarkGray)),
            ]))
          })
          .collect()
      })
      .unwrap_or_default()
  }
}

impl View for CourseDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('r') => {
        self.course.refetch();
        self.reviews.refetch();
      }
      KeyCode::Char('e') => self.enroll(),
      KeyCode::Char('p') => self.toggle_pause(),
      KeyCode::Char('c') => self.claim_certificate(),
      KeyCode::Char('m') => self.remind_tomorrow(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = self
      .course
      .data()
      .map(|c| c.title.clone())
      .unwrap_or_else(|| self.course_id.clone());
    let block = panel(&title, &self.course);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(course) = self.course.data() else {
      let text = match self.course.error() {
        Some(e) => format!("Error: {}\n\nPress 'r' to retry.", e),
        None => "Loading course...".to_string(),
      };
      frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        inner,
      );
      return;
    };

    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(7), Constraint::Min(3)])
      .split(inner);
    let cols = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
      .split(rows[1]);

    let summary = Paragraph::new(self.summary_lines(course))
      .wrap(Wrap { trim: true })
      .scroll((self.scroll, 0));
    frame.render_widget(summary, rows[0]);

    let outline = List::new(self.outline_items(course)).block(plain_panel("Outline"));
    frame.render_widget(outline, cols[0]);

    let reviews = List::new(self.review_items()).block(panel("Reviews", &self.reviews));
    frame.render_widget(reviews, cols[1]);
  }

  fn breadcrumb_label(&self) -> String {
    self
      .course
      .data()
      .map(|c| c.title.clone())
      .unwrap_or_else(|| self.course_id.clone())
  }

  fn tick(&mut self) {
    self.course.poll();
    self.reviews.poll();
    self.sync_enrollment();
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("e", "enroll"),
      Shortcut::new("p", "pause/resume"),
      Shortcut::new("c", "certificate"),
      Shortcut::new("m", "remind"),
      Shortcut::new("q", "back"),
    ]
  }
}
