use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, ListState};

use super::{panel, render_empty};
use crate::lms::types::{Course, CourseLevel};
use crate::lms::Services;
use crate::query::Query;
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_minutes, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::CourseDetailView;

const LEVELS: [CourseLevel; 3] = [
  CourseLevel::Beginner,
  CourseLevel::Intermediate,
  CourseLevel::Advanced,
];

/// Course catalog. `/` searches server-side with the current filters;
/// `f` cycles a level filter.
pub struct CourseListView {
  services: Services,
  user_id: String,
  query: Query<Vec<Course>>,
  list_state: ListState,
  search: SearchInput,
  /// Submitted search, empty for the plain catalog
  term: String,
}

impl CourseListView {
  pub fn new(services: Services, user_id: String) -> Self {
    let mut view = Self {
      query: Self::catalog_query(&services, String::new()),
      services,
      user_id,
      list_state: ListState::default(),
      search: SearchInput::new(),
      term: String::new(),
    };
    view.query.fetch();
    view
  }

  fn catalog_query(services: &Services, term: String) -> Query<Vec<Course>> {
    let courses = services.courses.clone();
    Query::new(move || {
      let courses = courses.clone();
      let term = term.clone();
      async move {
        let filtered = !courses.filters().borrow().is_empty();
        if term.is_empty() && !filtered {
          Ok(courses.list(None).await?.items)
        } else {
          courses.search_filtered(&term).await
        }
      }
    })
  }

  fn courses(&self) -> &[Course] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn run_search(&mut self, term: String) {
    self.term = term;
    self.query = Self::catalog_query(&self.services, self.term.clone());
    self.query.fetch();
    self.list_state.select(Some(0));
  }

  fn level_filter(&self) -> Option<CourseLevel> {
    self.services.courses.filters().borrow().levels.first().copied()
  }

  /// none → beginner → intermediate → advanced → none
  fn cycle_level(&mut self) {
    let next = match self.level_filter() {
      None => Some(LEVELS[0]),
      Some(current) => LEVELS
        .iter()
        .position(|l| *l == current)
        .and_then(|i| LEVELS.get(i + 1))
        .copied(),
    };
    self.services.courses.update_filters(|f| {
      f.levels = next.into_iter().collect();
    });
    self.run_search(self.term.clone());
  }

  fn title(&self) -> String {
    let mut title = if self.term.is_empty() {
      format!("Courses ({})", self.courses().len())
    } else {
      format!("Courses matching '{}' ({})", self.term, self.courses().len())
    };
    if let Some(level) = self.level_filter() {
      title.push_str(&format!(" [{}]", level.as_str()));
    }
    title
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let block = panel(&self.title(), &self.query);

    if self.courses().is_empty() {
      render_empty(frame, area, block, &self.query, "No courses found.");
      return;
    }

    let items: Vec<ListItem> = self
      .courses()
      .iter()
      .map(|course| {
        let mut spans = vec![
          Span::raw(format!("{:<40}", truncate(&course.title, 40))),
          Span::styled(
            format!("{:<13}", course.level.as_str()),
            Style::default().fg(Color::Cyan),
          ),
          Span::styled(
            format!("★ {:.1} ", course.rating),
            Style::default().fg(Color::Yellow),
          ),
          Span::styled(
            format!("{:>7} ", format_minutes(course.duration)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::raw(truncate(&course.instructor.full_name(), 24)),
        ];
        if course.is_trending {
          spans.push(Span::styled(" 🔥", Style::default().fg(Color::Red)));
        }
        ListItem::new(Line::from(spans))
      })
      .collect();

    ensure_valid_selection(&mut self.list_state, items.len());
    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for CourseListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Submitted(term)) => {
        self.run_search(term);
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Changed(_)) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('f') => self.cycle_level(),
      KeyCode::Char('c') => {
        self.services.courses.clear_filters();
        self.run_search(String::new());
      }
      KeyCode::Enter => {
        if let Some(course) = self.list_state.selected().and_then(|i| self.courses().get(i)) {
          return ViewAction::Push(Box::new(CourseDetailView::new(
            self.services.clone(),
            self.user_id.clone(),
            course.id.clone(),
            None,
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    if self.term.is_empty() {
      "Courses".to_string()
    } else {
      format!("Courses [{}]", self.term)
    }
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("/", "search"),
      Shortcut::new("f", "level"),
      Shortcut::new("c", "clear"),
      Shortcut::new("q", "back"),
    ]
  }
}
