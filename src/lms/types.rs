//! Domain models as the LMS backend sends them (camelCase JSON).
//!
//! Most fields default when absent so partially populated payloads from
//! list endpoints still decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
  #[default]
  Beginner,
  Intermediate,
  Advanced,
}

impl CourseLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      CourseLevel::Beginner => "beginner",
      CourseLevel::Intermediate => "intermediate",
      CourseLevel::Advanced => "advanced",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Instructor {
  pub id: String,
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub bio: String,
  pub profile_image: String,
  pub expertise: Vec<String>,
  pub rating: f64,
  pub total_students: u64,
  pub total_courses: u64,
}

impl Instructor {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name).trim().to_string()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseCategory {
  pub id: String,
  pub name: String,
  pub description: String,
  pub icon: String,
  pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
  #[default]
  Video,
  Text,
  Quiz,
  Assignment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lesson {
  pub id: String,
  pub title: String,
  #[serde(rename = "type")]
  pub lesson_type: LessonType,
  pub content: String,
  pub video_url: Option<String>,
  /// Minutes
  pub duration: u32,
  pub order_index: u32,
  pub is_completed: Option<bool>,
  pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseModule {
  pub id: String,
  pub title: String,
  pub description: String,
  pub order_index: u32,
  pub duration: u32,
  pub lessons: Vec<Lesson>,
  pub is_completed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Course {
  pub id: String,
  pub title: String,
  pub description: String,
  pub instructor: Instructor,
  pub category: CourseCategory,
  pub level: CourseLevel,
  /// Minutes
  pub duration: u32,
  pub rating: f64,
  pub review_count: u64,
  pub enrollment_count: u64,
  pub price: f64,
  pub currency: String,
  pub thumbnail: String,
  pub video_url: Option<String>,
  pub modules: Vec<CourseModule>,
  pub tags: Vec<String>,
  pub is_published: bool,
  pub is_trending: bool,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

impl Course {
  pub fn lesson_count(&self) -> usize {
    self.modules.iter().map(|m| m.lessons.len()).sum()
  }
}

/// Catalog filters, sent as `courses/search` query params.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseFilters {
  pub query: String,
  pub categories: Vec<String>,
  pub levels: Vec<CourseLevel>,
  pub min_rating: Option<f64>,
  pub price_range: Option<(f64, f64)>,
  /// Minutes
  pub duration_range: Option<(u32, u32)>,
  pub instructors: Vec<String>,
}

impl CourseFilters {
  pub fn is_empty(&self) -> bool {
    *self == CourseFilters::default()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseReview {
  pub id: String,
  pub user_id: String,
  pub rating: f64,
  pub comment: String,
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
  #[default]
  Active,
  Completed,
  Dropped,
  Paused,
}

impl EnrollmentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      EnrollmentStatus::Active => "active",
      EnrollmentStatus::Completed => "completed",
      EnrollmentStatus::Dropped => "dropped",
      EnrollmentStatus::Paused => "paused",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizScore {
  pub quiz_id: String,
  pub score: f64,
  pub max_score: f64,
  pub attempted_at: Option<DateTime<Utc>>,
  pub time_spent: u32,
}

impl QuizScore {
  /// Score as a rounded percentage; zero when `max_score` is not positive.
  pub fn percentage(&self) -> u32 {
    if self.max_score <= 0.0 {
      return 0;
    }
    ((self.score / self.max_score) * 100.0).round() as u32
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnrollmentProgress {
  pub completed_lessons: Vec<String>,
  pub completed_modules: Vec<String>,
  pub current_module: String,
  pub current_lesson: String,
  /// 0-100
  pub overall_progress: f64,
  pub quiz_scores: Vec<QuizScore>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Enrollment {
  pub id: String,
  pub user_id: String,
  pub course_id: String,
  pub enrolled_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub progress: EnrollmentProgress,
  pub status: EnrollmentStatus,
  pub certificate_id: Option<String>,
  pub last_accessed_at: Option<DateTime<Utc>>,
  /// Minutes
  pub time_spent: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LessonProgress {
  pub lesson_id: String,
  pub time_spent: u32,
  pub is_completed: bool,
  pub completed_at: Option<DateTime<Utc>>,
  pub watch_time: Option<u32>,
  pub interactions: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  #[default]
  Trainee,
  Instructor,
  Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Light,
  Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPreferences {
  pub email: bool,
  pub push: bool,
  pub course_updates: bool,
  pub achievements: bool,
}

impl Default for NotificationPreferences {
  fn default() -> Self {
    Self {
      email: true,
      push: true,
      course_updates: true,
      achievements: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
  pub theme: Theme,
  pub language: String,
  pub notifications: NotificationPreferences,
}

impl Default for UserPreferences {
  fn default() -> Self {
    Self {
      theme: Theme::Light,
      language: "en".to_string(),
      notifications: NotificationPreferences::default(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
  pub id: String,
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub profile_image: String,
  pub role: Role,
  pub preferences: UserPreferences,
  pub enrollment_date: Option<DateTime<Utc>>,
  pub last_active: Option<DateTime<Utc>>,
}

impl User {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name).trim().to_string()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Certificate {
  pub id: String,
  pub user_id: String,
  pub course_id: String,
  pub title: String,
  pub description: String,
  pub issued_at: Option<DateTime<Utc>>,
  pub certificate_url: String,
  pub verification_code: String,
  pub instructor: String,
  /// Minutes
  pub course_duration: u32,
  pub final_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeeklyActivity {
  pub week: String,
  pub hours_spent: f64,
  pub lessons_completed: u32,
  pub quizzes_attempted: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningPathProgress {
  pub path_id: String,
  pub path_name: String,
  pub progress: f64,
  pub estimated_completion: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserAnalytics {
  pub user_id: String,
  pub total_courses_enrolled: u32,
  pub total_courses_completed: u32,
  pub total_certificates_earned: u32,
  pub total_hours_learned: f64,
  pub current_streak: u32,
  pub longest_streak: u32,
  pub average_quiz_score: f64,
  pub skills_acquired: Vec<String>,
  pub learning_path: Vec<LearningPathProgress>,
  pub weekly_activity: Vec<WeeklyActivity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
  CourseUpdate,
  AssignmentDue,
  CertificateEarned,
  Achievement,
  #[default]
  System,
  Reminder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppNotification {
  pub id: String,
  pub user_id: String,
  #[serde(rename = "type")]
  pub kind: NotificationType,
  pub title: String,
  pub message: String,
  pub is_read: bool,
  pub created_at: Option<DateTime<Utc>>,
  pub data: Option<Value>,
  pub priority: Priority,
  pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
impl User {
  pub fn sample(id: &str) -> Self {
    Self {
      id: id.to_string(),
      first_name: "Ada".to_string(),
      last_name: "Lovelace".to_string(),
      email: format!("{}@example.com", id),
      ..Default::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_course_decodes_partial_payload() {
    let course: Course = serde_json::from_value(json!({
      "id": "c1",
      "title": "Rust 101",
      "level": "intermediate",
      "reviewCount": 12,
      "modules": [{"id": "m1", "lessons": [{"id": "l1", "type": "quiz"}, {"id": "l2"}]}]
    }))
    .unwrap();

    assert_eq!(course.level, CourseLevel::Intermediate);
    assert_eq!(course.review_count, 12);
    assert_eq!(course.lesson_count(), 2);
    assert_eq!(course.modules[0].lessons[0].lesson_type, LessonType::Quiz);
  }

  #[test]
  fn test_notification_type_is_snake_case() {
    let n: AppNotification =
      serde_json::from_value(json!({"id": "n1", "type": "assignment_due", "priority": "high"}))
        .unwrap();
    assert_eq!(n.kind, NotificationType::AssignmentDue);
    assert_eq!(n.priority, Priority::High);
    assert!(!n.is_read);
  }

  #[test]
  fn test_quiz_percentage() {
    let score = QuizScore {
      score: 7.0,
      max_score: 9.0,
      ..Default::default()
    };
    assert_eq!(score.percentage(), 78);
    assert_eq!(QuizScore::default().percentage(), 0);
  }

  #[test]
  fn test_user_serializes_camel_case() {
    let value = serde_json::to_value(User::sample("u1")).unwrap();
    assert_eq!(value["firstName"], "Ada");
    assert_eq!(value["role"], "trainee");
  }
}
