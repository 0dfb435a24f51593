//! Scripted learning assistant.
//!
//! Messages are matched against keyword intents and answered from live
//! account data. The conversation is persisted per user under
//! `chat-<userId>`.

use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cache::KeyValueStore;
use crate::http::ApiError;
use crate::lms::enrollments::EnrollmentQuery;
use crate::lms::types::{Enrollment, EnrollmentStatus};
use crate::lms::{AnalyticsService, CourseService, EnrollmentService, Services};
use crate::session::SessionStore;

const APOLOGY: &str = "I apologize, but I'm having trouble accessing your data right now. \
Please try again in a moment, or feel free to ask me something else!";

pub fn history_key(user_id: &str) -> String {
  format!("chat-{}", user_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
  Progress,
  Recommendations,
  NextLesson,
  Analytics,
  Schedule,
  Courses,
  Achievements,
  Help,
  Fallback,
}

/// Map a message to an intent. Earlier rules win.
pub fn classify(message: &str) -> Intent {
  let text = message.to_lowercase();
  let has = |needle: &str| text.contains(needle);

  if has("progress") || has("how am i doing") {
    Intent::Progress
  } else if has("recommend") || has("suggest") || has("what should i learn") {
    Intent::Recommendations
  } else if has("next lesson") || has("what should i study") || has("continue learning") {
    Intent::NextLesson
  } else if has("analytics") || has("stats") {
    Intent::Analytics
  } else if has("schedule") || has("reminder") || has("study plan") {
    Intent::Schedule
  } else if has("course") && (has("which") || has("what")) {
    Intent::Courses
  } else if has("certificate") || has("achievement") || has("badge") {
    Intent::Achievements
  } else if has("help") || has("how") || has("can you") {
    Intent::Help
  } else {
    Intent::Fallback
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
  #[serde(rename = "ai")]
  Assistant,
  #[serde(rename = "user")]
  User,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
  #[default]
  Text,
  Recommendation,
  Progress,
  Achievement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub id: String,
  pub sender: Sender,
  pub message: String,
  pub timestamp: DateTime<Utc>,
  #[serde(rename = "type", default)]
  pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
  pub message: String,
  pub kind: MessageKind,
  pub suggestions: Vec<String>,
}

impl Reply {
  fn text(message: String, suggestions: &[&str]) -> Self {
    Self {
      message,
      kind: MessageKind::Text,
      suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
    }
  }

  fn with_kind(mut self, kind: MessageKind) -> Self {
    self.kind = kind;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
  Progress,
  Recommendations,
  NextLesson,
  StudyPlan,
}

impl QuickAction {
  pub const ALL: [QuickAction; 4] = [
    QuickAction::Progress,
    QuickAction::Recommendations,
    QuickAction::NextLesson,
    QuickAction::StudyPlan,
  ];

  pub fn label(self) -> &'static str {
    match self {
      QuickAction::Progress => "My Progress",
      QuickAction::Recommendations => "Recommendations",
      QuickAction::NextLesson => "Next Lesson",
      QuickAction::StudyPlan => "Study Plan",
    }
  }

  fn prompt(self) -> &'static str {
    match self {
      QuickAction::Progress => "What's my current progress?",
      QuickAction::Recommendations => "Can you recommend some courses for me?",
      QuickAction::NextLesson => "What should I study next?",
      QuickAction::StudyPlan => "Help me create a study plan",
    }
  }
}

fn default_suggestions() -> Vec<String> {
  [
    "What's my current progress?",
    "Recommend courses for me",
    "When is my next assignment due?",
    "Show my learning analytics",
    "What skills should I focus on?",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

pub struct Assistant {
  user_id: String,
  messages: Vec<ChatMessage>,
  suggestions: Vec<String>,
  store: Arc<dyn KeyValueStore>,
  session: Arc<SessionStore>,
  analytics: AnalyticsService,
  enrollments: Arc<EnrollmentService>,
  courses: Arc<CourseService>,
}

impl Assistant {
  /// Restore the conversation for `user_id`, or greet if there is none.
  pub fn new(services: &Services, user_id: &str) -> Self {
    let messages: Vec<ChatMessage> = services
      .store
      .get_json(&history_key(user_id))
      .unwrap_or_default();

    let mut assistant = Self {
      user_id: user_id.to_string(),
      messages,
      suggestions: default_suggestions(),
      store: services.store.clone(),
      session: services.session.clone(),
      analytics: services.analytics.clone(),
      enrollments: services.enrollments.clone(),
      courses: services.courses.clone(),
    };
    if assistant.messages.is_empty() {
      assistant.welcome();
    }
    assistant
  }

  pub fn messages(&self) -> &[ChatMessage] {
    &self.messages
  }

  pub fn suggestions(&self) -> &[String] {
    &self.suggestions
  }

  /// Post a user message and the assistant's answer. Blank input is
  /// ignored.
  pub async fn send(&mut self, text: &str) -> Option<&ChatMessage> {
    let text = text.trim();
    if text.is_empty() {
      return None;
    }

    self.push(Sender::User, text.to_string(), MessageKind::Text);

    let reply = match self.respond(text).await {
      Ok(reply) => reply,
      Err(e) => {
        tracing::warn!(error = %e, "assistant could not load account data");
        Reply::text(APOLOGY.to_string(), &["Try again", "Contact support", "Browse courses"])
      }
    };

    if !reply.suggestions.is_empty() {
      self.suggestions = reply.suggestions;
    }
    self.push(Sender::Assistant, reply.message, reply.kind);
    self.messages.last()
  }

  pub async fn quick_action(&mut self, action: QuickAction) -> Option<&ChatMessage> {
    self.send(action.prompt()).await
  }

  /// Forget the conversation and start over.
  pub fn clear(&mut self) {
    self.messages.clear();
    self.welcome();
  }

  pub fn export(&self) -> Value {
    json!({
      "userId": self.user_id,
      "messages": self.messages,
      "exportedAt": Utc::now(),
    })
  }

  fn first_name(&self) -> Option<String> {
    self
      .session
      .current_user()
      .map(|u| u.first_name)
      .filter(|name| !name.is_empty())
  }

  fn welcome(&mut self) {
    let name = self.first_name().unwrap_or_else(|| "there".to_string());
    let greeting = format!(
      "Hi {}! I'm your learning assistant. I can help you with course recommendations, \
track your progress, answer questions about your learning path, and much more. \
What would you like to know?",
      name
    );
    self.suggestions = default_suggestions();
    self.push(Sender::Assistant, greeting, MessageKind::Text);
  }

  fn push(&mut self, sender: Sender, message: String, kind: MessageKind) {
    let now = Utc::now();
    self.messages.push(ChatMessage {
      id: format!("{:x}-{}", now.timestamp_millis(), self.messages.len()),
      sender,
      message,
      timestamp: now,
      kind,
    });
    self.store.set_json(&history_key(&self.user_id), &self.messages);
  }

  async fn respond(&self, text: &str) -> Result<Reply, ApiError> {
    let user_id = self.user_id.as_str();

    match classify(text) {
      Intent::Progress => {
        let analytics = self.analytics.user_analytics(user_id).await?;
        let enrollments = self
          .enrollments
          .list(user_id, &EnrollmentQuery::default())
          .await?;
        let active = count_status(&enrollments, EnrollmentStatus::Active);
        let completed = count_status(&enrollments, EnrollmentStatus::Completed);

        let message = format!(
          "Here's your current progress:\n\n\
Courses\n  {} enrolled\n  {} currently active\n  {} completed\n\n\
Study time\n  {:.1} total hours learned\n  {:.0} hours per week on average\n\n\
Streak\n  {} day current streak\n  {} day longest streak\n\n\
Performance\n  {:.0}% average quiz score\n  {} skills acquired\n\n\
You're doing great, keep it up!",
          analytics.total_courses_enrolled,
          active,
          completed,
          analytics.total_hours_learned,
          analytics.total_hours_learned / 7.0,
          analytics.current_streak,
          analytics.longest_streak,
          analytics.average_quiz_score,
          analytics.skills_acquired.len(),
        );
        Ok(
          Reply::text(
            message,
            &["Show detailed analytics", "Set study goals", "View certificates"],
          )
          .with_kind(MessageKind::Progress),
        )
      }

      Intent::Recommendations => {
        let recommended = self.analytics.recommendations(user_id).await;
        let trending = self.courses.trending(3).await?;

        let mut message =
          String::from("Based on your learning history and goals, here are my recommendations:\n");
        if !recommended.is_empty() {
          message.push_str("\nPersonalized for you\n");
          for (i, course) in recommended.iter().take(3).enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, course.title));
          }
        }
        if !trending.is_empty() {
          message.push_str("\nTrending courses\n");
          for (i, course) in trending.iter().enumerate() {
            message.push_str(&format!(
              "  {}. {} by {}\n",
              i + 1,
              course.title,
              course.instructor.full_name()
            ));
          }
        }
        Ok(
          Reply::text(
            message,
            &["Enroll in course", "View course details", "More recommendations"],
          )
          .with_kind(MessageKind::Recommendation),
        )
      }

      Intent::NextLesson => {
        let mut active = self.enrollments.list(user_id, &EnrollmentQuery::active()).await?;
        active.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        let Some(enrollment) = active.into_iter().next() else {
          return Ok(Reply::text(
            "You don't have any active courses right now. Would you like me to recommend \
some courses to get started?"
              .to_string(),
            &["Show recommendations", "Browse popular courses", "Find courses by topic"],
          ));
        };

        let course = self.courses.get(&enrollment.course_id).await?;
        let progress = &enrollment.progress;
        let message = format!(
          "Your next lesson is in \"{}\":\n\n  Current: {}\n  Module: {}\n  Progress: {:.0}% complete\n  \
Time spent: {} hours\n\nReady to continue? Let's keep that momentum going!",
          course.title,
          or_default(&progress.current_lesson, "Getting Started"),
          or_default(&progress.current_module, "Introduction"),
          progress.overall_progress,
          (enrollment.time_spent as f64 / 60.0).round(),
        );
        Ok(Reply::text(
          message,
          &["Continue this lesson", "Show course details", "Set study reminder"],
        ))
      }

      Intent::Analytics => {
        let a = self.analytics.user_analytics(user_id).await?;
        let rate = if a.total_courses_enrolled == 0 {
          0.0
        } else {
          a.total_courses_completed as f64 / a.total_courses_enrolled as f64 * 100.0
        };

        let mut message = format!(
          "Here's your detailed learning analytics:\n\n\
Overall performance\n  Completion rate: {}/{} courses ({:.0}%)\n  Average quiz score: {:.0}%\n  Skills acquired: {}\n\n\
Learning streak\n  Current: {} days\n  Longest: {} days\n\n\
Study time\n  Total: {:.1} hours\n  Daily average: {:.1} hours\n\n\
Achievements\n  Certificates earned: {}\n  Learning paths in progress: {}",
          a.total_courses_completed,
          a.total_courses_enrolled,
          rate,
          a.average_quiz_score,
          a.skills_acquired.len(),
          a.current_streak,
          a.longest_streak,
          a.total_hours_learned,
          a.total_hours_learned / 30.0,
          a.total_certificates_earned,
          a.learning_path.len(),
        );
        if let Some(week) = a.weekly_activity.last() {
          message.push_str(&format!(
            "\n\nThis week\n  {:.1} hours studied\n  {} lessons completed\n  {} quizzes attempted",
            week.hours_spent, week.lessons_completed, week.quizzes_attempted
          ));
        }
        Ok(Reply::text(
          message,
          &["Export progress report", "Set study goals", "View certificates"],
        ))
      }

      Intent::Schedule => {
        let deadlines = self.enrollments.upcoming_deadlines(user_id).await?;
        let mut message = String::from("Your study schedule\n\n");
        if !deadlines.is_empty() {
          message.push_str("Upcoming deadlines\n");
          for (i, deadline) in deadlines.iter().enumerate() {
            let title = deadline["title"].as_str().unwrap_or("Untitled");
            match deadline["dueDate"]
              .as_str()
              .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            {
              Some(due) => {
                let days = days_until(due.with_timezone(&Utc), Utc::now());
                message.push_str(&format!("  {}. {} - {} days left\n", i + 1, title, days));
              }
              None => message.push_str(&format!("  {}. {}\n", i + 1, title)),
            }
          }
          message.push('\n');
        }
        message.push_str(
          "Study recommendations\n  Study 30-45 minutes daily for best retention\n  \
Take a break every 25 minutes\n  Review previous lessons before starting new ones\n  \
Set consistent study times each day",
        );
        Ok(Reply::text(
          message,
          &["Create study schedule", "Set daily reminders", "View calendar"],
        ))
      }

      Intent::Courses => {
        let courses = self.courses.enrolled(user_id).await?;
        if courses.is_empty() {
          return Ok(Reply::text(
            "You're not currently enrolled in any courses. Would you like me to help you \
find some great courses to start your learning journey?"
              .to_string(),
            &["Browse courses", "Show recommendations", "Popular courses"],
          ));
        }

        let enrollments = self
          .enrollments
          .list(user_id, &EnrollmentQuery::default())
          .await?;
        let mut message = String::from("Your enrolled courses\n\n");
        for (i, course) in courses.iter().enumerate() {
          let enrollment = enrollments.iter().find(|e| e.course_id == course.id);
          message.push_str(&format!(
            "{}. {}\n   Instructor: {}\n   Progress: {:.0}% complete\n   Status: {}\n\n",
            i + 1,
            course.title,
            course.instructor.full_name(),
            enrollment.map(|e| e.progress.overall_progress).unwrap_or(0.0),
            enrollment.map(|e| e.status.as_str()).unwrap_or("unknown"),
          ));
        }
        Ok(Reply::text(
          message.trim_end().to_string(),
          &["Continue a course", "View course details", "Browse new courses"],
        ))
      }

      Intent::Achievements => {
        let a = self.analytics.user_analytics(user_id).await?;
        let closing = if a.total_certificates_earned > 0 {
          "Congratulations on your achievements! Your certificates are on the Certificates page."
        } else {
          "Keep learning to earn your first certificate! Complete a course to get started."
        };
        let message = format!(
          "Your achievements\n\n  Certificates earned: {}\n  Current streak: {} days\n  Skills mastered: {}\n\n{}",
          a.total_certificates_earned,
          a.current_streak,
          a.skills_acquired.len(),
          closing
        );
        Ok(
          Reply::text(
            message,
            &["View certificates", "Share achievements", "Continue learning"],
          )
          .with_kind(MessageKind::Achievement),
        )
      }

      Intent::Help => Ok(Reply::text(
        "I'm here to help! Here's what I can do for you:\n\n\
Progress tracking\n  Show your current progress in all courses\n  Calculate completion rates and study time\n  Track your learning streak\n\n\
Recommendations\n  Suggest courses based on your interests\n  Recommend study schedules\n\n\
Course support\n  List your courses and what to study next\n  Show upcoming deadlines\n\n\
Achievements\n  Track your certificates and streaks\n\n\
Just ask me anything about your learning journey!"
          .to_string(),
        &["Show my progress", "Recommend courses", "Study tips", "View achievements"],
      )),

      Intent::Fallback => {
        let help = contextual_help(Local::now().hour(), self.first_name().as_deref());
        let openers = [
          "That's an interesting question! I'm here to help with your learning journey.",
          "I understand you're looking for assistance.",
          "Thanks for reaching out!",
          "I'm here to support your educational goals!",
        ];
        let opener = openers[text.len() % openers.len()];
        Ok(Reply::text(
          format!("{} {}", opener, help),
          &["What's my progress?", "Recommend courses", "Study tips", "Set study goals"],
        ))
      }
    }
  }
}

fn count_status(enrollments: &[Enrollment], status: EnrollmentStatus) -> usize {
  enrollments.iter().filter(|e| e.status == status).count()
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
  if value.is_empty() {
    fallback
  } else {
    value
  }
}

/// Whole days until `due`, rounded up.
fn days_until(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
  let seconds = (due - now).num_seconds();
  (seconds + 86_399).div_euclid(86_400)
}

fn contextual_help(hour: u32, first_name: Option<&str>) -> String {
  let name = first_name.map(|n| format!(" {}", n)).unwrap_or_default();
  if hour < 12 {
    format!("Good morning{}! What would you like to focus on today?", name)
  } else if hour < 17 {
    format!("Good afternoon{}! How can I help with your learning goals?", name)
  } else {
    format!("Good evening{}! Ready for some evening study time?", name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::config::Config;
  use crate::http::testing::MockTransport;
  use crate::http::Method;
  use crate::lms::types::User;

  fn services(api: Arc<MockTransport>) -> Services {
    let mut config = Config::default();
    config.api.retries = 0;
    let storage = Arc::new(MemoryStorage::new());
    let services = Services::with_transports(
      &config,
      storage.clone(),
      storage,
      api,
      Arc::new(MockTransport::new()),
    );
    services
      .session
      .set_session(User::sample("u1"), "tok".into(), None);
    services
  }

  #[test]
  fn test_classify_follows_rule_order() {
    assert_eq!(classify("How am I doing?"), Intent::Progress);
    assert_eq!(classify("Show my progress stats"), Intent::Progress);
    assert_eq!(classify("Can you suggest something"), Intent::Recommendations);
    assert_eq!(classify("What should I study next?"), Intent::NextLesson);
    assert_eq!(classify("show my learning analytics"), Intent::Analytics);
    assert_eq!(classify("Help me create a study plan"), Intent::Schedule);
    assert_eq!(classify("Which course am I taking?"), Intent::Courses);
    assert_eq!(classify("any new badge?"), Intent::Achievements);
    assert_eq!(classify("how does this work"), Intent::Help);
    assert_eq!(classify("hello"), Intent::Fallback);
  }

  #[test]
  fn test_helpers() {
    let now = Utc::now();
    assert_eq!(days_until(now + chrono::Duration::hours(30), now), 2);
    assert_eq!(days_until(now + chrono::Duration::days(1), now), 1);
    assert_eq!(days_until(now - chrono::Duration::hours(2), now), 0);

    assert_eq!(
      contextual_help(9, Some("Ada")),
      "Good morning Ada! What would you like to focus on today?"
    );
    assert!(contextual_help(20, None).starts_with("Good evening!"));
  }

  #[tokio::test]
  async fn test_conversation_is_persisted_per_user() {
    let api = Arc::new(MockTransport::new());
    api.ok(
      Method::Get,
      "users/u1/analytics",
      json!({"totalCoursesEnrolled": 3, "currentStreak": 4, "totalCertificatesEarned": 1}),
    );
    api.ok(
      Method::Get,
      "enrollments",
      json!([{"id": "e1", "status": "active"}, {"id": "e2", "status": "completed"}]),
    );
    let services = services(api);

    let mut assistant = Assistant::new(&services, "u1");
    assert_eq!(assistant.messages().len(), 1);
    assert!(assistant.messages()[0].message.starts_with("Hi Ada!"));

    assert!(assistant.send("   ").await.is_none());
    let reply = assistant.send("How is my progress?").await.unwrap();
    assert_eq!(reply.sender, Sender::Assistant);
    assert_eq!(reply.kind, MessageKind::Progress);
    assert!(reply.message.contains("1 currently active"));
    assert!(reply.message.contains("4 day current streak"));
    assert_eq!(assistant.suggestions()[0], "Show detailed analytics");

    let restored = Assistant::new(&services, "u1");
    assert_eq!(restored.messages().len(), 3);
    assert_eq!(restored.messages()[1].sender, Sender::User);

    let other = Assistant::new(&services, "u2");
    assert_eq!(other.messages().len(), 1);
  }

  #[tokio::test]
  async fn test_backend_failure_yields_apology() {
    let api = Arc::new(MockTransport::new());
    api.on(
      Method::Get,
      "users/u1/analytics",
      Err(ApiError::Network("down".into())),
    );
    let services = services(api);
    let mut assistant = Assistant::new(&services, "u1");

    let reply = assistant
      .quick_action(QuickAction::Progress)
      .await
      .unwrap();
    assert!(reply.message.starts_with("I apologize"));
    assert_eq!(assistant.suggestions()[0], "Try again");

    assistant.clear();
    assert_eq!(assistant.messages().len(), 1);
    assert_eq!(assistant.export()["messages"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_next_lesson_without_active_courses() {
    let api = Arc::new(MockTransport::new());
    api.ok(Method::Get, "enrollments", json!([]));
    let services = services(api);
    let mut assistant = Assistant::new(&services, "u1");

    let reply = assistant.send("What should I study next?").await.unwrap();
    assert!(reply.message.starts_with("You don't have any active courses"));
  }
}
