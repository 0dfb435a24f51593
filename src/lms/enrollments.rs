use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

use super::analytics::AnalyticsService;
use super::types::{Course, Enrollment, EnrollmentStatus, LessonProgress, QuizScore};
use crate::cache::KeyValueStore;
use crate::http::{ApiClient, ApiError, ApiRequest};
use crate::toast::{Toast, ToastKind, Toasts};

pub const OFFLINE_PROGRESS_KEY: &str = "offlineProgress";
pub const ACTIVE_STUDY_SESSION_KEY: &str = "activeStudySession";
/// Set while offline progress is waiting to be flushed.
pub const PENDING_SYNC_KEY: &str = "pendingSync";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequest {
  pub user_id: String,
  pub course_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub discount_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentSort {
  EnrolledAt,
  LastAccessed,
  Progress,
}

impl EnrollmentSort {
  fn as_str(self) -> &'static str {
    match self {
      EnrollmentSort::EnrolledAt => "enrolledAt",
      EnrollmentSort::LastAccessed => "lastAccessed",
      EnrollmentSort::Progress => "progress",
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentQuery {
  pub status: Vec<EnrollmentStatus>,
  pub include_completed: Option<bool>,
  pub sort_by: Option<EnrollmentSort>,
  pub limit: Option<u32>,
}

impl EnrollmentQuery {
  pub fn active() -> Self {
    Self {
      status: vec![EnrollmentStatus::Active],
      include_completed: Some(false),
      sort_by: Some(EnrollmentSort::LastAccessed),
      limit: None,
    }
  }

  pub fn completed() -> Self {
    Self {
      status: vec![EnrollmentStatus::Completed],
      include_completed: None,
      sort_by: Some(EnrollmentSort::EnrolledAt),
      limit: None,
    }
  }

  fn to_request(&self, user_id: &str) -> ApiRequest {
    let mut req = ApiRequest::get("enrollments").with_param("userId", user_id);
    if !self.status.is_empty() {
      let status: Vec<&str> = self.status.iter().map(|s| s.as_str()).collect();
      req = req.with_param("status", status.join(","));
    }
    req
      .with_opt_param("includeCompleted", self.include_completed)
      .with_opt_param("sortBy", self.sort_by.map(EnrollmentSort::as_str))
      .with_opt_param("limit", self.limit)
  }
}

/// Progress recorded while offline, flushed by `sync_offline_progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineProgressRecord {
  pub enrollment_id: String,
  pub lesson_id: String,
  pub progress_data: Value,
  pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStudySession {
  pub session_id: String,
  pub enrollment_id: String,
  pub lesson_id: String,
  pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySessionSummary {
  pub time_spent: u32,
  pub completion_percentage: u32,
  pub interactions: Vec<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudySessionStarted {
  session_id: String,
}

pub struct EnrollmentService {
  http: ApiClient,
  store: Arc<dyn KeyValueStore>,
  analytics: AnalyticsService,
  toasts: Toasts,
  enrollments: watch::Sender<Vec<Enrollment>>,
  current: watch::Sender<Option<Enrollment>>,
}

impl EnrollmentService {
  pub fn new(
    http: ApiClient,
    store: Arc<dyn KeyValueStore>,
    analytics: AnalyticsService,
    toasts: Toasts,
  ) -> Self {
    Self {
      http,
      store,
      analytics,
      toasts,
      enrollments: watch::Sender::new(Vec::new()),
      current: watch::Sender::new(None),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<Vec<Enrollment>> {
    self.enrollments.subscribe()
  }

  pub fn subscribe_current(&self) -> watch::Receiver<Option<Enrollment>> {
    self.current.subscribe()
  }

  pub async fn enroll(&self, request: &EnrollmentRequest) -> Result<Enrollment, ApiError> {
    let enrollment: Enrollment = self.http.post("enrollments", request).await?;
    self
      .enrollments
      .send_modify(|list| list.push(enrollment.clone()));
    self
      .analytics
      .track(
        &request.user_id,
        "course_enrolled",
        json!({"courseId": request.course_id, "enrollmentId": enrollment.id}),
      )
      .await;
    Ok(enrollment)
  }

  pub async fn list(&self, user_id: &str, query: &EnrollmentQuery) -> Result<Vec<Enrollment>, ApiError> {
    let enrollments: Vec<Enrollment> = self.http.execute(query.to_request(user_id)).await?;
    self.enrollments.send_replace(enrollments.clone());
    Ok(enrollments)
  }

  pub async fn get(&self, enrollment_id: &str) -> Result<Enrollment, ApiError> {
    let enrollment: Enrollment = self
      .http
      .get(&format!("enrollments/{}", enrollment_id))
      .await?;
    self.current.send_replace(Some(enrollment.clone()));
    self.replace_local(&enrollment);
    Ok(enrollment)
  }

  pub async fn update_progress(&self, enrollment_id: &str, progress: &Value) -> Result<Enrollment, ApiError> {
    let enrollment: Enrollment = self
      .http
      .put(&format!("enrollments/{}/progress", enrollment_id), progress)
      .await?;
    self.replace_local(&enrollment);
    self
      .analytics
      .track(
        &enrollment.user_id,
        "progress_updated",
        json!({
          "enrollmentId": enrollment_id,
          "overallProgress": enrollment.progress.overall_progress,
        }),
      )
      .await;
    Ok(enrollment)
  }

  pub async fn complete_lesson(
    &self,
    enrollment_id: &str,
    lesson_id: &str,
    progress: &LessonProgress,
  ) -> Result<Enrollment, ApiError> {
    let path = format!("enrollments/{}/lessons/{}/complete", enrollment_id, lesson_id);
    let enrollment: Enrollment = self.http.post(&path, progress).await?;
    self.replace_local(&enrollment);
    self
      .analytics
      .track(
        &enrollment.user_id,
        "lesson_completed",
        json!({"enrollmentId": enrollment_id, "lessonId": lesson_id, "timeSpent": progress.time_spent}),
      )
      .await;
    Ok(enrollment)
  }

  pub async fn complete_module(&self, enrollment_id: &str, module_id: &str) -> Result<Enrollment, ApiError> {
    let path = format!("enrollments/{}/modules/{}/complete", enrollment_id, module_id);
    let enrollment: Enrollment = self.http.post(&path, &json!({})).await?;
    self.replace_local(&enrollment);
    self.toasts.achievement(
      "Module Completed!",
      "Great job completing this module! You're making excellent progress.",
    );
    Ok(enrollment)
  }

  pub async fn submit_quiz(
    &self,
    enrollment_id: &str,
    quiz_id: &str,
    answers: Vec<Value>,
  ) -> Result<QuizScore, ApiError> {
    let path = format!("enrollments/{}/quizzes/{}/attempt", enrollment_id, quiz_id);
    let score: QuizScore = self.http.post(&path, &json!({"answers": answers})).await?;

    self.current.send_if_modified(|current| match current {
      Some(e) if e.id == enrollment_id => {
        e.progress.quiz_scores.push(score.clone());
        true
      }
      _ => false,
    });

    let percentage = score.percentage();
    let toast = if percentage >= 80 {
      Toast::new(
        ToastKind::Success,
        "Great Quiz Score!",
        format!("You scored {}% on this quiz.", percentage),
      )
    } else {
      Toast::new(
        ToastKind::Info,
        "Quiz Complete",
        format!("You scored {}% on this quiz.", percentage),
      )
    };
    self.toasts.show(toast);
    Ok(score)
  }

  pub async fn complete_course(&self, enrollment_id: &str) -> Result<Enrollment, ApiError> {
    let enrollment: Enrollment = self
      .http
      .post(&format!("enrollments/{}/complete", enrollment_id), &json!({}))
      .await?;
    self.replace_local(&enrollment);
    self
      .analytics
      .track(
        &enrollment.user_id,
        "course_completed",
        json!({
          "enrollmentId": enrollment_id,
          "courseId": enrollment.course_id,
          "completionTime": enrollment.time_spent,
          "finalScore": final_score(&enrollment),
        }),
      )
      .await;
    self.toasts.achievement(
      "Course Completed!",
      "Congratulations! You've successfully completed this course.",
    );
    Ok(enrollment)
  }

  pub async fn pause(&self, enrollment_id: &str, reason: Option<&str>) -> Result<Enrollment, ApiError> {
    let enrollment: Enrollment = self
      .http
      .put(
        &format!("enrollments/{}/pause", enrollment_id),
        &json!({"reason": reason}),
      )
      .await?;
    self.replace_local(&enrollment);
    Ok(enrollment)
  }

  pub async fn resume(&self, enrollment_id: &str) -> Result<Enrollment, ApiError> {
    let enrollment: Enrollment = self
      .http
      .put(&format!("enrollments/{}/resume", enrollment_id), &json!({}))
      .await?;
    self.replace_local(&enrollment);
    self
      .toasts
      .info("Welcome Back!", "Ready to continue your learning journey?");
    Ok(enrollment)
  }

  pub async fn drop_enrollment(&self, enrollment_id: &str, reason: Option<&str>) -> Result<(), ApiError> {
    self
      .http
      .put::<Value, _>(
        &format!("enrollments/{}/drop", enrollment_id),
        &json!({"reason": reason}),
      )
      .await?;
    self
      .enrollments
      .send_modify(|list| list.retain(|e| e.id != enrollment_id));
    Ok(())
  }

  pub async fn bulk_update(&self, updates: Vec<(String, Value)>) -> Result<Vec<Enrollment>, ApiError> {
    let updates: Vec<Value> = updates
      .into_iter()
      .map(|(id, progress)| json!({"enrollmentId": id, "progress": progress}))
      .collect();
    let enrollments: Vec<Enrollment> = self
      .http
      .post("enrollments/bulk-update", &json!({"updates": updates}))
      .await?;
    for enrollment in &enrollments {
      self.replace_local(enrollment);
    }
    Ok(enrollments)
  }

  pub async fn start_study_session(&self, enrollment_id: &str, lesson_id: &str) -> Result<String, ApiError> {
    let started: StudySessionStarted = self
      .http
      .post(
        &format!("enrollments/{}/study-session/start", enrollment_id),
        &json!({"lessonId": lesson_id}),
      )
      .await?;

    let session = ActiveStudySession {
      session_id: started.session_id.clone(),
      enrollment_id: enrollment_id.to_string(),
      lesson_id: lesson_id.to_string(),
      start_time: Utc::now(),
    };
    self.store.set_json(ACTIVE_STUDY_SESSION_KEY, &session);
    Ok(started.session_id)
  }

  pub async fn end_study_session(&self, session_id: &str, summary: &StudySessionSummary) -> Result<(), ApiError> {
    self
      .http
      .post::<Value, _>(&format!("study-sessions/{}/end", session_id), summary)
      .await?;
    self.store.remove(ACTIVE_STUDY_SESSION_KEY);
    Ok(())
  }

  /// Session left open by a previous run, if any.
  pub fn active_study_session(&self) -> Option<ActiveStudySession> {
    self.store.get_json(ACTIVE_STUDY_SESSION_KEY)
  }

  /// Queue progress for upload once connectivity returns.
  pub fn save_progress_offline(&self, enrollment_id: &str, lesson_id: &str, progress_data: Value) {
    let mut records = self.offline_progress();
    records.push(OfflineProgressRecord {
      enrollment_id: enrollment_id.to_string(),
      lesson_id: lesson_id.to_string(),
      progress_data,
      timestamp: Utc::now(),
    });
    self.store.set_json(OFFLINE_PROGRESS_KEY, &records);
    self.store.set_json(PENDING_SYNC_KEY, &true);
  }

  pub fn offline_progress(&self) -> Vec<OfflineProgressRecord> {
    self.store.get_json(OFFLINE_PROGRESS_KEY).unwrap_or_default()
  }

  /// Upload queued offline progress. Returns how many records were sent.
  /// Only the uploaded records leave the queue, and only once the server
  /// accepted them; records saved during the upload stay queued.
  pub async fn sync_offline_progress(&self) -> Result<usize, ApiError> {
    let records = self.offline_progress();
    if records.is_empty() {
      return Ok(0);
    }

    self
      .http
      .post::<Value, _>(
        "enrollments/sync-offline",
        &json!({"progressData": records}),
      )
      .await?;

    let remaining: Vec<OfflineProgressRecord> =
      self.offline_progress().into_iter().skip(records.len()).collect();
    if remaining.is_empty() {
      self.store.remove(OFFLINE_PROGRESS_KEY);
    } else {
      self.store.set_json(OFFLINE_PROGRESS_KEY, &remaining);
    }
    tracing::info!(
      count = records.len(),
      remaining = remaining.len(),
      "offline progress synced"
    );
    Ok(records.len())
  }

  pub async fn upcoming_deadlines(&self, user_id: &str) -> Result<Vec<Value>, ApiError> {
    self
      .http
      .get(&format!("users/{}/upcoming-deadlines", user_id))
      .await
  }

  pub async fn recent_activity(&self, user_id: &str, limit: u32) -> Result<Vec<Value>, ApiError> {
    let req =
      ApiRequest::get(format!("users/{}/recent-activity", user_id)).with_param("limit", limit);
    self.http.execute(req).await
  }

  pub async fn stats(&self, user_id: &str) -> Result<Value, ApiError> {
    self
      .http
      .get(&format!("users/{}/enrollment-stats", user_id))
      .await
  }

  fn replace_local(&self, updated: &Enrollment) {
    self.enrollments.send_if_modified(|list| {
      match list.iter_mut().find(|e| e.id == updated.id) {
        Some(slot) => {
          *slot = updated.clone();
          true
        }
        None => false,
      }
    });
    self.current.send_if_modified(|current| match current {
      Some(e) if e.id == updated.id => {
        *e = updated.clone();
        true
      }
      _ => false,
    });
  }
}

/// Completed lessons as a rounded percentage of the course's lessons.
/// Without the course structure, the server-reported progress is used.
pub fn overall_progress(enrollment: &Enrollment, course: Option<&Course>) -> u32 {
  let total = course.map(Course::lesson_count).unwrap_or(0);
  if total == 0 {
    return enrollment.progress.overall_progress.clamp(0.0, 100.0).round() as u32;
  }
  let completed = enrollment.progress.completed_lessons.len().min(total);
  ((completed as f64 / total as f64) * 100.0).round() as u32
}

/// Mean of quiz percentages, rounded; zero without quiz attempts.
pub fn final_score(enrollment: &Enrollment) -> u32 {
  let scores: Vec<f64> = enrollment
    .progress
    .quiz_scores
    .iter()
    .filter(|q| q.max_score > 0.0)
    .map(|q| q.score / q.max_score)
    .collect();
  if scores.is_empty() {
    return 0;
  }
  ((scores.iter().sum::<f64>() / scores.len() as f64) * 100.0).round() as u32
}
