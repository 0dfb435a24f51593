use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::analytics::AnalyticsService;
use super::certificates::CertificateService;
use super::courses::CourseService;
use super::enrollments::{EnrollmentQuery, EnrollmentService};
use super::types::{Certificate, Course, Enrollment, EnrollmentStatus, UserAnalytics};
use crate::cache::{essential_keys, CacheLayer, CacheSource};
use crate::http::ApiError;

const TRENDING_LIMIT: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardStats {
  pub enrolled_courses: usize,
  pub completed_courses: usize,
  pub certificates: usize,
  pub hours_learned: f64,
  pub current_streak: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardData {
  pub stats: DashboardStats,
  pub enrollments: Vec<Enrollment>,
  pub enrolled_courses: Vec<Course>,
  pub trending: Vec<Course>,
  pub certificates: Vec<Certificate>,
  pub recommendations: Vec<Course>,
  pub analytics: Option<UserAnalytics>,
  /// Some sections were served from the local object cache
  pub from_cache: bool,
  pub loaded_at: Option<DateTime<Utc>>,
}

/// Aggregates everything the dashboard shows. Enrollments are required;
/// the other sections degrade to empty.
pub struct DashboardService {
  courses: Arc<CourseService>,
  enrollments: Arc<EnrollmentService>,
  certificates: CertificateService,
  analytics: AnalyticsService,
  cache: CacheLayer,
}

impl DashboardService {
  pub fn new(
    courses: Arc<CourseService>,
    enrollments: Arc<EnrollmentService>,
    certificates: CertificateService,
    analytics: AnalyticsService,
    cache: CacheLayer,
  ) -> Self {
    Self {
      courses,
      enrollments,
      certificates,
      analytics,
      cache,
    }
  }

  pub async fn load(&self, user_id: &str) -> Result<DashboardData, ApiError> {
    let enrollments_key = format!("enrollments-{}", user_id);
    let analytics_key = format!("analytics-{}", user_id);
    let query = EnrollmentQuery::default();

    let (enrollments, enrolled_courses, analytics, trending, certificates, recommendations) = tokio::join!(
      self.cache.get_or_fetch(&enrollments_key, None, || {
        self.enrollments.list(user_id, &query)
      }),
      self.courses.enrolled(user_id),
      self.cache.get_or_fetch(&analytics_key, None, || {
        self.analytics.user_analytics(user_id)
      }),
      self.cache.get_or_fetch("trending-courses", None, || {
        self.courses.trending(TRENDING_LIMIT)
      }),
      self.certificates.list(user_id),
      self.analytics.recommendations(user_id),
    );

    let enrollments = enrollments?;
    let enrolled_courses = enrolled_courses?;
    let mut from_cache = enrollments.source == CacheSource::Cache;

    let analytics = match analytics {
      Ok(result) => {
        from_cache |= result.source == CacheSource::Cache;
        Some(result.data)
      }
      Err(e) => {
        tracing::warn!(user_id, error = %e, "analytics unavailable for dashboard");
        None
      }
    };

    let trending = match trending {
      Ok(result) => result.data,
      Err(e) => {
        tracing::warn!(error = %e, "trending courses unavailable");
        Vec::new()
      }
    };

    let certificates = certificates.unwrap_or_else(|e| {
      tracing::warn!(user_id, error = %e, "certificates unavailable for dashboard");
      Vec::new()
    });

    let stats = compute_stats(&enrollments.data, &certificates, analytics.as_ref());

    Ok(DashboardData {
      stats,
      enrollments: enrollments.data,
      enrolled_courses,
      trending,
      certificates,
      recommendations,
      analytics,
      from_cache,
      loaded_at: Some(Utc::now()),
    })
  }

  /// Drop the cached dashboard sections for `user_id`.
  pub fn invalidate(&self, user_id: &str) {
    for key in essential_keys(user_id) {
      self.cache.delete(&key);
    }
  }
}

pub fn compute_stats(
  enrollments: &[Enrollment],
  certificates: &[Certificate],
  analytics: Option<&UserAnalytics>,
) -> DashboardStats {
  let completed = enrollments
    .iter()
    .filter(|e| e.status == EnrollmentStatus::Completed)
    .count();

  let hours_learned = match analytics {
    Some(a) if a.total_hours_learned > 0.0 => a.total_hours_learned,
    _ => enrollments.iter().map(|e| e.time_spent as f64).sum::<f64>() / 60.0,
  };

  DashboardStats {
    enrolled_courses: enrollments
      .iter()
      .filter(|e| e.status != EnrollmentStatus::Dropped)
      .count(),
    completed_courses: completed,
    certificates: certificates.len(),
    hours_learned,
    current_streak: analytics.map(|a| a.current_streak).unwrap_or(0),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::http::testing::MockTransport;
  use crate::http::{ApiClient, Method};
  use crate::toast::Toasts;
  use serde_json::json;

  fn dashboard(mock: &Arc<MockTransport>) -> DashboardService {
    let http = ApiClient::new(mock.clone());
    let storage = Arc::new(MemoryStorage::new());
    let analytics = AnalyticsService::new(http.clone());
    DashboardService::new(
      Arc::new(CourseService::new(http.clone())),
      Arc::new(EnrollmentService::new(
        http.clone(),
        storage.clone(),
        analytics.clone(),
        Toasts::new(),
      )),
      CertificateService::new(http),
      analytics,
      CacheLayer::new(storage),
    )
  }

  #[tokio::test]
  async fn test_load_tolerates_soft_failures_and_caches() {
    let mock = Arc::new(MockTransport::new());
    mock.ok(
      Method::Get,
      "enrollments",
      json!([
        {"id": "e1", "status": "completed", "timeSpent": 90},
        {"id": "e2", "status": "active", "timeSpent": 30}
      ]),
    );
    mock.ok(Method::Get, "users/u1/enrolled-courses", json!([{"id": "c1"}]));
    mock.ok(Method::Get, "courses/trending", json!([{"id": "c9"}]));

    let dashboard = dashboard(&mock);
    let data = dashboard.load("u1").await.unwrap();

    assert_eq!(data.stats.enrolled_courses, 2);
    assert_eq!(data.stats.completed_courses, 1);
    assert_eq!(data.stats.hours_learned, 2.0);
    assert!(data.analytics.is_none());
    assert!(data.certificates.is_empty());
    assert_eq!(data.trending[0].id, "c9");
    assert!(!data.from_cache);

    let again = dashboard.load("u1").await.unwrap();
    assert!(again.from_cache);
    assert_eq!(mock.calls(Method::Get, "enrollments"), 1);

    dashboard.invalidate("u1");
    dashboard.load("u1").await.unwrap();
    assert_eq!(mock.calls(Method::Get, "enrollments"), 2);
  }

  #[tokio::test]
  async fn test_load_fails_without_enrollments() {
    let mock = Arc::new(MockTransport::new());
    let err = dashboard(&mock).load("u1").await.unwrap_err();
    assert_eq!(err, ApiError::NotFound);
  }
}
