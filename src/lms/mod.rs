//! Domain services for the LMS backend.

pub mod analytics;
pub mod certificates;
pub mod courses;
pub mod dashboard;
pub mod enrollments;
pub mod features;
pub mod notifications;
pub mod types;
pub mod users;

use std::sync::Arc;

use crate::cache::{CacheLayer, KeyValueStore, ObjectStore};
use crate::config::Config;
use crate::http::{ApiError, Handler, HttpStack};
use crate::session::{AuthService, SessionStore};
use crate::toast::Toasts;

pub use analytics::AnalyticsService;
pub use certificates::CertificateService;
pub use courses::CourseService;
pub use dashboard::{DashboardData, DashboardService};
pub use enrollments::EnrollmentService;
pub use features::FeatureFlags;
pub use notifications::NotificationService;
pub use users::UserService;

/// Every service, built once at startup and shared by reference.
#[derive(Clone)]
pub struct Services {
  pub store: Arc<dyn KeyValueStore>,
  pub object_cache: CacheLayer,
  pub toasts: Toasts,
  pub http: HttpStack,
  pub session: Arc<SessionStore>,
  pub auth: AuthService,
  pub courses: Arc<CourseService>,
  pub enrollments: Arc<EnrollmentService>,
  pub certificates: CertificateService,
  pub analytics: AnalyticsService,
  pub notifications: Arc<NotificationService>,
  pub users: UserService,
  pub features: Arc<FeatureFlags>,
  pub dashboard: Arc<DashboardService>,
}

impl Services {
  /// Wire the services against the configured backend.
  pub fn new(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    objects: Arc<dyn ObjectStore>,
  ) -> Result<Self, ApiError> {
    let toasts = Toasts::new();
    let session = Arc::new(SessionStore::new(store.clone()));
    let http = HttpStack::new(config, session.clone(), toasts.clone())?;
    Ok(Self::assemble(config, store, objects, toasts, session, http))
  }

  /// Same wiring over caller-provided transports.
  pub fn with_transports(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    objects: Arc<dyn ObjectStore>,
    api_transport: Arc<dyn Handler>,
    auth_transport: Arc<dyn Handler>,
  ) -> Self {
    let toasts = Toasts::new();
    let session = Arc::new(SessionStore::new(store.clone()));
    let http = HttpStack::with_transports(
      config,
      api_transport,
      auth_transport,
      session.clone(),
      toasts.clone(),
    );
    Self::assemble(config, store, objects, toasts, session, http)
  }

  fn assemble(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    objects: Arc<dyn ObjectStore>,
    toasts: Toasts,
    session: Arc<SessionStore>,
    http: HttpStack,
  ) -> Self {
    let api = http.api.clone();
    let object_cache = CacheLayer::new(objects);

    let analytics = AnalyticsService::new(api.clone());
    let courses = Arc::new(CourseService::new(api.clone()));
    let certificates = CertificateService::new(api.clone());
    let enrollments = Arc::new(EnrollmentService::new(
      api.clone(),
      store.clone(),
      analytics.clone(),
      toasts.clone(),
    ));
    let dashboard = Arc::new(DashboardService::new(
      courses.clone(),
      enrollments.clone(),
      certificates.clone(),
      analytics.clone(),
      object_cache.clone(),
    ));

    Self {
      auth: AuthService::new(http.auth.clone(), session.clone()),
      users: UserService::new(api.clone(), session.clone()),
      notifications: Arc::new(NotificationService::new(api)),
      features: Arc::new(FeatureFlags::new(config.features.clone())),
      store,
      object_cache,
      toasts,
      http,
      session,
      courses,
      enrollments,
      certificates,
      analytics,
      dashboard,
    }
  }
}
