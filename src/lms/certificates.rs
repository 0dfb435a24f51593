use serde_json::{json, Value};

use super::types::Certificate;
use crate::http::{ApiClient, ApiError};

#[derive(Clone)]
pub struct CertificateService {
  http: ApiClient,
}

impl CertificateService {
  pub fn new(http: ApiClient) -> Self {
    Self { http }
  }

  pub async fn list(&self, user_id: &str) -> Result<Vec<Certificate>, ApiError> {
    self
      .http
      .get(&format!("users/{}/certificates", user_id))
      .await
  }

  pub async fn get(&self, certificate_id: &str) -> Result<Certificate, ApiError> {
    self
      .http
      .get(&format!("certificates/{}", certificate_id))
      .await
  }

  pub async fn generate(&self, enrollment_id: &str) -> Result<Certificate, ApiError> {
    self
      .http
      .post(
        &format!("enrollments/{}/certificate", enrollment_id),
        &json!({}),
      )
      .await
  }

  pub async fn verify(&self, verification_code: &str) -> Result<Certificate, ApiError> {
    self
      .http
      .get(&format!("certificates/verify/{}", verification_code))
      .await
  }

  pub async fn share(&self, certificate_id: &str, platform: &str) -> Result<Value, ApiError> {
    self
      .http
      .post(
        &format!("certificates/{}/share", certificate_id),
        &json!({"platform": platform}),
      )
      .await
  }
}
