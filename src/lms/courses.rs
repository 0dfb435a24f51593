use serde_json::Value;
use tokio::sync::watch;

use super::types::{Course, CourseCategory, CourseFilters, CourseReview};
use crate::http::{ApiClient, ApiError, ApiRequest, Page};

/// Catalog endpoints. Most reads land under `courses`/`categories` and are
/// served by the response cache.
pub struct CourseService {
  http: ApiClient,
  courses: watch::Sender<Vec<Course>>,
  categories: watch::Sender<Vec<CourseCategory>>,
  filters: watch::Sender<CourseFilters>,
}

impl CourseService {
  pub fn new(http: ApiClient) -> Self {
    Self {
      http,
      courses: watch::Sender::new(Vec::new()),
      categories: watch::Sender::new(Vec::new()),
      filters: watch::Sender::new(CourseFilters::default()),
    }
  }

  pub async fn list(&self, page: Option<u32>) -> Result<Page<Course>, ApiError> {
    let req = ApiRequest::get("courses").with_opt_param("page", page);
    let page = self.http.get_page::<Course>(req).await?;
    self.courses.send_replace(page.items.clone());
    Ok(page)
  }

  pub async fn get(&self, course_id: &str) -> Result<Course, ApiError> {
    self.http.get(&format!("courses/{}", course_id)).await
  }

  pub async fn enrolled(&self, user_id: &str) -> Result<Vec<Course>, ApiError> {
    self
      .http
      .get(&format!("users/{}/enrolled-courses", user_id))
      .await
  }

  pub async fn trending(&self, limit: u32) -> Result<Vec<Course>, ApiError> {
    self
      .http
      .execute(ApiRequest::get("courses/trending").with_param("limit", limit))
      .await
  }

  pub async fn by_category(&self, category_id: &str) -> Result<Vec<Course>, ApiError> {
    self
      .http
      .get(&format!("courses/category/{}", category_id))
      .await
  }

  pub async fn by_instructor(&self, instructor_id: &str) -> Result<Vec<Course>, ApiError> {
    self
      .http
      .get(&format!("courses/instructor/{}", instructor_id))
      .await
  }

  pub async fn search(&self, query: &str, filters: &CourseFilters) -> Result<Vec<Course>, ApiError> {
    self.http.execute(search_request(query, filters)).await
  }

  /// Search with the current filter state.
  pub async fn search_filtered(&self, query: &str) -> Result<Vec<Course>, ApiError> {
    let filters = self.filters.borrow().clone();
    self.search(query, &filters).await
  }

  pub async fn categories(&self) -> Result<Vec<CourseCategory>, ApiError> {
    let categories: Vec<CourseCategory> = self.http.get("categories").await?;
    self.categories.send_replace(categories.clone());
    Ok(categories)
  }

  pub async fn reviews(&self, course_id: &str, page: u32) -> Result<Vec<CourseReview>, ApiError> {
    let req = ApiRequest::get(format!("courses/{}/reviews", course_id)).with_param("page", page);
    self.http.execute(req).await
  }

  pub async fn add_review(&self, course_id: &str, rating: u8, comment: &str) -> Result<Value, ApiError> {
    let body = serde_json::json!({"rating": rating, "comment": comment});
    self
      .http
      .post(&format!("courses/{}/reviews", course_id), &body)
      .await
  }

  pub fn update_filters(&self, update: impl FnOnce(&mut CourseFilters)) {
    self.filters.send_modify(update);
  }

  pub fn clear_filters(&self) {
    self.filters.send_replace(CourseFilters::default());
  }

  pub fn filters(&self) -> watch::Receiver<CourseFilters> {
    self.filters.subscribe()
  }

  /// Last list fetched by `list`.
  pub fn courses(&self) -> watch::Receiver<Vec<Course>> {
    self.courses.subscribe()
  }

  pub fn cached_categories(&self) -> Vec<CourseCategory> {
    self.categories.borrow().clone()
  }
}

/// `courses/search` request for `query` narrowed by `filters`.
pub fn search_request(query: &str, filters: &CourseFilters) -> ApiRequest {
  let mut req = ApiRequest::get("courses/search").with_param("q", query);

  if !filters.categories.is_empty() {
    req = req.with_param("categories", filters.categories.join(","));
  }
  if !filters.levels.is_empty() {
    let levels: Vec<&str> = filters.levels.iter().map(|l| l.as_str()).collect();
    req = req.with_param("levels", levels.join(","));
  }
  if !filters.instructors.is_empty() {
    req = req.with_param("instructors", filters.instructors.join(","));
  }
  if let Some(rating) = filters.min_rating.filter(|r| *r > 0.0) {
    req = req.with_param("minRating", rating);
  }
  if let Some((min, max)) = filters.price_range {
    req = req.with_param("minPrice", min).with_param("maxPrice", max);
  }
  if let Some((min, max)) = filters.duration_range {
    req = req
      .with_param("minDuration", min)
      .with_param("maxDuration", max);
  }

  req
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::MockTransport;
  use crate::http::Method;
  use crate::lms::types::CourseLevel;
  use serde_json::json;
  use std::sync::Arc;

  #[test]
  fn test_search_request_params() {
    let filters = CourseFilters {
      categories: vec!["web".into(), "data".into()],
      levels: vec![CourseLevel::Beginner, CourseLevel::Advanced],
      min_rating: Some(4.5),
      price_range: Some((0.0, 50.0)),
      ..Default::default()
    };
    let req = search_request("rust", &filters);

    assert_eq!(req.params["q"], "rust");
    assert_eq!(req.params["categories"], "web,data");
    assert_eq!(req.params["levels"], "beginner,advanced");
    assert_eq!(req.params["minRating"], "4.5");
    assert_eq!(req.params["maxPrice"], "50");
    assert!(!req.params.contains_key("minDuration"));
  }

  #[test]
  fn test_empty_filters_only_send_query() {
    let req = search_request("go", &CourseFilters::default());
    assert_eq!(req.params.len(), 1);
  }

  #[tokio::test]
  async fn test_filter_state_drives_search() {
    let mock = Arc::new(MockTransport::new());
    mock.ok(Method::Get, "courses/search", json!([{"id": "c1"}]));
    let courses = CourseService::new(ApiClient::new(mock.clone()));

    courses.update_filters(|f| f.min_rating = Some(4.0));
    let found = courses.search_filtered("rust").await.unwrap();
    assert_eq!(found[0].id, "c1");
    assert_eq!(mock.requests()[0].params["minRating"], "4");

    courses.clear_filters();
    assert!(courses.filters().borrow().is_empty());
  }
}
