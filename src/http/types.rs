use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Header that opts a request out of the loading indicator.
pub const SKIP_LOADING_HEADER: &str = "X-Skip-Loading";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    };
    f.write_str(s)
  }
}

impl From<Method> for reqwest::Method {
  fn from(m: Method) -> Self {
    match m {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

/// An outgoing API request. `path` is relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  pub path: String,
  /// Query parameters; ordered so serialization is canonical
  pub params: BTreeMap<String, String>,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Value>,
}

impl ApiRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into().trim_start_matches('/').to_string(),
      params: BTreeMap::new(),
      headers: BTreeMap::new(),
      body: None,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::Get, path)
  }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self::new(Method::Post, path).with_body(body)
  }

  pub fn put(path: impl Into<String>, body: Value) -> Self {
    Self::new(Method::Put, path).with_body(body)
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self::new(Method::Delete, path)
  }

  pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
    self.params.insert(key.to_string(), value.to_string());
    self
  }

  /// Add the param only when a value is present.
  pub fn with_opt_param<V: ToString>(self, key: &str, value: Option<V>) -> Self {
    match value {
      Some(v) => self.with_param(key, v),
      None => self,
    }
  }

  pub fn with_header(mut self, key: &str, value: &str) -> Self {
    self.headers.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  /// Case-insensitive header presence check.
  pub fn has_header(&self, name: &str) -> bool {
    self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
  }

  /// First path segment, e.g. `courses` for `courses/42/reviews`.
  pub fn resource(&self) -> &str {
    self.path.split(['/', '?']).next().unwrap_or("")
  }
}

/// A raw response: status plus JSON body (`Null` when empty, a JSON string
/// when the server sent non-JSON text).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Value,
}

impl ApiResponse {
  pub fn new(status: u16, body: Value) -> Self {
    Self { status, body }
  }

  pub fn ok(body: Value) -> Self {
    Self::new(200, body)
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Decode a raw body, keeping non-JSON text as a string value.
  pub fn from_text(status: u16, text: &str) -> Self {
    let body = if text.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    };
    Self { status, body }
  }

  /// `message` field of the body, if any.
  pub fn message(&self) -> Option<&str> {
    self.body.get("message").and_then(Value::as_str)
  }
}

/// Server response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
  pub success: bool,
  pub data: Option<T>,
  pub message: Option<String>,
  #[serde(default)]
  pub errors: Option<Value>,
  pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub page: u32,
  pub limit: u32,
  pub total: u64,
  pub total_pages: u32,
}

/// A page of results along with its pagination block.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub pagination: Option<Pagination>,
}

/// Normalize the `errors` field, which servers send either as a list of
/// messages or as a `{field: [messages]}` map.
pub fn field_errors(value: Option<&Value>) -> BTreeMap<String, Vec<String>> {
  let mut out = BTreeMap::new();
  match value {
    Some(Value::Array(items)) => {
      let messages: Vec<String> = items.iter().map(value_to_message).collect();
      if !messages.is_empty() {
        out.insert("general".to_string(), messages);
      }
    }
    Some(Value::Object(map)) => {
      for (field, v) in map {
        let messages = match v {
          Value::Array(items) => items.iter().map(value_to_message).collect(),
          other => vec![value_to_message(other)],
        };
        out.insert(field.clone(), messages);
      }
    }
    _ => {}
  }
  out
}

fn value_to_message(v: &Value) -> String {
  match v {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_resource_is_first_segment() {
    assert_eq!(ApiRequest::get("/courses/42/reviews").resource(), "courses");
    assert_eq!(ApiRequest::get("categories").resource(), "categories");
  }

  #[test]
  fn test_has_header_ignores_case() {
    let req = ApiRequest::get("x").with_header("x-skip-loading", "true");
    assert!(req.has_header(SKIP_LOADING_HEADER));
  }

  #[test]
  fn test_from_text_keeps_non_json() {
    assert_eq!(ApiResponse::from_text(204, "").body, Value::Null);
    assert_eq!(
      ApiResponse::from_text(502, "Bad Gateway").body,
      json!("Bad Gateway")
    );
    assert_eq!(ApiResponse::from_text(200, r#"{"a":1}"#).body, json!({"a": 1}));
  }

  #[test]
  fn test_field_errors_accepts_list_and_map() {
    let list = field_errors(Some(&json!(["bad email"])));
    assert_eq!(list["general"], vec!["bad email"]);

    let map = field_errors(Some(&json!({"password": ["too short", "no digit"], "email": "taken"})));
    assert_eq!(map["password"].len(), 2);
    assert_eq!(map["email"], vec!["taken"]);
  }
}
