use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::http::error::ApiError;
use crate::http::transport::Handler;
use crate::http::types::{ApiRequest, ApiResponse, SKIP_LOADING_HEADER};

/// Paths that poll in the background and should not flash the indicator.
const QUIET_PATHS: &[&str] = &["notifications", "analytics/track", "analytics/events"];

type LoadingCallback = Box<dyn Fn(bool) + Send + Sync>;

struct TrackerState {
  active: usize,
  callback: Option<LoadingCallback>,
}

/// Counts in-flight requests and reports the busy edges.
///
/// The callback fires `true` when the count leaves zero and `false` when it
/// returns to zero; it runs under the tracker lock, so edges are never
/// reordered and it must not call back into the tracker.
pub struct LoadingTracker {
  state: Mutex<TrackerState>,
  busy: watch::Sender<bool>,
}

impl Default for LoadingTracker {
  fn default() -> Self {
    Self::new()
  }
}

impl LoadingTracker {
  pub fn new() -> Self {
    let (busy, _) = watch::channel(false);
    Self {
      state: Mutex::new(TrackerState {
        active: 0,
        callback: None,
      }),
      busy,
    }
  }

  pub fn set_callback(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
    self.lock().callback = Some(Box::new(callback));
  }

  pub fn active_count(&self) -> usize {
    self.lock().active
  }

  /// Raw busy flag, one update per edge.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.busy.subscribe()
  }

  /// Register a request. The count drops again when the guard is dropped,
  /// whether the request succeeded, failed or was cancelled.
  pub fn begin(self: &Arc<Self>) -> InFlightGuard {
    let mut state = self.lock();
    state.active += 1;
    if state.active == 1 {
      self.edge(&state, true);
    }
    InFlightGuard {
      tracker: Arc::clone(self),
    }
  }

  fn end(&self) {
    let mut state = self.lock();
    state.active = state.active.saturating_sub(1);
    if state.active == 0 {
      self.edge(&state, false);
    }
  }

  fn edge(&self, state: &TrackerState, busy: bool) {
    if let Some(callback) = &state.callback {
      callback(busy);
    }
    self.busy.send_replace(busy);
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
    self
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

pub struct InFlightGuard {
  tracker: Arc<LoadingTracker>,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self.tracker.end();
  }
}

/// Follow `raw`, delaying only the falling edge by `delay` so back-to-back
/// requests do not make the indicator flicker.
pub fn debounce_busy(mut raw: watch::Receiver<bool>, delay: Duration) -> watch::Receiver<bool> {
  let initial = *raw.borrow_and_update();
  let (tx, rx) = watch::channel(initial);

  tokio::spawn(async move {
    loop {
      let busy = *raw.borrow_and_update();
      if busy {
        tx.send_if_modified(|v| !std::mem::replace(v, true));
        if raw.changed().await.is_err() {
          break;
        }
        continue;
      }

      tokio::select! {
        changed = raw.changed() => {
          if changed.is_err() {
            tx.send_if_modified(|v| std::mem::replace(v, false));
            break;
          }
        }
        _ = tokio::time::sleep(delay) => {
          tx.send_if_modified(|v| std::mem::replace(v, false));
          if raw.changed().await.is_err() {
            break;
          }
        }
      }

      if tx.is_closed() {
        break;
      }
    }
  });

  rx
}

/// Wraps every non-quiet request in an `InFlightGuard`.
pub struct LoadingInterceptor {
  inner: Arc<dyn Handler>,
  tracker: Arc<LoadingTracker>,
}

impl LoadingInterceptor {
  pub fn new(inner: Arc<dyn Handler>, tracker: Arc<LoadingTracker>) -> Self {
    Self { inner, tracker }
  }
}

fn skips_loading(req: &ApiRequest) -> bool {
  req.has_header(SKIP_LOADING_HEADER) || QUIET_PATHS.iter().any(|p| req.path.contains(p))
}

#[async_trait]
impl Handler for LoadingInterceptor {
  async fn handle(&self, req: ApiRequest) -> Result<ApiResponse, ApiError> {
    if skips_loading(&req) {
      return self.inner.handle(req).await;
    }

    let _guard = self.tracker.begin();
    self.inner.handle(req).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::MockTransport;
  use crate::http::types::Method;
  use serde_json::json;

  fn recording_tracker() -> (Arc<LoadingTracker>, Arc<Mutex<Vec<bool>>>) {
    let tracker = Arc::new(LoadingTracker::new());
    let edges = Arc::new(Mutex::new(Vec::new()));
    let sink = edges.clone();
    tracker.set_callback(move |busy| sink.lock().unwrap().push(busy));
    (tracker, edges)
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_requests_fire_each_edge_once() {
    let mock = Arc::new(MockTransport::new().with_delay(Duration::from_millis(100)));
    mock.ok(Method::Get, "courses", json!([]));
    let (tracker, edges) = recording_tracker();
    let chain = LoadingInterceptor::new(mock.clone(), tracker.clone());

    let requests = (0..5).map(|_| chain.handle(ApiRequest::get("courses")));
    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(*edges.lock().unwrap(), vec![true, false]);
    assert_eq!(tracker.active_count(), 0);
  }

  #[tokio::test]
  async fn test_failed_requests_still_release() {
    let mock = Arc::new(MockTransport::new());
    mock.on(
      Method::Get,
      "courses",
      Err(ApiError::Network("refused".to_string())),
    );
    let (tracker, edges) = recording_tracker();
    let chain = LoadingInterceptor::new(mock, tracker.clone());

    assert!(chain.handle(ApiRequest::get("courses")).await.is_err());
    assert_eq!(*edges.lock().unwrap(), vec![true, false]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancelled_request_releases() {
    let mock = Arc::new(MockTransport::new().with_delay(Duration::from_secs(60)));
    let (tracker, _) = recording_tracker();
    let chain = Arc::new(LoadingInterceptor::new(mock, tracker.clone()));

    let task = {
      let chain = chain.clone();
      tokio::spawn(async move { chain.handle(ApiRequest::get("courses")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(tracker.active_count(), 1);

    task.abort();
    let _ = task.await;
    assert_eq!(tracker.active_count(), 0);
  }

  #[tokio::test]
  async fn test_quiet_requests_are_not_counted() {
    let mock = Arc::new(MockTransport::new());
    let (tracker, edges) = recording_tracker();
    let chain = LoadingInterceptor::new(mock, tracker);

    let _ = chain.handle(ApiRequest::get("users/u1/notifications")).await;
    let _ = chain
      .handle(ApiRequest::post("analytics/events", json!({})))
      .await;
    let _ = chain
      .handle(ApiRequest::get("courses").with_header(SKIP_LOADING_HEADER, "true"))
      .await;

    assert!(edges.lock().unwrap().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_debounce_delays_only_falling_edge() {
    let (raw_tx, raw_rx) = watch::channel(false);
    let debounced = debounce_busy(raw_rx, Duration::from_millis(150));

    raw_tx.send_replace(true);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(*debounced.borrow());

    // brief dip shorter than the delay is swallowed
    raw_tx.send_replace(false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    raw_tx.send_replace(true);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(*debounced.borrow());

    raw_tx.send_replace(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(*debounced.borrow());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!*debounced.borrow());
  }
}
