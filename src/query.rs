//! Background fetches that views poll from the render loop.
//!
//! A `Query<T>` owns a fetcher closure returning `Result<T, ApiError>`.
//! `fetch()` spawns it; `poll()` is called on every tick and moves the
//! result into the query state without blocking. Previous data is kept
//! while a refetch is in flight so lists do not flash empty.
//!
//! ```ignore
//! let courses = services.courses.clone();
//! let mut query = Query::new(move || {
//!   let courses = courses.clone();
//!   async move { courses.trending(10).await }
//! });
//! query.fetch();
//! // on tick
//! query.poll();
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::http::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
  Idle,
  Loading,
  Ready,
  Error(String),
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

pub struct Query<T> {
  state: QueryState,
  /// Last successful data, kept across refetches and errors
  data: Option<T>,
  fetcher: FetcherFn<T>,
  receiver: Option<oneshot::Receiver<Result<T, ApiError>>>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
}

impl<T: Send + 'static> Query<T> {
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      data: None,
      fetcher: Box::new(move || Box::pin(fetcher())),
      receiver: None,
      fetched_at: None,
      stale_time: Duration::from_secs(60),
    }
  }

  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  pub fn state(&self) -> &QueryState {
    &self.state
  }

  /// Latest data, even while a refetch is loading or after it failed.
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn data_mut(&mut self) -> Option<&mut T> {
    self.data.as_mut()
  }

  pub fn is_loading(&self) -> bool {
    matches!(self.state, QueryState::Loading)
  }

  pub fn is_error(&self) -> bool {
    matches!(self.state, QueryState::Error(_))
  }

  pub fn error(&self) -> Option<&str> {
    match &self.state {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_stale(&self) -> bool {
    match self.fetched_at {
      Some(at) => at.elapsed() > self.stale_time,
      None => true,
    }
  }

  /// Start fetching unless a fetch is already running.
  pub fn fetch(&mut self) {
    if self.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Drop any pending fetch and start over.
  pub fn refetch(&mut self) {
    self.receiver = None;
    self.start_fetch();
  }

  /// Refetch once loaded data is older than the stale time. Failed and
  /// never-started queries are left for an explicit refetch.
  pub fn refresh_if_stale(&mut self) {
    if self.state == QueryState::Ready && self.is_stale() {
      self.start_fetch();
    }
  }

  /// Returns true when the state changed.
  pub fn poll(&mut self) -> bool {
    let Some(receiver) = self.receiver.as_mut() else {
      return false;
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.data = Some(data);
        self.state = QueryState::Ready;
        self.fetched_at = Some(Instant::now());
        self.receiver = None;
        true
      }
      Ok(Err(e)) => {
        self.state = QueryState::Error(e.to_string());
        self.receiver = None;
        true
      }
      Err(oneshot::error::TryRecvError::Empty) => false,
      Err(oneshot::error::TryRecvError::Closed) => {
        self.state = QueryState::Error("request was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = oneshot::channel();
    self.receiver = Some(rx);
    self.state = QueryState::Loading;

    let future = (self.fetcher)();
    tokio::spawn(async move {
      // receiver gone means the view was closed or refetched
      let _ = tx.send(future.await);
    });
  }
}
