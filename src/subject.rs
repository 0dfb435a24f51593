//! Multi-subscriber event streams with explicit unsubscription.
//!
//! A `Subject<T>` fans every emitted value out to all live subscribers.
//! Each subscriber owns its own FIFO channel, and emission happens while the
//! subscriber list is locked, so every subscriber observes values in exactly
//! the order they were emitted. Dropping a `Subscription` removes it.
//!
//! Long-lived state (the "current value" kind of stream) uses
//! `tokio::sync::watch` instead; this module covers event streams and the
//! teardown signal background tasks select on.

use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, watch};

struct SubjectInner<T> {
  next_id: u64,
  subscribers: Vec<(u64, mpsc::UnboundedSender<T>)>,
}

/// Broadcasts values to every current subscriber, in emission order.
pub struct Subject<T> {
  inner: Arc<Mutex<SubjectInner<T>>>,
}

impl<T> Clone for Subject<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone + Send + 'static> Subject<T> {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(SubjectInner {
        next_id: 0,
        subscribers: Vec::new(),
      })),
    }
  }

  /// Register a new subscriber. Values emitted before this call are not seen.
  pub fn subscribe(&self) -> Subscription<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut inner = lock(&self.inner);
    let id = inner.next_id;
    inner.next_id += 1;
    inner.subscribers.push((id, tx));

    Subscription {
      id,
      rx,
      subject: Arc::downgrade(&self.inner),
    }
  }

  /// Deliver `value` to all subscribers. Returns how many received it.
  pub fn emit(&self, value: T) -> usize {
    let mut inner = lock(&self.inner);
    // Subscribers whose receiver is gone are pruned here
    inner
      .subscribers
      .retain(|(_, tx)| tx.send(value.clone()).is_ok());
    inner.subscribers.len()
  }

  pub fn subscriber_count(&self) -> usize {
    lock(&self.inner).subscribers.len()
  }
}

/// Receiving half of a subject subscription.
pub struct Subscription<T> {
  id: u64,
  rx: mpsc::UnboundedReceiver<T>,
  subject: Weak<Mutex<SubjectInner<T>>>,
}

impl<T> Subscription<T> {
  /// Wait for the next value. Returns `None` once the subject is gone.
  pub async fn recv(&mut self) -> Option<T> {
    self.rx.recv().await
  }

  /// Non-blocking receive, used from render ticks.
  pub fn try_recv(&mut self) -> Option<T> {
    self.rx.try_recv().ok()
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    if let Some(inner) = self.subject.upgrade() {
      let mut inner = lock(&inner);
      inner.subscribers.retain(|(id, _)| *id != self.id);
    }
  }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared shutdown signal for background tasks.
///
/// Clones share the same signal; `fire()` wakes every `fired()` waiter.
#[derive(Clone)]
pub struct Teardown {
  tx: Arc<watch::Sender<bool>>,
  rx: watch::Receiver<bool>,
}

impl Default for Teardown {
  fn default() -> Self {
    Self::new()
  }
}

impl Teardown {
  pub fn new() -> Self {
    let (tx, rx) = watch::channel(false);
    Self { tx: Arc::new(tx), rx }
  }

  pub fn fire(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_fired(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once `fire()` has been called (immediately if it already was).
  pub async fn fired(&self) {
    let mut rx = self.rx.clone();
    // wait_for only errors when the sender is dropped, which the Arc prevents
    let _ = rx.wait_for(|fired| *fired).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_delivers_in_emission_order_to_all_subscribers() {
    let subject = Subject::new();
    let mut a = subject.subscribe();
    let mut b = subject.subscribe();

    for i in 0..5 {
      assert_eq!(subject.emit(i), 2);
    }

    for i in 0..5 {
      assert_eq!(a.recv().await, Some(i));
      assert_eq!(b.recv().await, Some(i));
    }
  }

  #[tokio::test]
  async fn test_dropped_subscription_is_removed() {
    let subject: Subject<u32> = Subject::new();
    let first = subject.subscribe();
    let _second = subject.subscribe();
    assert_eq!(subject.subscriber_count(), 2);

    drop(first);
    assert_eq!(subject.subscriber_count(), 1);
    assert_eq!(subject.emit(7), 1);
  }

  #[tokio::test]
  async fn test_late_subscriber_misses_earlier_values() {
    let subject = Subject::new();
    subject.emit("early");
    let mut late = subject.subscribe();
    subject.emit("late");

    assert_eq!(late.try_recv(), Some("late"));
    assert_eq!(late.try_recv(), None);
  }

  #[tokio::test]
  async fn test_teardown_wakes_waiters() {
    let teardown = Teardown::new();
    let waiter = teardown.clone();
    let handle = tokio::spawn(async move { waiter.fired().await });

    assert!(!teardown.is_fired());
    teardown.fire();
    handle.await.unwrap();
    assert!(teardown.is_fired());
  }
}
