//! Online/offline detection.
//!
//! A terminal has no browser `online` event, so the monitor periodically
//! opens a TCP connection to the API host and publishes the result as a
//! `watch<bool>`. Subscribers only wake on transitions.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use url::Url;

use crate::subject::Teardown;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const PROBE_INTERVAL: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Probe: Send + Sync {
  async fn is_reachable(&self) -> bool;
}

/// Reachability of `host:port` over TCP.
pub struct TcpProbe {
  host: String,
  port: u16,
}

impl TcpProbe {
  pub fn from_url(url: &str) -> Option<Self> {
    let url = Url::parse(url).ok()?;
    Some(Self {
      host: url.host_str()?.to_string(),
      port: url.port_or_known_default()?,
    })
  }
}

#[async_trait]
impl Probe for TcpProbe {
  async fn is_reachable(&self) -> bool {
    let connect = TcpStream::connect((self.host.as_str(), self.port));
    match tokio::time::timeout(PROBE_TIMEOUT, connect).await {
      Ok(Ok(_)) => true,
      Ok(Err(e)) => {
        tracing::debug!(host = %self.host, port = self.port, error = %e, "connectivity probe failed");
        false
      }
      Err(_) => {
        tracing::debug!(host = %self.host, port = self.port, "connectivity probe timed out");
        false
      }
    }
  }
}

/// Probe now and then every `every`, until teardown. Starts optimistic.
pub fn monitor(probe: Arc<dyn Probe>, every: Duration, teardown: Teardown) -> watch::Receiver<bool> {
  let tx = watch::Sender::new(true);
  let rx = tx.subscribe();

  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = teardown.fired() => break,
        _ = ticker.tick() => {
          let online = probe.is_reachable().await;
          let changed = tx.send_if_modified(|current| {
            if *current == online {
              return false;
            }
            *current = online;
            true
          });
          if changed {
            tracing::info!(online, "connectivity changed");
          }
        }
      }
    }
  });

  rx
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  struct Switch {
    up: AtomicBool,
    probes: AtomicUsize,
  }

  #[async_trait]
  impl Probe for Switch {
    async fn is_reachable(&self) -> bool {
      self.probes.fetch_add(1, Ordering::SeqCst);
      self.up.load(Ordering::SeqCst)
    }
  }

  #[test]
  fn test_probe_from_url_uses_default_ports() {
    let probe = TcpProbe::from_url("https://lms.example.com/api").unwrap();
    assert_eq!((probe.host.as_str(), probe.port), ("lms.example.com", 443));

    let probe = TcpProbe::from_url("http://localhost:3000/api").unwrap();
    assert_eq!(probe.port, 3000);

    assert!(TcpProbe::from_url("not a url").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_monitor_publishes_transitions_only() {
    let switch = Arc::new(Switch {
      up: AtomicBool::new(false),
      probes: AtomicUsize::new(0),
    });
    let teardown = Teardown::new();
    let mut online = monitor(switch.clone(), Duration::from_secs(10), teardown.clone());

    online.wait_for(|up| !*up).await.unwrap();
    online.borrow_and_update();

    // Still down on the next probe: no wake-up
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!online.has_changed().unwrap());

    switch.up.store(true, Ordering::SeqCst);
    online.changed().await.unwrap();
    assert!(*online.borrow());

    teardown.fire();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let probes = switch.probes.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(switch.probes.load(Ordering::SeqCst), probes);
  }
}
