//! Background machinery shared by the TUI and the headless `sync` command.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::lms::Services;
use crate::session::token_expired;
use crate::subject::Teardown;
use crate::sync::{monitor, DataSync, Probe, TcpProbe, PROBE_INTERVAL};
use crate::ws::{Connector, TungsteniteConnector, WebSocketClient};

/// Running connectivity monitor, WebSocket client and sync loop.
pub struct Runtime {
  pub services: Services,
  pub ws: Arc<WebSocketClient>,
  pub sync: Arc<DataSync>,
  pub online: watch::Receiver<bool>,
  teardown: Teardown,
  sync_task: JoinHandle<()>,
}

impl Runtime {
  /// Start everything against the real network.
  pub async fn start(config: &Config, services: Services) -> Result<Self> {
    let probe = TcpProbe::from_url(&config.api.url)
      .ok_or_else(|| eyre!("Cannot probe connectivity for {}", config.api.url))?;
    Self::start_with(config, services, Arc::new(probe), Arc::new(TungsteniteConnector)).await
  }

  pub async fn start_with(
    config: &Config,
    services: Services,
    probe: Arc<dyn Probe>,
    connector: Arc<dyn Connector>,
  ) -> Result<Self> {
    restore_session(&services).await;
    services.features.load_remote(&services.http.api).await;
    if let Some(user_id) = services.session.user_id() {
      let warmed = services.object_cache.preload_essential(&user_id);
      tracing::debug!(user_id = %user_id, warmed, "object cache preloaded");
    }

    let teardown = Teardown::new();
    let online = monitor(probe, PROBE_INTERVAL, teardown.clone());

    let ws = WebSocketClient::spawn(
      config,
      connector,
      services.session.clone(),
      services.store.clone(),
      teardown.clone(),
    )
    .map_err(|e| eyre!("Failed to start WebSocket client: {}", e))?;
    let ws = Arc::new(ws);

    let sync = Arc::new(DataSync::new(&services, config.sync.interval()));
    let sync_task = sync.spawn(online.clone(), ws.subscribe(), teardown.clone());

    tracing::info!(
      authenticated = services.session.is_authenticated(),
      "runtime started"
    );

    Ok(Self {
      services,
      ws,
      sync,
      online,
      teardown,
      sync_task,
    })
  }

  pub fn teardown(&self) -> &Teardown {
    &self.teardown
  }

  /// Stop the background tasks and wait for the sync loop to exit.
  pub async fn shutdown(self) {
    self.ws.disconnect();
    self.teardown.fire();
    if let Err(e) = self.sync_task.await {
      tracing::warn!(error = %e, "sync task ended abnormally");
    }
    tracing::info!("runtime stopped");
  }
}

/// A session whose access token has expired is refreshed once; if that
/// fails the session is cleared.
async fn restore_session(services: &Services) {
  let expired = match services.session.token() {
    Some(token) => token_expired(&token, Utc::now()),
    None => services.session.awaiting_refresh(),
  };
  if !expired {
    return;
  }
  tracing::info!("stored token expired, refreshing");
  if let Err(e) = services.auth.restore().await {
    tracing::warn!(error = %e, "session could not be restored");
  }
}
