//! Reconnecting real-time client.
//!
//! A single background task owns the socket. Callers talk to it through a
//! command channel and observe it through a `watch` of [`ConnectionStatus`]
//! and a [`Subject`] of decoded inbound messages.
//!
//! Reconnection is linear: the n-th retry waits `interval × n`. After
//! `max_attempts` retries the client stays disconnected until
//! [`WebSocketClient::reconnect`] is called or a new token shows up in the
//! session.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use url::Url;

use super::connector::{socket_url, Channel, ChannelEvent, Connector};
use super::error::WsError;
use super::message::{InboundMessage, OutboundMessage, QueuedMessage, QUEUE_KEY};
use crate::cache::KeyValueStore;
use crate::config::Config;
use crate::session::{AuthState, SessionStore};
use crate::subject::{Subject, Subscription, Teardown};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
  #[default]
  Disconnected,
  Connecting,
  Connected,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionStatus {
  pub state: ConnectionState,
  /// A retry is scheduled or in progress
  pub reconnecting: bool,
  pub last_connected: Option<DateTime<Utc>>,
  /// Retries made since the last successful connect
  pub attempts: u32,
  /// Messages waiting in the persisted queue
  pub queued: usize,
}

impl ConnectionStatus {
  pub fn is_connected(&self) -> bool {
    self.state == ConnectionState::Connected
  }
}

#[derive(Debug)]
enum Command {
  Send(OutboundMessage),
  Reconnect,
  Disconnect,
}

pub struct WebSocketClient {
  commands: mpsc::UnboundedSender<Command>,
  status: watch::Receiver<ConnectionStatus>,
  messages: Subject<InboundMessage>,
  session: Arc<SessionStore>,
}

impl WebSocketClient {
  /// Start the connection task. It connects right away when the session is
  /// authenticated and otherwise waits for a login.
  pub fn spawn(
    config: &Config,
    connector: Arc<dyn Connector>,
    session: Arc<SessionStore>,
    store: Arc<dyn KeyValueStore>,
    teardown: Teardown,
  ) -> Result<Self, WsError> {
    let base_url = Url::parse(&config.api.websocket_url)
      .map_err(|e| WsError::InvalidUrl(format!("{}: {}", config.api.websocket_url, e)))?;

    let (commands, command_rx) = mpsc::unbounded_channel();
    let queued = store
      .get_json::<Vec<QueuedMessage>>(QUEUE_KEY)
      .map(|q| q.len())
      .unwrap_or(0);
    let status = watch::Sender::new(ConnectionStatus {
      queued,
      ..Default::default()
    });
    let status_rx = status.subscribe();
    let messages = Subject::new();

    let mut auth = session.subscribe();
    let last_token = auth.borrow_and_update().token.clone();

    let actor = Connection {
      connector,
      base_url,
      interval: config.websocket.reconnect_interval(),
      max_attempts: config.websocket.max_reconnect_attempts,
      attempts: 0,
      status,
      messages: messages.clone(),
      store,
      session: session.clone(),
      auth,
      last_token,
      commands: command_rx,
      teardown,
    };
    tokio::spawn(actor.run());

    Ok(Self {
      commands,
      status: status_rx,
      messages,
      session,
    })
  }

  pub fn status(&self) -> ConnectionStatus {
    self.status.borrow().clone()
  }

  pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
    self.status.clone()
  }

  pub fn subscribe(&self) -> Subscription<InboundMessage> {
    self.messages.subscribe()
  }

  pub fn is_connected(&self) -> bool {
    self.status.borrow().is_connected()
  }

  /// Send now, or queue until the next connection if the socket is down.
  pub fn send(&self, kind: &str, payload: Value) {
    self.command(Command::Send(OutboundMessage::new(kind, payload)));
  }

  /// Drop the current connection (if any) and start over with a fresh
  /// retry budget.
  pub fn reconnect(&self) {
    self.command(Command::Reconnect);
  }

  pub fn disconnect(&self) {
    self.command(Command::Disconnect);
  }

  pub fn join_room(&self, room_id: &str) {
    self.send("join_room", json!({ "roomId": room_id }));
  }

  pub fn leave_room(&self, room_id: &str) {
    self.send("leave_room", json!({ "roomId": room_id }));
  }

  pub fn send_chat_message(&self, message: &str, room_id: Option<&str>) {
    self.send(
      "chat_message",
      json!({
        "message": message,
        "roomId": room_id,
        "userId": self.session.user_id(),
      }),
    );
  }

  pub fn track_activity(&self, activity: &str, metadata: Option<Value>) {
    self.send(
      "user_activity",
      json!({
        "activity": activity,
        "metadata": metadata,
        "timestamp": Utc::now(),
      }),
    );
  }

  fn command(&self, command: Command) {
    if self.commands.send(command).is_err() {
      tracing::warn!("websocket task has stopped, dropping command");
    }
  }
}

enum Phase {
  Idle,
  Connect,
  Backoff(Instant),
}

/// Why a wait ended.
enum Wake {
  Timer,
  Connect,
  Stop,
  Shutdown,
}

/// How a live connection ended.
enum SessionEnd {
  Closed { clean: bool },
  Restart,
  Stopped,
  Shutdown,
}

struct Connection {
  connector: Arc<dyn Connector>,
  base_url: Url,
  interval: Duration,
  max_attempts: u32,
  attempts: u32,
  status: watch::Sender<ConnectionStatus>,
  messages: Subject<InboundMessage>,
  store: Arc<dyn KeyValueStore>,
  session: Arc<SessionStore>,
  auth: watch::Receiver<AuthState>,
  last_token: Option<String>,
  commands: mpsc::UnboundedReceiver<Command>,
  teardown: Teardown,
}

impl Connection {
  async fn run(mut self) {
    let mut phase = if self.last_token.is_some() {
      Phase::Connect
    } else {
      Phase::Idle
    };

    loop {
      phase = match phase {
        Phase::Idle => match self.wait(None).await {
          Wake::Shutdown => break,
          Wake::Connect => {
            self.attempts = 0;
            Phase::Connect
          }
          Wake::Timer | Wake::Stop => Phase::Idle,
        },
        Phase::Backoff(deadline) => match self.wait(Some(deadline)).await {
          Wake::Shutdown => break,
          Wake::Timer => Phase::Connect,
          Wake::Connect => {
            self.attempts = 0;
            Phase::Connect
          }
          Wake::Stop => {
            self.status.send_modify(|s| s.reconnecting = false);
            Phase::Idle
          }
        },
        Phase::Connect => match self.connect_once().await {
          Some(next) => next,
          None => break,
        },
      };
    }

    self.status.send_modify(|s| {
      s.state = ConnectionState::Disconnected;
      s.reconnecting = false;
    });
    tracing::debug!("websocket task stopped");
  }

  /// Wait for a command, an auth change, the deadline or teardown. Sends
  /// arriving meanwhile go to the persisted queue.
  async fn wait(&mut self, deadline: Option<Instant>) -> Wake {
    loop {
      let timer = async {
        match deadline {
          Some(deadline) => tokio::time::sleep_until(deadline).await,
          None => std::future::pending().await,
        }
      };

      tokio::select! {
        biased;
        _ = self.teardown.fired() => return Wake::Shutdown,
        command = self.commands.recv() => match command {
          None => return Wake::Shutdown,
          Some(Command::Send(msg)) => self.enqueue(msg),
          Some(Command::Reconnect) => return Wake::Connect,
          Some(Command::Disconnect) => return Wake::Stop,
        },
        changed = self.auth.changed() => {
          if changed.is_err() {
            return Wake::Shutdown;
          }
          if let Some(wake) = self.on_auth_change() {
            return wake;
          }
        }
        _ = timer => return Wake::Timer,
      }
    }
  }

  /// A logout stops the connection; a new token starts one.
  fn on_auth_change(&mut self) -> Option<Wake> {
    let token = self.auth.borrow_and_update().token.clone();
    match token {
      None => {
        self.last_token = None;
        Some(Wake::Stop)
      }
      Some(token) if self.last_token.as_deref() != Some(token.as_str()) => {
        self.last_token = Some(token);
        Some(Wake::Connect)
      }
      Some(_) => None,
    }
  }

  async fn connect_once(&mut self) -> Option<Phase> {
    let Some(token) = self.session.token() else {
      tracing::debug!("no auth token, not connecting");
      self.status.send_modify(|s| {
        s.state = ConnectionState::Disconnected;
        s.reconnecting = false;
      });
      return Some(Phase::Idle);
    };

    self
      .status
      .send_modify(|s| s.state = ConnectionState::Connecting);
    let url = socket_url(&self.base_url, &token);

    let connected = tokio::select! {
      _ = self.teardown.fired() => return None,
      result = self.connector.connect(&url) => result,
    };

    match connected {
      Ok(channel) => {
        tracing::info!(url = %self.base_url, "websocket connected");
        self.attempts = 0;
        self.status.send_modify(|s| {
          s.state = ConnectionState::Connected;
          s.reconnecting = false;
          s.last_connected = Some(Utc::now());
          s.attempts = 0;
        });

        let end = self.serve(channel).await;
        self
          .status
          .send_modify(|s| s.state = ConnectionState::Disconnected);

        match end {
          SessionEnd::Shutdown => None,
          SessionEnd::Restart => Some(Phase::Connect),
          SessionEnd::Stopped | SessionEnd::Closed { clean: true } => Some(Phase::Idle),
          SessionEnd::Closed { clean: false } => Some(self.schedule_retry()),
        }
      }
      Err(e) => {
        tracing::warn!(error = %e, attempt = self.attempts, "websocket connection failed");
        self
          .status
          .send_modify(|s| s.state = ConnectionState::Disconnected);
        Some(self.schedule_retry())
      }
    }
  }

  fn schedule_retry(&mut self) -> Phase {
    if self.attempts >= self.max_attempts {
      tracing::error!(
        attempts = self.attempts,
        "max websocket reconnection attempts reached"
      );
      self.status.send_modify(|s| s.reconnecting = false);
      return Phase::Idle;
    }

    self.attempts += 1;
    let attempts = self.attempts;
    let delay = self.interval * attempts;
    tracing::info!(attempt = attempts, delay_secs = delay.as_secs(), "scheduling websocket reconnect");
    self.status.send_modify(|s| {
      s.reconnecting = true;
      s.attempts = attempts;
    });
    Phase::Backoff(Instant::now() + delay)
  }

  async fn serve(&mut self, mut channel: Box<dyn Channel>) -> SessionEnd {
    if let Some(user_id) = self.session.user_id() {
      let auth = OutboundMessage::new(
        "authenticate",
        json!({ "userId": user_id, "timestamp": Utc::now() }),
      );
      if self.transmit(channel.as_mut(), &auth).await.is_err() {
        return SessionEnd::Closed { clean: false };
      }
    }

    self.flush_queue(channel.as_mut()).await;

    loop {
      tokio::select! {
        _ = self.teardown.fired() => {
          channel.close().await;
          return SessionEnd::Shutdown;
        }
        event = channel.recv() => match event {
          ChannelEvent::Text(text) => self.dispatch(&text),
          ChannelEvent::Closed { clean } => {
            tracing::info!(clean, "websocket closed");
            return SessionEnd::Closed { clean };
          }
          ChannelEvent::Error(e) => {
            tracing::warn!(error = %e, "websocket error");
            return SessionEnd::Closed { clean: false };
          }
        },
        command = self.commands.recv() => match command {
          None => {
            channel.close().await;
            return SessionEnd::Shutdown;
          }
          Some(Command::Send(msg)) => {
            if self.transmit(channel.as_mut(), &msg).await.is_err() {
              self.enqueue(msg);
              return SessionEnd::Closed { clean: false };
            }
          }
          Some(Command::Reconnect) => {
            channel.close().await;
            self.attempts = 0;
            return SessionEnd::Restart;
          }
          Some(Command::Disconnect) => {
            channel.close().await;
            return SessionEnd::Stopped;
          }
        },
        changed = self.auth.changed() => {
          if changed.is_err() {
            channel.close().await;
            return SessionEnd::Shutdown;
          }
          match self.on_auth_change() {
            Some(Wake::Stop) => {
              channel.close().await;
              return SessionEnd::Stopped;
            }
            // the socket URL carries the token, reopen with the new one
            Some(Wake::Connect) => {
              channel.close().await;
              return SessionEnd::Restart;
            }
            None | Some(Wake::Timer | Wake::Shutdown) => {}
          }
        }
      }
    }
  }

  fn dispatch(&self, text: &str) {
    match InboundMessage::decode(text) {
      Ok(msg) => {
        tracing::debug!(kind = msg.event.kind(), "websocket message");
        self.messages.emit(msg);
      }
      Err(e) => tracing::warn!(error = %e, "dropping websocket frame"),
    }
  }

  async fn transmit(&self, channel: &mut dyn Channel, msg: &OutboundMessage) -> Result<(), WsError> {
    let text = msg.to_text()?;
    channel.send(text).await.inspect_err(|e| {
      tracing::warn!(kind = %msg.kind, error = %e, "websocket send failed");
    })
  }

  fn enqueue(&self, msg: OutboundMessage) {
    let mut queue = self.queued();
    tracing::debug!(kind = %msg.kind, "websocket not connected, queueing message");
    queue.push(QueuedMessage::from(msg));
    if self.store.set_json(QUEUE_KEY, &queue) {
      self.status.send_modify(|s| s.queued = queue.len());
    }
  }

  fn queued(&self) -> Vec<QueuedMessage> {
    self.store.get_json(QUEUE_KEY).unwrap_or_default()
  }

  /// Replay the persisted queue in insertion order. Sends are fire and
  /// forget: every entry is attempted once, then the queue is cleared.
  async fn flush_queue(&self, channel: &mut dyn Channel) {
    let queue = self.queued();
    if queue.is_empty() {
      return;
    }

    let total = queue.len();
    let mut failed = 0;
    for queued in queue {
      let msg = OutboundMessage::from(queued);
      if self.transmit(channel, &msg).await.is_err() {
        failed += 1;
      }
    }

    self.store.remove(QUEUE_KEY);
    tracing::info!(sent = total - failed, failed, "replayed queued messages");
    self.status.send_modify(|s| s.queued = 0);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::lms::types::User;
  use crate::ws::message::ServerEvent;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Mutex;

  struct ServerEnd {
    received: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<ChannelEvent>,
  }

  impl ServerEnd {
    async fn next_kind(&mut self) -> String {
      let text = self.received.recv().await.unwrap();
      let value: Value = serde_json::from_str(&text).unwrap();
      value["type"].as_str().unwrap().to_string()
    }
  }

  struct FakeChannel {
    sent: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<ChannelEvent>,
    /// Sends allowed before every further send fails
    budget: Option<usize>,
  }

  #[async_trait]
  impl Channel for FakeChannel {
    async fn send(&mut self, text: String) -> Result<(), WsError> {
      if let Some(budget) = self.budget.as_mut() {
        if *budget == 0 {
          return Err(WsError::Closed);
        }
        *budget -= 1;
      }
      self.sent.send(text).map_err(|_| WsError::Closed)
    }

    async fn recv(&mut self) -> ChannelEvent {
      self
        .incoming
        .recv()
        .await
        .unwrap_or(ChannelEvent::Closed { clean: false })
    }

    async fn close(&mut self) {}
  }

  struct FakeConnector {
    accept: AtomicBool,
    attempts: Mutex<Vec<(Instant, String)>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
    send_budget: Mutex<Option<usize>>,
  }

  impl FakeConnector {
    fn new(accept: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
      let (servers, rx) = mpsc::unbounded_channel();
      let connector = Arc::new(Self {
        accept: AtomicBool::new(accept),
        attempts: Mutex::new(Vec::new()),
        servers,
        send_budget: Mutex::new(None),
      });
      (connector, rx)
    }

    fn fail_sends_after(&self, sends: usize) {
      *self.send_budget.lock().unwrap() = Some(sends);
    }

    fn attempt_count(&self) -> usize {
      self.attempts.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl Connector for FakeConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Channel>, WsError> {
      self
        .attempts
        .lock()
        .unwrap()
        .push((Instant::now(), url.to_string()));
      if !self.accept.load(Ordering::SeqCst) {
        return Err(WsError::Connect("refused".into()));
      }

      let (sent, received) = mpsc::unbounded_channel();
      let (push, incoming) = mpsc::unbounded_channel();
      let _ = self.servers.send(ServerEnd { received, push });
      Ok(Box::new(FakeChannel {
        sent,
        incoming,
        budget: *self.send_budget.lock().unwrap(),
      }))
    }
  }

  fn config(max_attempts: u32) -> Config {
    let mut config = Config::default();
    config.api.websocket_url = "ws://lms.test/socket".into();
    config.websocket.reconnect_interval_secs = 5;
    config.websocket.max_reconnect_attempts = max_attempts;
    config
  }

  fn signed_in(store: &Arc<MemoryStorage>) -> Arc<SessionStore> {
    let session = Arc::new(SessionStore::new(store.clone()));
    session.set_session(User::sample("u1"), "tok-1".into(), None);
    session
  }

  #[tokio::test(start_paused = true)]
  async fn test_gives_up_after_max_attempts_until_manual_reconnect() {
    let store = Arc::new(MemoryStorage::new());
    let session = signed_in(&store);
    let (connector, mut servers) = FakeConnector::new(false);

    let client = WebSocketClient::spawn(
      &config(3),
      connector.clone(),
      session,
      store,
      Teardown::new(),
    )
    .unwrap();

    let mut status = client.subscribe_status();
    status
      .wait_for(|s| s.attempts == 3 && !s.reconnecting && s.state == ConnectionState::Disconnected)
      .await
      .unwrap();

    // initial attempt plus three retries, spaced 5s, 10s, 15s apart
    let times: Vec<Instant> = connector
      .attempts
      .lock()
      .unwrap()
      .iter()
      .map(|(at, _)| *at)
      .collect();
    assert_eq!(times.len(), 4);
    let gaps: Vec<u64> = times.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(gaps, vec![5, 10, 15]);
    assert!(connector.attempts.lock().unwrap()[0].1.ends_with("?token=tok-1"));

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(connector.attempt_count(), 4);
    assert!(!client.is_connected());

    connector.accept.store(true, Ordering::SeqCst);
    client.reconnect();
    status.wait_for(|s| s.is_connected()).await.unwrap();
    assert_eq!(connector.attempt_count(), 5);
    assert_eq!(client.status().attempts, 0);

    let mut server = servers.recv().await.unwrap();
    assert_eq!(server.next_kind().await, "authenticate");
  }

  #[tokio::test(start_paused = true)]
  async fn test_queued_messages_replay_in_order_then_clear() {
    let store = Arc::new(MemoryStorage::new());
    let session = Arc::new(SessionStore::new(store.clone()));
    let (connector, mut servers) = FakeConnector::new(true);

    let client = WebSocketClient::spawn(
      &config(5),
      connector.clone(),
      session.clone(),
      store.clone(),
      Teardown::new(),
    )
    .unwrap();

    client.join_room("r1");
    client.send_chat_message("hello", Some("r1"));
    client.track_activity("viewed_course", None);

    let mut status = client.subscribe_status();
    status.wait_for(|s| s.queued == 3).await.unwrap();
    assert_eq!(connector.attempt_count(), 0);
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let queued: Vec<QueuedMessage> = kv.get_json(QUEUE_KEY).unwrap();
    assert_eq!(queued[1].kind, "chat_message");

    session.set_session(User::sample("u1"), "tok-1".into(), None);
    let mut server = servers.recv().await.unwrap();
    assert_eq!(server.next_kind().await, "authenticate");
    assert_eq!(server.next_kind().await, "join_room");
    assert_eq!(server.next_kind().await, "chat_message");
    assert_eq!(server.next_kind().await, "user_activity");

    status.wait_for(|s| s.queued == 0).await.unwrap();
    assert!(kv.get_json::<Vec<QueuedMessage>>(QUEUE_KEY).is_none());

    client.leave_room("r1");
    assert_eq!(server.next_kind().await, "leave_room");
  }

  #[tokio::test(start_paused = true)]
  async fn test_queue_is_cleared_even_when_replay_sends_fail() {
    let store = Arc::new(MemoryStorage::new());
    let session = Arc::new(SessionStore::new(store.clone()));
    let (connector, mut servers) = FakeConnector::new(true);
    // authenticate plus the first queued message go through
    connector.fail_sends_after(2);

    let client = WebSocketClient::spawn(
      &config(5),
      connector.clone(),
      session.clone(),
      store.clone(),
      Teardown::new(),
    )
    .unwrap();

    client.join_room("r1");
    client.send_chat_message("hello", Some("r1"));
    client.track_activity("viewed_course", None);
    let mut status = client.subscribe_status();
    status.wait_for(|s| s.queued == 3).await.unwrap();

    session.set_session(User::sample("u1"), "tok-1".into(), None);
    let mut server = servers.recv().await.unwrap();
    assert_eq!(server.next_kind().await, "authenticate");
    assert_eq!(server.next_kind().await, "join_room");

    status.wait_for(|s| s.queued == 0).await.unwrap();
    let kv: Arc<dyn KeyValueStore> = store.clone();
    assert!(kv.get_json::<Vec<QueuedMessage>>(QUEUE_KEY).is_none());
    assert!(server.received.try_recv().is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn test_new_token_reopens_live_socket() {
    let store = Arc::new(MemoryStorage::new());
    let session = signed_in(&store);
    let (connector, mut servers) = FakeConnector::new(true);

    let client = WebSocketClient::spawn(
      &config(5),
      connector.clone(),
      session.clone(),
      store,
      Teardown::new(),
    )
    .unwrap();
    let mut status = client.subscribe_status();
    let _first = servers.recv().await.unwrap();
    status.wait_for(|s| s.is_connected()).await.unwrap();

    session.set_tokens("tok-2".into(), None);
    let mut second = servers.recv().await.unwrap();
    assert_eq!(second.next_kind().await, "authenticate");

    let attempts = connector.attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1].1.ends_with("?token=tok-2"));
    assert!(client.is_connected());
  }

  #[tokio::test(start_paused = true)]
  async fn test_malformed_frames_are_dropped_and_connection_survives() {
    let store = Arc::new(MemoryStorage::new());
    let session = signed_in(&store);
    let (connector, mut servers) = FakeConnector::new(true);

    let client =
      WebSocketClient::spawn(&config(5), connector, session, store, Teardown::new()).unwrap();
    let mut inbound = client.subscribe();

    let server = servers.recv().await.unwrap();
    for text in [
      "{not json",
      r#"{"type":"mystery","payload":{}}"#,
      r#"{"type":"enrollment_update","payload":{}}"#,
      r#"{"type":"enrollment_update","payload":{"enrollmentId":"e7"}}"#,
    ] {
      server.push.send(ChannelEvent::Text(text.to_string())).unwrap();
    }

    let msg = inbound.recv().await.unwrap();
    assert_eq!(
      msg.event,
      ServerEvent::EnrollmentUpdate {
        enrollment_id: "e7".into()
      }
    );
    assert!(inbound.try_recv().is_none());
    assert!(client.is_connected());
  }

  #[tokio::test(start_paused = true)]
  async fn test_clean_close_does_not_reconnect_but_drop_does() {
    let store = Arc::new(MemoryStorage::new());
    let session = signed_in(&store);
    let (connector, mut servers) = FakeConnector::new(true);

    let client = WebSocketClient::spawn(
      &config(5),
      connector.clone(),
      session.clone(),
      store,
      Teardown::new(),
    )
    .unwrap();
    let mut status = client.subscribe_status();

    let server = servers.recv().await.unwrap();
    server.push.send(ChannelEvent::Closed { clean: true }).unwrap();
    status.wait_for(|s| !s.is_connected()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempt_count(), 1);

    // A fresh token counts as a renewed login
    session.set_tokens("tok-2".into(), None);
    let server = servers.recv().await.unwrap();
    status.wait_for(|s| s.is_connected()).await.unwrap();

    drop(server);
    status.wait_for(|s| s.reconnecting).await.unwrap();
    status.wait_for(|s| s.is_connected()).await.unwrap();
    assert_eq!(connector.attempt_count(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_logout_disconnects_and_teardown_stops_task() {
    let store = Arc::new(MemoryStorage::new());
    let session = signed_in(&store);
    let (connector, mut servers) = FakeConnector::new(true);
    let teardown = Teardown::new();

    let client = WebSocketClient::spawn(
      &config(5),
      connector.clone(),
      session.clone(),
      store,
      teardown.clone(),
    )
    .unwrap();
    let mut status = client.subscribe_status();
    let _server = servers.recv().await.unwrap();
    status.wait_for(|s| s.is_connected()).await.unwrap();

    session.logout();
    status.wait_for(|s| !s.is_connected()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.attempt_count(), 1);

    teardown.fire();
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.reconnect();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempt_count(), 1);
  }
}
