//! Socket seam: the client talks to a [`Channel`] opened by a
//! [`Connector`], so the reconnect logic runs the same against
//! tokio-tungstenite and against in-process fakes.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::error::WsError;

/// What the read half of a channel yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
  Text(String),
  /// `clean` is true when the peer sent a close frame.
  Closed {
    clean: bool,
  },
  Error(String),
}

#[async_trait]
pub trait Channel: Send {
  async fn send(&mut self, text: String) -> Result<(), WsError>;

  async fn recv(&mut self) -> ChannelEvent;

  async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
  async fn connect(&self, url: &Url) -> Result<Box<dyn Channel>, WsError>;
}

pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
  async fn connect(&self, url: &Url) -> Result<Box<dyn Channel>, WsError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
      .await
      .map_err(|e| WsError::Connect(e.to_string()))?;
    Ok(Box::new(TungsteniteChannel { stream }))
  }
}

struct TungsteniteChannel {
  stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for TungsteniteChannel {
  async fn send(&mut self, text: String) -> Result<(), WsError> {
    self
      .stream
      .send(Message::Text(text))
      .await
      .map_err(|e| WsError::Send(e.to_string()))
  }

  async fn recv(&mut self) -> ChannelEvent {
    loop {
      match self.stream.next().await {
        Some(Ok(Message::Text(text))) => return ChannelEvent::Text(text),
        Some(Ok(Message::Close(_))) => return ChannelEvent::Closed { clean: true },
        // Pings are answered by tungstenite; binary frames are not part of the protocol
        Some(Ok(_)) => continue,
        Some(Err(e)) => return ChannelEvent::Error(e.to_string()),
        None => return ChannelEvent::Closed { clean: false },
      }
    }
  }

  async fn close(&mut self) {
    if let Err(e) = self.stream.close(None).await {
      tracing::debug!(error = %e, "error while closing websocket");
    }
  }
}

/// `base?token=…`
pub fn socket_url(base: &Url, token: &str) -> Url {
  let mut url = base.clone();
  url.query_pairs_mut().append_pair("token", token);
  url
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_socket_url_appends_token() {
    let base = Url::parse("ws://localhost:3000").unwrap();
    assert_eq!(
      socket_url(&base, "abc.def").as_str(),
      "ws://localhost:3000/?token=abc.def"
    );
  }
}
