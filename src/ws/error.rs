use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WsError {
  #[error("invalid websocket url: {0}")]
  InvalidUrl(String),

  #[error("connection failed: {0}")]
  Connect(String),

  #[error("send failed: {0}")]
  Send(String),

  #[error("connection closed")]
  Closed,

  #[error("malformed frame: {0}")]
  Malformed(String),

  #[error("unknown message type `{0}`")]
  UnknownType(String),
}
