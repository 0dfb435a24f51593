//! Real-time channel to the backend.

mod client;
mod connector;
mod error;
mod message;

pub use client::{ConnectionState, ConnectionStatus, WebSocketClient};
pub use connector::{socket_url, Channel, ChannelEvent, Connector, TungsteniteConnector};
pub use error::WsError;
pub use message::{InboundMessage, OutboundMessage, QueuedMessage, ServerEvent, QUEUE_KEY};
