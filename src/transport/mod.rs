//! Backend transport
//!
//! One logical bidirectional connection to the assistant backend:
//! - `TransportClient`: connect/disconnect lifecycle, reconnect with backoff,
//!   ordered pending queue that survives disconnection
//! - `Connector`/`Link`: pluggable link (WebSocket in production)
//! - `messages`: JSON wire format

pub mod backoff;
pub mod client;
pub mod link;
pub mod messages;
pub mod queue;

pub use backoff::Backoff;
pub use client::{ConnectionState, TransportClient, TransportEvent};
pub use link::{Connector, Link, LinkEvent, WebSocketConnector, TERMINAL_CLOSE_CODES};
pub use messages::{
    parse_inbound, CommandContext, CommandMessage, InboundMessage, OutboundMessage, ResponseMessage,
};
pub use queue::{PendingQueue, QueuedCommand};
