//! Push channel: WebSocket connection, frame decoding and subscriptions.

mod connection;
mod frame;
mod registry;

pub use connection::{
    ConnectionManager, ConnectionSettings, ConnectionState, DEFAULT_PING_INTERVAL,
    DEFAULT_RECONNECT_DELAY,
};
pub use frame::{CompletedPayload, EventKind, FrameError, PushEvent, PushFrame};
pub use registry::{Handler, SharedRegistry, Subscription, Topic};
