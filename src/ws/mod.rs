//! Resilient Bybit v5 WebSocket streams.
//!
//! # Architecture
//!
//! - [`SocketManager`]: owns the reconnect loop, the subscription registry and the session identity
//! - [`Session`]: scope of a running manager; closing or dropping it shuts everything down
//! - [`SubscriptionRegistry`]: topics replayed on every new connection
//! - [`dispatch::classify`]: sorts inbound frames into data, heartbeat replies and acknowledgements
//!
//! Each connection attempt runs under its own cancellation scope. A caller that finds the
//! transport broken cancels that scope, which stops the heartbeat and triggers a reconnect, then
//! retries once against the next ready connection.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod endpoint;
pub mod error;
mod gateway;
mod handshake;
mod heartbeat;
pub mod manager;
pub mod registry;
pub mod types;

pub use config::{Config, ReconnectConfig};
pub use connection::ConnectionState;
pub use endpoint::{Channel, Network};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use manager::{Session, SocketManager};
pub use registry::SubscriptionRegistry;
pub use types::request::{Op, SubscriptionRequest};
