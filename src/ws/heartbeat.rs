use tokio::time::{sleep, timeout};

use super::config::Config;
use super::connection::{Connection, Io};
use super::error::WsError;
use super::types::request::PING;
use crate::Result;

/// Keeps `connection` alive: ping, wait `heartbeat_interval`, repeat.
///
/// Only returns when the ping cannot be written within `heartbeat_timeout` or the transport is
/// closed. The caller cancels the attempt to stop it otherwise.
pub(crate) async fn run(connection: &Connection, config: &Config) -> Result<()> {
    loop {
        match timeout(config.heartbeat_timeout, connection.send(PING)).await {
            Ok(Io::Done(())) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(id = connection.id(), "Heartbeat sent");
            }
            Ok(_) => return Err(WsError::ConnectionClosed.into()),
            Err(_elapsed) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    id = connection.id(),
                    "Heartbeat not sent within {:?}",
                    config.heartbeat_timeout
                );
                return Err(WsError::Timeout.into());
            }
        }

        sleep(config.heartbeat_interval).await;
    }
}
