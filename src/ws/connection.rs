#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::time::Instant;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::WsError;
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A received payload, or the reason it cannot be read as text.
pub(crate) type Received = std::result::Result<String, WsError>;

/// Lifecycle state of the socket manager.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport is open
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Performing the private channel login
    Authenticating,
    /// Replaying the subscription registry
    Resubscribing,
    /// Connection installed and heartbeating
    Ready {
        /// When the connection became ready
        since: Instant,
    },
    /// Tearing the current attempt down
    Closing,
}

impl ConnectionState {
    /// Check if the connection is currently usable.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Outcome of a single transport operation.
///
/// Transport closure is an expected condition that drives reconnection, so it is a value rather
/// than an error.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Io<T> {
    Done(T),
    /// The transport is closed or broken, or the attempt owning it was cancelled
    Closed,
    /// The socket manager has stopped for good
    Stopped,
}

/// One live socket plus the cancellation scope of the attempt that opened it.
///
/// Each direction is behind its own lock, so there is at most one writer and one reader in flight.
/// Every operation gives up as soon as the attempt is cancelled.
pub(crate) struct Connection {
    id: u64,
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: Mutex<SplitStream<WsStream>>,
    token: CancellationToken,
}

impl Connection {
    pub(crate) async fn open(url: &Url, id: u64, token: CancellationToken) -> Result<Self> {
        let (stream, _) = connect_async(url.as_str()).await?;
        let (writer, reader) = stream.split();

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, id, "WebSocket transport opened");

        Ok(Self {
            id,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            token,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the attempt owning this connection.
    pub(crate) fn abandon(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) async fn send(&self, text: &str) -> Io<()> {
        let mut writer = tokio::select! {
            writer = self.writer.lock() => writer,
            () = self.token.cancelled() => return Io::Closed,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(id = self.id, %text, "Sending WebSocket frame");

        tokio::select! {
            sent = writer.send(Message::Text(text.to_owned().into())) => match sent {
                Ok(()) => Io::Done(()),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(id = self.id, error = %e, "WebSocket send failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    Io::Closed
                }
            },
            () = self.token.cancelled() => Io::Closed,
        }
    }

    /// Reads the next text payload, skipping transport-level control frames.
    pub(crate) async fn recv(&self) -> Io<Received> {
        let mut reader = tokio::select! {
            reader = self.reader.lock() => reader,
            () = self.token.cancelled() => return Io::Closed,
        };

        loop {
            let next = tokio::select! {
                next = reader.next() => next,
                () = self.token.cancelled() => return Io::Closed,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(id = self.id, %text, "Received WebSocket text message");
                    return Io::Done(Ok(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return Io::Done(String::from_utf8(bytes.to_vec()).map_err(|e| {
                        WsError::InvalidMessage(format!("binary frame is not UTF-8: {e}"))
                    }));
                }
                Some(Ok(Message::Close(_))) | None => return Io::Closed,
                Some(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(id = self.id, error = %e, "WebSocket receive failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    return Io::Closed;
                }
                Some(Ok(_)) => {
                    // Ping/pong and raw frames are handled by tungstenite.
                }
            }
        }
    }

    /// Closes the transport. The attempt must already be cancelled so that no operation is holding
    /// the writer.
    pub(crate) async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            #[cfg(feature = "tracing")]
            tracing::trace!(id = self.id, error = %e, "Error while closing WebSocket");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }
}
