use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::connection::{Connection, Io, Received};

/// Publishes the current [`Connection`] and routes every caller-side send and receive through it.
///
/// Installing a connection is the readiness signal: all waiters are released at once. Callers never
/// hold on to a connection across operations; they fetch whatever is current each time.
pub(crate) struct Gateway {
    current: watch::Sender<Option<Arc<Connection>>>,
    shutdown: CancellationToken,
}

impl Gateway {
    pub(crate) fn new(shutdown: CancellationToken) -> Self {
        let (current, _) = watch::channel(None);
        Self { current, shutdown }
    }

    /// Makes `connection` current and wakes everyone waiting for readiness.
    pub(crate) fn install(&self, connection: Arc<Connection>) {
        self.current.send_replace(Some(connection));
    }

    /// Withdraws connection `id` if it is still the current one.
    pub(crate) fn retire(&self, id: u64) {
        self.current
            .send_if_modified(|current| match current {
                Some(connection) if connection.id() == id => {
                    *current = None;
                    true
                }
                _ => false,
            });
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Arc<Connection>>> {
        self.current.subscribe()
    }

    /// Waits for a ready connection. Returns `false` once the socket manager has shut down.
    pub(crate) async fn wait_ready(&self) -> bool {
        self.ready(None).await.is_some()
    }

    /// Sends `text`. If the transport turns out to be closed, the attempt owning it is abandoned and
    /// the send is retried exactly once on the next connection that becomes ready.
    pub(crate) async fn send(&self, text: &str) -> Io<()> {
        let Some(connection) = self.ready(None).await else {
            return Io::Stopped;
        };
        if let Io::Done(()) = connection.send(text).await {
            return Io::Done(());
        }

        let Some(replacement) = self.reconnected(&connection).await else {
            return Io::Stopped;
        };
        replacement.send(text).await
    }

    /// Receives the next payload, with the same single retry as [`Self::send`].
    pub(crate) async fn recv(&self) -> Io<Received> {
        let Some(connection) = self.ready(None).await else {
            return Io::Stopped;
        };
        if let Io::Done(frame) = connection.recv().await {
            return Io::Done(frame);
        }

        let Some(replacement) = self.reconnected(&connection).await else {
            return Io::Stopped;
        };
        replacement.recv().await
    }

    async fn reconnected(&self, broken: &Connection) -> Option<Arc<Connection>> {
        #[cfg(feature = "tracing")]
        tracing::debug!(id = broken.id(), "Connection broken, waiting for reconnect");

        broken.abandon();
        self.ready(Some(broken.id())).await
    }

    /// Waits until a connection other than `stale` is installed. Returns `None` once the socket
    /// manager has shut down.
    async fn ready(&self, stale: Option<u64>) -> Option<Arc<Connection>> {
        let mut rx = self.current.subscribe();

        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(connection) = current
                && Some(connection.id()) != stale
                && !connection.is_abandoned()
            {
                return Some(connection);
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                () = self.shutdown.cancelled() => return None,
            }
        }
    }
}
