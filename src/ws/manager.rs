use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use async_stream::try_stream;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use bon::bon;
use futures::Stream;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::connection::{Connection, ConnectionState, Io, Received};
use super::dispatch::dispatch;
use super::endpoint::{Channel, Network, resolve};
use super::error::WsError;
use super::gateway::Gateway;
use super::registry::SubscriptionRegistry;
use super::types::request::SubscriptionRequest;
use super::{handshake, heartbeat};
use crate::Result;
use crate::auth::Credentials;
use crate::error::{Error, Kind, OperationError, Synchronization};

/// Maintains one logical Bybit stream session across an unreliable transport.
///
/// The manager opens a socket, logs in on the private channel, replays every subscribed topic,
/// then heartbeats until the transport fails, at which point it starts over. Callers never see
/// those reconnects: [`SocketManager::messages`] and [`SocketManager::subscribe`] always act on
/// whichever connection is current.
///
/// [`SocketManager`] is cheap to clone; clones share the same session.
///
/// # Example
///
/// ```rust,no_run
/// use bybit_client_sdk::ws::{Channel, Network, SocketManager};
/// use futures::StreamExt as _;
///
/// #[tokio::main]
/// async fn main() -> bybit_client_sdk::Result<()> {
///     let manager = SocketManager::builder()
///         .network(Network::Main)
///         .channel(Channel::Linear)
///         .build()?;
///
///     let session = manager.connect()?;
///     manager.subscribe(["publicTrade.BTCUSDT"]).await?;
///
///     let mut messages = Box::pin(manager.messages());
///     while let Some(message) = messages.next().await {
///         println!("{}", message?);
///     }
///
///     session.close().await
/// }
/// ```
#[derive(Clone)]
pub struct SocketManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for SocketManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketManager")
            .field("network", &self.inner.network)
            .field("channel", &self.inner.channel)
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &self.state())
            .field("topics", &self.topics())
            .finish_non_exhaustive()
    }
}

struct Inner {
    network: Network,
    channel: Channel,
    endpoint: Url,
    credentials: Option<Credentials>,
    config: Config,
    subscriptions: SubscriptionRegistry,
    /// Session id assigned by the server on the last successful login
    conn_id: RwLock<Option<String>>,
    state: watch::Sender<ConnectionState>,
    /// Latest login rejection, observed by [`SocketManager::create`]
    rejections: watch::Sender<Option<OperationError>>,
    gateway: Gateway,
    /// Root cancellation scope. Cancelling it is terminal.
    shutdown: CancellationToken,
    started: AtomicBool,
    next_id: AtomicU64,
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        #[cfg(feature = "tracing")]
        tracing::debug!(?state, channel = %self.channel, "Connection state changed");
        self.state.send_replace(state);
    }
}

#[bon]
impl SocketManager {
    /// Validates the configuration and resolves the stream URL. No I/O happens until
    /// [`Self::connect`].
    ///
    /// `endpoint` overrides the resolved URL, e.g. to point at a local server. The
    /// `network` × `channel` combination is validated regardless.
    #[builder]
    pub fn new(
        #[builder(default)] network: Network,
        #[builder(default)] channel: Channel,
        credentials: Option<Credentials>,
        #[builder(default)] config: Config,
        #[builder(into)] endpoint: Option<String>,
    ) -> Result<Self> {
        let resolved = resolve(network, channel)?;

        if channel.is_private() && credentials.is_none() {
            return Err(Error::configuration(
                "api_key and api_secret must be provided for private streams",
            ));
        }

        let endpoint = match endpoint {
            Some(endpoint) => Url::parse(&endpoint)?,
            None => resolved,
        };

        let shutdown = CancellationToken::new();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (rejections, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(Inner {
                network,
                channel,
                endpoint,
                credentials,
                config,
                subscriptions: SubscriptionRegistry::new(),
                conn_id: RwLock::new(None),
                state,
                rejections,
                gateway: Gateway::new(shutdown.clone()),
                shutdown,
                started: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
            }),
        })
    }

    /// Starts the reconnect loop in a background task.
    ///
    /// The returned [`Session`] is the scope of the loop: closing or dropping it stops the manager
    /// for good. A manager runs at most one session in its lifetime.
    pub fn connect(&self) -> Result<Session> {
        if self.inner.shutdown.is_cancelled() {
            return Err(WsError::ConnectionClosed.into());
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(Synchronization.into());
        }

        let this = self.clone();
        let task = tokio::spawn(async move { this.run().await });

        Ok(Session {
            shutdown: self.inner.shutdown.clone(),
            task: Some(task),
        })
    }

    /// Connects and waits until the first connection is ready.
    ///
    /// If the server rejects the first login, the session is shut down before the rejection is
    /// returned, so nothing is left running.
    pub async fn create(&self) -> Result<Session> {
        let mut rejections = self.inner.rejections.subscribe();
        let mut current = self.inner.gateway.subscribe();
        let session = self.connect()?;

        let startup = tokio::select! {
            biased;

            changed = rejections.changed() => {
                if changed.is_ok() { Startup::Rejected } else { Startup::Stopped }
            }
            ready = current.wait_for(Option::is_some) => {
                if ready.is_ok() { Startup::Ready } else { Startup::Stopped }
            }
            () = self.inner.shutdown.cancelled() => Startup::Stopped,
        };

        match startup {
            Startup::Ready => Ok(session),
            Startup::Rejected => {
                let rejection = rejections.borrow().clone();
                session.close().await?;
                Err(rejection.map_or_else(|| WsError::ConnectionClosed.into(), Into::into))
            }
            Startup::Stopped => {
                session.close().await?;
                Err(WsError::ConnectionClosed.into())
            }
        }
    }

    /// Adds `topics` to the registry and subscribes to them on the current connection.
    pub async fn subscribe<I, T>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let topics = topics.into_iter().map(Into::into).collect();
        self.send_subscription(SubscriptionRequest::subscribe(topics))
            .await
    }

    /// Removes `topics` from the registry and unsubscribes from them on the current connection.
    pub async fn unsubscribe<I, T>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let topics = topics.into_iter().map(Into::into).collect();
        self.send_subscription(SubscriptionRequest::unsubscribe(topics))
            .await
    }

    /// Applies `request` to the registry, then transmits it.
    ///
    /// Waits for a ready connection first, so a request issued before [`Self::connect`] is sent
    /// once the session is up. If the transport breaks underneath the send
    /// and the single retry fails too, the registry change is still delivered by the replay that
    /// follows the next reconnect.
    pub async fn send_subscription(&self, request: SubscriptionRequest) -> Result<()> {
        if request.topics.is_empty() {
            return Err(Error::configuration(format!(
                "at least one topic must be provided to {}",
                request.op
            )));
        }

        let text = serde_json::to_string(&request)?;

        // Applied any earlier, the request would also go out with the first replay.
        if !self.inner.gateway.wait_ready().await {
            return Err(WsError::ConnectionClosed.into());
        }
        self.inner.subscriptions.apply(&request);

        match self.inner.gateway.send(&text).await {
            Io::Done(()) => Ok(()),
            Io::Closed => {
                #[cfg(feature = "tracing")]
                tracing::debug!(op = %request.op, "Subscription deferred to the next replay");
                Ok(())
            }
            Io::Stopped => Err(WsError::ConnectionClosed.into()),
        }
    }

    /// Stream of data frames (`{"topic":...,"data":...}`) from whichever connection is current.
    ///
    /// Heartbeat replies and successful acknowledgements are swallowed. The stream yields an error
    /// and ends when the server rejects a login or a subscription, or sends a frame of unknown
    /// shape, and ends without error when the manager stops. Only logins rejected after the stream
    /// was created are reported.
    pub fn messages(&self) -> impl Stream<Item = Result<Value>> {
        let inner = Arc::clone(&self.inner);
        let mut rejections = inner.rejections.subscribe();

        try_stream! {
            loop {
                let next = tokio::select! {
                    io = inner.gateway.recv() => Inbound::Frame(io),
                    Ok(()) = rejections.changed() => {
                        Inbound::Rejected(rejections.borrow_and_update().clone())
                    }
                };

                match next {
                    Inbound::Frame(Io::Done(raw)) => {
                        if let Some(message) = dispatch(&raw?)? {
                            yield message;
                        }
                    }
                    // The single retry after a reconnect failed as well; wait for the next one.
                    Inbound::Frame(Io::Closed) | Inbound::Rejected(None) => {}
                    Inbound::Frame(Io::Stopped) => break,
                    Inbound::Rejected(Some(rejection)) => Err(rejection)?,
                }
            }
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Whether a connection is installed and accepting traffic.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.gateway.is_ready()
    }

    /// Session id from the last successful login on the private channel.
    #[must_use]
    pub fn conn_id(&self) -> Option<String> {
        self.inner
            .conn_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Topics currently in the registry, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.inner.subscriptions.topics()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.inner.network
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.inner.channel
    }

    /// The reconnect loop. Returns `Ok` once shut down externally and an error if it gives up.
    async fn run(&self) -> Result<()> {
        let inner = &self.inner;
        let mut backoff: ExponentialBackoff = inner.config.reconnect.clone().into();
        let mut failures = 0_u32;

        let result = loop {
            if inner.shutdown.is_cancelled() {
                break Ok(());
            }

            let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
            let token = inner.shutdown.child_token();
            let mut became_ready = false;

            let outcome = self.attempt(id, &token, &mut became_ready).await;
            inner.set_state(ConnectionState::Disconnected);

            if inner.shutdown.is_cancelled() {
                break Ok(());
            }

            if became_ready {
                failures = 0;
                backoff.reset();
            } else {
                failures = failures.saturating_add(1);
            }

            match outcome {
                Err(e) if e.kind() == Kind::Operation => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Login rejected, restarting...");
                    if let Some(rejection) = e.downcast_ref::<OperationError>() {
                        inner.rejections.send_replace(Some(rejection.clone()));
                    }
                }
                Err(e) if !became_ready => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, attempt = failures, "Failed to connect, restarting...");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(error = %e, "Connection closed, restarting...");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
                Ok(()) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!("Connection abandoned, restarting...");
                }
            }

            if let Some(max) = inner.config.reconnect.max_attempts
                && failures >= max
            {
                break Err(WsError::ReconnectExhausted { attempts: failures }.into());
            }

            if let Some(delay) = backoff.next_backoff()
                && !delay.is_zero()
            {
                tokio::select! {
                    () = sleep(delay) => {}
                    () = inner.shutdown.cancelled() => break Ok(()),
                }
            }
        };

        inner.shutdown.cancel();
        result
    }

    /// One connection attempt, from opening the socket until it fails or `token` is cancelled.
    async fn attempt(
        &self,
        id: u64,
        token: &CancellationToken,
        became_ready: &mut bool,
    ) -> Result<()> {
        let inner = &self.inner;
        inner.set_state(ConnectionState::Connecting);

        let connection = tokio::select! {
            opened = Connection::open(&inner.endpoint, id, token.clone()) => Arc::new(opened?),
            () = token.cancelled() => return Ok(()),
        };

        let outcome = tokio::select! {
            outcome = self.establish(&connection, became_ready) => outcome,
            () = token.cancelled() => Ok(()),
        };

        inner.set_state(ConnectionState::Closing);
        token.cancel();
        inner.gateway.retire(id);
        if timeout(inner.config.heartbeat_timeout, connection.close())
            .await
            .is_err()
        {
            #[cfg(feature = "tracing")]
            tracing::debug!(id, "Timed out closing WebSocket");
        }

        outcome
    }

    /// Authenticating → Resubscribing → Ready, then heartbeat until the connection fails.
    async fn establish(&self, connection: &Arc<Connection>, became_ready: &mut bool) -> Result<()> {
        let inner = &self.inner;

        if inner.channel.is_private()
            && let Some(credentials) = &inner.credentials
        {
            inner.set_state(ConnectionState::Authenticating);
            let conn_id = handshake::authenticate(connection, credentials).await?;

            #[cfg(feature = "tracing")]
            tracing::debug!(?conn_id, "Authenticated");

            *inner
                .conn_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) = conn_id;
        }

        inner.set_state(ConnectionState::Resubscribing);
        if let Some(request) = inner.subscriptions.replay_request() {
            #[cfg(feature = "tracing")]
            tracing::debug!(count = request.topics.len(), "Re-subscribing to topics");

            let text = serde_json::to_string(&request)?;
            if connection.send(&text).await != Io::Done(()) {
                return Err(WsError::ConnectionClosed.into());
            }
        }

        inner.gateway.install(Arc::clone(connection));
        inner.set_state(ConnectionState::Ready {
            since: Instant::now(),
        });
        *became_ready = true;

        heartbeat::run(connection, &inner.config).await
    }
}

enum Inbound {
    Frame(Io<Received>),
    Rejected(Option<OperationError>),
}

enum Startup {
    Ready,
    Rejected,
    Stopped,
}

/// Scope of a running [`SocketManager`].
///
/// Dropping the session cancels the reconnect loop, like [`Session::close`] does without waiting
/// for it to finish.
#[derive(Debug)]
pub struct Session {
    shutdown: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl Session {
    /// Stops the manager and waits for the loop to unwind.
    pub async fn close(mut self) -> Result<()> {
        self.shutdown.cancel();
        self.join().await
    }

    /// Waits for the loop to end on its own, which only happens when reconnection is exhausted.
    pub async fn wait(mut self) -> Result<()> {
        self.join().await
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    async fn join(&mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task.await?,
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
