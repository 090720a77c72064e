//! Push channel connection manager.
//!
//! Owns one WebSocket to the backend. A background task runs the connect /
//! read / reconnect loop; the manager itself only starts and aborts that task,
//! so `disconnect()` cancels whatever the loop is doing, including a pending
//! reconnect sleep.
//!
//! State transitions:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> (delay) -> Connecting ...
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::frame::PushFrame;
use super::registry::{Handler, SharedRegistry, Subscription, Topic};

/// Default delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
/// Default keep-alive period.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// WebSocket endpoint, e.g. `ws://localhost:3001`.
    pub url: String,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
}

impl ConnectionSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound queue of the live socket and the run loop allowed to touch it.
///
/// `disconnect` bumps the generation, so a loop that is still running after
/// its abort was requested can no longer publish state.
#[derive(Default)]
struct Link {
    generation: u64,
    /// `None` while not connected.
    outbound: Option<mpsc::UnboundedSender<String>>,
}

/// State shared between the manager and its run loop.
struct Shared {
    settings: ConnectionSettings,
    registry: SharedRegistry,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Link>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a transition for run loop `generation`. Returns `false` once
    /// that loop has been superseded.
    fn transition(
        &self,
        generation: u64,
        next: ConnectionState,
        outbound: Option<mpsc::UnboundedSender<String>>,
    ) -> bool {
        let mut link = self.link();
        if link.generation != generation {
            return false;
        }
        link.outbound = outbound;
        self.set_state(next);
        true
    }

    /// Invalidate the current run loop and mark the channel closed.
    fn reset(&self) {
        let mut link = self.link();
        link.generation = link.generation.wrapping_add(1);
        link.outbound = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = current.as_str(), to = next.as_str(), "push state");
            *current = next;
            true
        });
    }

    /// Parse and dispatch one text frame. Malformed frames are dropped.
    fn deliver(&self, text: &str) {
        match PushFrame::parse(text) {
            Ok(frame) => {
                let handled = self.registry.dispatch(&frame);
                debug!(kind = %frame.kind, handled, "push frame");
            }
            Err(err) => warn!(error = %err, "dropping malformed push frame"),
        }
    }

    async fn run(self: Arc<Self>, generation: u64) {
        loop {
            if !self.transition(generation, ConnectionState::Connecting, None) {
                return;
            }
            match connect_async(self.settings.url.as_str()).await {
                Ok((socket, _response)) => {
                    info!(url = %self.settings.url, "push channel connected");
                    self.pump(generation, socket).await;
                    info!(url = %self.settings.url, "push channel closed");
                }
                Err(err) => {
                    warn!(url = %self.settings.url, error = %err, "push channel connect failed");
                }
            }
            if !self.transition(generation, ConnectionState::Disconnected, None) {
                return;
            }

            debug!(delay_ms = self.settings.reconnect_delay.as_millis(), "scheduling reconnect");
            tokio::time::sleep(self.settings.reconnect_delay).await;
        }
    }

    /// Drive one open socket until it closes or errors.
    async fn pump(&self, generation: u64, socket: Socket) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if !self.transition(generation, ConnectionState::Connected, Some(tx)) {
            return;
        }
        let (mut sink, mut stream) = socket.split();

        let period = self.settings.ping_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ping = match PushFrame::ping().to_text() {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "cannot encode keep-alive frame");
                return;
            }
        };

        loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.deliver(&text),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "server closed push channel");
                        break;
                    }
                    // Ping/pong is answered by the transport; binary is not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "push channel error");
                        break;
                    }
                    None => break,
                },
                Some(out) = rx.recv() => {
                    if let Err(err) = sink.send(Message::Text(out)).await {
                        warn!(error = %err, "push send failed");
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    if let Err(err) = sink.send(Message::Text(ping.clone())).await {
                        warn!(error = %err, "keep-alive failed");
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
    }
}

/// Maintains the push channel and fans inbound frames out to subscribers.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                settings,
                registry: SharedRegistry::default(),
                state,
                link: Mutex::new(Link::default()),
            }),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the push channel.
    ///
    /// Does nothing while a connection is open, being opened or waiting to be
    /// retried. Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut task = self.task();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        info!(url = %self.shared.settings.url, "starting push channel");
        let generation = self.shared.link().generation;
        *task = Some(tokio::spawn(Arc::clone(&self.shared).run(generation)));
    }

    /// Close the push channel and cancel any pending reconnect.
    pub fn disconnect(&self) {
        if let Some(task) = self.task().take() {
            task.abort();
            info!(url = %self.shared.settings.url, "push channel stopped");
        }
        self.shared.reset();
    }

    /// Register a handler for a frame kind or for every frame.
    pub fn subscribe(&self, topic: impl Into<Topic>, handler: Handler) -> Subscription {
        self.shared.registry.subscribe(topic.into(), handler)
    }

    /// Queue a frame for sending. Returns `false` when the socket is not open.
    pub fn send(&self, frame: &PushFrame) -> bool {
        if !self.is_connected() {
            return false;
        }
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "cannot encode outbound frame");
                return false;
            }
        };
        self.shared
            .link()
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(text).is_ok())
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.shared.settings
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task().take() {
            task.abort();
        }
    }
}
