//! Stream connection manager — the one shared upstream chat socket.
//!
//! DESIGN
//! ======
//! `ChatConnection` is a cheap, cloneable handle to process-wide state. It
//! owns at most one live socket, multiplexes any number of consumers, and
//! exposes two independent listener classes:
//!
//! - line listeners receive every inbound protocol line except keep-alive
//!   pings, synchronously and in registration order;
//! - status listeners receive `true`/`false` connectivity changes, and are
//!   invoked once with the current state the moment they register.
//!
//! Consumers come and go; the socket does not. Only `disconnect()` tears it
//! down on purpose.
//!
//! LIFECYCLE
//! =========
//! ```text
//! Disconnected → Connecting → Open → Closed | Errored → (retry) Connecting
//!                                                     → (disconnect) Disconnected
//! ```
//!
//! Each socket runs in its own task tagged with a generation number. Every
//! replace or teardown bumps the generation, and a task whose generation is
//! stale can no longer publish lines or status.
//!
//! LOCKING
//! =======
//! All shared state sits behind one `std::sync::Mutex`. Listeners are
//! cloned out of the lock before they are called, so a listener may freely
//! call back into the connection (for example to unsubscribe itself).
//!
//! Status deliveries are queued under the lock and drained by one caller at
//! a time, in queue order. A listener therefore sees status values in the
//! order the state changed, even when a registration races a state change
//! on another thread or a listener changes the state from inside a callback.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::message::{self, ChatMessage};
use super::reconnect::ReconnectPolicy;
use super::transport::{FrameSink, Transport, WebSocketTransport};
use super::{ChatError, normalize_channel};

pub const DEFAULT_CHAT_URL: &str = "wss://irc-ws.chat.twitch.tv";
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Any password is accepted for the anonymous `justinfan` login.
const ANONYMOUS_PASS: &str = "SCHMOOPIIE";
const CAPABILITIES: &str = "twitch.tv/tags twitch.tv/commands";

static SHARED: OnceLock<ChatConnection> = OnceLock::new();

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Handle returned by `subscribe`/`subscribe_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type LineListener = Arc<dyn Fn(&str) + Send + Sync>;
type StatusListener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub url: String,
    pub ping_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// Anonymous login name, `justinfan<digits>`.
    pub nick: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_CHAT_URL.to_owned(),
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            nick: anonymous_nick(),
        }
    }
}

/// A fresh anonymous read-only login name.
#[must_use]
pub fn anonymous_nick() -> String {
    use rand::Rng;
    format!("justinfan{}", rand::rng().random_range(10_000..100_000))
}

// =============================================================================
// SHARED STATE
// =============================================================================

#[derive(Clone)]
pub struct ChatConnection {
    inner: Arc<Shared>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    options: ConnectionOptions,
    core: Mutex<Core>,
}

struct Core {
    state: ConnectionState,
    channel: Option<String>,
    generation: u64,
    socket: Option<SocketHandle>,
    retry: Option<JoinHandle<()>>,
    attempts: u32,
    next_listener: u64,
    line_listeners: BTreeMap<ListenerId, LineListener>,
    status_listeners: BTreeMap<ListenerId, StatusListener>,
    /// Status deliveries not yet made, in state-change order.
    status_queue: VecDeque<(StatusListener, bool)>,
    /// Some caller is draining `status_queue`.
    draining: bool,
}

/// Control side of a running socket task.
struct SocketHandle {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SocketHandle {
    fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Core {
    fn next_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }

    /// Close the current socket (if any) and invalidate its task.
    fn teardown(&mut self) {
        self.generation += 1;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
    }

    /// Queue `open` for every status listener. Returns true if the caller
    /// must drain the queue once the lock is released.
    fn publish_status(&mut self, open: bool) -> bool {
        let listeners: Vec<StatusListener> = self.status_listeners.values().cloned().collect();
        self.status_queue.extend(listeners.into_iter().map(|listener| (listener, open)));
        self.claim_drain()
    }

    fn claim_drain(&mut self) -> bool {
        if self.draining || self.status_queue.is_empty() {
            return false;
        }
        self.draining = true;
        true
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

impl ChatConnection {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, options: ConnectionOptions) -> Self {
        let core = Core {
            state: ConnectionState::Disconnected,
            channel: None,
            generation: 0,
            socket: None,
            retry: None,
            attempts: 0,
            next_listener: 0,
            line_listeners: BTreeMap::new(),
            status_listeners: BTreeMap::new(),
            status_queue: VecDeque::new(),
            draining: false,
        };
        Self { inner: Arc::new(Shared { transport, options, core: Mutex::new(core) }) }
    }

    /// The process-wide connection over a real WebSocket. Created on first
    /// call; `options` are ignored on every later call.
    pub fn shared(options: &ConnectionOptions) -> Self {
        SHARED
            .get_or_init(|| Self::new(Arc::new(WebSocketTransport), options.clone()))
            .clone()
    }

    /// Join `channel`. On an open socket this is a PART/JOIN pair over the
    /// same connection; otherwise any existing socket is discarded and a new
    /// one is opened and handshaken.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::InvalidChannel` if the name does not normalize.
    pub fn connect(&self, channel: &str) -> Result<(), ChatError> {
        let channel = normalize_channel(channel)?;
        let mut guard = self.inner.lock();
        let core = &mut *guard;
        core.cancel_retry();
        core.attempts = 0;

        if core.state == ConnectionState::Open {
            if let Some(socket) = &core.socket {
                if let Some(previous) = core.channel.as_deref() {
                    let _ = socket.outbound.send(format!("PART #{previous}"));
                }
                let _ = socket.outbound.send(format!("JOIN #{channel}"));
                info!(%channel, "chat: switched channel");
                core.channel = Some(channel);
                return Ok(());
            }
        }

        core.teardown();
        core.channel = Some(channel);
        self.inner.start_socket(core);
        Ok(())
    }

    /// Stop keep-alive, close the socket, forget the channel, and report
    /// `false` to status listeners.
    pub fn disconnect(&self) {
        let drain = {
            let mut core = self.inner.lock();
            core.cancel_retry();
            core.attempts = 0;
            core.teardown();
            core.channel = None;
            core.state = ConnectionState::Disconnected;
            core.publish_status(false)
        };
        info!("chat: disconnected");
        if drain {
            self.inner.drain_status();
        }
    }

    /// Register a raw-line listener.
    pub fn subscribe(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        let mut core = self.inner.lock();
        let id = core.next_id();
        core.line_listeners.insert(id, Arc::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.lock().line_listeners.remove(&id);
    }

    /// Register a connectivity listener. It is called with the current
    /// state before this method returns, unless another caller is already
    /// delivering status; that caller then delivers it, ahead of any later
    /// change.
    pub fn subscribe_status(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        let listener: StatusListener = Arc::new(listener);
        let (id, drain) = {
            let mut core = self.inner.lock();
            let id = core.next_id();
            core.status_listeners.insert(id, Arc::clone(&listener));
            let open = core.state == ConnectionState::Open;
            core.status_queue.push_back((listener, open));
            (id, core.claim_drain())
        };
        if drain {
            self.inner.drain_status();
        }
        id
    }

    pub fn unsubscribe_status(&self, id: ListenerId) {
        self.inner.lock().status_listeners.remove(&id);
    }

    /// Register a listener for decoded chat messages. Lines that do not
    /// decode are skipped.
    pub fn subscribe_messages(&self, listener: impl Fn(ChatMessage) + Send + Sync + 'static) -> ListenerId {
        self.subscribe(move |line| {
            if let Some(msg) = message::decode_line(line) {
                listener(msg);
            }
        })
    }

    /// `subscribe_messages` that unsubscribes when the guard drops.
    pub fn watch_messages(&self, listener: impl Fn(ChatMessage) + Send + Sync + 'static) -> Subscription {
        let id = self.subscribe_messages(listener);
        Subscription { connection: self.clone(), id, kind: ListenerKind::Line }
    }

    /// `subscribe_status` that unsubscribes when the guard drops.
    pub fn watch_status(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let id = self.subscribe_status(listener);
        Subscription { connection: self.clone(), id, kind: ListenerKind::Status }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    #[must_use]
    pub fn channel(&self) -> Option<String> {
        self.inner.lock().channel.clone()
    }

    #[cfg(test)]
    pub(crate) fn listener_counts(&self) -> (usize, usize) {
        let core = self.inner.lock();
        (core.line_listeners.len(), core.status_listeners.len())
    }
}

// =============================================================================
// SUBSCRIPTION GUARD
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum ListenerKind {
    Line,
    Status,
}

/// Unregisters its listener on drop.
pub struct Subscription {
    connection: ChatConnection,
    id: ListenerId,
    kind: ListenerKind,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match self.kind {
            ListenerKind::Line => self.connection.unsubscribe(self.id),
            ListenerKind::Status => self.connection.unsubscribe_status(self.id),
        }
    }
}

// =============================================================================
// SOCKET TASK
// =============================================================================

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver queued status values one at a time, outside the lock, until
    /// the queue is empty. Only the caller that claimed the drain runs this.
    fn drain_status(&self) {
        loop {
            let (listener, open) = {
                let mut core = self.lock();
                match core.status_queue.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        core.draining = false;
                        return;
                    }
                }
            };
            listener(open);
        }
    }

    /// Spawn a socket task for `core.channel` under the current generation.
    fn start_socket(self: &Arc<Self>, core: &mut Core) {
        let Some(channel) = core.channel.clone() else {
            return;
        };
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        core.socket = Some(SocketHandle { outbound, shutdown: Some(shutdown) });
        core.state = ConnectionState::Connecting;

        let shared = Arc::clone(self);
        let generation = core.generation;
        info!(%channel, generation, "chat: connecting");
        tokio::spawn(async move {
            let end = shared.run_socket(generation, &channel, outbound_rx, shutdown_rx).await;
            if let Some(end) = end {
                shared.socket_ended(generation, end);
            }
        });
    }

    /// Drive one socket until it closes, errors, or is shut down. Returns the
    /// terminal state, or `None` when the manager asked for the shutdown.
    async fn run_socket(
        &self,
        generation: u64,
        channel: &str,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Option<ConnectionState> {
        let (mut sink, mut stream) = tokio::select! {
            opened = self.transport.open(&self.options.url) => match opened {
                Ok(halves) => halves,
                Err(e) => {
                    warn!(error = %e, "chat: connect failed");
                    return Some(ConnectionState::Errored);
                }
            },
            _ = &mut shutdown_rx => return None,
        };

        if !self.mark_open(generation) {
            let _ = sink.close().await;
            return None;
        }

        if let Err(e) = send_all(&mut sink, handshake_frames(&self.options.nick, channel)).await {
            warn!(error = %e, "chat: handshake failed");
            return Some(ConnectionState::Errored);
        }

        let ping = self.options.ping_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + ping, ping);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                payload = stream.next() => match payload {
                    Some(Ok(payload)) => {
                        if let Err(e) = self.deliver(generation, &mut sink, &payload).await {
                            warn!(error = %e, "chat: send failed");
                            break ConnectionState::Errored;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "chat: socket error");
                        break ConnectionState::Errored;
                    }
                    None => {
                        info!("chat: socket closed by server");
                        break ConnectionState::Closed;
                    }
                },
                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = sink.send(frame).await {
                        warn!(error = %e, "chat: send failed");
                        break ConnectionState::Errored;
                    }
                }
                _ = keepalive.tick() => {
                    if let Err(e) = sink.send("PING".to_owned()).await {
                        warn!(error = %e, "chat: keep-alive failed");
                        break ConnectionState::Errored;
                    }
                }
                _ = &mut shutdown_rx => {
                    let _ = sink.close().await;
                    return None;
                }
            }
        };

        let _ = sink.close().await;
        Some(end)
    }

    /// Answer keep-alives and fan every other line out to listeners.
    async fn deliver(&self, generation: u64, sink: &mut FrameSink, payload: &str) -> Result<(), ChatError> {
        for line in message::split_frame(payload) {
            if let Some(pong) = message::pong_for(line) {
                debug!("chat: answering keep-alive");
                sink.send(pong).await?;
                continue;
            }
            self.fan_out(generation, line);
        }
        Ok(())
    }

    fn fan_out(&self, generation: u64, line: &str) {
        let listeners: Vec<LineListener> = {
            let core = self.lock();
            if core.generation != generation {
                return;
            }
            core.line_listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(line);
        }
    }

    fn mark_open(&self, generation: u64) -> bool {
        let drain = {
            let mut core = self.lock();
            if core.generation != generation {
                return false;
            }
            core.state = ConnectionState::Open;
            core.attempts = 0;
            core.publish_status(true)
        };
        info!(generation, "chat: connected");
        if drain {
            self.drain_status();
        }
        true
    }

    /// Record a socket that ended on its own and schedule a retry if the
    /// policy asks for one.
    fn socket_ended(self: &Arc<Self>, generation: u64, end: ConnectionState) {
        let drain = {
            let mut core = self.lock();
            if core.generation != generation {
                return;
            }
            core.socket = None;
            core.state = end;
            if let Some(delay) = self.options.reconnect.delay(core.attempts) {
                core.attempts = core.attempts.saturating_add(1);
                info!(?delay, attempt = core.attempts, "chat: scheduling reconnect");
                let shared = Arc::clone(self);
                core.retry = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.retry(generation);
                }));
            }
            core.publish_status(false)
        };
        if drain {
            self.drain_status();
        }
    }

    fn retry(self: &Arc<Self>, generation: u64) {
        let mut core = self.lock();
        let ended = matches!(core.state, ConnectionState::Closed | ConnectionState::Errored);
        if core.generation != generation || !ended {
            return;
        }
        core.retry = None;
        core.teardown();
        self.start_socket(&mut core);
    }
}

fn handshake_frames(nick: &str, channel: &str) -> Vec<String> {
    vec![
        format!("CAP REQ :{CAPABILITIES}"),
        format!("PASS {ANONYMOUS_PASS}"),
        format!("NICK {nick}"),
        format!("USER {nick} 8 * :{nick}"),
        format!("JOIN #{channel}"),
    ]
}

async fn send_all(sink: &mut FrameSink, frames: Vec<String>) -> Result<(), ChatError> {
    for frame in frames {
        sink.send(frame).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
