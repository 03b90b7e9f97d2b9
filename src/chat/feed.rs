//! Per-mount chat feed — one consumer of the shared connection.
//!
//! DESIGN
//! ======
//! A `ChatFeed` is what a view mounts. It registers a message listener and a
//! status listener on the shared `ChatConnection` (both as drop guards),
//! owns a `MessageBuffer`, and runs a single `select!` loop over:
//!
//! - decoded messages from the connection,
//! - status changes from the connection,
//! - commands from the render surface (scroll reports, resume, channel),
//! - the buffer's next timer deadline.
//!
//! After every event it publishes a `FeedUpdate` if anything observable
//! changed. Dropping the feed unregisters both listeners and discards the
//! buffer's timers; the shared socket is left alone.
//!
//! BACKPRESSURE
//! ============
//! Every update is a full snapshot, so only the newest unsent one matters.
//! While the consumer is slow the feed keeps at most one update in hand,
//! replacing it as state changes, and keeps draining messages into the
//! capped buffer. A pending scroll effect survives the replacement.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::buffer::{BufferConfig, BufferSnapshot, MessageBuffer, ScrollRequest, Viewport};
use super::connection::{ChatConnection, ConnectionState, Subscription};
use super::message::ChatMessage;
use super::{ChatError, normalize_channel};

/// Input from the render surface.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedCommand {
    Scroll(Viewport),
    Resume,
    SwitchChannel(String),
}

/// Everything the render surface needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedUpdate {
    pub snapshot: BufferSnapshot,
    pub connected: bool,
    pub channel: String,
    pub scroll: Option<ScrollRequest>,
}

pub struct ChatFeed {
    connection: ChatConnection,
    channel: String,
    buffer: MessageBuffer,
    connected: bool,
    messages: mpsc::UnboundedReceiver<Arc<ChatMessage>>,
    status: mpsc::UnboundedReceiver<bool>,
    _listeners: (Subscription, Subscription),
}

/// Last state pushed to the render surface.
#[derive(PartialEq)]
struct Published {
    revision: u64,
    connected: bool,
    channel: String,
}

impl ChatFeed {
    /// Attach to `connection` and make sure it is joined to `channel`.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::InvalidChannel` if the name does not normalize.
    pub fn mount(connection: ChatConnection, channel: &str, config: BufferConfig) -> Result<Self, ChatError> {
        let channel = normalize_channel(channel)?;

        let (message_tx, messages) = mpsc::unbounded_channel();
        let (status_tx, status) = mpsc::unbounded_channel();
        let data = connection.watch_messages(move |msg| {
            let _ = message_tx.send(Arc::new(msg));
        });
        let presence = connection.watch_status(move |open| {
            let _ = status_tx.send(open);
        });

        let live = matches!(connection.state(), ConnectionState::Open | ConnectionState::Connecting);
        if !live || connection.channel().as_deref() != Some(channel.as_str()) {
            connection.connect(&channel)?;
        }
        info!(%channel, "feed: mounted");

        Ok(Self {
            connection,
            channel,
            buffer: MessageBuffer::new(config),
            connected: false,
            messages,
            status,
            _listeners: (data, presence),
        })
    }

    /// Drive the feed until the command sender or the update receiver goes
    /// away.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<FeedCommand>, updates: mpsc::Sender<FeedUpdate>) {
        let mut published: Option<Published> = None;
        let mut unsent: Option<FeedUpdate> = None;

        loop {
            let deadline = self.buffer.next_deadline().map(Instant::from_std);
            tokio::select! {
                Some(msg) = self.messages.recv() => {
                    if msg.channel == self.channel {
                        self.buffer.push(msg, now());
                    } else {
                        debug!(channel = %msg.channel, "feed: dropping message for another channel");
                    }
                }
                Some(open) = self.status.recv() => {
                    self.connected = open;
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.apply(command);
                }
                () = sleep_until(deadline) => {}
                permit = updates.reserve(), if unsent.is_some() => {
                    let Ok(permit) = permit else { break };
                    if let Some(update) = unsent.take() {
                        permit.send(update);
                    }
                    continue;
                }
                () = updates.closed() => break,
            }

            self.buffer.poll(now());

            let scroll = self.buffer.take_scroll_request();
            let current = Published {
                revision: self.buffer.revision(),
                connected: self.connected,
                channel: self.channel.clone(),
            };
            if scroll.is_none() && published.as_ref() == Some(&current) {
                continue;
            }
            let scroll = scroll.or_else(|| unsent.take().and_then(|stale| stale.scroll));
            unsent = Some(FeedUpdate {
                snapshot: self.buffer.snapshot(),
                connected: self.connected,
                channel: self.channel.clone(),
                scroll,
            });
            published = Some(current);
        }

        info!(channel = %self.channel, "feed: unmounted");
    }

    fn apply(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Scroll(viewport) => self.buffer.on_scroll(viewport, now()),
            FeedCommand::Resume => self.buffer.resume(now()),
            FeedCommand::SwitchChannel(name) => self.switch_channel(&name),
        }
    }

    fn switch_channel(&mut self, name: &str) {
        let channel = match normalize_channel(name) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "feed: ignoring channel switch");
                return;
            }
        };
        if channel == self.channel {
            return;
        }
        if let Err(e) = self.connection.connect(&channel) {
            warn!(error = %e, "feed: channel switch failed");
            return;
        }
        info!(from = %self.channel, to = %channel, "feed: switched channel");
        self.channel = channel;
        self.buffer.clear();
    }
}

/// Buffer time follows the tokio clock so paused-clock tests drive it.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;
