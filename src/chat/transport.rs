//! Socket transport seam for the connection manager.
//!
//! DESIGN
//! ======
//! The manager only needs a sink of outbound text frames and a stream of
//! inbound text payloads. `WebSocketTransport` provides both over
//! `tokio-tungstenite`; tests plug in an in-memory transport instead.
//! WebSocket-level ping/pong is answered by tungstenite itself and never
//! surfaces here; protocol-level `PING` lines do.

use std::pin::Pin;

use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use super::ChatError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = ChatError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket to `url`, returning its outbound and inbound halves.
    async fn open(&self, url: &str) -> Result<(FrameSink, FrameStream), ChatError>;
}

// =============================================================================
// WEBSOCKET
// =============================================================================

pub struct WebSocketTransport;

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<(FrameSink, FrameStream), ChatError> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| ChatError::Connect(Box::new(e)))?;
        let (sink, stream) = socket.split();

        let sink = sink
            .with(|line: String| future::ready(Ok::<_, tungstenite::Error>(Message::text(line))))
            .sink_map_err(|e| ChatError::Socket(Box::new(e)));

        let stream = stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec()).ok().map(Ok),
                Ok(_) => None,
                Err(e) => Some(Err(ChatError::Socket(Box::new(e)))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

// =============================================================================
// TEST TRANSPORT
// =============================================================================

#[cfg(test)]
pub mod testing {
    //! In-memory transport. Each `open` hands the test a `MemorySession`
    //! holding the server side of the socket.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::channel::mpsc as fmpsc;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;

    pub struct MemoryTransport {
        sessions: mpsc::UnboundedSender<MemorySession>,
        refusals: AtomicUsize,
    }

    /// Server side of one opened socket.
    pub struct MemorySession {
        sent: fmpsc::UnboundedReceiver<String>,
        inbound: fmpsc::UnboundedSender<Result<String, ChatError>>,
    }

    impl MemoryTransport {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<MemorySession>) {
            let (sessions, rx) = mpsc::unbounded_channel();
            (Self { sessions, refusals: AtomicUsize::new(0) }, rx)
        }

        /// Make the next `count` opens fail.
        pub fn refuse_next(&self, count: usize) {
            self.refusals.store(count, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl Transport for MemoryTransport {
        async fn open(&self, _url: &str) -> Result<(FrameSink, FrameStream), ChatError> {
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ChatError::Transport("connection refused".into()));
            }

            let (sent_tx, sent) = fmpsc::unbounded();
            let (inbound, inbound_rx) = fmpsc::unbounded();
            self.sessions
                .send(MemorySession { sent, inbound })
                .map_err(|_| ChatError::Transport("test harness gone".into()))?;

            let sink = sent_tx.sink_map_err(|e| ChatError::Transport(e.to_string()));
            Ok((Box::pin(sink), Box::pin(inbound_rx)))
        }
    }

    impl MemorySession {
        /// Next frame the client sent, or `None` once the client closed.
        pub async fn next_sent(&mut self) -> Option<String> {
            timeout(Duration::from_secs(5), self.sent.next())
                .await
                .expect("timed out waiting for a client frame")
        }

        /// A client frame that has already arrived, without waiting.
        pub fn try_next_sent(&mut self) -> Option<String> {
            self.sent.try_next().ok().flatten()
        }

        /// Collect the next `count` client frames.
        pub async fn take_sent(&mut self, count: usize) -> Vec<String> {
            let mut frames = Vec::with_capacity(count);
            for _ in 0..count {
                frames.push(self.next_sent().await.expect("client closed the socket"));
            }
            frames
        }

        /// Deliver a payload from the server.
        pub fn push(&self, payload: &str) {
            let _ = self.inbound.unbounded_send(Ok(payload.to_owned()));
        }

        /// Deliver a socket error from the server.
        pub fn fail(&self, reason: &str) {
            let _ = self.inbound.unbounded_send(Err(ChatError::Transport(reason.to_owned())));
        }
    }
}
