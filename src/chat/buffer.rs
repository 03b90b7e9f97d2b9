//! Message buffer and scroll controller — bounded, scroll-aware chat view.
//!
//! DESIGN
//! ======
//! Turns the unbounded arrival stream into a capped visible list plus a
//! LIVE/PAUSED state machine. The buffer is a pure state machine: time is
//! passed in, timers are plain deadlines it owns, and the driver asks
//! `next_deadline()` when to call `poll()` next. That keeps every timer
//! single-owner and makes the whole controller testable without a clock.
//!
//! STATES
//! ======
//! - LIVE: arrivals are coalesced for `batch_window`, then appended to the
//!   visible list, followed by a scroll-to-bottom request.
//! - PAUSED: arrivals go to the pending queue and bump `unread_count`.
//!
//! LIVE → PAUSED when the viewport sits farther than `pause_threshold` from
//! the bottom for `pause_debounce`. PAUSED → LIVE when the viewport comes
//! back within the threshold or on `resume()`.
//!
//! While a programmatic scroll is in flight (`scroll_guard`), viewport
//! reports are held back and only the last one is evaluated once the guard
//! lapses, so auto-scroll never pauses the view by itself. The guard runs
//! from the first scroll request and is never pushed back by later flushes;
//! otherwise a steady stream of batches would keep it up forever.
//!
//! ORDERING
//! ========
//! Arrival order is the only order. A batch still waiting for its window
//! when the view pauses is moved to the front of the pending queue.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::message::ChatMessage;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferConfig {
    /// Most-recent messages kept visible.
    pub capacity: usize,
    /// Messages held while paused; oldest dropped first.
    pub pending_capacity: usize,
    pub batch_window: Duration,
    /// Pixels from the bottom beyond which the view counts as scrolled away.
    pub pause_threshold: f64,
    pub pause_debounce: Duration,
    /// Auto-scroll animates only below this many visible messages.
    pub smooth_scroll_limit: usize,
    pub scroll_guard: Duration,
    /// Minimum number of recent ids remembered for de-duplication.
    pub dedupe_window: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            pending_capacity: 200,
            batch_window: Duration::from_millis(250),
            pause_threshold: 100.0,
            pause_debounce: Duration::from_millis(150),
            smooth_scroll_limit: 50,
            scroll_guard: Duration::from_millis(300),
            dedupe_window: 4096,
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollMode {
    Live,
    Paused,
}

/// Scroll geometry reported by the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl Viewport {
    #[must_use]
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

/// The render surface should move the viewport to the live edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrollRequest {
    pub smooth: bool,
}

/// Read-only view handed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSnapshot {
    pub visible_messages: Vec<Arc<ChatMessage>>,
    pub unread_count: usize,
    pub is_paused: bool,
}

/// A cancellable one-shot deadline. Arming replaces, never stacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn arm(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    /// Arm only if not already pending.
    pub fn arm_if_idle(&mut self, at: Instant) {
        self.deadline.get_or_insert(at);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Consume the timer if it is due at `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if at <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}

/// Bounded memory of recently seen message ids.
#[derive(Debug)]
struct SeenIds {
    window: usize,
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenIds {
    fn new(window: usize) -> Self {
        Self { window: window.max(1), ids: HashSet::new(), order: VecDeque::new() }
    }

    /// Record `id`; false if it was already remembered.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_owned());
        self.order.push_back(id.to_owned());
        while self.order.len() > self.window {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

// =============================================================================
// BUFFER
// =============================================================================

#[derive(Debug)]
pub struct MessageBuffer {
    config: BufferConfig,
    mode: ScrollMode,
    visible: VecDeque<Arc<ChatMessage>>,
    /// Current LIVE batch, waiting for `batch_window`.
    incoming: Vec<Arc<ChatMessage>>,
    pending: VecDeque<Arc<ChatMessage>>,
    unread: usize,
    seen: SeenIds,
    batch: Timer,
    debounce: Timer,
    guard: Timer,
    /// Last viewport reported while the guard was up.
    deferred: Option<Viewport>,
    scroll: Option<ScrollRequest>,
    revision: u64,
}

impl MessageBuffer {
    #[must_use]
    pub fn new(config: BufferConfig) -> Self {
        let window = config
            .dedupe_window
            .max(config.capacity.saturating_add(config.pending_capacity));
        Self {
            config,
            mode: ScrollMode::Live,
            visible: VecDeque::with_capacity(config.capacity),
            incoming: Vec::new(),
            pending: VecDeque::new(),
            unread: 0,
            seen: SeenIds::new(window),
            batch: Timer::default(),
            debounce: Timer::default(),
            guard: Timer::default(),
            deferred: None,
            scroll: None,
            revision: 0,
        }
    }

    /// Accept one arrival. Returns false for an id already processed.
    pub fn push(&mut self, message: Arc<ChatMessage>, now: Instant) -> bool {
        if !self.seen.insert(&message.id) {
            return false;
        }
        match self.mode {
            ScrollMode::Live => {
                self.incoming.push(message);
                self.batch.arm_if_idle(now + self.config.batch_window);
            }
            ScrollMode::Paused => {
                self.hold(message);
                self.unread = self.unread.saturating_add(1);
                self.revision += 1;
            }
        }
        true
    }

    /// Run every timer due at `now`.
    pub fn poll(&mut self, now: Instant) {
        if self.batch.fire(now) {
            self.flush_batch(now);
        }
        if self.guard.fire(now) {
            if let Some(viewport) = self.deferred.take() {
                self.evaluate(viewport, now);
            }
        }
        if self.debounce.fire(now) && self.mode == ScrollMode::Live {
            self.pause();
        }
    }

    /// Feed a scroll-position report from the render surface.
    pub fn on_scroll(&mut self, viewport: Viewport, now: Instant) {
        self.poll(now);
        if self.guard.is_armed() {
            self.deferred = Some(viewport);
            return;
        }
        self.evaluate(viewport, now);
    }

    /// Force PAUSED → LIVE: flush pending, reset unread, scroll to bottom.
    pub fn resume(&mut self, now: Instant) {
        self.debounce.cancel();
        self.deferred = None;
        if self.mode == ScrollMode::Live {
            return;
        }
        self.mode = ScrollMode::Live;
        let pending = std::mem::take(&mut self.pending);
        self.append(pending);
        self.unread = 0;
        self.revision += 1;
        self.request_scroll(now);
    }

    /// Drop everything and return to LIVE, as on a channel change.
    pub fn clear(&mut self) {
        self.mode = ScrollMode::Live;
        self.visible.clear();
        self.incoming.clear();
        self.pending.clear();
        self.unread = 0;
        self.seen.clear();
        self.batch.cancel();
        self.debounce.cancel();
        self.guard.cancel();
        self.deferred = None;
        self.scroll = None;
        self.revision += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            visible_messages: self.visible.iter().cloned().collect(),
            unread_count: self.unread,
            is_paused: self.is_paused(),
        }
    }

    /// Take the outstanding scroll effect, if any.
    pub fn take_scroll_request(&mut self) -> Option<ScrollRequest> {
        self.scroll.take()
    }

    /// Earliest instant at which `poll` has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.batch, self.debounce, self.guard]
            .iter()
            .filter_map(Timer::deadline)
            .min()
    }

    /// Bumped on every change visible through `snapshot()`.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.mode == ScrollMode::Paused
    }

    // -------------------------------------------------------------------------

    fn evaluate(&mut self, viewport: Viewport, now: Instant) {
        if viewport.distance_from_bottom() > self.config.pause_threshold {
            if self.mode == ScrollMode::Live {
                self.debounce.arm(now + self.config.pause_debounce);
            }
        } else {
            self.debounce.cancel();
            if self.mode == ScrollMode::Paused {
                self.resume(now);
            }
        }
    }

    fn pause(&mut self) {
        self.mode = ScrollMode::Paused;
        self.batch.cancel();
        let batch = std::mem::take(&mut self.incoming);
        self.unread = batch.len();
        for message in batch {
            self.hold(message);
        }
        self.revision += 1;
    }

    fn flush_batch(&mut self, now: Instant) {
        if self.incoming.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.incoming);
        self.append(batch);
        self.revision += 1;
        // The user is scrolling away; do not pull them back before the pause lands.
        if !self.debounce.is_armed() {
            self.request_scroll(now);
        }
    }

    fn append(&mut self, messages: impl IntoIterator<Item = Arc<ChatMessage>>) {
        for message in messages {
            self.visible.push_back(message);
        }
        while self.visible.len() > self.config.capacity {
            self.visible.pop_front();
        }
    }

    fn hold(&mut self, message: Arc<ChatMessage>) {
        self.pending.push_back(message);
        while self.pending.len() > self.config.pending_capacity {
            self.pending.pop_front();
        }
    }

    /// A guard already up is not extended, so under steady traffic it still
    /// lapses and the deferred report gets evaluated. A debounce armed by a
    /// real report is left running.
    fn request_scroll(&mut self, now: Instant) {
        let smooth = self.visible.len() < self.config.smooth_scroll_limit;
        self.scroll = Some(ScrollRequest { smooth });
        self.guard.arm_if_idle(now + self.config.scroll_guard);
    }
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod tests;
