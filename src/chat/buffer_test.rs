use super::*;
use time::OffsetDateTime;

fn msg(id: impl Into<String>) -> Arc<ChatMessage> {
    Arc::new(ChatMessage {
        id: id.into(),
        channel: "bar".into(),
        author: "Foo".into(),
        color: "#FFFFFF".into(),
        badge_tags: String::new(),
        body: "hi".into(),
        emotes: Vec::new(),
        timestamp: OffsetDateTime::UNIX_EPOCH,
    })
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn ids(buffer: &MessageBuffer) -> Vec<String> {
    buffer.snapshot().visible_messages.iter().map(|m| m.id.clone()).collect()
}

fn far() -> Viewport {
    Viewport { scroll_top: 0.0, scroll_height: 2000.0, client_height: 500.0 }
}

fn near() -> Viewport {
    Viewport { scroll_top: 1450.0, scroll_height: 2000.0, client_height: 500.0 }
}

/// Fill the visible list with `count` messages and let the scroll guard lapse.
/// Returns the instant after which the buffer is idle.
fn settle_live(buffer: &mut MessageBuffer, t0: Instant, count: usize) -> Instant {
    for i in 0..count {
        buffer.push(msg(format!("seed-{i}")), t0);
    }
    buffer.poll(t0 + ms(250));
    buffer.take_scroll_request();
    let idle = t0 + ms(600);
    buffer.poll(idle);
    idle
}

/// Scroll away and wait out the debounce.
fn pause_at(buffer: &mut MessageBuffer, now: Instant) -> Instant {
    buffer.on_scroll(far(), now);
    let paused = now + ms(150);
    buffer.poll(paused);
    assert!(buffer.is_paused());
    paused
}

// =============================================================================
// VIEWPORT / TIMER
// =============================================================================

#[test]
fn distance_from_bottom_never_negative() {
    assert_eq!(near().distance_from_bottom(), 50.0);
    let overscrolled = Viewport { scroll_top: 1600.0, scroll_height: 2000.0, client_height: 500.0 };
    assert_eq!(overscrolled.distance_from_bottom(), 0.0);
}

#[test]
fn timer_arm_replaces_and_fire_consumes() {
    let t0 = Instant::now();
    let mut timer = Timer::default();
    timer.arm(t0 + ms(100));
    timer.arm(t0 + ms(200));
    assert!(!timer.fire(t0 + ms(150)));
    assert!(timer.fire(t0 + ms(200)));
    assert!(!timer.fire(t0 + ms(300)));
}

#[test]
fn timer_arm_if_idle_keeps_first_deadline() {
    let t0 = Instant::now();
    let mut timer = Timer::default();
    timer.arm_if_idle(t0 + ms(100));
    timer.arm_if_idle(t0 + ms(500));
    assert_eq!(timer.deadline(), Some(t0 + ms(100)));
    timer.cancel();
    assert!(!timer.is_armed());
}

// =============================================================================
// LIVE BATCHING
// =============================================================================

#[test]
fn live_arrivals_wait_for_batch_window() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    buffer.push(msg("a"), t0);
    buffer.push(msg("b"), t0 + ms(100));
    buffer.push(msg("c"), t0 + ms(200));

    buffer.poll(t0 + ms(249));
    assert!(ids(&buffer).is_empty());
    assert_eq!(buffer.next_deadline(), Some(t0 + ms(250)));

    buffer.poll(t0 + ms(250));
    assert_eq!(ids(&buffer), vec!["a", "b", "c"]);
    assert_eq!(buffer.snapshot().unread_count, 0);
}

#[test]
fn flush_bumps_revision_once_per_batch() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let before = buffer.revision();
    for i in 0..10 {
        buffer.push(msg(i.to_string()), t0);
    }
    assert_eq!(buffer.revision(), before);
    buffer.poll(t0 + ms(250));
    assert_eq!(buffer.revision(), before + 1);
}

#[test]
fn visible_length_is_min_of_arrivals_and_capacity() {
    for n in [0_usize, 1, 50, 199, 200, 201, 500] {
        let t0 = Instant::now();
        let mut buffer = MessageBuffer::new(BufferConfig::default());
        for i in 0..n {
            buffer.push(msg(i.to_string()), t0);
        }
        buffer.poll(t0 + ms(250));

        let expected: Vec<String> = (n.saturating_sub(200)..n).map(|i| i.to_string()).collect();
        assert_eq!(ids(&buffer), expected, "n = {n}");
    }
}

#[test]
fn eviction_spans_batches_oldest_first() {
    let config = BufferConfig { capacity: 5, ..BufferConfig::default() };
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(config);
    for i in 0..4 {
        buffer.push(msg(i.to_string()), t0);
    }
    buffer.poll(t0 + ms(250));
    for i in 4..8 {
        buffer.push(msg(i.to_string()), t0 + ms(300));
    }
    buffer.poll(t0 + ms(550));
    assert_eq!(ids(&buffer), vec!["3", "4", "5", "6", "7"]);
}

#[test]
fn duplicate_ids_are_processed_once() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    assert!(buffer.push(msg("42"), t0));
    assert!(!buffer.push(msg("42"), t0));
    buffer.poll(t0 + ms(250));
    assert!(!buffer.push(msg("42"), t0 + ms(300)));
    buffer.poll(t0 + ms(600));
    assert_eq!(ids(&buffer), vec!["42"]);
}

#[test]
fn duplicates_while_paused_do_not_count_as_unread() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 3);
    let paused = pause_at(&mut buffer, idle);

    buffer.push(msg("x"), paused);
    buffer.push(msg("x"), paused);
    buffer.push(msg("seed-0"), paused);
    assert_eq!(buffer.snapshot().unread_count, 1);
}

// =============================================================================
// SCROLL EFFECTS
// =============================================================================

#[test]
fn small_buffer_scrolls_smoothly_large_one_snaps() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    for i in 0..10 {
        buffer.push(msg(i.to_string()), t0);
    }
    buffer.poll(t0 + ms(250));
    assert_eq!(buffer.take_scroll_request(), Some(ScrollRequest { smooth: true }));
    assert_eq!(buffer.take_scroll_request(), None);

    for i in 10..60 {
        buffer.push(msg(i.to_string()), t0 + ms(300));
    }
    buffer.poll(t0 + ms(550));
    assert_eq!(buffer.take_scroll_request(), Some(ScrollRequest { smooth: false }));
}

#[test]
fn scroll_reports_during_guard_are_deferred() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    buffer.push(msg("a"), t0);
    buffer.poll(t0 + ms(250));

    // The guard runs until t0 + 550; a report inside it cannot start the debounce.
    buffer.on_scroll(far(), t0 + ms(260));
    buffer.poll(t0 + ms(500));
    assert!(!buffer.is_paused());

    // Once the guard lapses the last report is evaluated and debounced.
    buffer.poll(t0 + ms(550));
    assert!(!buffer.is_paused());
    buffer.poll(t0 + ms(700));
    assert!(buffer.is_paused());
}

#[test]
fn deferred_report_near_bottom_keeps_live() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    buffer.push(msg("a"), t0);
    buffer.poll(t0 + ms(250));

    buffer.on_scroll(far(), t0 + ms(260));
    buffer.on_scroll(near(), t0 + ms(300));
    buffer.poll(t0 + ms(1000));
    assert!(!buffer.is_paused());
}

// =============================================================================
// PAUSE / RESUME
// =============================================================================

#[test]
fn pause_is_debounced_and_replaced_on_each_report() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 1);

    buffer.on_scroll(far(), idle);
    buffer.on_scroll(far(), idle + ms(100));
    buffer.poll(idle + ms(160));
    assert!(!buffer.is_paused(), "first debounce should have been replaced");

    buffer.poll(idle + ms(250));
    assert!(buffer.is_paused());
}

#[test]
fn returning_to_bottom_cancels_pending_pause() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 1);

    buffer.on_scroll(far(), idle);
    buffer.on_scroll(near(), idle + ms(50));
    buffer.poll(idle + ms(500));
    assert!(!buffer.is_paused());
}

#[test]
fn paused_arrivals_count_unread_and_leave_view_alone() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 10);
    let before = ids(&buffer);
    let paused = pause_at(&mut buffer, idle);

    for i in 0..37 {
        buffer.push(msg(format!("p-{i}")), paused + ms(i));
    }
    buffer.poll(paused + ms(5000));

    let snapshot = buffer.snapshot();
    assert!(snapshot.is_paused);
    assert_eq!(snapshot.unread_count, 37);
    assert_eq!(ids(&buffer), before);
    assert_eq!(buffer.take_scroll_request(), None);

    buffer.resume(paused + ms(6000));
    let snapshot = buffer.snapshot();
    assert!(!snapshot.is_paused);
    assert_eq!(snapshot.unread_count, 0);
    assert_eq!(snapshot.visible_messages.len(), 47);
    assert_eq!(snapshot.visible_messages.last().map(|m| m.id.as_str()), Some("p-36"));
    assert!(buffer.take_scroll_request().is_some());
}

#[test]
fn resume_respects_capacity_oldest_evicted() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 150);
    let paused = pause_at(&mut buffer, idle);

    for i in 0..120 {
        buffer.push(msg(format!("p-{i}")), paused);
    }
    buffer.resume(paused + ms(10));

    let visible = ids(&buffer);
    assert_eq!(visible.len(), 200);
    assert_eq!(visible[0], "seed-70");
    assert_eq!(visible[199], "p-119");
}

#[test]
fn scrolling_back_to_bottom_resumes() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 1);
    let paused = pause_at(&mut buffer, idle);
    buffer.push(msg("late"), paused);

    buffer.on_scroll(near(), paused + ms(20));
    assert!(!buffer.is_paused());
    assert_eq!(buffer.snapshot().unread_count, 0);
    assert_eq!(ids(&buffer), vec!["seed-0", "late"]);
}

#[test]
fn batch_in_flight_at_pause_keeps_arrival_order() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 1);

    buffer.push(msg("a"), idle);
    buffer.on_scroll(far(), idle + ms(10));
    buffer.poll(idle + ms(160));
    assert!(buffer.is_paused());
    assert_eq!(buffer.snapshot().unread_count, 1);

    buffer.push(msg("b"), idle + ms(200));
    buffer.poll(idle + ms(300));
    assert_eq!(ids(&buffer), vec!["seed-0"]);

    buffer.resume(idle + ms(400));
    assert_eq!(ids(&buffer), vec!["seed-0", "a", "b"]);
}

#[test]
fn resume_while_live_is_a_no_op() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    settle_live(&mut buffer, t0, 3);
    let revision = buffer.revision();
    buffer.resume(t0 + ms(700));
    assert_eq!(buffer.revision(), revision);
    assert_eq!(buffer.take_scroll_request(), None);
}

#[test]
fn clear_returns_to_empty_live() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 5);
    let paused = pause_at(&mut buffer, idle);
    buffer.push(msg("p"), paused);

    buffer.clear();
    let snapshot = buffer.snapshot();
    assert!(snapshot.visible_messages.is_empty());
    assert_eq!(snapshot.unread_count, 0);
    assert!(!snapshot.is_paused);
    assert_eq!(buffer.next_deadline(), None);

    // Ids are forgotten with the old channel.
    assert!(buffer.push(msg("p"), paused));
}

// =============================================================================
// SCROLLING AWAY UNDER TRAFFIC
// =============================================================================

/// One arrival every 100ms from `t0` through `end_ms`, polling every 50ms.
/// `report(ms)` says whether the user reports a far viewport at that step.
/// Returns how many scroll requests were raised after `quiet_after_ms`.
fn stream_with_reports(
    buffer: &mut MessageBuffer,
    t0: Instant,
    end_ms: u64,
    quiet_after_ms: u64,
    report: impl Fn(u64) -> bool,
) -> usize {
    let mut late_scrolls = 0;
    for step in 0..=end_ms / 50 {
        let at = step * 50;
        let now = t0 + ms(at);
        if at % 100 == 0 {
            buffer.push(msg(format!("m-{at}")), now);
        }
        if report(at) {
            buffer.on_scroll(far(), now);
        }
        buffer.poll(now);
        if buffer.take_scroll_request().is_some() && at > quiet_after_ms {
            late_scrolls += 1;
        }
    }
    late_scrolls
}

#[test]
fn scrolling_away_pauses_despite_steady_arrivals() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());

    // A report every 200ms leaves room for the debounce between reports.
    let late_scrolls = stream_with_reports(&mut buffer, t0, 3000, 700, |at| at >= 500 && (at - 500) % 200 == 0);

    let snapshot = buffer.snapshot();
    assert!(snapshot.is_paused, "flushes must not hold the scroll guard up forever");
    assert_eq!(late_scrolls, 0, "no pull to the bottom once paused");
    // Paused at 700ms: the open batch (600, 700) and every later arrival are unread.
    assert_eq!(snapshot.unread_count, 25);
    assert_eq!(snapshot.visible_messages.last().map(|m| m.id.as_str()), Some("m-500"));
}

#[test]
fn continuous_scrolling_is_not_pulled_back_and_pauses_when_it_stops() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());

    let late_scrolls = stream_with_reports(&mut buffer, t0, 3000, 550, |at| at >= 500);
    assert_eq!(late_scrolls, 0, "flushes while the user scrolls away must not snap to the bottom");
    assert!(!buffer.is_paused(), "each report replaces the pending pause");
    assert!(ids(&buffer).contains(&"m-2000".to_owned()), "arrivals keep landing in the list");

    buffer.poll(t0 + ms(3150));
    assert!(buffer.is_paused());
    buffer.push(msg("after"), t0 + ms(3200));
    assert_eq!(buffer.take_scroll_request(), None);
}

// =============================================================================
// STRESS
// =============================================================================

#[test]
fn sustained_arrivals_while_paused_stay_bounded() {
    let t0 = Instant::now();
    let mut buffer = MessageBuffer::new(BufferConfig::default());
    let idle = settle_live(&mut buffer, t0, 200);
    let paused = pause_at(&mut buffer, idle);

    for i in 0..100_000_u64 {
        buffer.push(msg(format!("s-{i}")), paused + ms(i / 10));
        assert!(buffer.pending.len() <= 200);
    }
    assert_eq!(buffer.snapshot().unread_count, 100_000);
    assert!(buffer.seen.order.len() <= 4096);

    buffer.resume(paused + ms(20_000));
    let visible = ids(&buffer);
    assert_eq!(visible.len(), 200);
    assert_eq!(visible[0], "s-99800");
    assert_eq!(visible[199], "s-99999");
}
