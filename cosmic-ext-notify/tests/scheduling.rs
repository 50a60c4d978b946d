//! Scheduling Scenario Tests
//!
//! Exercises the engine end to end against a recording backend:
//! - waiter uniqueness and the grouping bound
//! - idempotent invalidation
//! - skip consistency
//! - deterministic flush order and timer re-arming
//! - forwarded-run coalescing

mod common;

use common::{forwarded, message, Call, Harness};
use cosmic_ext_notify::{
    Capabilities, ConversationId, EngineConfig, FullMsgId, MsgId, MuteState, PeerId,
};

/// At most one waiter per conversation after arbitrary arrivals and removals
#[test]
fn test_at_most_one_waiter_per_conversation() {
    let mut harness = Harness::new();
    let mut seed: u64 = 0x2545_f491;
    let mut now = 0;

    for id in 1..400 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let conversation = (seed >> 33) % 5 + 1;
        now += (seed >> 40) % 120;

        match (seed >> 20) % 7 {
            0 => harness
                .engine
                .clear_from_conversation(ConversationId(conversation)),
            1 => harness
                .engine
                .clear_from_item(ConversationId(conversation), MsgId(id - 1)),
            _ => harness.arrive(message(conversation, id, conversation * 10), now),
        }

        assert!(harness.engine.verify().is_ok());
        for c in 1..=5 {
            let waiters = harness
                .engine
                .registry()
                .iter()
                .filter(|w| w.conversation == ConversationId(c))
                .count();
            assert!(waiters <= 1);
        }
    }
}

/// Follow-ups extend a waiter but never past first arrival + maximum window
#[test]
fn test_grouping_bound() {
    let mut harness = Harness::new();
    let config = EngineConfig::default();

    harness.engine.schedule(message(1, 1, 10), 1000);
    for i in 2..30 {
        let at = 1000 + (i as u64) * 300;
        harness.engine.schedule(message(1, i, 10), at);
        let waiter = harness.engine.registry().get(ConversationId(1)).unwrap();
        assert!(waiter.due <= 1000 + config.max_grouping_window_ms);
        if at >= 1000 + config.max_grouping_window_ms {
            break;
        }
    }

    let waiter = harness.engine.registry().get(ConversationId(1)).unwrap();
    assert_eq!(waiter.due, 1000 + config.max_grouping_window_ms);
    assert_eq!(waiter.first_arrival, 1000);
}

/// Clearing a conversation twice looks the same as clearing it once
#[test]
fn test_idempotent_clear() {
    let snapshot = |harness: &Harness| {
        (
            harness.engine.registry().len(),
            harness.engine.registry().parked_len(),
            harness.engine.dispatcher().shown_len(),
            harness.engine.pending_alerts(),
            harness.engine.next_deadline(),
        )
    };

    let mut once = Harness::new();
    let mut twice = Harness::new();
    for harness in [&mut once, &mut twice] {
        harness.arrive(message(1, 1, 10), 0);
        harness.advance(100);
        harness.arrive(message(1, 2, 10), 200);
        harness.arrive(message(2, 1, 20), 210);
    }

    once.engine.clear_from_conversation(ConversationId(1));
    twice.engine.clear_from_conversation(ConversationId(1));
    twice.engine.clear_from_conversation(ConversationId(1));

    assert_eq!(snapshot(&once), snapshot(&twice));
    assert_eq!(once.engine.wait_deadline(), Some(310));
    assert_eq!(once.engine.dispatcher().shown_len(), 0);
}

/// A message skipped at enqueue time never reaches the backend
#[test]
fn test_skip_consistency() {
    let mut harness = Harness::new();
    harness.session.set_mute(ConversationId(3), MuteState::Muted);

    let mut outgoing = message(1, 1, 1);
    outgoing.outgoing = true;

    assert!(harness.engine.schedule(message(3, 1, 30), 0).is_skip());
    assert!(harness.engine.schedule(outgoing, 0).is_skip());
    harness.arrive(message(2, 1, 20), 10);
    harness.advance(60_000);

    assert_eq!(harness.shown_conversations(), vec![2]);
}

/// show_grouped dispatches by due time, then by conversation identifier
#[test]
fn test_deterministic_flush_order() {
    let config = EngineConfig {
        minimum_delay_ms: 50,
        ..Default::default()
    };
    let mut harness = Harness::with_config(config, Capabilities::FULL);

    // C due at 50, A and B due at 100
    harness.engine.schedule(message(3, 1, 30), 0);
    harness.engine.schedule(message(2, 1, 20), 50);
    harness.engine.schedule(message(1, 1, 10), 50);

    let report = harness.engine.show_grouped(100);

    assert_eq!(report.shown, 3);
    assert_eq!(harness.shown_conversations(), vec![3, 1, 2]);
    assert_eq!(harness.engine.next_deadline(), None);
}

/// A forwarded run split over three waiters ends up as one presentation
#[test]
fn test_forward_coalescing_across_waiters() {
    let mut harness = Harness::new();

    harness.arrive(forwarded(1, 1, 10, 0), 0);
    harness.advance(500);
    assert!(harness.log.borrow().shows().is_empty());

    harness.arrive(forwarded(1, 2, 10, 600), 600);
    harness.arrive(forwarded(1, 3, 10, 1200), 1200);
    harness.advance(10_000);

    let log = harness.log.borrow();
    let shows = log.shows();
    assert_eq!(shows.len(), 1);
    assert_eq!(shows[0].forwarded_count, 3);
    assert_eq!(shows[0].body, "3 forwarded messages");
    assert_eq!(shows[0].msg, MsgId(3));
}

/// A forwarded run inside one waiter is presented once with its full count
#[test]
fn test_forward_run_in_single_waiter() {
    let mut harness = Harness::new();
    for (id, at) in [(1, 0), (2, 10), (3, 20)] {
        harness.arrive(forwarded(1, id, 10, at), at);
    }
    harness.advance(10_000);

    let log = harness.log.borrow();
    assert_eq!(log.shows().len(), 1);
    assert_eq!(log.shows()[0].forwarded_count, 3);
}

/// Forwarded messages from different senders are separate runs
#[test]
fn test_forward_runs_split_by_sender() {
    let mut harness = Harness::new();
    harness.arrive(forwarded(1, 1, 10, 0), 0);
    harness.advance(500);
    harness.arrive(forwarded(1, 2, 11, 600), 600);
    harness.advance(10_000);

    let log = harness.log.borrow();
    let counts: Vec<u32> = log.shows().iter().map(|p| p.forwarded_count).collect();
    assert_eq!(counts, vec![1, 1]);
}

/// After each firing the wait timer follows the next-earliest waiter
#[test]
fn test_scheduler_rearm() {
    let mut harness = Harness::new();
    harness.engine.schedule(message(1, 1, 10), 0);
    harness.engine.schedule(message(2, 1, 20), 50);
    harness.engine.schedule(message(3, 1, 30), 100);
    assert_eq!(harness.engine.wait_deadline(), Some(100));

    harness.engine.show_next(100);
    assert_eq!(harness.engine.wait_deadline(), Some(150));

    harness.engine.show_next(150);
    assert_eq!(harness.engine.wait_deadline(), Some(200));

    harness.engine.show_next(200);
    assert_eq!(harness.engine.wait_deadline(), None);
    assert_eq!(harness.shown_conversations(), vec![1, 2, 3]);
}

/// Removing the earliest waiter before it fires re-arms to the next one
#[test]
fn test_cancellation_rearms() {
    let mut harness = Harness::new();
    harness.engine.schedule(message(1, 1, 10), 0);
    harness.engine.schedule(message(2, 1, 20), 40);

    harness.engine.clear_from_conversation(ConversationId(1));
    assert_eq!(harness.engine.wait_deadline(), Some(140));

    harness.engine.clear_all();
    assert_eq!(harness.engine.next_deadline(), None);
    assert!(harness.log.borrow().calls.contains(&Call::ClearAll));
}

/// Backend refusal is reported and the next waiter still fires
#[test]
fn test_backend_failure_does_not_block_others() {
    let mut harness = Harness::new();
    harness.log.borrow_mut().rejected.insert(ConversationId(1));

    harness.engine.schedule(message(1, 1, 10), 0);
    harness.engine.schedule(message(2, 1, 20), 0);
    let report = harness.engine.on_timer(100);

    assert_eq!(report.failed(), 1);
    assert!(report.errors[0].is_backend_failure());
    assert_eq!(report.shown, 1);
    assert_eq!(harness.shown_conversations(), vec![2]);
}

/// A deleted message falls back to the previous one in its waiter
#[test]
fn test_deleted_message_before_fire() {
    let mut harness = Harness::new();
    harness.engine.schedule(message(1, 1, 10), 0);
    harness.engine.schedule(message(1, 2, 11), 20);

    harness.engine.clear_from_item(ConversationId(1), MsgId(2));
    harness.advance(10_000);

    let log = harness.log.borrow();
    let shows = log.shows();
    assert_eq!(shows.len(), 1);
    assert_eq!(shows[0].msg, MsgId(1));
    assert_eq!(shows[0].peer, PeerId(10));
}

/// Reading past a displayed alert dismisses it on a capable backend
#[test]
fn test_mark_read_clears_displayed_alert() {
    let mut harness = Harness::new();
    harness.arrive(message(1, 7, 10), 0);
    harness.advance(100);

    harness.engine.mark_read(ConversationId(1), MsgId(7), 150);

    assert!(harness
        .log
        .borrow()
        .calls
        .contains(&Call::ClearItem(FullMsgId::new(ConversationId(1), MsgId(7)))));
    assert_eq!(harness.engine.dispatcher().shown_len(), 0);
}
