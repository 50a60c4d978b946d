//! Waiter Registry
//!
//! Holds at most one pending [`Waiter`] per conversation, plus the parked
//! messages whose skip policy could not be decided yet. Live waiters are the
//! only entries the alert clock ever looks at.
//!
//! A waiter announces the newest message it absorbed. Older messages stay in
//! the waiter so that deleting the newest one falls back to the previous one,
//! and so that the "(+K more)" count and forwarded runs can be rendered.

use crate::config::EngineConfig;
use crate::skip::{SkipState, SkipValue};
use crate::types::{ConversationId, IncomingMessage, MsgId, PeerId, Time};
use crate::{NotifyError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Message absorbed into a waiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub message: IncomingMessage,
    pub arrival: Time,
    /// Skip policy asked for no sound
    pub silent: bool,
}

/// Next pending alert of one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waiter {
    pub conversation: ConversationId,
    /// When the alert fires
    pub due: Time,
    /// Arrival of the first absorbed message
    pub first_arrival: Time,
    /// Latest permitted due time
    pub due_limit: Time,
    /// Due time was pushed back by a follow-up message
    pub extended: bool,
    messages: Vec<Pending>,
}

impl Waiter {
    /// Message the alert announces (the newest one absorbed)
    pub fn message(&self) -> &IncomingMessage {
        // Waiters are never left empty: see `WaiterRegistry::remove_message`.
        &self.messages[self.messages.len() - 1].message
    }

    /// Sender of the announced message
    pub fn notifying_peer(&self) -> PeerId {
        self.message().sender
    }

    /// Number of messages absorbed besides the announced one
    pub fn absorbed(&self) -> usize {
        self.messages.len() - 1
    }

    /// Silent only when every absorbed message is silent
    pub fn silent(&self) -> bool {
        self.messages.iter().all(|p| p.silent)
    }

    pub fn messages(&self) -> &[Pending] {
        &self.messages
    }

    pub fn contains(&self, msg: MsgId) -> bool {
        self.messages.iter().any(|p| p.message.id == msg)
    }

    /// Length of the trailing run of forwarded messages from the announced sender
    ///
    /// Consecutive entries belong to the run when their origin dates are less
    /// than `proximity_ms` apart.
    pub fn forwarded_run(&self, proximity_ms: Time) -> u32 {
        let last = self.message();
        if !last.forwarded {
            return 0;
        }

        let mut count = 1;
        let mut newer = last;
        for pending in self.messages.iter().rev().skip(1) {
            let older = &pending.message;
            if !older.forwarded
                || older.sender != last.sender
                || newer.date.abs_diff(older.date) >= proximity_ms
            {
                break;
            }
            count += 1;
            newer = older;
        }
        count
    }
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// New waiter due at the contained time
    Created(Time),
    /// Existing waiter moved to the contained due time
    Extended(Time),
}

impl Upserted {
    pub fn due(&self) -> Time {
        match self {
            Upserted::Created(due) | Upserted::Extended(due) => *due,
        }
    }
}

/// Outcome of re-running the skip policy over one waiter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reevaluation {
    pub kept: usize,
    pub dropped: usize,
    pub parked: usize,
    /// Nothing was kept, the waiter is gone
    pub removed: bool,
}

/// Per-conversation pending-alert state
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    waiters: BTreeMap<ConversationId, Waiter>,
    parked: BTreeMap<ConversationId, Vec<Pending>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announced message, creating or extending its conversation's waiter
    pub fn upsert(
        &mut self,
        message: IncomingMessage,
        arrival: Time,
        silent: bool,
        config: &EngineConfig,
    ) -> Upserted {
        let conversation = message.conversation;
        let pending = Pending {
            message,
            arrival,
            silent,
        };

        if let Some(waiter) = self.waiters.get_mut(&conversation) {
            let wanted = waiter.due.max(arrival + config.grouping_window_ms);
            let due = wanted.min(waiter.due_limit);
            if due != waiter.due {
                waiter.extended = true;
            }
            waiter.due = due;
            waiter.messages.push(pending);
            debug!(
                "Extended waiter for {} to {} ({} absorbed)",
                conversation,
                due,
                waiter.absorbed()
            );
            return Upserted::Extended(due);
        }

        let due_limit = arrival + config.max_grouping_window_ms;
        let due = (arrival + config.initial_delay(pending.message.forwarded)).min(due_limit);
        debug!("New waiter for {} due at {}", conversation, due);
        self.waiters.insert(
            conversation,
            Waiter {
                conversation,
                due,
                first_arrival: arrival,
                due_limit,
                extended: false,
                messages: vec![pending],
            },
        );
        Upserted::Created(due)
    }

    /// Drop the conversation's waiter and parked messages
    pub fn remove(&mut self, conversation: ConversationId) -> Option<Waiter> {
        self.parked.remove(&conversation);
        self.waiters.remove(&conversation)
    }

    /// Forget one message; returns true when the live waiter disappeared
    pub fn remove_message(&mut self, conversation: ConversationId, msg: MsgId) -> bool {
        self.retain_messages(conversation, |id| id != msg)
    }

    /// Forget every message up to and including `up_to`
    pub fn remove_read(&mut self, conversation: ConversationId, up_to: MsgId) -> bool {
        self.retain_messages(conversation, |id| id > up_to)
    }

    fn retain_messages(
        &mut self,
        conversation: ConversationId,
        keep: impl Fn(MsgId) -> bool,
    ) -> bool {
        if let Some(parked) = self.parked.get_mut(&conversation) {
            parked.retain(|p| keep(p.message.id));
            if parked.is_empty() {
                self.parked.remove(&conversation);
            }
        }

        let Some(waiter) = self.waiters.get_mut(&conversation) else {
            return false;
        };
        waiter.messages.retain(|p| keep(p.message.id));
        if waiter.messages.is_empty() {
            self.waiters.remove(&conversation);
            return true;
        }
        false
    }

    /// Re-run `evaluate` over every message of the conversation's waiter
    ///
    /// Skipped messages are dropped, undecided ones are parked, the rest keep
    /// the waiter alive with their silent flag refreshed. The due time is not
    /// touched.
    pub fn reevaluate(
        &mut self,
        conversation: ConversationId,
        mut evaluate: impl FnMut(&IncomingMessage) -> SkipState,
    ) -> Reevaluation {
        let mut result = Reevaluation::default();
        let Some(mut waiter) = self.waiters.remove(&conversation) else {
            return result;
        };

        let mut undecided = Vec::new();
        waiter.messages.retain_mut(|pending| {
            let state = evaluate(&pending.message);
            match state.value {
                SkipValue::DontSkip => {
                    pending.silent = state.silent;
                    result.kept += 1;
                    true
                }
                SkipValue::Skip => {
                    result.dropped += 1;
                    false
                }
                SkipValue::Unknown => {
                    undecided.push(pending.clone());
                    false
                }
            }
        });

        result.parked = undecided.len();
        for pending in undecided {
            self.park(pending.message, pending.arrival);
        }

        if waiter.messages.is_empty() {
            result.removed = true;
        } else {
            self.waiters.insert(conversation, waiter);
        }
        result
    }

    /// Earliest-due waiter; ties go to the lower conversation identifier
    pub fn peek_earliest(&self) -> Option<&Waiter> {
        self.waiters.values().min_by_key(|w| (w.due, w.conversation))
    }

    /// Remove the earliest waiter if it is due at `now`
    pub fn pop_due(&mut self, now: Time) -> Option<Waiter> {
        let conversation = self
            .peek_earliest()
            .filter(|w| w.due <= now)
            .map(|w| w.conversation)?;
        self.waiters.remove(&conversation)
    }

    /// Remove every waiter due at `now`, ordered by due time then conversation
    pub fn take_due(&mut self, now: Time) -> Vec<Waiter> {
        let due: Vec<ConversationId> = self
            .waiters
            .values()
            .filter(|w| w.due <= now)
            .map(|w| w.conversation)
            .collect();

        let mut taken: Vec<Waiter> = due
            .into_iter()
            .filter_map(|c| self.waiters.remove(&c))
            .collect();
        taken.sort_by_key(|w| (w.due, w.conversation));
        taken
    }

    /// Earliest due time among waiters that were extended by grouping
    pub fn earliest_extended_due(&self) -> Option<Time> {
        self.waiters
            .values()
            .filter(|w| w.extended)
            .map(|w| w.due)
            .min()
    }

    pub fn get(&self, conversation: ConversationId) -> Option<&Waiter> {
        self.waiters.get(&conversation)
    }

    /// Take a waiter out regardless of its due time (re-evaluation)
    pub fn take(&mut self, conversation: ConversationId) -> Option<Waiter> {
        self.waiters.remove(&conversation)
    }

    /// Put a waiter back unchanged
    pub fn restore(&mut self, waiter: Waiter) {
        self.waiters.insert(waiter.conversation, waiter);
    }

    pub fn conversations(&self) -> Vec<ConversationId> {
        self.waiters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waiter> {
        self.waiters.values()
    }

    /// Hold a message until its skip policy can be decided
    pub fn park(&mut self, message: IncomingMessage, arrival: Time) {
        debug!("Parking {} until settings are known", message.full_id());
        self.parked
            .entry(message.conversation)
            .or_default()
            .push(Pending {
                message,
                arrival,
                silent: false,
            });
    }

    pub fn take_parked(&mut self, conversation: ConversationId) -> Vec<Pending> {
        self.parked.remove(&conversation).unwrap_or_default()
    }

    pub fn take_all_parked(&mut self) -> Vec<Pending> {
        std::mem::take(&mut self.parked)
            .into_values()
            .flatten()
            .collect()
    }

    pub fn parked_len(&self) -> usize {
        self.parked.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.waiters.clear();
        self.parked.clear();
    }

    /// Check the structural invariants of every live waiter
    pub fn verify(&self) -> Result<()> {
        for (conversation, waiter) in &self.waiters {
            if waiter.messages.is_empty() {
                return Err(NotifyError::InvariantViolation(format!(
                    "empty waiter registered for {}",
                    conversation
                )));
            }
            if waiter.conversation != *conversation
                || waiter
                    .messages
                    .iter()
                    .any(|p| p.message.conversation != *conversation)
            {
                return Err(NotifyError::InvariantViolation(format!(
                    "waiter filed under {} holds a foreign message",
                    conversation
                )));
            }
            if waiter.due > waiter.due_limit {
                return Err(NotifyError::InvariantViolation(format!(
                    "waiter for {} due at {} past its limit {}",
                    conversation, waiter.due, waiter.due_limit
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(conversation: u64, id: i64) -> IncomingMessage {
        IncomingMessage::new(ConversationId(conversation), MsgId(id), PeerId(conversation * 10))
    }

    #[test]
    fn test_create_uses_minimum_delay() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();

        let result = registry.upsert(message(1, 1), 1000, false, &config);
        assert_eq!(result, Upserted::Created(1100));

        let mut forwarded = message(2, 1);
        forwarded.forwarded = true;
        let result = registry.upsert(forwarded, 1000, false, &config);
        assert_eq!(result, Upserted::Created(1500));
    }

    #[test]
    fn test_extension_updates_peer_and_due() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        registry.upsert(message(1, 1), 0, false, &config);

        let mut follow_up = message(1, 2);
        follow_up.sender = PeerId(77);
        let result = registry.upsert(follow_up, 50, false, &config);

        assert_eq!(result, Upserted::Extended(1550));
        let waiter = registry.get(ConversationId(1)).unwrap();
        assert_eq!(waiter.notifying_peer(), PeerId(77));
        assert_eq!(waiter.absorbed(), 1);
        assert!(waiter.extended);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_extension_is_bounded() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        registry.upsert(message(1, 1), 0, false, &config);

        for i in 2..50 {
            let result = registry.upsert(message(1, i), (i as u64) * 400, false, &config);
            assert!(result.due() <= config.max_grouping_window_ms);
        }
        assert_eq!(registry.get(ConversationId(1)).unwrap().due, 5000);
        assert!(registry.verify().is_ok());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        registry.upsert(message(1, 1), 0, false, &config);

        assert!(registry.remove(ConversationId(1)).is_some());
        assert!(registry.remove(ConversationId(1)).is_none());
        assert!(!registry.remove_message(ConversationId(1), MsgId(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_message_falls_back_to_previous() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        registry.upsert(message(1, 1), 0, false, &config);
        registry.upsert(message(1, 2), 10, false, &config);

        assert!(!registry.remove_message(ConversationId(1), MsgId(2)));
        assert_eq!(registry.get(ConversationId(1)).unwrap().message().id, MsgId(1));

        assert!(registry.remove_message(ConversationId(1), MsgId(1)));
        assert!(registry.get(ConversationId(1)).is_none());
    }

    #[test]
    fn test_peek_tie_breaks_on_conversation() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        registry.upsert(message(5, 1), 0, false, &config);
        registry.upsert(message(3, 1), 0, false, &config);

        assert_eq!(registry.peek_earliest().unwrap().conversation, ConversationId(3));
        assert!(registry.pop_due(50).is_none());
        assert_eq!(registry.pop_due(100).unwrap().conversation, ConversationId(3));
    }

    #[test]
    fn test_take_due_ordering() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        registry.upsert(message(1, 1), 50, false, &config);
        registry.upsert(message(2, 1), 50, false, &config);
        registry.upsert(message(3, 1), 0, false, &config);
        registry.upsert(message(4, 1), 5000, false, &config);

        let order: Vec<u64> = registry.take_due(200).iter().map(|w| w.conversation.0).collect();
        assert_eq!(order, vec![3, 1, 2]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_forwarded_run() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        for (id, date) in [(1, 0), (2, 500), (3, 1000)] {
            let mut m = message(1, id);
            m.forwarded = true;
            m.date = date;
            registry.upsert(m, 0, false, &config);
        }
        let waiter = registry.get(ConversationId(1)).unwrap();
        assert_eq!(waiter.forwarded_run(config.forward_proximity_ms()), 3);
        assert_eq!(waiter.forwarded_run(400), 1);
    }

    #[test]
    fn test_parked_messages() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        registry.park(message(1, 1), 0);
        registry.park(message(1, 2), 5);
        assert_eq!(registry.parked_len(), 2);
        assert!(registry.peek_earliest().is_none());

        registry.remove_message(ConversationId(1), MsgId(1));
        let parked = registry.take_parked(ConversationId(1));
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].message.id, MsgId(2));

        registry.upsert(message(2, 1), 0, false, &config);
        registry.park(message(2, 2), 0);
        registry.remove(ConversationId(2));
        assert_eq!(registry.parked_len(), 0);
    }

    #[test]
    fn test_reevaluate_splits_messages() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        for id in 1..=3 {
            registry.upsert(message(1, id), 0, false, &config);
        }
        let due = registry.get(ConversationId(1)).unwrap().due;

        let result = registry.reevaluate(ConversationId(1), |m| match m.id.0 {
            1 => SkipState::SKIP,
            2 => SkipState::UNKNOWN,
            _ => SkipState::dont_skip(true),
        });

        assert_eq!(
            result,
            Reevaluation {
                kept: 1,
                dropped: 1,
                parked: 1,
                removed: false
            }
        );
        let waiter = registry.get(ConversationId(1)).unwrap();
        assert_eq!(waiter.due, due);
        assert!(waiter.silent());
        assert_eq!(registry.parked_len(), 1);

        let result = registry.reevaluate(ConversationId(1), |_| SkipState::SKIP);
        assert!(result.removed);
        assert!(registry.is_empty());
        assert_eq!(registry.reevaluate(ConversationId(1), |_| SkipState::SKIP), Reevaluation::default());
    }

    #[test]
    fn test_remove_read() {
        let config = EngineConfig::default();
        let mut registry = WaiterRegistry::new();
        registry.upsert(message(1, 1), 0, false, &config);
        registry.upsert(message(1, 2), 0, false, &config);
        registry.upsert(message(1, 3), 0, false, &config);

        assert!(!registry.remove_read(ConversationId(1), MsgId(2)));
        assert_eq!(registry.get(ConversationId(1)).unwrap().absorbed(), 0);
        assert!(registry.remove_read(ConversationId(1), MsgId(3)));
    }
}
