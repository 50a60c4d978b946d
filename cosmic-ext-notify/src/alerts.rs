//! Alert ledger and the sound pass
//!
//! Every scheduled arrival leaves an [`Alert`] entry keyed by its fire time.
//! When the clock fires, the entries that are due (plus those close enough to
//! be heard as the same alert) are consumed at once and produce at most one
//! sound.

use crate::types::{ConversationId, PeerId, Time};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub peer: PeerId,
    pub silent: bool,
}

/// Result of one alert pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertPass {
    /// At least one consumed alert wants a sound
    pub audible: bool,
    pub consumed: usize,
    pub distinct_peers: usize,
}

/// Pending alerts per conversation, ordered by fire time
#[derive(Debug, Default)]
pub struct AlertLedger {
    entries: BTreeMap<ConversationId, BTreeMap<Time, Vec<Alert>>>,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, conversation: ConversationId, fire_time: Time, alert: Alert) {
        self.entries
            .entry(conversation)
            .or_default()
            .entry(fire_time)
            .or_default()
            .push(alert);
    }

    pub fn remove_conversation(&mut self, conversation: ConversationId) {
        self.entries.remove(&conversation);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|by_time| by_time.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume every entry firing no later than `now + coalesce`
    pub fn pass(&mut self, now: Time, coalesce: Time) -> AlertPass {
        let limit = now.saturating_add(coalesce);
        let mut result = AlertPass::default();
        let mut peers = BTreeSet::new();

        self.entries.retain(|_, by_time| {
            while let Some(entry) = by_time.first_entry() {
                if *entry.key() > limit {
                    break;
                }
                for alert in entry.remove() {
                    result.consumed += 1;
                    result.audible |= !alert.silent;
                    peers.insert(alert.peer);
                }
            }
            !by_time.is_empty()
        });

        result.distinct_peers = peers.len();
        result
    }
}
