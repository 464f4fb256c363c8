//! Change log of store mutations.

use formsync_protocol::ChangeNotification;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A sequence-numbered log of mutations, consumed by the change detector.
///
/// # Invariants
///
/// - Sequence numbers start at 1 and strictly increase
/// - Notifications are kept in mutation order
/// - Acknowledged notifications are dropped and never returned again
/// - Sequence numbers keep increasing across a save and reload
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLog {
    entries: VecDeque<ChangeNotification>,
    next_sequence: u64,
    last_acked: u64,
}

impl ChangeLog {
    /// Creates an empty change log.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_sequence: 1,
            last_acked: 0,
        }
    }

    /// Appends a notification built from the next sequence number.
    ///
    /// Returns the assigned sequence number.
    pub fn record(&mut self, make: impl FnOnce(u64) -> ChangeNotification) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push_back(make(sequence));
        sequence
    }

    /// Returns the unacknowledged notifications for the given collections.
    pub fn since(&self, collections: &[&str]) -> Vec<ChangeNotification> {
        self.entries
            .iter()
            .filter(|c| collections.contains(&c.collection.as_str()))
            .cloned()
            .collect()
    }

    /// Drops every notification up to and including `sequence`.
    pub fn acknowledge_up_to(&mut self, sequence: u64) {
        while self
            .entries
            .front()
            .is_some_and(|c| c.sequence <= sequence)
        {
            self.entries.pop_front();
        }
        self.last_acked = self.last_acked.max(sequence);
    }

    /// Drops the notifications with the given sequence numbers, wherever
    /// they sit in the log.
    pub fn discard(&mut self, sequences: &[u64]) {
        self.entries.retain(|c| !sequences.contains(&c.sequence));
    }

    /// Returns the highest acknowledged sequence number.
    pub fn last_acknowledged(&self) -> u64 {
        self.last_acked
    }

    /// Returns the number of unacknowledged notifications.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is waiting to be acknowledged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}
