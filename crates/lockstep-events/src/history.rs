//! Append-only log of emitted events.
//!
//! Each emit (when recording is enabled) lands here with the address that was
//! current when it fired. After a disconnect, the log is filtered and replayed
//! through [`remit`](crate::emitter::remit) to bring handlers back in sync.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lockstep_core::address::Address;
use lockstep_core::clock::Clock;
use serde::Serialize;
use serde_json::Value;

use crate::emitter::EmittedEvent;

/// One recorded emit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Position in the log, starting at 1.
    pub sequence: u64,
    /// The event name.
    pub name: String,
    /// Address current when the event fired.
    pub address: Address,
    /// Payload arguments.
    pub args: Vec<Value>,
    /// Wall-clock time of the emit.
    pub occurred_at: DateTime<Utc>,
}

impl EventRecord {
    fn to_event(&self) -> EmittedEvent {
        EmittedEvent {
            name: self.name.clone(),
            args: self.args.clone(),
        }
    }
}

/// Selects which records a replay re-emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayFilter {
    /// Only records fired at this address.
    pub address: Option<Address>,
    /// Event names never replayed.
    pub exclude: Vec<String>,
    /// When set, only these event names are replayed.
    pub include_only: Option<Vec<String>>,
}

impl ReplayFilter {
    /// Replays everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Replays records fired at `address`.
    #[must_use]
    pub fn at(address: Address) -> Self {
        Self {
            address: Some(address),
            ..Self::default()
        }
    }

    /// Adds names to skip.
    #[must_use]
    pub fn excluding<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Restricts the replay to the given names.
    #[must_use]
    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_only = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if `record` passes every criterion.
    #[must_use]
    pub fn matches(&self, record: &EventRecord) -> bool {
        if self.address.as_ref().is_some_and(|a| *a != record.address) {
            return false;
        }
        if self.exclude.iter().any(|name| *name == record.name) {
            return false;
        }
        self.include_only
            .as_ref()
            .is_none_or(|names| names.iter().any(|name| *name == record.name))
    }
}

/// The session's event log.
#[derive(Debug, Clone)]
pub struct EventHistory {
    records: Vec<EventRecord>,
    next_sequence: u64,
    clock: Arc<dyn Clock>,
}

impl EventHistory {
    /// Creates an empty log stamped by `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Vec::new(),
            next_sequence: 1,
            clock,
        }
    }

    /// Appends an event and returns its sequence number.
    pub fn record(&mut self, event: &EmittedEvent, address: Address) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records.push(EventRecord {
            sequence,
            name: event.name.clone(),
            address,
            args: event.args.clone(),
            occurred_at: self.clock.now(),
        });
        sequence
    }

    /// All records in append order.
    #[must_use]
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Number of records retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records fired at `address`, in order.
    pub fn records_at<'a>(&'a self, address: &'a Address) -> impl Iterator<Item = &'a EventRecord> {
        self.records.iter().filter(move |r| r.address == *address)
    }

    /// Records accepted by `filter`, in order.
    pub fn select<'a>(
        &'a self,
        filter: &'a ReplayFilter,
    ) -> impl Iterator<Item = &'a EventRecord> {
        self.records.iter().filter(move |r| filter.matches(r))
    }

    pub(crate) fn replay_set(&self, filter: &ReplayFilter) -> Vec<EmittedEvent> {
        self.select(filter).map(EventRecord::to_event).collect()
    }

    /// Drops every record. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Drops records older than `sequence` and returns how many were removed.
    pub fn prune_before(&mut self, sequence: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.sequence >= sequence);
        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_test_support::FixedClock;
    use serde_json::json;

    fn history() -> EventHistory {
        EventHistory::new(Arc::new(FixedClock::session_start()))
    }

    fn event(name: &str) -> EmittedEvent {
        EmittedEvent::new(name, vec![json!(name)]).unwrap()
    }

    #[test]
    fn test_record_assigns_increasing_sequence_numbers() {
        // Arrange
        let mut history = history();

        // Act
        let first = history.record(&event("a"), Address::new(1, 1, 1));
        let second = history.record(&event("b"), Address::new(1, 2, 1));

        // Assert
        assert_eq!((first, second), (1, 2));
        assert_eq!(history.len(), 2);
        assert_eq!(history.records()[1].name, "b");
        assert_eq!(history.records()[1].address, Address::new(1, 2, 1));
    }

    #[test]
    fn test_filter_combines_address_exclude_and_include() {
        // Arrange
        let mut history = history();
        history.record(&event("chat"), Address::new(1, 1, 1));
        history.record(&event("bid"), Address::new(1, 1, 1));
        history.record(&event("bid"), Address::new(2, 1, 1));
        history.record(&event("offer"), Address::new(1, 1, 1));

        // Act
        let at_first = ReplayFilter::at(Address::new(1, 1, 1)).excluding(["chat"]);
        let only_bids = ReplayFilter::all().only(["bid"]);

        // Assert
        let names: Vec<_> = history.select(&at_first).map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["bid", "offer"]);
        let sequences: Vec<_> = history.select(&only_bids).map(|r| r.sequence).collect();
        assert_eq!(sequences, [2, 3]);
    }

    #[test]
    fn test_prune_before_keeps_later_records() {
        // Arrange
        let mut history = history();
        for name in ["a", "b", "c"] {
            history.record(&event(name), Address::zero());
        }

        // Act
        let removed = history.prune_before(3);

        // Assert
        assert_eq!(removed, 2);
        assert_eq!(history.records()[0].name, "c");
    }

    #[test]
    fn test_clear_does_not_reuse_sequence_numbers() {
        // Arrange
        let mut history = history();
        history.record(&event("a"), Address::zero());

        // Act
        history.clear();
        let next = history.record(&event("b"), Address::zero());

        // Assert
        assert_eq!(next, 2);
        assert_eq!(history.len(), 1);
    }
}
