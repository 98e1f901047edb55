//! Last-known state of the remote parties.
//!
//! Remote addresses are normalized on arrival. Index majors follow the
//! declared sequence and compare directly; named majors (flexible plans) are
//! ranked by the [`StageTrail`] of stage rounds the local party entered,
//! since stage names say nothing about the order stages run in.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use lockstep_core::address::{Address, Coord};
use lockstep_core::level::CompletionLevel;
use lockstep_core::roster::{PartyId, RosterView};
use lockstep_core::transport::StageNotification;
use serde::Serialize;
use tracing::debug;

/// What the local party knows about one remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyRecord {
    /// The remote party.
    pub party: PartyId,
    /// Its last reported address.
    pub address: Address,
    /// Its last reported completion level.
    pub completion: CompletionLevel,
    /// Sequence of the last applied notification; 0 before any.
    pub sequence: u64,
}

impl PartyRecord {
    /// True when this party is done at `address` or already past it.
    #[must_use]
    pub fn consistent_with(&self, address: &Address, trail: &StageTrail) -> bool {
        match trail.compare(&self.address, address) {
            Ordering::Greater => true,
            Ordering::Equal => self.completion == CompletionLevel::Done,
            Ordering::Less => false,
        }
    }
}

/// Stage rounds entered by the local party, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTrail {
    entered: Vec<(String, u32)>,
}

impl StageTrail {
    /// Creates an empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records entering `address`. Index majors are ignored.
    pub fn enter(&mut self, address: &Address) {
        let Coord::Name(stage) = &address.major else {
            return;
        };
        let round = (stage.clone(), address.repetition);
        if self.entered.last() != Some(&round) {
            self.entered.push(round);
        }
    }

    /// Orders two normalized addresses by progress through the session.
    ///
    /// A named stage round the local party has not entered yet ranks after
    /// every entered one. The unresolved address precedes everything.
    #[must_use]
    pub fn compare(&self, a: &Address, b: &Address) -> Ordering {
        match (a.major.as_name(), b.major.as_name()) {
            (Some(_), Some(_)) => self
                .rank(a)
                .cmp(&self.rank(b))
                .then_with(|| a.minor.as_index().cmp(&b.minor.as_index())),
            (None, Some(_)) if a.is_zero() => Ordering::Less,
            (Some(_), None) if b.is_zero() => Ordering::Greater,
            _ => Address::compare(a, b),
        }
    }

    /// Number of stage rounds entered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entered.len()
    }

    /// True before any named stage was entered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty()
    }

    fn rank(&self, address: &Address) -> usize {
        self.entered
            .iter()
            .rposition(|(stage, round)| {
                address.major.as_name() == Some(stage.as_str()) && *round == address.repetition
            })
            .unwrap_or(self.entered.len())
    }
}

/// Remote parties keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    parties: BTreeMap<PartyId, PartyRecord>,
}

impl Roster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a party that has not reported yet. Returns false if it was
    /// already known.
    pub fn join(&mut self, party: PartyId) -> bool {
        if self.parties.contains_key(&party) {
            return false;
        }
        self.parties.insert(
            party,
            PartyRecord {
                party,
                address: Address::zero(),
                completion: CompletionLevel::NotStarted,
                sequence: 0,
            },
        );
        true
    }

    /// Applies a notification, adding the sender if unknown.
    ///
    /// Returns false, changing nothing, when the notification is not newer
    /// than the last one applied for that sender.
    pub fn apply(&mut self, notification: &StageNotification) -> bool {
        if let Some(record) = self.parties.get(&notification.sender)
            && notification.sequence <= record.sequence
        {
            debug!(
                party = %notification.sender,
                sequence = notification.sequence,
                applied = record.sequence,
                "stale notification"
            );
            return false;
        }
        self.parties.insert(
            notification.sender,
            PartyRecord {
                party: notification.sender,
                address: notification.address.clone(),
                completion: notification.completion,
                sequence: notification.sequence,
            },
        );
        true
    }

    /// Forgets a party.
    pub fn remove(&mut self, party: PartyId) -> Option<PartyRecord> {
        self.parties.remove(&party)
    }

    /// Looks up a party.
    #[must_use]
    pub fn get(&self, party: PartyId) -> Option<&PartyRecord> {
        self.parties.get(&party)
    }

    /// All records, ordered by party id.
    pub fn records(&self) -> impl Iterator<Item = &PartyRecord> {
        self.parties.values()
    }

    /// Number of known parties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parties.len()
    }

    /// True when no remote party is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    /// The roster as step rules see it, ordered by `trail`.
    #[must_use]
    pub fn progress<'a>(&'a self, trail: &'a StageTrail) -> RosterProgress<'a> {
        RosterProgress {
            roster: self,
            trail,
        }
    }
}

/// A [`Roster`] paired with the local [`StageTrail`].
#[derive(Debug, Clone, Copy)]
pub struct RosterProgress<'a> {
    roster: &'a Roster,
    trail: &'a StageTrail,
}

impl RosterView for RosterProgress<'_> {
    fn all_consistent_with(&self, address: &Address) -> bool {
        self.roster
            .records()
            .all(|record| record.consistent_with(address, self.trail))
    }

    fn party_count(&self) -> usize {
        self.roster.len()
    }
}
