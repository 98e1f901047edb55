//! Test roster: a `RosterView` with a canned answer.

use lockstep_core::address::Address;
use lockstep_core::roster::RosterView;

/// A roster of `parties` remote parties that are either all caught up or all
/// lagging, whatever the address.
#[derive(Debug, Clone, Copy)]
pub struct StaticRoster {
    parties: usize,
    caught_up: bool,
}

impl StaticRoster {
    /// Every party is done at or past any address.
    #[must_use]
    pub fn caught_up(parties: usize) -> Self {
        Self {
            parties,
            caught_up: true,
        }
    }

    /// Every party is behind. An empty lagging roster is still vacuously
    /// consistent.
    #[must_use]
    pub fn lagging(parties: usize) -> Self {
        Self {
            parties,
            caught_up: false,
        }
    }
}

impl RosterView for StaticRoster {
    fn all_consistent_with(&self, _address: &Address) -> bool {
        self.caught_up || self.parties == 0
    }

    fn party_count(&self) -> usize {
        self.parties
    }
}
