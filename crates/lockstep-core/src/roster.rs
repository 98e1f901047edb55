//! Remote party identity and the roster query used by step rules.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;

/// Identifier of a party taking part in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub Uuid);

impl PartyId {
    /// Generates a fresh random party identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Read-only view over the last-known state of remote parties.
///
/// The roster is owned by the transport side; step rules only query it.
pub trait RosterView {
    /// True when every known remote party is done at `address` or already
    /// past it. Vacuously true for an empty roster.
    fn all_consistent_with(&self, address: &Address) -> bool;

    /// Number of known remote parties.
    fn party_count(&self) -> usize;
}
