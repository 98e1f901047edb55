//! Query handlers for a running session.
//!
//! Read-only, serializable views over the driver and its plan.

use lockstep_core::address::Address;
use lockstep_core::level::{CompletionLevel, EngineLevel};
use lockstep_core::roster::PartyId;
use lockstep_plan::PlanSummary;
use serde::Serialize;

use crate::domain::game::Game;
use crate::domain::roster::PartyRecord;

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    /// The local party.
    pub party: PartyId,
    /// Normalized address.
    pub address: Address,
    /// Address with the stage name as major, rendered.
    pub label: String,
    /// Name of the current step, once one is bound.
    pub step: Option<String>,
    /// Local completion level.
    pub completion: CompletionLevel,
    /// Engine level.
    pub engine: EngineLevel,
    /// Last-known state of the remote parties.
    pub remote_parties: Vec<PartyRecord>,
    /// Number of recorded events (0 without history).
    pub recorded_events: usize,
}

/// Returns the current state of `game`.
#[must_use]
pub fn get_session_view<S>(game: &Game<S>) -> SessionView {
    SessionView {
        party: game.party_id(),
        address: game.address().clone(),
        label: game.labelled_address().to_string(),
        step: game.current_step().map(|step| step.name().to_owned()),
        completion: game.completion(),
        engine: game.engine_level(),
        remote_parties: game.roster().records().cloned().collect(),
        recorded_events: game.history().map_or(0, |history| history.len()),
    }
}

/// Returns the introspection summary of the plan `game` runs.
#[must_use]
pub fn get_plan_summary<S>(game: &Game<S>) -> PlanSummary {
    game.plan().summary()
}
