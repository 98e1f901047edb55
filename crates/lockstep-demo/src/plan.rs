//! The sample plan run by the demo.

use std::sync::Arc;

use lockstep_core::error::ConfigurationError;
use lockstep_plan::{StageDefinition, StepDefinition, StepRule};
use lockstep_session::{Game, SessionPlan, SessionStager};
use serde_json::Value;
use tracing::info;

/// What the moderator keeps between steps.
#[derive(Debug, Default)]
pub struct Tally {
    /// Completed rounds.
    pub rounds: u32,
}

/// `lobby`, then `round` repeated `rounds` times, then `debrief` and game
/// over. Only the lobby lets the moderator run ahead of the other parties.
pub fn sample_plan(rounds: u32) -> Result<Arc<SessionPlan<Tally>>, ConfigurationError> {
    let mut stager = SessionStager::new();

    stager.add_stage(
        StepDefinition::new("lobby", |game: &mut Game<Tally>| {
            info!(parties = game.roster().len(), "lobby open");
            Ok(true)
        })
        .with_rule(StepRule::Solo),
    )?;
    stager.add_step(
        StepDefinition::new("decide", |game: &mut Game<Tally>| {
            let round = game.address().repetition;
            game.store("decision", Value::from(round % 2 == 0));
            Ok(true)
        })
        .with_property("timer_ms", 200),
    )?;
    stager.add_step(StepDefinition::new("reveal", |game: &mut Game<Tally>| {
        game.data_mut().rounds += 1;
        Ok(true)
    }))?;
    stager.add_stage(StageDefinition::new("round", ["decide", "reveal"]))?;
    stager.add_stage(StepDefinition::new("debrief", |game: &mut Game<Tally>| {
        info!(rounds = game.data().rounds, "debriefing");
        Ok(true)
    }))?;

    stager.set_default_step_rule(StepRule::SyncStep);
    stager.set_on_gameover(|game: &mut Game<Tally>| {
        info!(rounds = game.data().rounds, "session finished");
        Ok(())
    });

    stager.next("lobby")?;
    stager.repeat("round", rounds)?;
    stager.next("debrief")?;
    stager.gameover();
    stager.build()
}
