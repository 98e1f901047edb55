//! Command handlers for a running session.
//!
//! Each handler applies one externally delivered command to the local
//! [`Game`] and reports where the session ended up.

use lockstep_core::address::Address;
use lockstep_core::command::Command;
use lockstep_core::level::{CompletionLevel, EngineLevel};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::commands::{
    ApplyNotification, RemoteGameOver, RemoteGoto, RemoteStep, ReplayHistory,
};
use crate::domain::game::{Game, GameError};

/// Result of a successfully handled command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCommandResult {
    /// The handled command's correlation ID.
    pub correlation_id: Uuid,
    /// Address after the command.
    pub address: Address,
    /// Completion level after the command.
    pub completion: CompletionLevel,
    /// Engine level after the command.
    pub engine: EngineLevel,
    /// Whether the session moved to another address (or ended).
    pub advanced: bool,
}

fn result_of<S>(command: &impl Command, game: &Game<S>, transitions_before: u64) -> SessionCommandResult {
    SessionCommandResult {
        correlation_id: command.correlation_id(),
        address: game.address().clone(),
        completion: game.completion(),
        engine: game.engine_level(),
        advanced: game.transition_count() != transitions_before,
    }
}

/// Handles `ApplyNotification`: updates the roster and re-consults the step
/// rule. Stale notifications are ignored.
///
/// # Errors
///
/// Returns `GameError` if advancing fails in diagnostics mode.
#[instrument(skip_all, fields(party = ?command.issued_by(), sequence = command.notification.sequence))]
pub fn handle_apply_notification<S>(
    command: &ApplyNotification,
    game: &mut Game<S>,
) -> Result<SessionCommandResult, GameError> {
    debug!(correlation_id = %command.correlation_id, "handling apply_notification command");
    let before = game.transition_count();
    game.apply_notification(&command.notification)?;
    Ok(result_of(command, game, before))
}

/// Handles `RemoteStep`: advances regardless of the step rule.
///
/// # Errors
///
/// Returns `GameError::InvalidTransition` unless the session is running.
#[instrument(skip_all, fields(issued_by = %command.issued_by))]
pub fn handle_remote_step<S>(
    command: &RemoteStep,
    game: &mut Game<S>,
) -> Result<SessionCommandResult, GameError> {
    info!(correlation_id = %command.correlation_id, "handling remote_step command");
    let before = game.transition_count();
    game.step()?;
    Ok(result_of(command, game, before))
}

/// Handles `RemoteGoto`: jumps to the requested address.
///
/// # Errors
///
/// Returns `GameError::Navigation` if the address does not resolve.
#[instrument(skip_all, fields(issued_by = %command.issued_by, address = %command.address))]
pub fn handle_remote_goto<S>(
    command: &RemoteGoto,
    game: &mut Game<S>,
) -> Result<SessionCommandResult, GameError> {
    info!(correlation_id = %command.correlation_id, "handling remote_goto command");
    let before = game.transition_count();
    game.goto_step(&command.address)?;
    Ok(result_of(command, game, before))
}

/// Handles `RemoteGameOver`: ends the session.
///
/// # Errors
///
/// Returns `GameError::InvalidTransition` unless the session is running.
#[instrument(skip_all, fields(issued_by = %command.issued_by))]
pub fn handle_remote_game_over<S>(
    command: &RemoteGameOver,
    game: &mut Game<S>,
) -> Result<SessionCommandResult, GameError> {
    info!(correlation_id = %command.correlation_id, "handling remote_game_over command");
    let before = game.transition_count();
    game.game_over()?;
    Ok(result_of(command, game, before))
}

/// Handles `ReplayHistory`: re-emits the filtered records. `advanced`
/// reports a handler-driven transition during the replay.
///
/// # Errors
///
/// Returns `GameError::Event` if a handler fails.
#[instrument(skip_all)]
pub fn handle_replay_history<S>(
    command: &ReplayHistory,
    game: &mut Game<S>,
) -> Result<SessionCommandResult, GameError> {
    info!(correlation_id = %command.correlation_id, "handling replay_history command");
    let before = game.transition_count();
    let replayed = game.remit(&command.filter)?;
    debug!(replayed, "replay finished");
    Ok(result_of(command, game, before))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use lockstep_core::roster::PartyId;
    use lockstep_core::transport::StageNotification;
    use lockstep_events::ReplayFilter;
    use lockstep_plan::{StageDefinition, StepDefinition, StepRule};
    use serde_json::Value;
    use uuid::Uuid;

    use super::*;
    use crate::domain::game::{SessionPlan, SessionStager};

    fn plan(rule: StepRule) -> Arc<SessionPlan> {
        let mut stager = SessionStager::new();
        for name in ["a1", "a2"] {
            stager
                .add_step(StepDefinition::new(name, |_: &mut Game| Ok(true)))
                .unwrap();
        }
        stager
            .add_stage(StageDefinition::new("intro", ["a1", "a2"]))
            .unwrap();
        stager.set_default_step_rule(rule);
        stager.next("intro").unwrap();
        stager.gameover();
        stager.build().unwrap()
    }

    fn started(rule: StepRule) -> Game {
        let mut game = Game::new(plan(rule), ());
        game.start().unwrap();
        game
    }

    #[test]
    fn test_handle_apply_notification_advances_when_roster_catches_up() {
        // Arrange
        let mut game = started(StepRule::SyncStep);
        let remote = PartyId::random();
        game.roster_mut().join(remote);
        game.mark_done().unwrap();
        let command = ApplyNotification {
            correlation_id: Uuid::new_v4(),
            notification: StageNotification {
                sender: remote,
                address: Address::new(1, 1, 1),
                completion: CompletionLevel::Done,
                sequence: 1,
            },
        };

        // Act
        let result = handle_apply_notification(&command, &mut game).unwrap();

        // Assert
        assert!(result.advanced);
        assert_eq!(result.correlation_id, command.correlation_id);
        assert_eq!(result.address, Address::new(1, 2, 1));
        assert_eq!(result.completion, CompletionLevel::Playing);
    }

    #[test]
    fn test_handle_apply_notification_ignores_replayed_sequence() {
        // Arrange
        let mut game = started(StepRule::SyncStep);
        let remote = PartyId::random();
        let notification = StageNotification {
            sender: remote,
            address: Address::new(1, 1, 1),
            completion: CompletionLevel::Playing,
            sequence: 3,
        };
        let command = ApplyNotification {
            correlation_id: Uuid::new_v4(),
            notification,
        };
        handle_apply_notification(&command, &mut game).unwrap();

        // Act
        let result = handle_apply_notification(&command, &mut game).unwrap();

        // Assert
        assert!(!result.advanced);
        assert_eq!(game.roster().get(remote).unwrap().sequence, 3);
    }

    #[test]
    fn test_handle_remote_step_overrides_wait_rule() {
        let mut game = started(StepRule::Wait);
        let command = RemoteStep {
            correlation_id: Uuid::new_v4(),
            issued_by: PartyId::random(),
        };

        let result = handle_remote_step(&command, &mut game).unwrap();

        assert!(result.advanced);
        assert_eq!(result.address, Address::new(1, 2, 1));
    }

    #[test]
    fn test_handle_remote_goto_rejects_unknown_address() {
        let mut game = started(StepRule::Solo);
        let command = RemoteGoto {
            correlation_id: Uuid::new_v4(),
            issued_by: PartyId::random(),
            address: Address::named("missing", 1, 1),
        };

        let result = handle_remote_goto(&command, &mut game);

        assert!(matches!(result, Err(GameError::Navigation { .. })));
        assert_eq!(game.address(), &Address::new(1, 1, 1));
    }

    #[test]
    fn test_handle_remote_game_over_ends_session() {
        let mut game = started(StepRule::Solo);
        let command = RemoteGameOver {
            correlation_id: Uuid::new_v4(),
            issued_by: PartyId::random(),
        };

        let result = handle_remote_game_over(&command, &mut game).unwrap();

        assert_eq!(result.engine, EngineLevel::Over);
        assert!(result.advanced);
    }

    #[test]
    fn test_handle_replay_history_re_emits_filtered_events() {
        // Arrange
        let mut game = started(StepRule::Solo);
        game.emit("chat", vec![Value::from("hello")]).unwrap();
        game.emit("vote", vec![Value::from(2)]).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["chat", "vote"] {
            let seen = Arc::clone(&seen);
            game.on(name, move |_, event| {
                seen.lock().unwrap().push(event.name.clone());
                Ok(())
            });
        }
        let command = ReplayHistory {
            correlation_id: Uuid::new_v4(),
            filter: ReplayFilter::at(Address::new(1, 1, 1)).only(["vote"]),
        };

        // Act
        let result = handle_replay_history(&command, &mut game).unwrap();

        // Assert
        assert!(!result.advanced);
        assert_eq!(*seen.lock().unwrap(), ["vote"]);
    }
}
