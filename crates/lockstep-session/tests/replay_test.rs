//! Reconnection replay through the recorded event history.

mod common;

use std::sync::{Arc, Mutex};

use lockstep_core::address::Address;
use lockstep_core::event::{STAGE_ACTIVE, STAGE_LOADED, STAGE_LOADING};
use lockstep_events::ReplayFilter;
use lockstep_plan::StepRule;
use serde_json::Value;

#[test]
fn test_replay_restores_handler_state_for_the_current_step() {
    // Arrange
    let (mut game, _out) = common::recorded_game(common::intro_body_plan(StepRule::Solo));
    game.start().unwrap();
    game.emit("question", vec![Value::from("left or right?")]).unwrap();
    game.emit("answer", vec![Value::from("left")]).unwrap();
    game.mark_done().unwrap();
    game.emit("answer", vec![Value::from("right")]).unwrap();
    let recorded = game.history().unwrap().len();

    let seen: Arc<Mutex<Vec<(String, Value)>>> = Arc::default();
    for name in ["question", "answer"] {
        let seen = Arc::clone(&seen);
        game.on(name, move |_, event| {
            let arg = event.arg(0).cloned().unwrap_or(Value::Null);
            seen.lock().unwrap().push((event.name.clone(), arg));
            Ok(())
        });
    }

    // Act
    let replayed = game
        .remit(
            &ReplayFilter::at(Address::new(1, 1, 1)).excluding([
                STAGE_LOADING,
                STAGE_LOADED,
                STAGE_ACTIVE,
            ]),
        )
        .unwrap();

    // Assert
    assert!(replayed);
    assert_eq!(
        *seen.lock().unwrap(),
        [
            ("question".to_owned(), Value::from("left or right?")),
            ("answer".to_owned(), Value::from("left")),
        ]
    );
    assert_eq!(game.history().unwrap().len(), recorded);
}

#[test]
fn test_replay_with_no_match_reports_nothing_done() {
    let (mut game, _out) = common::recorded_game(common::intro_body_plan(StepRule::Solo));
    game.start().unwrap();

    let replayed = game.remit(&ReplayFilter::all().only(["never-emitted"])).unwrap();

    assert!(!replayed);
}

#[test]
fn test_pruned_history_is_not_replayed() {
    // Arrange
    let (mut game, _out) = common::recorded_game(common::intro_body_plan(StepRule::Solo));
    game.start().unwrap();
    game.emit("answer", vec![Value::from(1)]).unwrap();
    let last = game.history().unwrap().records().last().unwrap().sequence;

    // Act
    let pruned = game.history_mut().unwrap().prune_before(last + 1);
    let replayed = game.remit(&ReplayFilter::all()).unwrap();

    // Assert
    assert!(pruned > 0);
    assert!(!replayed);
}
