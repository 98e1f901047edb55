//! End-to-end session flow through the public API.

mod common;

use lockstep_core::address::Address;
use lockstep_core::level::{CompletionLevel, EngineLevel};
use lockstep_core::roster::PartyId;
use lockstep_plan::StepRule;
use lockstep_session::application::command_handlers::handle_apply_notification;
use lockstep_session::application::query_handlers::get_session_view;
use lockstep_session::domain::commands::ApplyNotification;
use lockstep_session::Game;
use uuid::Uuid;

#[test]
fn test_solo_session_visits_every_step_then_ends() {
    // Arrange
    let mut game = Game::new(common::intro_body_plan(StepRule::Solo), ());

    // Act
    game.start().unwrap();
    let mut visited = vec![game.labelled_address().to_string()];
    while game.engine_level() == EngineLevel::Running {
        game.mark_done().unwrap();
        if game.engine_level() == EngineLevel::Running {
            visited.push(game.labelled_address().to_string());
        }
    }

    // Assert
    assert_eq!(visited, ["intro.1.1", "intro.2.1", "body.1.1", "body.1.2"]);
    assert_eq!(game.engine_level(), EngineLevel::Over);
}

#[test]
fn test_two_parties_advance_in_lockstep_under_sync_step() {
    // Arrange
    let (mut a, a_out) = common::recorded_game(common::intro_body_plan(StepRule::SyncStep));
    let (mut b, b_out) = common::recorded_game(common::intro_body_plan(StepRule::SyncStep));
    let mut to_a = common::Link::new(&b_out);
    let mut to_b = common::Link::new(&a_out);
    a.start().unwrap();
    b.start().unwrap();
    common::pump(&mut a, &mut to_a, &mut b, &mut to_b);

    // Act
    let a_advanced = a.mark_done().unwrap();
    common::pump(&mut a, &mut to_a, &mut b, &mut to_b);
    let a_after_own_done = a.address().clone();
    let b_advanced = b.mark_done().unwrap();
    common::pump(&mut a, &mut to_a, &mut b, &mut to_b);

    // Assert
    assert!(!a_advanced);
    assert_eq!(a_after_own_done, Address::new(1, 1, 1));
    assert!(b_advanced);
    assert_eq!(a.address(), &Address::new(1, 2, 1));
    assert_eq!(b.address(), &Address::new(1, 2, 1));
    assert_eq!(a.completion(), CompletionLevel::Playing);
}

#[test]
fn test_sync_stage_only_waits_at_stage_boundary() {
    // Arrange
    let (mut a, _a_out) = common::recorded_game(common::intro_body_plan(StepRule::SyncStage));
    a.roster_mut().join(PartyId::random());
    a.start().unwrap();

    // Act
    let first = a.mark_done().unwrap();
    let last = a.mark_done().unwrap();

    // Assert
    assert!(first);
    assert!(!last);
    assert_eq!(a.labelled_address().to_string(), "intro.2.1");
    assert_eq!(a.completion(), CompletionLevel::Done);
}

#[test]
fn test_notifications_through_command_handler_update_view() {
    // Arrange
    let (mut a, a_out) = common::recorded_game(common::intro_body_plan(StepRule::SyncStep));
    let (mut b, _b_out) = common::recorded_game(common::intro_body_plan(StepRule::SyncStep));
    a.start().unwrap();
    b.start().unwrap();
    a.mark_done().unwrap();

    // Act
    for notification in a_out.sent() {
        let command = ApplyNotification {
            correlation_id: Uuid::new_v4(),
            notification,
        };
        handle_apply_notification(&command, &mut b).unwrap();
    }
    let view = get_session_view(&b);

    // Assert
    assert_eq!(view.remote_parties.len(), 1);
    assert_eq!(view.remote_parties[0].party, a.party_id());
    assert_eq!(view.remote_parties[0].completion, CompletionLevel::Done);
    assert_eq!(view.label, "intro.1.1");
}

#[test]
fn test_flexible_sync_step_waits_for_party_still_in_earlier_stage() {
    // Arrange
    let (mut game, _out) = common::recorded_game(common::zeta_alpha_plan());
    let remote = PartyId::random();
    game.start().unwrap();
    game.apply_notification(&common::notification(
        remote,
        Address::named("zeta", 1, 1),
        CompletionLevel::Playing,
        1,
    ))
    .unwrap();
    assert!(game.mark_done().unwrap());
    assert_eq!(game.address(), &Address::named("alpha", 1, 1));

    // Act
    let while_behind = game.mark_done().unwrap();
    let once_caught_up = game
        .apply_notification(&common::notification(
            remote,
            Address::named("alpha", "a1", 1),
            CompletionLevel::Done,
            2,
        ))
        .unwrap();

    // Assert
    assert!(!while_behind);
    assert!(once_caught_up);
    assert_eq!(game.engine_level(), EngineLevel::Over);
}

#[test]
fn test_flexible_sync_step_passes_party_already_in_later_stage() {
    // Arrange
    let (mut game, _out) = common::recorded_game(common::zeta_alpha_plan());
    let remote = PartyId::random();
    game.start().unwrap();
    game.mark_done().unwrap();

    // Act
    game.apply_notification(&common::notification(
        remote,
        Address::named("zeta", 1, 1),
        CompletionLevel::Done,
        1,
    ))
    .unwrap();
    let behind = game.mark_done().unwrap();
    let ahead = game
        .apply_notification(&common::notification(
            remote,
            Address::named("alpha", 1, 2),
            CompletionLevel::Loading,
            2,
        ))
        .unwrap();

    // Assert
    assert!(!behind);
    assert!(ahead);
}

#[test]
fn test_named_remote_addresses_are_normalized_before_comparison() {
    // Arrange
    let (mut game, _out) = common::recorded_game(common::intro_body_plan(StepRule::SyncStep));
    let remote = PartyId::random();
    game.start().unwrap();
    game.apply_notification(&common::notification(
        remote,
        Address::named("intro", "a1", 1),
        CompletionLevel::Done,
        1,
    ))
    .unwrap();

    // Act
    let first = game.mark_done().unwrap();
    let second = game.mark_done().unwrap();
    let unknown = game
        .apply_notification(&common::notification(
            remote,
            Address::named("nowhere", 1, 1),
            CompletionLevel::Done,
            2,
        ))
        .unwrap();
    let recorded = game.roster().get(remote).unwrap().clone();
    let caught_up = game
        .apply_notification(&common::notification(
            remote,
            Address::named("intro", "a2", 1),
            CompletionLevel::Done,
            3,
        ))
        .unwrap();

    // Assert
    assert!(first);
    assert!(!second);
    assert!(!unknown);
    assert_eq!(recorded.address, Address::new(1, 1, 1));
    assert_eq!(recorded.sequence, 1);
    assert!(caught_up);
    assert_eq!(game.labelled_address().to_string(), "body.1.1");
}
