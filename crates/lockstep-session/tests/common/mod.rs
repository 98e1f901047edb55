//! Shared fixtures for session integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use lockstep_core::address::Address;
use lockstep_core::clock::Clock;
use lockstep_core::level::CompletionLevel;
use lockstep_core::roster::PartyId;
use lockstep_core::transport::StageNotification;
use lockstep_plan::{NextStage, StageDefinition, StepDefinition, StepRule};
use lockstep_session::{Game, SessionConfig, SessionPlan, SessionStager};
use lockstep_test_support::{FixedClock, RecordingTransport};

/// Fixed timestamp used across all integration tests.
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::session_start())
}

/// A step whose callback does nothing.
pub fn noop_step(name: &str) -> StepDefinition<Game> {
    StepDefinition::new(name, |_: &mut Game| Ok(true))
}

/// Steps a1, a2 in stage `intro` and b1 in stage `body`, registered but not
/// yet sequenced.
pub fn intro_body_stager(rule: StepRule) -> SessionStager {
    let mut stager = SessionStager::new();
    for name in ["a1", "a2", "b1"] {
        stager.add_step(noop_step(name)).unwrap();
    }
    stager
        .add_stage(StageDefinition::new("intro", ["a1", "a2"]))
        .unwrap();
    stager.add_stage(StageDefinition::new("body", ["b1"])).unwrap();
    stager.set_default_step_rule(rule);
    stager
}

/// `intro` once, `body` twice, then game over.
pub fn intro_body_plan(rule: StepRule) -> Arc<SessionPlan> {
    let mut stager = intro_body_stager(rule);
    stager.next("intro").unwrap();
    stager.repeat("body", 2).unwrap();
    stager.gameover();
    stager.build().unwrap()
}

/// Flexible plan: `zeta` under `Solo`, then `alpha` under `SyncStep`, then
/// game over. Stage names sort opposite to the order they run in.
pub fn zeta_alpha_plan() -> Arc<SessionPlan> {
    let mut stager = SessionStager::new();
    for name in ["z1", "a1"] {
        stager.add_step(noop_step(name)).unwrap();
    }
    stager
        .add_stage(StageDefinition::new("zeta", ["z1"]).with_rule(StepRule::Solo))
        .unwrap();
    stager
        .add_stage(StageDefinition::new("alpha", ["a1"]).with_rule(StepRule::SyncStep))
        .unwrap();
    stager.register_general_next(|_| NextStage::from("zeta"));
    stager
        .register_next("zeta", |_| NextStage::from("alpha"))
        .unwrap();
    stager
        .register_next("alpha", |_| NextStage::GameOver)
        .unwrap();
    stager.build().unwrap()
}

/// A notification from `sender`.
pub fn notification(
    sender: PartyId,
    address: Address,
    completion: CompletionLevel,
    sequence: u64,
) -> StageNotification {
    StageNotification {
        sender,
        address,
        completion,
        sequence,
    }
}

/// A game wired to a recording transport and the fixed clock.
pub fn recorded_game(plan: Arc<SessionPlan>) -> (Game, RecordingTransport) {
    let transport = RecordingTransport::new();
    let game = Game::builder(plan, ())
        .config(SessionConfig::default())
        .transport(transport.clone())
        .clock(fixed_clock())
        .build();
    (game, transport)
}

/// Delivers notifications one party sent since `cursor` to another party.
pub struct Link {
    from: RecordingTransport,
    cursor: usize,
}

impl Link {
    pub fn new(from: &RecordingTransport) -> Self {
        Self {
            from: from.clone(),
            cursor: 0,
        }
    }

    /// Pending notifications, oldest first.
    pub fn drain(&mut self) -> Vec<StageNotification> {
        let sent = self.from.sent();
        let pending = sent[self.cursor..].to_vec();
        self.cursor = sent.len();
        pending
    }
}

/// Exchanges notifications between two games until both links are quiet.
pub fn pump(a: &mut Game, to_a: &mut Link, b: &mut Game, to_b: &mut Link) {
    loop {
        let for_a = to_a.drain();
        let for_b = to_b.drain();
        if for_a.is_empty() && for_b.is_empty() {
            return;
        }
        for notification in &for_a {
            a.apply_notification(notification).unwrap();
        }
        for notification in &for_b {
            b.apply_notification(notification).unwrap();
        }
    }
}
