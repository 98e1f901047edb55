//! Lockstep Plan — staging, navigation, and advancement rules.
//!
//! A [`Stager`] collects steps, stages, and a sequence and builds an immutable
//! [`Plan`]. A [`GameLoop`] walks the plan address by address, and a
//! [`StepRule`] decides when a party may move on.

pub mod game_loop;
pub mod plan;
pub mod stager;
pub mod step_rules;

pub use game_loop::{Destination, GameLoop};
pub use plan::{
    BlockSummary, LifecycleCallback, LoopPredicate, NextStage, Plan, PlanSummary, Properties,
    SequenceBlock, Sequencing, SequencingMode, Stage, StageResolver, StageSummary, Step,
    StepCallback,
};
pub use stager::{
    SequenceEntry, StageDefinition, StageInput, StagePatch, Stager, StagerState, StepDefinition,
    StepPatch,
};
pub use step_rules::{RuleContext, RuleFn, StepRule};
