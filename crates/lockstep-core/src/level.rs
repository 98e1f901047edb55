//! Engine and step completion levels.

use serde::{Deserialize, Serialize};

/// Progress of the current step on one party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionLevel {
    /// No step has been entered yet.
    #[default]
    NotStarted,
    /// The step callback is running.
    Loading,
    /// The step callback returned.
    Loaded,
    /// The step is live.
    Playing,
    /// The step is live but suspended.
    Paused,
    /// The party finished the step.
    Done,
}

/// Lifecycle of the whole session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineLevel {
    /// Constructed, not started.
    #[default]
    Uninitialized,
    /// Running the one-time setup.
    Initializing,
    /// Setup finished.
    Ready,
    /// Stepping through the plan.
    Running,
    /// Reached the end of the plan.
    Over,
    /// Halted by an escalated failure.
    Fatal,
}
