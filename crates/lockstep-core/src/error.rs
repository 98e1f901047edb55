//! Error types shared across the engine.

use thiserror::Error;

use crate::address::Address;

/// A plan definition that cannot be built.
///
/// Raised synchronously while staging; construction of the plan is aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A step or stage name is empty, padded, or contains the alias keyword.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// A step with this name is already registered.
    #[error("duplicate step: {0}")]
    DuplicateStep(String),

    /// A stage with this name is already registered.
    #[error("duplicate stage: {0}")]
    DuplicateStage(String),

    /// A stage references a step that was never added.
    #[error("stage {stage} references unknown step {step}")]
    UnknownStep {
        /// The referencing stage.
        stage: String,
        /// The missing step.
        step: String,
    },

    /// An operation names a step that was never added.
    #[error("unknown step: {0}")]
    UnknownStepName(String),

    /// An operation names a stage that was never added.
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    /// A stage has no steps left to run.
    #[error("stage {0} has no steps")]
    EmptyStage(String),

    /// The resolved stage name already occurs in the sequence.
    #[error("stage {0} already appears in the sequence; add it under an alias")]
    DuplicateSequenceEntry(String),

    /// An alias shadows an existing stage.
    #[error("alias {alias} for stage {stage} collides with an existing stage")]
    AliasCollision {
        /// The aliased stage.
        stage: String,
        /// The rejected alias.
        alias: String,
    },

    /// A repeat block with fewer than one round.
    #[error("stage {stage} cannot repeat {count} times")]
    InvalidRepeatCount {
        /// The repeated stage.
        stage: String,
        /// The rejected count.
        count: u32,
    },

    /// A sequence entry that is not `name` or `name AS alias`.
    #[error("malformed sequence entry: {0:?}")]
    MalformedEntry(String),

    /// Sequence blocks and runtime resolvers were both registered.
    #[error("plan mixes a declared sequence with runtime resolvers")]
    MixedSequencing,
}

/// Why an address could not be navigated.
///
/// Navigation never fails loudly: this travels inside a sentinel result and
/// callers treat it as "no progress".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// The major component does not name a stage or block of the plan.
    #[error("{0} does not resolve to a stage of the plan")]
    UnknownStage(Address),

    /// The minor component does not name a step of the stage.
    #[error("{0} does not resolve to a step of its stage")]
    UnknownStep(Address),

    /// There is nothing before this address.
    #[error("cannot step back from {0}")]
    NoPrevious(Address),

    /// Resolver-driven plans keep no backward path.
    #[error("cannot step back from {0} in a flexible plan")]
    FlexibleBackwards(Address),

    /// A runtime resolver picked a stage that does not exist.
    #[error("resolver chose unknown stage {0}")]
    UnknownResolvedStage(String),
}

/// Failure reported by a step callback or an event handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    /// Creates an error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self(message)
    }
}
