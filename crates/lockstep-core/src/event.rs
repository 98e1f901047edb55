//! Lifecycle event names published by the session driver.

/// Maximum number of payload arguments an event carries.
pub const MAX_EVENT_ARGS: usize = 3;

/// The engine started its one-time setup.
pub const ENGINE_INITIALIZING: &str = "engine:initializing";

/// Setup finished.
pub const ENGINE_READY: &str = "engine:ready";

/// The plan reached its terminal block.
pub const ENGINE_OVER: &str = "engine:over";

/// An escalated failure halted the session.
pub const ENGINE_FATAL: &str = "engine:fatal";

/// A step callback is about to run.
pub const STAGE_LOADING: &str = "stage:loading";

/// The step callback returned.
pub const STAGE_LOADED: &str = "stage:loaded";

/// The step is live.
pub const STAGE_ACTIVE: &str = "stage:active";

/// The local party finished the step.
pub const STAGE_DONE: &str = "stage:done";

/// The live step was suspended.
pub const STAGE_PAUSED: &str = "stage:paused";

/// The suspended step resumed.
pub const STAGE_RESUMED: &str = "stage:resumed";
