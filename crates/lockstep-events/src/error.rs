//! Event emitter errors.

use lockstep_core::error::CallbackError;
use lockstep_core::event::MAX_EVENT_ARGS;
use thiserror::Error;

/// Failure while emitting or replaying an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The payload exceeds [`MAX_EVENT_ARGS`] slots.
    #[error("event {name} carries {count} arguments; at most {MAX_EVENT_ARGS} are allowed")]
    TooManyArgs {
        /// The event name.
        name: String,
        /// Number of arguments supplied.
        count: usize,
    },

    /// A handler failed; remaining handlers for the event were not run.
    #[error("handler for {event} failed: {source}")]
    Handler {
        /// The event being dispatched.
        event: String,
        /// The handler's error.
        #[source]
        source: CallbackError,
    },
}
