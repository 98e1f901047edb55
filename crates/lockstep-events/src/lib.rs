//! Lockstep Events — dual-scope event bus and replayable history.

pub mod emitter;
pub mod error;
pub mod history;

pub use emitter::{EmittedEvent, EmitterHost, EventEmitter, Handler, HandlerId, emit, remit};
pub use error::EventError;
pub use history::{EventHistory, EventRecord, ReplayFilter};
