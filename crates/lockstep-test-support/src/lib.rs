//! Shared test doubles for Lockstep sessions.

mod clock;
mod predicate;
mod roster;
mod transport;

pub use clock::FixedClock;
pub use predicate::true_times;
pub use roster::StaticRoster;
pub use transport::{RecordingStore, RecordingTransport};
