//! Lockstep Core — shared session abstractions.
//!
//! Addresses, completion levels, error types, and the collaborator traits
//! that the plan, event, and session crates agree on. No engine logic lives
//! here.

pub mod address;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod level;
pub mod roster;
pub mod transport;
