//! Lockstep Session — the per-party driver.
//!
//! Owns the current address and completion level, runs step callbacks,
//! consults step rules against the roster, and publishes lifecycle events and
//! outbound notifications.

pub mod application;
pub mod config;
pub mod domain;

pub use config::{ConfigError, SessionConfig};
pub use domain::game::{Game, GameBuilder, GameError, SessionPlan, SessionStager};
pub use domain::roster::{PartyRecord, Roster, RosterProgress, StageTrail};
