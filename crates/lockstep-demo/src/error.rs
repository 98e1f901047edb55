//! Demo error types.

use lockstep_core::error::ConfigurationError;
use lockstep_session::{ConfigError, GameError};
use thiserror::Error;

/// Startup and runtime errors for the demo.
#[derive(Debug, Error)]
pub enum DemoError {
    /// A demo environment variable is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A session environment variable is invalid.
    #[error(transparent)]
    Session(#[from] ConfigError),

    /// The sample plan does not build.
    #[error("plan error: {0}")]
    Plan(#[from] ConfigurationError),

    /// The moderator's session failed.
    #[error("session error: {0}")]
    Game(#[from] GameError),

    /// A simulated party lost its channel.
    #[error("channel closed")]
    ChannelClosed,

    /// A simulated party task panicked or was cancelled.
    #[error("party task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Report serialization failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
