//! Session configuration read from the environment.

use lockstep_core::roster::PartyId;
use thiserror::Error;
use uuid::Uuid;

/// Escalate callback and handler failures instead of logging them.
pub const DIAGNOSTICS_VAR: &str = "LOCKSTEP_DIAGNOSTICS";
/// Keep an event history for replay.
pub const RECORD_HISTORY_VAR: &str = "LOCKSTEP_RECORD_HISTORY";
/// Local party identifier (a UUID).
pub const PARTY_ID_VAR: &str = "LOCKSTEP_PARTY_ID";

/// A variable that is set but cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{var} has invalid value {value:?}: {reason}")]
pub struct ConfigError {
    /// The offending variable.
    pub var: &'static str,
    /// Its raw value.
    pub value: String,
    /// What was expected.
    pub reason: &'static str,
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Callback errors become fatal.
    pub diagnostics: bool,
    /// Emits are appended to an event history.
    pub record_history: bool,
    /// Identity used in outbound notifications and store records.
    pub party_id: PartyId,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            diagnostics: false,
            record_history: true,
            party_id: PartyId::random(),
        }
    }
}

impl SessionConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first variable with an unusable
    /// value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`; unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// As [`SessionConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(DIAGNOSTICS_VAR) {
            config.diagnostics = parse_flag(DIAGNOSTICS_VAR, value)?;
        }
        if let Some(value) = lookup(RECORD_HISTORY_VAR) {
            config.record_history = parse_flag(RECORD_HISTORY_VAR, value)?;
        }
        if let Some(value) = lookup(PARTY_ID_VAR) {
            let id = Uuid::parse_str(value.trim()).map_err(|_| ConfigError {
                var: PARTY_ID_VAR,
                value,
                reason: "expected a UUID",
            })?;
            config.party_id = PartyId(id);
        }
        Ok(config)
    }
}

fn parse_flag(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var,
            value,
            reason: "expected a boolean",
        }),
    }
}
