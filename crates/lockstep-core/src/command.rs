//! Commands delivered to a running session.

use uuid::Uuid;

use crate::roster::PartyId;

/// Trait that all session commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable command name for logging.
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the session.
    fn correlation_id(&self) -> Uuid;

    /// The party that issued the command, when it came over the transport.
    fn issued_by(&self) -> Option<PartyId> {
        None
    }
}
