//! Commands delivered to a running session from outside the local party.

use lockstep_core::address::Address;
use lockstep_core::command::Command;
use lockstep_core::roster::PartyId;
use lockstep_core::transport::StageNotification;
use lockstep_events::ReplayFilter;
use uuid::Uuid;

/// Command to apply a remote party's state update.
#[derive(Debug, Clone)]
pub struct ApplyNotification {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The received notification.
    pub notification: StageNotification,
}

impl Command for ApplyNotification {
    fn command_type(&self) -> &'static str {
        "session.apply_notification"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn issued_by(&self) -> Option<PartyId> {
        Some(self.notification.sender)
    }
}

/// Command from a moderator to advance the session.
#[derive(Debug, Clone)]
pub struct RemoteStep {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The issuing party.
    pub issued_by: PartyId,
}

impl Command for RemoteStep {
    fn command_type(&self) -> &'static str {
        "session.remote_step"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn issued_by(&self) -> Option<PartyId> {
        Some(self.issued_by)
    }
}

/// Command from a moderator to jump to an address.
#[derive(Debug, Clone)]
pub struct RemoteGoto {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The issuing party.
    pub issued_by: PartyId,
    /// Target address, by name or index.
    pub address: Address,
}

impl Command for RemoteGoto {
    fn command_type(&self) -> &'static str {
        "session.remote_goto"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn issued_by(&self) -> Option<PartyId> {
        Some(self.issued_by)
    }
}

/// Command from a moderator to end the session.
#[derive(Debug, Clone)]
pub struct RemoteGameOver {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The issuing party.
    pub issued_by: PartyId,
}

impl Command for RemoteGameOver {
    fn command_type(&self) -> &'static str {
        "session.remote_game_over"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn issued_by(&self) -> Option<PartyId> {
        Some(self.issued_by)
    }
}

/// Command to replay recorded events, e.g. after a reconnection.
#[derive(Debug, Clone)]
pub struct ReplayHistory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Which records to replay.
    pub filter: ReplayFilter,
}

impl Command for ReplayHistory {
    fn command_type(&self) -> &'static str {
        "session.replay_history"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
