//! Boundary with the transport and store collaborators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::Address;
use crate::level::CompletionLevel;
use crate::roster::PartyId;

/// State update exchanged between parties on every local transition.
///
/// `sequence` increases monotonically per sender; receivers drop anything at
/// or below the last sequence they applied for that sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNotification {
    /// The party whose state changed.
    pub sender: PartyId,
    /// Where the sender is.
    pub address: Address,
    /// How far the sender got with that step.
    pub completion: CompletionLevel,
    /// Per-sender ordering key.
    pub sequence: u64,
}

/// A value written by a step callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    /// Application key.
    pub key: String,
    /// Stored value.
    pub value: Value,
    /// Address of the step that wrote it.
    pub address: Address,
    /// The writing party.
    pub party: PartyId,
}

/// Outbound side of the transport.
pub trait Transport {
    /// Queues a notification for the other parties.
    fn send(&mut self, notification: StageNotification);
}

/// Write-only data store.
pub trait Store {
    /// Persists one record.
    fn write(&mut self, record: StoreRecord);
}

/// Transport that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, _notification: StageNotification) {}
}

/// Store that discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl Store for NullStore {
    fn write(&mut self, _record: StoreRecord) {}
}
