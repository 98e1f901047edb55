//! Recording collaborators: capture everything the session sends out.

use std::sync::{Arc, Mutex};

use lockstep_core::transport::{StageNotification, Store, StoreRecord, Transport};

/// A transport that records every outbound notification.
///
/// Clones share the same log, so a test keeps one handle and gives the other
/// to the session.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<StageNotification>>>,
}

impl RecordingTransport {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all notifications sent so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn sent(&self) -> Vec<StageNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, notification: StageNotification) {
        self.sent.lock().unwrap().push(notification);
    }
}

/// A store that records every write.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    records: Arc<Mutex<Vec<StoreRecord>>>,
}

impl RecordingStore {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all records written so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn records(&self) -> Vec<StoreRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl Store for RecordingStore {
    fn write(&mut self, record: StoreRecord) {
        self.records.lock().unwrap().push(record);
    }
}
