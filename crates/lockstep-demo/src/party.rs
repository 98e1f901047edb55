//! Channel-backed collaborators and the simulated remote parties.

use std::time::Duration;

use lockstep_core::level::CompletionLevel;
use lockstep_core::roster::PartyId;
use lockstep_core::transport::{StageNotification, Store, StoreRecord, Transport};
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::DemoError;

/// Publishes the moderator's notifications to every simulated party.
#[derive(Debug, Clone)]
pub struct BroadcastTransport(pub broadcast::Sender<StageNotification>);

impl Transport for BroadcastTransport {
    fn send(&mut self, notification: StageNotification) {
        if self.0.send(notification).is_err() {
            debug!("no party listening");
        }
    }
}

/// Logs every record written by a step.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStore;

impl Store for LogStore {
    fn write(&mut self, record: StoreRecord) {
        info!(key = %record.key, value = %record.value, address = %record.address, "stored");
    }
}

/// A remote party that finishes each step the moderator starts after a
/// random think time.
pub async fn run_party(
    party: PartyId,
    mut from_moderator: broadcast::Receiver<StageNotification>,
    to_moderator: mpsc::Sender<StageNotification>,
) -> Result<(), DemoError> {
    let mut sequence = 0;
    loop {
        let notification = match from_moderator.recv().await {
            Ok(notification) => notification,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%party, skipped, "party lagged behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };
        if notification.completion != CompletionLevel::Playing {
            continue;
        }

        let think_ms = rand::rng().random_range(20..=200);
        tokio::time::sleep(Duration::from_millis(think_ms)).await;

        sequence += 1;
        debug!(%party, address = %notification.address, think_ms, "party done");
        to_moderator
            .send(StageNotification {
                sender: party,
                address: notification.address,
                completion: CompletionLevel::Done,
                sequence,
            })
            .await
            .map_err(|_| DemoError::ChannelClosed)?;
    }
}
