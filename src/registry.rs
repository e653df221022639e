//! Address-keyed registry of the latest record per device.
//!
//! Every change publishes the complete device list to all subscribers.
//! Snapshots are built and sent while the write lock is held, so every
//! subscriber sees changes in the order they were applied and never sees
//! a half-applied update.

use futures::stream::{self, Stream};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace};

use crate::config::DEFAULT_SNAPSHOT_CAPACITY;
use crate::data::device::DeviceRecord;

/// Immutable view of every known device in first-seen order.
pub type DeviceSnapshot = Arc<[DeviceRecord]>;

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The address was new and the record was appended.
    Inserted,
    /// The record replaced an existing one at the same position.
    Updated,
}

struct RegistryState {
    /// Current device list.
    devices: DeviceSnapshot,
    /// Position of each address in `devices`.
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn empty() -> Self {
        Self {
            devices: Arc::from(Vec::new()),
            index: HashMap::new(),
        }
    }
}

/// Registry holding the most recent record for each device address.
pub struct DeviceRegistry {
    state: Arc<RwLock<RegistryState>>,
    snapshot_tx: broadcast::Sender<DeviceSnapshot>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    ///
    /// `capacity` is the number of snapshots a subscriber may fall behind
    /// before it skips ahead to the latest one.
    pub fn new(capacity: usize) -> Self {
        let (snapshot_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            state: Arc::new(RwLock::new(RegistryState::empty())),
            snapshot_tx,
        }
    }

    /// Insert a new record or replace the record with the same address.
    ///
    /// Replaced records keep their position in the list.
    pub fn upsert(&self, record: DeviceRecord) -> Upsert {
        let mut state = self.state.write();
        let mut devices = state.devices.to_vec();

        let existing = state.index.get(&record.address).copied();
        let outcome = match existing {
            Some(position) => {
                trace!("Updating device {}", record.address);
                devices[position] = record;
                Upsert::Updated
            }
            None => {
                debug!("New device {} ({})", record.address, record.name);
                state.index.insert(record.address.clone(), devices.len());
                devices.push(record);
                Upsert::Inserted
            }
        };

        state.devices = devices.into();
        self.publish(&state);
        outcome
    }

    /// Remove every device.
    pub fn clear(&self) {
        let mut state = self.state.write();
        debug!("Clearing {} devices", state.devices.len());
        *state = RegistryState::empty();
        self.publish(&state);
    }

    /// Get the current device list.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.read().devices.clone()
    }

    /// Get the record for an address.
    pub fn get(&self, address: &str) -> Option<DeviceRecord> {
        let state = self.state.read();
        state
            .index
            .get(address)
            .map(|&position| state.devices[position].clone())
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.state.read().devices.len()
    }

    /// Check if no devices are known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.snapshot_tx.receiver_count()
    }

    /// Subscribe to device list changes.
    ///
    /// The subscription first yields the current list, then one snapshot
    /// per subsequent change.
    pub fn subscribe(&self) -> DeviceSubscription {
        let state = self.state.read();

        DeviceSubscription {
            pending: Some(state.devices.clone()),
            rx: self.snapshot_tx.subscribe(),
            state: self.state.clone(),
        }
    }

    fn publish(&self, state: &RegistryState) {
        // No subscribers is not an error.
        let _ = self.snapshot_tx.send(state.devices.clone());
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_CAPACITY)
    }
}

/// Live view of the registry's device list.
pub struct DeviceSubscription {
    /// Snapshot to yield before reading from the channel.
    pending: Option<DeviceSnapshot>,
    rx: broadcast::Receiver<DeviceSnapshot>,
    state: Arc<RwLock<RegistryState>>,
}

impl DeviceSubscription {
    /// Wait for the next device list.
    ///
    /// A subscriber that fell too far behind skips the snapshots it missed
    /// and receives the current list instead. Returns `None` once the
    /// registry has been dropped.
    pub async fn recv(&mut self) -> Option<DeviceSnapshot> {
        if let Some(snapshot) = self.pending.take() {
            return Some(snapshot);
        }

        match self.rx.recv().await {
            Ok(snapshot) => Some(snapshot),
            Err(RecvError::Lagged(skipped)) => {
                debug!("Device subscriber lagged, skipping {} snapshots", skipped);
                // Writers publish under the write lock, so holding the read
                // lock here pins the current list to the new receiver position.
                let state = self.state.read();
                self.rx = self.rx.resubscribe();
                Some(state.devices.clone())
            }
            Err(RecvError::Closed) => None,
        }
    }

    /// Convert the subscription into a stream of device lists.
    pub fn into_stream(self) -> impl Stream<Item = DeviceSnapshot> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|snapshot| (snapshot, subscription))
        })
    }
}
