use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::{DeviceAddress, DeviceInfo};

/// Thread-safe table of discovered devices keyed by address.
///
/// The first record seen for an address wins; later sightings are ignored.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<BTreeMap<DeviceAddress, DeviceInfo>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `info` if its address is unknown. Returns whether it was inserted.
    pub fn upsert(&self, info: DeviceInfo) -> bool {
        match self.lock().entry(info.address()) {
            Entry::Vacant(entry) => {
                entry.insert(info);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Returns at most `max` records, ordered by address.
    #[must_use]
    pub fn snapshot(&self, max: usize) -> Vec<DeviceInfo> {
        self.lock().values().take(max).cloned().collect()
    }

    /// Returns the stored record for `address`, if any.
    #[must_use]
    pub fn get(&self, address: &DeviceAddress) -> Option<DeviceInfo> {
        self.lock().get(address).cloned()
    }

    /// Number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether no device has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DeviceAddress, DeviceInfo>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
