//! Latest-reading store keyed by device code

use crate::device::DeviceRecord;
use sensor_protocol::SensorEvent;
use std::collections::BTreeMap;

/// Mapping from device code to its last-known reading.
///
/// Records are overwritten on every event for their code and are never
/// removed. The store itself is not synchronized; the owner guards it.
#[derive(Debug, Default, Clone)]
pub struct DeviceStore {
    records: BTreeMap<String, DeviceRecord>,
}

impl DeviceStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an event into the store
    pub fn apply(&mut self, event: &SensorEvent) {
        self.records
            .insert(event.code.clone(), DeviceRecord::from(event));
    }

    /// Last reading for a code
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&DeviceRecord> {
        self.records.get(code)
    }

    /// All records, sorted by code
    #[must_use]
    pub fn records(&self) -> &BTreeMap<String, DeviceRecord> {
        &self.records
    }
}
