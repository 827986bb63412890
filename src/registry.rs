//! Device Registry
//!
//! Devices learned from I-Am announcements, keyed by device instance. An
//! announcement is authoritative: rediscovering a device overwrites every
//! attribute of its record. Records are never removed.

use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use crate::address::{ConnectionDescriptor, RoutingPair};

/// Last-known attributes of a discovered device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// BACnet vendor identifier from the I-Am
    pub vendor_id: u16,
    /// Path the announcement arrived on
    pub connection: ConnectionDescriptor,
    /// Route through a BACnet router, `None` when on the local network
    pub route: Option<RoutingPair>,
}

/// Thread-safe map of device instance to [`DeviceRecord`]
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<u32, DeviceRecord>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a device. Returns `true` if the device was not known before.
    pub fn upsert(
        &self,
        device_id: u32,
        vendor_id: u16,
        route: Option<RoutingPair>,
        connection: ConnectionDescriptor,
    ) -> bool {
        let record = DeviceRecord {
            vendor_id,
            connection,
            route,
        };
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id, record)
            .is_none()
    }

    /// Copy of every record, ordered by device instance
    pub fn enumerate(&self) -> Vec<(u32, DeviceRecord)> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }

    pub fn get(&self, device_id: u32) -> Option<DeviceRecord> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn conn(s: &str) -> ConnectionDescriptor {
        s.parse().unwrap()
    }

    #[test]
    fn test_upsert_inserts_then_overwrites() {
        let registry = DeviceRegistry::new();
        assert!(registry.upsert(389001, 37, None, conn("10.0.0.2:47808")));
        assert!(!registry.upsert(
            389001,
            38,
            Some(RoutingPair::new(5, vec![0x11])),
            conn("10.0.0.3:47808")
        ));

        assert_eq!(registry.len(), 1);
        let record = registry.get(389001).unwrap();
        assert_eq!(record.vendor_id, 38);
        assert_eq!(record.connection, conn("10.0.0.3:47808"));
        assert_eq!(record.route, Some(RoutingPair::new(5, vec![0x11])));
    }

    #[test]
    fn test_enumerate_is_a_snapshot() {
        let registry = DeviceRegistry::new();
        registry.upsert(2, 1, None, conn("10.0.0.2"));
        registry.upsert(1, 1, None, conn("10.0.0.1"));

        let snapshot = registry.enumerate();
        // Mutating while holding a snapshot must not disturb it
        for (id, record) in &snapshot {
            registry.upsert(id + 100, record.vendor_id, None, record.connection);
        }

        let ids: Vec<u32> = snapshot.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(registry.len(), 4);
    }

    proptest! {
        #[test]
        fn prop_last_announcement_wins(vendors in proptest::collection::vec(any::<u16>(), 1..20)) {
            let registry = DeviceRegistry::new();
            for (i, vendor) in vendors.iter().enumerate() {
                let connection = ConnectionDescriptor::new([10, 0, 0, (i % 250) as u8].into(), 47808);
                registry.upsert(389001, *vendor, None, connection);
            }

            let devices = registry.enumerate();
            prop_assert_eq!(devices.len(), 1);
            let last = vendors.len() - 1;
            prop_assert_eq!(devices[0].1.vendor_id, vendors[last]);
            prop_assert_eq!(devices[0].1.connection.ip().octets()[3], (last % 250) as u8);
        }
    }
}
