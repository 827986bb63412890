//! Database Dump
//!
//! A point-in-time copy of the client's tables for periodic logging. Each
//! table is snapshotted under its own lock, so a report taken while traffic
//! is flowing may show a response stored whose request is still listed.

use std::{collections::BTreeMap, fmt, time::Instant};

use crate::{
    pending::{PendingKey, PendingRequest, PendingRequestTable},
    registry::{DeviceRecord, DeviceRegistry},
    store::{PropertyKey, PropertyStore},
};

#[derive(Debug, Clone)]
pub struct Report {
    pub devices: Vec<(u32, DeviceRecord)>,
    pub properties: BTreeMap<PropertyKey, String>,
    pub requests: Vec<(PendingKey, PendingRequest)>,
    taken_at: Instant,
}

impl Report {
    pub fn capture(
        registry: &DeviceRegistry,
        store: &PropertyStore,
        pending: &PendingRequestTable,
    ) -> Self {
        Self {
            devices: registry.enumerate(),
            properties: store.snapshot(),
            requests: pending.snapshot(),
            taken_at: Instant::now(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Devices ({}):", self.devices.len())?;
        for (device_id, record) in &self.devices {
            write!(
                f,
                "  {} vendor={} via {}",
                device_id, record.vendor_id, record.connection
            )?;
            if let Some(route) = &record.route {
                write!(f, " route={}", route)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Properties ({}):", self.properties.len())?;
        for (key, value) in &self.properties {
            writeln!(f, "  {} = {}", key, value)?;
        }

        write!(f, "Requests ({}):", self.requests.len())?;
        for (key, request) in &self.requests {
            write!(
                f,
                "\n  {} device={} object={} age={}ms",
                key,
                request.device_id,
                request.object,
                self.taken_at
                    .saturating_duration_since(request.issued_at)
                    .as_millis()
            )?;
        }
        Ok(())
    }
}
