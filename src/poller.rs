//! Poll Driver
//!
//! One polling round asks every known device for all properties of its device
//! object with a ReadPropertyMultiple. The invoke ID the engine assigns is
//! recorded in the pending table together with what was asked, so the answer
//! can be attributed when it arrives.

use std::sync::Arc;

use log::{debug, error, warn};

use crate::{
    engine::{EngineHost, ProtocolEngine, ReadRequest},
    error::ClientError,
    object::{ObjectIdentifier, ObjectType, PropertyIdentifier},
    pending::{PendingRequest, PendingRequestTable},
    registry::DeviceRegistry,
};

/// Outcome of one polling round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Requests sent and recorded
    pub issued: usize,
    /// Requests sent whose (connection, invoke ID) was already outstanding
    pub duplicates: usize,
    /// Requests the engine refused to send
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct PollDriver {
    registry: Arc<DeviceRegistry>,
    pending: Arc<PendingRequestTable>,
}

impl PollDriver {
    pub fn new(registry: Arc<DeviceRegistry>, pending: Arc<PendingRequestTable>) -> Self {
        Self { registry, pending }
    }

    /// Issue one read request per registered device
    pub fn poll_round<E>(&self, engine: &mut E, host: &mut dyn EngineHost) -> PollSummary
    where
        E: ProtocolEngine + ?Sized,
    {
        let mut summary = PollSummary::default();

        for (device_id, record) in self.registry.enumerate() {
            let object = ObjectIdentifier::new(ObjectType::Device, device_id);
            let request = ReadRequest {
                connection: record.connection,
                route: record.route.clone(),
                object,
                property: PropertyIdentifier::All,
            };

            let invoke_id = match engine.send_read_property(host, &request) {
                Ok(invoke_id) => invoke_id,
                Err(e) => {
                    error!("Failed to send read request to device {}: {}", device_id, e);
                    summary.failed += 1;
                    continue;
                }
            };

            debug!(
                "Sent ReadPropertyMultiple to device {} on {}, invoke ID {}",
                device_id, record.connection, invoke_id
            );

            let pending = PendingRequest::new(device_id, object, record.route);
            match self.pending.insert(record.connection, invoke_id, pending) {
                Ok(()) => summary.issued += 1,
                Err(e @ ClientError::DuplicateKey { .. }) => {
                    warn!("Not tracking request to device {}: {}", device_id, e);
                    summary.duplicates += 1;
                }
                Err(e) => {
                    error!("Failed to record request to device {}: {}", device_id, e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}
