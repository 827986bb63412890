//! Message Correlator
//!
//! Applies decoded packets to the client's tables. An I-Am updates the device
//! registry. A ReadPropertyMultiple acknowledgement claims its pending request
//! by (connection, invoke ID) and writes every returned value into the property
//! store under the device and object that request named. Responses nobody is
//! waiting for are discarded.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::{
    address::ConnectionDescriptor,
    error::{ClientError, Result},
    message::{self, DiscoveryAnnouncement, InboundMessage, ReadResult},
    pending::PendingRequestTable,
    registry::DeviceRegistry,
    store::{PropertyKey, PropertyStore},
    util::payload_preview,
};

/// What a message did to the tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// A device was registered or refreshed
    DeviceDiscovered { device_id: u32, first_seen: bool },
    /// A read result was matched and its values stored
    PropertiesStored { device_id: u32, stored: usize },
    /// The message kind is not handled by this client
    Ignored,
}

/// Routes decoded messages into the registry, pending table and store
#[derive(Debug, Clone)]
pub struct MessageCorrelator {
    registry: Arc<DeviceRegistry>,
    pending: Arc<PendingRequestTable>,
    store: Arc<PropertyStore>,
}

impl MessageCorrelator {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        pending: Arc<PendingRequestTable>,
        store: Arc<PropertyStore>,
    ) -> Self {
        Self {
            registry,
            pending,
            store,
        }
    }

    /// Apply one decoded message received on `connection`
    pub fn correlate(
        &self,
        message: InboundMessage,
        connection: ConnectionDescriptor,
    ) -> Result<Correlation> {
        match message {
            InboundMessage::DiscoveryAnnouncement(announcement) => {
                Ok(self.register(announcement, connection))
            }
            InboundMessage::ReadResult(result) => self.store_result(result, connection),
            InboundMessage::Other { service } => {
                debug!(
                    "Ignoring {} from {}",
                    service.as_deref().unwrap_or("packet"),
                    connection
                );
                Ok(Correlation::Ignored)
            }
        }
    }

    /// Decode the engine's rendering of `payload` and apply it. Every failure
    /// is logged and the message dropped.
    pub fn handle(
        &self,
        rendered: &str,
        payload: &[u8],
        connection: ConnectionDescriptor,
    ) -> Option<Correlation> {
        let message = match message::decode(rendered) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    "Dropping packet from {}: {}. Payload: {}, rendering: {}",
                    connection,
                    e,
                    payload_preview(payload),
                    rendered
                );
                return None;
            }
        };

        match self.correlate(message, connection) {
            Ok(correlation) => Some(correlation),
            Err(e @ ClientError::UnmatchedResponse { .. }) => {
                warn!("Discarding response: {}", e);
                None
            }
            Err(e) => {
                error!("Failed to apply packet from {}: {}", connection, e);
                None
            }
        }
    }

    fn register(
        &self,
        announcement: DiscoveryAnnouncement,
        connection: ConnectionDescriptor,
    ) -> Correlation {
        let DiscoveryAnnouncement {
            device_id,
            vendor_id,
            route,
        } = announcement;

        info!(
            "I-Am from device {} (vendor {}) on {}{}",
            device_id,
            vendor_id,
            connection,
            route
                .as_ref()
                .map(|r| format!(" via network {}", r))
                .unwrap_or_default()
        );

        let first_seen = self.registry.upsert(device_id, vendor_id, route, connection);
        Correlation::DeviceDiscovered {
            device_id,
            first_seen,
        }
    }

    fn store_result(
        &self,
        result: ReadResult,
        connection: ConnectionDescriptor,
    ) -> Result<Correlation> {
        let request = self
            .pending
            .take_if_present(connection, result.invoke_id)
            .ok_or(ClientError::UnmatchedResponse {
                connection,
                invoke_id: result.invoke_id,
            })?;

        debug!(
            "Invoke ID {} on {} answers request for {} of device {}",
            result.invoke_id, connection, request.object, request.device_id
        );

        for property in &result.failed {
            warn!(
                "Device {} returned no usable value for {} of {}",
                request.device_id, property, request.object
            );
        }

        let network = request.route.as_ref().map(|route| route.network);
        let stored = result.readings.len();
        for reading in result.readings {
            debug!(
                "Device {} {} {} = {} ({})",
                request.device_id, request.object, reading.property, reading.value, reading.datatype
            );
            let key = PropertyKey::new(request.device_id, request.object, reading.property)
                .routed_via(network);
            self.store.put(key, reading.value);
        }

        Ok(Correlation::PropertiesStored {
            device_id: request.device_id,
            stored,
        })
    }
}
