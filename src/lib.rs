#![doc = include_str!("../README.md")]

pub mod address;
pub mod client;
pub mod config;
pub mod correlator;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod host;
pub mod logging;
pub mod message;
pub mod object;
pub mod pending;
pub mod poller;
pub mod queue;
pub mod registry;
pub mod store;
pub mod transport;
pub mod util;

#[doc(hidden)]
pub use pastey;

// Re-export main types without glob imports to avoid conflicts
pub use address::{ConnectionDescriptor, RoutingPair};
pub use client::Client;
pub use config::{ClientConfig, NetworkSettings};
pub use correlator::{Correlation, MessageCorrelator};
pub use engine::{EngineHost, ProtocolEngine, ReadRequest};
pub use error::{ClientError, Result};
pub use message::InboundMessage;
pub use object::{ObjectIdentifier, ObjectType, PropertyIdentifier};
pub use pending::{PendingRequest, PendingRequestTable};
pub use queue::InboundFrameQueue;
pub use registry::{DeviceRecord, DeviceRegistry};
pub use store::{PropertyKey, PropertyStore};
pub use transport::FrameSink;

#[cfg(feature = "async")]
pub use transport::UdpTransport;

/// Largest BACnet/IP datagram (BACnet MPDU)
pub const BACNET_MAX_MPDU: usize = 1497;

#[cfg(test)]
mod tests {
    use crate::{ConnectionDescriptor, ObjectIdentifier, ObjectType};

    #[test]
    fn test_reexports() {
        let device = ObjectIdentifier::new(ObjectType::Device, 389001);
        assert!(device.is_valid());
        assert_eq!(device.to_string(), "device, 389001");

        let conn: ConnectionDescriptor = "10.0.0.2".parse().unwrap();
        assert_eq!(conn.port(), 0xBAC0);
        assert_eq!(crate::config::MAX_FRAME_LEN, crate::BACNET_MAX_MPDU);
    }
}
