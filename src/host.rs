//! Engine Host
//!
//! [`ClientHost`] is the client's side of the engine callback contract. It
//! feeds the engine from the inbound queue, hands outbound frames to the
//! transport, serves the local device's properties and forwards engine
//! diagnostics to the `log` facade.
//!
//! Every frame handed to the engine during a tick is also kept aside so the
//! client can decode and correlate it once the tick returns.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, info};

use crate::{
    address::ConnectionDescriptor,
    config::NetworkSettings,
    engine::{EngineHost, PropertyQuery, Severity},
    queue::{InboundFrame, InboundFrameQueue},
    store::{LocalProperties, LocalPropertyKey},
    transport::FrameSink,
    util::payload_preview,
};

/// Log target for messages emitted by the protocol engine
pub const ENGINE_LOG_TARGET: &str = "bacnet_poller::engine";

pub struct ClientHost {
    queue: Arc<InboundFrameQueue>,
    sink: Arc<dyn FrameSink>,
    network: NetworkSettings,
    local: Arc<LocalProperties>,
    max_frame_len: usize,
    served: Vec<InboundFrame>,
}

impl ClientHost {
    pub fn new(
        queue: Arc<InboundFrameQueue>,
        sink: Arc<dyn FrameSink>,
        network: NetworkSettings,
        local: Arc<LocalProperties>,
        max_frame_len: usize,
    ) -> Self {
        Self {
            queue,
            sink,
            network,
            local,
            max_frame_len,
            served: Vec::new(),
        }
    }

    pub fn network(&self) -> &NetworkSettings {
        &self.network
    }

    /// Frames handed to the engine since the last call, in arrival order
    pub fn take_served(&mut self) -> Vec<InboundFrame> {
        std::mem::take(&mut self.served)
    }
}

impl EngineHost for ClientHost {
    fn send_message(
        &mut self,
        payload: &[u8],
        destination: ConnectionDescriptor,
        broadcast: bool,
    ) -> usize {
        let destination = if broadcast {
            destination.with_ip(self.network.broadcast_address())
        } else {
            destination
        };

        if destination.port() == 0 {
            error!(
                "Refusing to send {} bytes to {}: port is zero",
                payload.len(),
                destination
            );
            return 0;
        }

        debug!(
            "Sending {} bytes to {}{}: {}",
            payload.len(),
            destination,
            if broadcast { " (broadcast)" } else { "" },
            payload_preview(payload)
        );

        match self
            .sink
            .dispatch(Bytes::copy_from_slice(payload), destination.socket_addr())
        {
            Ok(sent) => sent,
            Err(e) => {
                error!("Failed to send to {}: {}", destination, e);
                0
            }
        }
    }

    fn receive_message(&mut self, buffer: &mut [u8]) -> Option<(usize, ConnectionDescriptor)> {
        loop {
            let frame = self.queue.dequeue()?;
            let len = frame.payload.len();
            if len > buffer.len() || len > self.max_frame_len {
                error!(
                    "Dropping {} byte datagram from {}: larger than {} bytes",
                    len,
                    frame.sender,
                    buffer.len().min(self.max_frame_len)
                );
                continue;
            }

            buffer[..len].copy_from_slice(&frame.payload);
            let sender = frame.sender;
            debug!("Handing {} bytes from {} to the engine", len, sender);
            self.served.push(frame);
            return Some((len, sender));
        }
    }

    fn system_time(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }

    fn get_property(&self, query: &PropertyQuery) -> Option<String> {
        let key = LocalPropertyKey {
            device_id: query.device_id,
            object: query.object,
            property: query.property,
        };
        let value = self.local.get(&key);
        if value.is_none() {
            error!(
                "No local value for {} of {} (device {})",
                query.property, query.object, query.device_id
            );
        }
        value
    }

    fn log_message(&self, message: &str, severity: Severity) {
        let message = message.trim_end();
        match severity {
            Severity::Info => info!(target: ENGINE_LOG_TARGET, "{}", message),
            Severity::Error => error!(target: ENGINE_LOG_TARGET, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ClientError, Result},
        object::{ObjectIdentifier, ObjectType, PropertyIdentifier},
    };
    use std::{
        net::{Ipv4Addr, SocketAddrV4},
        sync::Mutex,
    };

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(Bytes, SocketAddrV4)>>,
        fail: bool,
    }

    impl FrameSink for RecordingSink {
        fn dispatch(&self, payload: Bytes, destination: SocketAddrV4) -> Result<usize> {
            if self.fail {
                return Err(ClientError::Transport("link down".into()));
            }
            let len = payload.len();
            self.sent.lock().unwrap().push((payload, destination));
            Ok(len)
        }
    }

    fn settings() -> NetworkSettings {
        NetworkSettings {
            local_address: Ipv4Addr::new(192, 168, 1, 20),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            bind_address: Ipv4Addr::UNSPECIFIED,
            port: 47808,
        }
    }

    fn host_with(sink: Arc<RecordingSink>, max_frame_len: usize) -> (ClientHost, Arc<InboundFrameQueue>) {
        let queue = Arc::new(InboundFrameQueue::new());
        let local = Arc::new(LocalProperties::for_device(389005, "Example name"));
        let host = ClientHost::new(queue.clone(), sink, settings(), local, max_frame_len);
        (host, queue)
    }

    fn conn(s: &str) -> ConnectionDescriptor {
        s.parse().unwrap()
    }

    #[test]
    fn test_unicast_and_broadcast_send() {
        let sink = Arc::new(RecordingSink::default());
        let (mut host, _) = host_with(sink.clone(), 1497);

        assert_eq!(host.send_message(&[1, 2, 3], conn("10.0.0.2:47808"), false), 3);
        assert_eq!(host.send_message(&[4, 5], conn("10.0.0.2:47809"), true), 2);

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[0].1, "10.0.0.2:47808".parse::<SocketAddrV4>().unwrap());
        assert_eq!(sent[1].1, "192.168.1.255:47809".parse::<SocketAddrV4>().unwrap());
        assert_eq!(sent[1].0.as_ref(), &[4, 5]);
    }

    #[test]
    fn test_send_failures_return_zero() {
        let sink = Arc::new(RecordingSink::default());
        let (mut host, _) = host_with(sink.clone(), 1497);
        assert_eq!(host.send_message(&[1], conn("10.0.0.2:0"), false), 0);
        assert!(sink.sent.lock().unwrap().is_empty());

        let failing = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let (mut host, _) = host_with(failing, 1497);
        assert_eq!(host.send_message(&[1], conn("10.0.0.2:47808"), false), 0);
    }

    #[test]
    fn test_receive_drains_queue_in_order() {
        let (mut host, queue) = host_with(Arc::new(RecordingSink::default()), 1497);
        queue.enqueue(vec![0xAA, 0xBB], conn("10.0.0.2:47808"));
        queue.enqueue(vec![0xCC], conn("10.0.0.3:47808"));

        let mut buffer = [0u8; 1497];
        let (len, sender) = host.receive_message(&mut buffer).unwrap();
        assert_eq!((len, sender), (2, conn("10.0.0.2:47808")));
        assert_eq!(&buffer[..2], &[0xAA, 0xBB]);

        let (len, sender) = host.receive_message(&mut buffer).unwrap();
        assert_eq!((len, sender), (1, conn("10.0.0.3:47808")));
        assert_eq!(buffer[0], 0xCC);

        assert!(host.receive_message(&mut buffer).is_none());

        let served = host.take_served();
        assert_eq!(served.len(), 2);
        assert_eq!(served[1].payload.as_ref(), &[0xCC]);
        assert!(host.take_served().is_empty());
    }

    #[test]
    fn test_oversized_frame_is_skipped() {
        let (mut host, queue) = host_with(Arc::new(RecordingSink::default()), 4);
        queue.enqueue(vec![0u8; 5], conn("10.0.0.2:47808"));
        queue.enqueue(vec![7u8; 4], conn("10.0.0.3:47808"));

        let mut buffer = [0u8; 16];
        let (len, sender) = host.receive_message(&mut buffer).unwrap();
        assert_eq!((len, sender), (4, conn("10.0.0.3:47808")));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_get_property_serves_local_device() {
        let (host, _) = host_with(Arc::new(RecordingSink::default()), 1497);
        let mut query = PropertyQuery {
            device_id: 389005,
            object: ObjectIdentifier::new(ObjectType::Device, 389005),
            property: PropertyIdentifier::ObjectName,
            array_index: None,
        };
        assert_eq!(host.get_property(&query).as_deref(), Some("Example name"));

        query.property = PropertyIdentifier::Location;
        assert_eq!(host.get_property(&query), None);
    }

    #[test]
    fn test_system_time_is_unix_seconds() {
        let (host, _) = host_with(Arc::new(RecordingSink::default()), 1497);
        // 2020-01-01T00:00:00Z
        assert!(host.system_time() > 1_577_836_800);
    }
}
