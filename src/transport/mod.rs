//! Transport Layer Module
//!
//! Bridges the engine's send and receive callbacks to a UDP socket.
//!
//! # Overview
//!
//! - Outbound frames go through a [`FrameSink`]. The UDP implementation hands
//!   each frame to a background send task and returns at once; a failed send
//!   is logged there and the frame is lost.
//! - Inbound datagrams are read by a background receive task and appended to
//!   the [`InboundFrameQueue`]. The receive path never calls into the engine.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bacnet_poller::{config::ClientConfig, queue::InboundFrameQueue, transport::UdpTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = ClientConfig::default().resolve_network()?;
//! let queue = Arc::new(InboundFrameQueue::new());
//! let transport = UdpTransport::bind(&settings, queue.clone())?;
//! println!("listening on {}", transport.local_address());
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddrV4;

use bytes::Bytes;

use crate::error::Result;

#[cfg(feature = "async")]
use std::{
    net::{SocketAddr, UdpSocket as StdUdpSocket},
    sync::Arc,
    time::Duration,
};

#[cfg(feature = "async")]
use log::{debug, error, info, warn};

#[cfg(feature = "async")]
use socket2::{Domain, Protocol, Socket, Type};

#[cfg(feature = "async")]
use tokio::{net::UdpSocket, sync::mpsc, task::JoinHandle};

#[cfg(feature = "async")]
use crate::{
    address::ConnectionDescriptor, config::NetworkSettings, error::ClientError,
    queue::InboundFrameQueue, util::payload_preview,
};

/// Receive buffer size, one Ethernet MTU
pub const RECV_BUFFER_SIZE: usize = 1500;

/// First pause after a failed receive
#[cfg(feature = "async")]
const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);

/// Longest pause between retries of a failing socket
#[cfg(feature = "async")]
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Outbound side of the network collaborator
pub trait FrameSink: Send + Sync {
    /// Queue `payload` for delivery to `destination`. Returns the number of
    /// bytes accepted; delivery itself completes asynchronously.
    fn dispatch(&self, payload: Bytes, destination: SocketAddrV4) -> Result<usize>;
}

/// BACnet/IP UDP transport. Dropping it stops the background tasks and
/// closes the socket.
#[cfg(feature = "async")]
pub struct UdpTransport {
    local_address: SocketAddr,
    outbound: mpsc::UnboundedSender<(Bytes, SocketAddrV4)>,
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

#[cfg(feature = "async")]
impl UdpTransport {
    /// Bind the socket and start the receive and send tasks. Must be called
    /// from within a tokio runtime.
    pub fn bind(settings: &NetworkSettings, queue: Arc<InboundFrameQueue>) -> Result<Self> {
        let socket = Arc::new(UdpSocket::from_std(Self::open_socket(settings)?)?);
        let local_address = socket.local_addr()?;
        info!("UDP transport listening on {}", local_address);

        let (outbound, rx) = mpsc::unbounded_channel();
        let receiver = tokio::spawn(receive_loop(socket.clone(), queue));
        let sender = tokio::spawn(send_loop(socket, rx));

        Ok(Self {
            local_address,
            outbound,
            receiver,
            sender,
        })
    }

    fn open_socket(settings: &NetworkSettings) -> Result<StdUdpSocket> {
        let bind_address = SocketAddr::V4(settings.bind_socket_addr());
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&bind_address.into()).map_err(|e| {
            ClientError::Transport(format!("failed to bind {}: {}", bind_address, e))
        })?;
        Ok(socket.into())
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Stop the background tasks
    pub fn shutdown(&self) {
        self.receiver.abort();
        self.sender.abort();
        info!("UDP transport on {} closed", self.local_address);
    }
}

#[cfg(feature = "async")]
impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
        self.sender.abort();
    }
}

#[cfg(feature = "async")]
impl FrameSink for UdpTransport {
    fn dispatch(&self, payload: Bytes, destination: SocketAddrV4) -> Result<usize> {
        let len = payload.len();
        self.outbound
            .send((payload, destination))
            .map_err(|_| ClientError::Transport("send task has stopped".into()))?;
        Ok(len)
    }
}

#[cfg(feature = "async")]
async fn receive_loop(socket: Arc<UdpSocket>, queue: Arc<InboundFrameQueue>) {
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    let mut backoff = None;
    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, source)) => {
                backoff = None;
                match ConnectionDescriptor::try_from(source) {
                    Ok(sender) => {
                        debug!(
                            "<< {} bytes from {}: {}",
                            len,
                            sender,
                            payload_preview(&buffer[..len])
                        );
                        queue.enqueue(Bytes::copy_from_slice(&buffer[..len]), sender);
                    }
                    Err(e) => warn!("Ignoring datagram: {}", e),
                }
            }
            Err(e) => {
                // ICMP errors from earlier sends surface here on some platforms
                let delay = next_backoff(backoff);
                error!("UDP receive error: {}, retrying in {:?}", e, delay);
                backoff = Some(delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Pause before the next receive after an error, doubling up to `RECV_BACKOFF_MAX`
#[cfg(feature = "async")]
fn next_backoff(current: Option<Duration>) -> Duration {
    match current {
        None => RECV_BACKOFF_MIN,
        Some(delay) => (delay * 2).min(RECV_BACKOFF_MAX),
    }
}

#[cfg(feature = "async")]
async fn send_loop(socket: Arc<UdpSocket>, mut rx: mpsc::UnboundedReceiver<(Bytes, SocketAddrV4)>) {
    while let Some((payload, destination)) = rx.recv().await {
        match socket.send_to(&payload, destination).await {
            Ok(sent) => debug!(">> {} bytes to {}", sent, destination),
            Err(e) => error!(
                "Could not send {} bytes to {}: {}",
                payload.len(),
                destination,
                e
            ),
        }
    }
}
