//! Peer Addressing
//!
//! A BACnet/IP peer is reached through a [`ConnectionDescriptor`] (IPv4
//! address and UDP port). Peers behind a BACnet router additionally need a
//! [`RoutingPair`]: the remote network number and the station address on that
//! network.
//!
//! The protocol engine exchanges connection descriptors in their six-byte
//! BACnet/IP form (four address octets followed by the port, big endian).

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    str::FromStr,
};

use crate::error::ClientError;

/// Default BACnet/IP UDP port (0xBAC0)
pub const BACNET_IP_PORT: u16 = 0xBAC0;

/// Length of a BACnet/IP address in its wire form
pub const BIP_ADDRESS_LEN: usize = 6;

/// Transport-level path to a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionDescriptor(SocketAddrV4);

impl ConnectionDescriptor {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        self.0
    }

    /// Six-byte BACnet/IP form
    pub fn to_bytes(&self) -> [u8; BIP_ADDRESS_LEN] {
        let [a, b, c, d] = self.ip().octets();
        let [hi, lo] = self.port().to_be_bytes();
        [a, b, c, d, hi, lo]
    }

    /// Parse the six-byte BACnet/IP form
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        match data {
            [a, b, c, d, hi, lo, ..] => Some(Self::new(
                Ipv4Addr::new(*a, *b, *c, *d),
                u16::from_be_bytes([*hi, *lo]),
            )),
            _ => None,
        }
    }

    /// Same port, different host
    pub fn with_ip(&self, ip: Ipv4Addr) -> Self {
        Self::new(ip, self.port())
    }
}

impl From<SocketAddrV4> for ConnectionDescriptor {
    fn from(addr: SocketAddrV4) -> Self {
        Self(addr)
    }
}

impl TryFrom<SocketAddr> for ConnectionDescriptor {
    type Error = ClientError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(Self(v4)),
            SocketAddr::V6(v6) => Err(ClientError::Transport(format!(
                "BACnet/IP peer must be IPv4, got {}",
                v6
            ))),
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ClientError;

    /// Accepts `"192.168.1.101:47808"`, or `"192.168.1.101"` for the default port
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientError::Config(format!("invalid connection descriptor '{}'", s));
        match s.split_once(':') {
            Some((host, port)) => {
                let ip = host.parse::<Ipv4Addr>().map_err(|_| invalid())?;
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                Ok(Self::new(ip, port))
            }
            None => {
                let ip = s.parse::<Ipv4Addr>().map_err(|_| invalid())?;
                Ok(Self::new(ip, BACNET_IP_PORT))
            }
        }
    }
}

/// Network-layer route to a peer behind a BACnet router
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingPair {
    /// Remote network number
    pub network: u16,
    /// Station address on the remote network (MAC layer, 0-7 bytes)
    pub address: Vec<u8>,
}

impl RoutingPair {
    pub fn new(network: u16, address: Vec<u8>) -> Self {
        Self { network, address }
    }
}

impl fmt::Display for RoutingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, hex::encode(&self.address))
    }
}

/// Directed broadcast address of the subnet `local` lives on
pub fn broadcast_address(local: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    let local = u32::from(local);
    let mask = u32::from(mask);
    Ipv4Addr::from((local & mask) | !mask)
}
