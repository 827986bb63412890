//! Client Configuration
//!
//! [`ClientConfig`] carries everything the client needs at startup. Any
//! interval can be overridden from JSON (durations in milliseconds); missing
//! fields keep their defaults. When the local address or subnet mask is not
//! configured, [`ClientConfig::resolve_network`] takes them from the first
//! non-loopback IPv4 interface.

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    path::PathBuf,
    time::Duration,
};

use log::{debug, info};
use serde::{Deserialize, Deserializer};

use crate::{
    address::{broadcast_address, BACNET_IP_PORT},
    error::{ClientError, Result},
};

/// Default instance number of the client's own device
pub const DEFAULT_DEVICE_INSTANCE: u32 = 389005;

/// Largest datagram handed to the engine by default
pub const MAX_FRAME_LEN: usize = crate::BACNET_MAX_MPDU;

/// Startup configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address of the interface BACnet traffic uses; discovered when `None`
    pub local_address: Option<Ipv4Addr>,
    /// Subnet mask of that interface; discovered when `None`
    pub subnet_mask: Option<Ipv4Addr>,
    /// Address the socket binds to (all interfaces when `None`)
    pub bind_address: Option<Ipv4Addr>,
    /// UDP port
    pub port: u16,
    /// Instance number of the client's own device
    pub device_instance: u32,
    /// Object name the client's own device reports
    pub device_name: String,
    /// Engine tick period
    #[serde(rename = "tick_interval_ms", deserialize_with = "millis")]
    pub tick_interval: Duration,
    /// Period between ReadPropertyMultiple rounds
    #[serde(rename = "poll_interval_ms", deserialize_with = "millis")]
    pub poll_interval: Duration,
    /// Period between Who-Is broadcasts
    #[serde(rename = "discovery_interval_ms", deserialize_with = "millis")]
    pub discovery_interval: Duration,
    /// Period between database dumps
    #[serde(rename = "dump_interval_ms", deserialize_with = "millis")]
    pub dump_interval: Duration,
    /// Age after which an unanswered request is dropped; `None` keeps them forever
    #[serde(rename = "pending_ttl_ms", deserialize_with = "optional_millis")]
    pub pending_ttl: Option<Duration>,
    /// Largest datagram handed to the engine
    pub max_frame_len: usize,
    /// Rotating log file; logs go to stderr when `None`
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local_address: None,
            subnet_mask: None,
            bind_address: None,
            port: BACNET_IP_PORT,
            device_instance: DEFAULT_DEVICE_INSTANCE,
            device_name: "Example name".to_string(),
            tick_interval: Duration::from_millis(100),
            poll_interval: Duration::from_secs(1),
            discovery_interval: Duration::from_secs(3),
            dump_interval: Duration::from_secs(3),
            pending_ttl: Some(Duration::from_secs(30)),
            max_frame_len: MAX_FRAME_LEN,
            log_file: None,
        }
    }
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_millis<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

/// Resolved addressing of the local interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSettings {
    pub local_address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub bind_address: Ipv4Addr,
    pub port: u16,
}

impl NetworkSettings {
    /// Directed broadcast address of the local subnet
    pub fn broadcast_address(&self) -> Ipv4Addr {
        broadcast_address(self.local_address, self.subnet_mask)
    }

    pub fn bind_socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.bind_address, self.port)
    }
}

/// An IPv4 interface as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub loopback: bool,
}

impl ClientConfig {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("tick", self.tick_interval),
            ("poll", self.poll_interval),
            ("discovery", self.discovery_interval),
            ("dump", self.dump_interval),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(ClientError::Config(format!(
                    "{} interval must be non-zero",
                    name
                )));
            }
        }
        if self.max_frame_len == 0 {
            return Err(ClientError::Config("max_frame_len must be non-zero".into()));
        }
        if self.device_instance > crate::object::MAX_INSTANCE {
            return Err(ClientError::Config(format!(
                "device instance {} is out of range",
                self.device_instance
            )));
        }
        Ok(())
    }

    /// Fill in the local address and mask, asking the OS when they are not configured
    pub fn resolve_network(&self) -> Result<NetworkSettings> {
        let (local_address, subnet_mask) = match (self.local_address, self.subnet_mask) {
            (Some(ip), Some(mask)) => (ip, mask),
            (wanted, _) => {
                let interfaces = system_interfaces()?;
                debug!("Found interfaces: {:?}", interfaces);
                let chosen = select_interface(&interfaces, wanted).ok_or_else(|| {
                    ClientError::Config(match wanted {
                        Some(ip) => format!("no interface with address {}", ip),
                        None => "no non-loopback IPv4 interface found".to_string(),
                    })
                })?;
                (chosen.ip, self.subnet_mask.unwrap_or(chosen.netmask))
            }
        };

        let settings = NetworkSettings {
            local_address,
            subnet_mask,
            bind_address: self.bind_address.unwrap_or(Ipv4Addr::UNSPECIFIED),
            port: self.port,
        };
        info!(
            "IP address: {}, subnet mask: {}, broadcast: {}",
            settings.local_address,
            settings.subnet_mask,
            settings.broadcast_address()
        );
        Ok(settings)
    }
}

/// Pick the interface to use: the one carrying `wanted`, else the first
/// non-loopback entry.
pub fn select_interface(
    interfaces: &[InterfaceAddress],
    wanted: Option<Ipv4Addr>,
) -> Option<InterfaceAddress> {
    match wanted {
        Some(ip) => interfaces.iter().find(|i| i.ip == ip).copied(),
        None => interfaces.iter().find(|i| !i.loopback).copied(),
    }
}

fn system_interfaces() -> Result<Vec<InterfaceAddress>> {
    let interfaces = if_addrs::get_if_addrs()?;
    Ok(interfaces
        .into_iter()
        .filter_map(|iface| {
            let loopback = iface.is_loopback();
            match iface.addr {
                if_addrs::IfAddr::V4(v4) => Some(InterfaceAddress {
                    ip: v4.ip,
                    netmask: v4.netmask,
                    loopback,
                }),
                if_addrs::IfAddr::V6(_) => None,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 47808);
        assert_eq!(config.device_instance, 389005);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.discovery_interval, Duration::from_secs(3));
        assert_eq!(config.pending_ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.log_file, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_overrides() {
        let config = ClientConfig::from_json(
            r#"{"local_address":"192.168.1.20","subnet_mask":"255.255.255.0",
                "poll_interval_ms":5000,"pending_ttl_ms":null,"device_instance":7,
                "log_file":"app.log"}"#,
        )
        .unwrap();
        assert_eq!(config.local_address, Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.pending_ttl, None);
        assert_eq!(config.device_instance, 7);
        assert_eq!(config.log_file, Some(PathBuf::from("app.log")));
        assert_eq!(config.tick_interval, Duration::from_millis(100));

        assert!(ClientConfig::from_json(r#"{"port":"abc"}"#).is_err());
    }

    #[test]
    fn test_validate() {
        let config = ClientConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let config = ClientConfig {
            device_instance: 0x3F_FFFF,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configured_network_skips_discovery() {
        let config = ClientConfig {
            local_address: Some(Ipv4Addr::new(10, 0, 0, 5)),
            subnet_mask: Some(Ipv4Addr::new(255, 255, 255, 0)),
            ..Default::default()
        };
        let settings = config.resolve_network().unwrap();
        assert_eq!(settings.broadcast_address(), Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(
            settings.bind_socket_addr(),
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 47808)
        );
    }

    #[test]
    fn test_select_interface() {
        let interfaces = [
            InterfaceAddress {
                ip: Ipv4Addr::LOCALHOST,
                netmask: Ipv4Addr::new(255, 0, 0, 0),
                loopback: true,
            },
            InterfaceAddress {
                ip: Ipv4Addr::new(192, 168, 1, 20),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                loopback: false,
            },
            InterfaceAddress {
                ip: Ipv4Addr::new(10, 1, 0, 2),
                netmask: Ipv4Addr::new(255, 255, 0, 0),
                loopback: false,
            },
        ];

        assert_eq!(select_interface(&interfaces, None), Some(interfaces[1]));
        assert_eq!(
            select_interface(&interfaces, Some(Ipv4Addr::new(10, 1, 0, 2))),
            Some(interfaces[2])
        );
        assert_eq!(
            select_interface(&interfaces, Some(Ipv4Addr::new(172, 16, 0, 1))),
            None
        );
        assert_eq!(select_interface(&interfaces[..1], None), None);
    }
}
