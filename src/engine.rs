//! Protocol Engine Contract
//!
//! The BACnet encoding, timers and retries live in an external protocol
//! engine. The engine is driven through [`ProtocolEngine`] and calls back into
//! the client through [`EngineHost`], which the client implements (see
//! [`crate::host::ClientHost`]). Every callback the engine may make during a
//! tick is a method on the host it is handed, so no global state or function
//! pointers cross the boundary.
//!
//! ```text
//!   ProtocolEngine::tick(host) ──► host.receive_message()  (inbound queue)
//!                             ──► host.send_message()     (transport)
//!                             ──► host.system_time()
//!                             ──► host.get_property()     (local properties)
//!                             ──► host.log_message()      (log facade)
//! ```

use std::fmt;

use crate::{
    address::{ConnectionDescriptor, RoutingPair},
    error::Result,
    object::{ObjectIdentifier, PropertyIdentifier},
};

/// Severity of an engine diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A property the engine wants to serve on behalf of the local device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyQuery {
    pub device_id: u32,
    pub object: ObjectIdentifier,
    pub property: PropertyIdentifier,
    pub array_index: Option<u32>,
}

/// A confirmed ReadPropertyMultiple the client asks the engine to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Peer to send to
    pub connection: ConnectionDescriptor,
    /// Route through a BACnet router, if the device is remote
    pub route: Option<RoutingPair>,
    /// Object to read from
    pub object: ObjectIdentifier,
    /// Property to read (`All` for every property)
    pub property: PropertyIdentifier,
}

/// Callbacks the engine makes into the client
pub trait EngineHost {
    /// Deliver `payload` to `destination`, or to the subnet broadcast address
    /// on the destination's port. Returns the number of bytes handed to the
    /// transport, 0 on failure.
    fn send_message(
        &mut self,
        payload: &[u8],
        destination: ConnectionDescriptor,
        broadcast: bool,
    ) -> usize;

    /// Copy the oldest received datagram into `buffer`. Returns its length and
    /// sender, or `None` when nothing is waiting.
    fn receive_message(&mut self, buffer: &mut [u8]) -> Option<(usize, ConnectionDescriptor)>;

    /// Wall-clock time in seconds since the Unix epoch
    fn system_time(&self) -> u64;

    /// Value of a character-string property of the local device
    fn get_property(&self, query: &PropertyQuery) -> Option<String>;

    /// Diagnostic from inside the engine
    fn log_message(&self, message: &str, severity: Severity);
}

/// The external BACnet protocol engine
pub trait ProtocolEngine: Send {
    /// Run timers and process received datagrams
    fn tick(&mut self, host: &mut dyn EngineHost);

    /// Broadcast a Who-Is for all device instances
    fn send_who_is(
        &mut self,
        host: &mut dyn EngineHost,
        destination: ConnectionDescriptor,
    ) -> Result<()>;

    /// Send a ReadPropertyMultiple and return the invoke ID assigned to it
    fn send_read_property(&mut self, host: &mut dyn EngineHost, request: &ReadRequest)
        -> Result<u8>;

    /// Render a received datagram as the engine's JSON packet tree
    fn render(&self, payload: &[u8]) -> Result<String>;
}
