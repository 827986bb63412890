//! Inbound Message Decoding
//!
//! The protocol engine renders each datagram as a JSON tree mirroring the
//! packet structure (`BACnetPacket` / `NPDU` / `UnconfirmedRequestPDU` /
//! `ComplexACKPDU` ...). This module deserialises that tree into the few typed
//! shapes the correlator acts on and classifies the packet:
//!
//! - an I-Am becomes [`InboundMessage::DiscoveryAnnouncement`]
//! - a ReadPropertyMultiple acknowledgement becomes [`InboundMessage::ReadResult`]
//! - everything else is [`InboundMessage::Other`]
//!
//! Attributes are underscore-prefixed (`_serviceChoice`, `_text`) and every
//! scalar may arrive either as a JSON number or as its decimal text.
//!
//! A packet that claims to be one of the handled kinds but is missing a
//! required field fails with [`ClientError::DecodeFailure`] as a whole. Inside
//! a read result, a single property whose value cannot be rendered is listed
//! in [`ReadResult::failed`] and the remaining properties are still returned.
//!
//! # Example
//!
//! ```rust
//! use bacnet_poller::message::{decode, InboundMessage};
//!
//! let json = r#"{"BACnetPacket":{"UnconfirmedRequestPDU":{"_serviceChoice":"iAm",
//!     "IAmRequest":{"IAmDeviceIdentifier":{"_objectInstance":"389001","_objectType":"8"},
//!     "VendorId":{"_value":"37"}}}}}"#;
//!
//! match decode(json).unwrap() {
//!     InboundMessage::DiscoveryAnnouncement(iam) => {
//!         assert_eq!(iam.device_id, 389001);
//!         assert_eq!(iam.vendor_id, 37);
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use std::fmt;

use log::warn;
use serde::{
    de::{self, Error as _, IgnoredAny, MapAccess, Visitor},
    Deserialize, Deserializer,
};

use serde_json::Value;

use crate::{
    address::RoutingPair,
    error::{ClientError, Result},
};

/// Service choice label of an I-Am
pub const SERVICE_I_AM: &str = "iAm";

/// Service choice label of a ReadPropertyMultiple acknowledgement
pub const SERVICE_READ_PROPERTY_MULTIPLE: &str = "readPropertyMultiple";

/// A decoded packet, reduced to what the client acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    DiscoveryAnnouncement(DiscoveryAnnouncement),
    ReadResult(ReadResult),
    /// Any packet the client does not handle, with its service label if it had one
    Other { service: Option<String> },
}

/// Contents of an I-Am
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryAnnouncement {
    pub device_id: u32,
    pub vendor_id: u16,
    /// Source network and address when the I-Am came through a router
    pub route: Option<RoutingPair>,
}

/// Contents of a ReadPropertyMultiple acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    /// Invoke ID of the request being answered
    pub invoke_id: u8,
    /// Properties that came back with a value
    pub readings: Vec<PropertyReading>,
    /// Properties that came back with an access error, or with a value
    /// that could not be rendered as text
    pub failed: Vec<String>,
}

/// One property value out of a read result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyReading {
    /// Property label (`"objectName"`)
    pub property: String,
    /// Application datatype element the value was wrapped in (`"CharacterString"`)
    pub datatype: String,
    /// Text rendering of the value
    pub value: String,
}

/// Decode the engine's JSON rendering of a packet
pub fn decode(json: &str) -> Result<InboundMessage> {
    let envelope: Envelope = serde_json::from_str(json)?;
    envelope.packet.classify()
}

/// [`decode`] for a rendering that is still raw bytes
pub fn decode_slice(json: &[u8]) -> Result<InboundMessage> {
    let envelope: Envelope = serde_json::from_slice(json)?;
    envelope.packet.classify()
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "BACnetPacket")]
    packet: Packet,
}

#[derive(Debug, Deserialize)]
struct Packet {
    #[serde(rename = "NPDU", default)]
    npdu: Option<Npdu>,
    #[serde(rename = "UnconfirmedRequestPDU", default)]
    unconfirmed: Option<UnconfirmedRequestPdu>,
    #[serde(rename = "ComplexACKPDU", default)]
    complex_ack: Option<ComplexAckPdu>,
}

#[derive(Debug, Deserialize)]
struct Npdu {
    #[serde(rename = "SourceNetwork", default, deserialize_with = "optional_numeric")]
    source_network: Option<u16>,
    #[serde(rename = "SourceAddress", default)]
    source_address: Option<NpduAddress>,
}

#[derive(Debug, Deserialize)]
struct NpduAddress {
    #[serde(rename = "_length", deserialize_with = "numeric")]
    length: usize,
    #[serde(rename = "_value", default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnconfirmedRequestPdu {
    #[serde(rename = "_serviceChoice")]
    service_choice: String,
    #[serde(rename = "IAmRequest", default)]
    i_am: Option<IAmRequest>,
}

#[derive(Debug, Deserialize)]
struct IAmRequest {
    #[serde(rename = "IAmDeviceIdentifier")]
    device_identifier: DeviceIdentifier,
    #[serde(rename = "VendorId")]
    vendor_id: VendorId,
}

#[derive(Debug, Deserialize)]
struct DeviceIdentifier {
    #[serde(rename = "_objectInstance", deserialize_with = "numeric")]
    instance: u32,
}

#[derive(Debug, Deserialize)]
struct VendorId {
    #[serde(rename = "_value", deserialize_with = "numeric")]
    value: u16,
}

#[derive(Debug, Deserialize)]
struct ComplexAckPdu {
    #[serde(rename = "_serviceChoice")]
    service_choice: String,
    #[serde(rename = "_originalInvokeId", default, deserialize_with = "optional_numeric")]
    original_invoke_id: Option<u8>,
    #[serde(rename = "ReadPropertyMultipleACK", default)]
    read_property_multiple: Option<ReadPropertyMultipleAck>,
}

#[derive(Debug, Deserialize)]
struct ReadPropertyMultipleAck {
    #[serde(rename = "ListOfReadAccessResults")]
    results: ListOfReadAccessResults,
}

#[derive(Debug, Deserialize)]
struct ListOfReadAccessResults {
    #[serde(rename = "ReadAccessResult", default)]
    access_results: OneOrMany<ReadAccessResult>,
}

#[derive(Debug, Deserialize)]
struct ReadAccessResult {
    #[serde(rename = "ListOfResults", default)]
    results: Option<ListOfResults>,
}

#[derive(Debug, Deserialize)]
struct ListOfResults {
    #[serde(rename = "ReadResult", default)]
    results: OneOrMany<ReadResultEntry>,
}

#[derive(Debug, Deserialize)]
struct ReadResultEntry {
    #[serde(rename = "PropertyIdentifier")]
    property: Labelled,
    #[serde(rename = "PropertyValue", default)]
    value: Option<TypedValue>,
    #[serde(rename = "PropertyAccessError", default)]
    access_error: Option<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct Labelled {
    #[serde(rename = "_text")]
    text: String,
}

/// A single element or a list of them; the engine emits a bare object when a
/// list has one entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// A property value wrapped in its datatype element:
/// `{"_text": "...", "CharacterString": {"_text": "Example name"}}`.
/// The first non-attribute key, in document order, names the datatype. Its
/// element is kept as-is since arrays (`objectList`) and constructed values
/// (`DateTime`) have no `_text` of their own.
#[derive(Debug, Clone, PartialEq)]
struct TypedValue {
    label: Option<String>,
    datatype: Option<(String, Value)>,
}

impl<'de> Deserialize<'de> for TypedValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TypedValueVisitor;

        impl<'de> Visitor<'de> for TypedValueVisitor {
            type Value = TypedValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a property value wrapped in a datatype element")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<TypedValue, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut value = TypedValue {
                    label: None,
                    datatype: None,
                };
                while let Some(key) = map.next_key::<String>()? {
                    if key == "_text" {
                        value.label = match map.next_value::<Value>()? {
                            Value::String(text) => Some(text),
                            _ => None,
                        };
                    } else if value.datatype.is_some() || key.starts_with('_') {
                        map.next_value::<IgnoredAny>()?;
                    } else {
                        value.datatype = Some((key, map.next_value()?));
                    }
                }
                Ok(value)
            }
        }

        deserializer.deserialize_map(TypedValueVisitor)
    }
}

impl TypedValue {
    /// Datatype name and text rendering of the value
    fn resolve(self) -> std::result::Result<(String, String), String> {
        let Some((datatype, element)) = self.datatype else {
            return Err("value carries no datatype element".into());
        };

        let text = match &element {
            Value::Object(fields) => match fields.get("_text") {
                Some(Value::String(text)) => Some(text.clone()),
                _ => self
                    .label
                    .filter(|label| !label.is_empty())
                    .or_else(|| element_text(&element)),
            },
            _ => element_text(&element),
        };

        text.map(|text| (datatype.clone(), text))
            .ok_or_else(|| format!("{} element has no text", datatype))
    }
}

/// Text of an arbitrary element: its `_text`, the texts of array items
/// joined with `"; "`, or the texts of a constructed value's fields joined
/// with a space.
fn element_text(element: &Value) -> Option<String> {
    match element {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(element_text)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Value::Object(fields) => {
            if let Some(Value::String(text)) = fields.get("_text") {
                return Some(text.clone());
            }
            let parts: Vec<String> = fields
                .iter()
                .filter(|(key, _)| !key.starts_with('_'))
                .filter_map(|(_, value)| element_text(value))
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(u64),
    Text(String),
}

impl Numeric {
    fn into_u64<E: de::Error>(self) -> std::result::Result<u64, E> {
        match self {
            Numeric::Number(n) => Ok(n),
            Numeric::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a number, got '{}'", s))),
        }
    }
}

fn numeric<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let raw = Numeric::deserialize(deserializer)?.into_u64::<D::Error>()?;
    T::try_from(raw).map_err(|_| D::Error::custom(format!("{} is out of range", raw)))
}

fn optional_numeric<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    match Option::<Numeric>::deserialize(deserializer)? {
        Some(n) => {
            let raw = n.into_u64::<D::Error>()?;
            T::try_from(raw)
                .map(Some)
                .map_err(|_| D::Error::custom(format!("{} is out of range", raw)))
        }
        None => Ok(None),
    }
}

impl Packet {
    fn classify(self) -> Result<InboundMessage> {
        if let Some(pdu) = self.unconfirmed {
            if pdu.service_choice == SERVICE_I_AM {
                let i_am = pdu.i_am.ok_or_else(|| {
                    ClientError::DecodeFailure("I-Am without IAmRequest body".into())
                })?;
                let route = match self.npdu {
                    Some(npdu) => npdu.source_route()?,
                    None => None,
                };
                return Ok(InboundMessage::DiscoveryAnnouncement(DiscoveryAnnouncement {
                    device_id: i_am.device_identifier.instance,
                    vendor_id: i_am.vendor_id.value,
                    route,
                }));
            }
            return Ok(InboundMessage::Other {
                service: Some(pdu.service_choice),
            });
        }

        if let Some(pdu) = self.complex_ack {
            if pdu.service_choice == SERVICE_READ_PROPERTY_MULTIPLE {
                return pdu.into_read_result().map(InboundMessage::ReadResult);
            }
            return Ok(InboundMessage::Other {
                service: Some(pdu.service_choice),
            });
        }

        Ok(InboundMessage::Other { service: None })
    }
}

impl Npdu {
    fn source_route(self) -> Result<Option<RoutingPair>> {
        let Some(network) = self.source_network else {
            return Ok(None);
        };

        let address = match self.source_address {
            Some(NpduAddress {
                length,
                value: Some(value),
            }) => {
                let digits = value.trim().trim_start_matches("0x");
                let bytes = hex::decode(digits).map_err(|e| {
                    ClientError::DecodeFailure(format!("bad source address '{}': {}", value, e))
                })?;
                if bytes.len() != length {
                    return Err(ClientError::DecodeFailure(format!(
                        "source address '{}' does not match length {}",
                        value, length
                    )));
                }
                bytes
            }
            _ => Vec::new(),
        };

        Ok(Some(RoutingPair::new(network, address)))
    }
}

impl ComplexAckPdu {
    fn into_read_result(self) -> Result<ReadResult> {
        let invoke_id = self.original_invoke_id.ok_or_else(|| {
            ClientError::DecodeFailure("ReadPropertyMultiple ACK without invoke ID".into())
        })?;
        let ack = self.read_property_multiple.ok_or_else(|| {
            ClientError::DecodeFailure("ReadPropertyMultiple ACK without result list".into())
        })?;

        let mut readings = Vec::new();
        let mut failed = Vec::new();
        let entries = ack
            .results
            .access_results
            .into_vec()
            .into_iter()
            .filter_map(|access| access.results)
            .flat_map(|list| list.results.into_vec());

        for entry in entries {
            match entry.value.map(TypedValue::resolve) {
                Some(Ok((datatype, value))) => readings.push(PropertyReading {
                    property: entry.property.text,
                    datatype,
                    value,
                }),
                Some(Err(reason)) => {
                    warn!("Unreadable value for {}: {}", entry.property.text, reason);
                    failed.push(entry.property.text);
                }
                None => {
                    if entry.access_error.is_none() {
                        return Err(ClientError::DecodeFailure(format!(
                            "result for {} has neither a value nor an error",
                            entry.property.text
                        )));
                    }
                    failed.push(entry.property.text);
                }
            }
        }

        Ok(ReadResult {
            invoke_id,
            readings,
            failed,
        })
    }
}
