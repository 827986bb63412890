//! BACnet Object Types and Property Identifiers
//!
//! The subset of ASHRAE 135 enumerations the poller needs to address a read
//! request and to label what comes back. Both enumerations carry the numeric
//! wire value and the camelCase label the protocol engine prints when it
//! renders a packet; anything not listed survives as `Other(value)`.
//!
//! # Example
//!
//! ```rust
//! use bacnet_poller::object::{ObjectIdentifier, ObjectType, PropertyIdentifier};
//!
//! let device = ObjectIdentifier::new(ObjectType::Device, 389001);
//! assert!(device.is_valid());
//! assert_eq!(device.to_string(), "device, 389001");
//!
//! assert_eq!(u32::from(PropertyIdentifier::ObjectName), 77);
//! assert_eq!("objectName".parse::<PropertyIdentifier>().unwrap(), PropertyIdentifier::ObjectName);
//! ```

use std::fmt;

use crate::bacnet_enum;

/// Largest valid object instance number (22 bits, 4194303 is reserved)
pub const MAX_INSTANCE: u32 = 0x3F_FFFE;

bacnet_enum! {
    /// BACnet object types (clause 21, BACnetObjectType)
    ObjectType {
        AnalogInput = 0 => "analogInput",
        AnalogOutput = 1 => "analogOutput",
        AnalogValue = 2 => "analogValue",
        BinaryInput = 3 => "binaryInput",
        BinaryOutput = 4 => "binaryOutput",
        BinaryValue = 5 => "binaryValue",
        Calendar = 6 => "calendar",
        Command = 7 => "command",
        Device = 8 => "device",
        EventEnrollment = 9 => "eventEnrollment",
        File = 10 => "file",
        Group = 11 => "group",
        Loop = 12 => "loop",
        MultiStateInput = 13 => "multiStateInput",
        MultiStateOutput = 14 => "multiStateOutput",
        NotificationClass = 15 => "notificationClass",
        Program = 16 => "program",
        Schedule = 17 => "schedule",
        Averaging = 18 => "averaging",
        MultiStateValue = 19 => "multiStateValue",
        TrendLog = 20 => "trendLog",
    },
    u16
}

bacnet_enum! {
    /// BACnet property identifiers (clause 21, BACnetPropertyIdentifier)
    PropertyIdentifier {
        All = 8 => "all",
        ApplicationSoftwareVersion = 12 => "applicationSoftwareVersion",
        Description = 28 => "description",
        FirmwareRevision = 44 => "firmwareRevision",
        Location = 58 => "location",
        MaxApduLengthAccepted = 62 => "maxApduLengthAccepted",
        ModelName = 70 => "modelName",
        ObjectIdentifier = 75 => "objectIdentifier",
        ObjectList = 76 => "objectList",
        ObjectName = 77 => "objectName",
        ObjectType = 79 => "objectType",
        Optional = 80 => "optional",
        PresentValue = 85 => "presentValue",
        ProtocolVersion = 98 => "protocolVersion",
        Required = 105 => "required",
        SegmentationSupported = 107 => "segmentationSupported",
        StatusFlags = 111 => "statusFlags",
        SystemStatus = 112 => "systemStatus",
        Units = 117 => "units",
        VendorIdentifier = 120 => "vendorIdentifier",
        VendorName = 121 => "vendorName",
    },
    u32
}

/// Object identifier (type + instance number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentifier {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectIdentifier {
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }

    /// Check if instance number is valid (0-4194302)
    pub fn is_valid(&self) -> bool {
        self.instance <= MAX_INSTANCE
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.object_type, self.instance)
    }
}
