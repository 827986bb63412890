//! Property Store
//!
//! [`PropertyStore`] caches the last value read from each remote property.
//! [`LocalProperties`] holds the values this client serves about its own
//! device when the engine asks through the host's property callback; the two
//! are never mixed.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{PoisonError, RwLock},
};

use crate::object::{ObjectIdentifier, ObjectType, PropertyIdentifier};

/// Identity of a cached remote property
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey {
    /// Remote network the device sits on, `None` for the local network
    pub network: Option<u16>,
    pub device_id: u32,
    pub object: ObjectIdentifier,
    /// Property label as reported in the read result (`"objectName"`, ...)
    pub property: String,
}

impl PropertyKey {
    pub fn new(device_id: u32, object: ObjectIdentifier, property: impl Into<String>) -> Self {
        Self {
            network: None,
            device_id,
            object,
            property: property.into(),
        }
    }

    /// Scope the key to a remote network
    pub fn routed_via(mut self, network: Option<u16>) -> Self {
        self.network = network;
        self
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(network) = self.network {
            write!(f, "{}/", network)?;
        }
        write!(
            f,
            "{}/{}/{}/{}",
            self.device_id, self.object.object_type, self.object.instance, self.property
        )
    }
}

/// Last-observed values of remote properties
#[derive(Debug, Default)]
pub struct PropertyStore {
    values: RwLock<BTreeMap<PropertyKey, String>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the one it replaced
    pub fn put(&self, key: PropertyKey, value: impl Into<String>) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.into())
    }

    pub fn get(&self, key: &PropertyKey) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Copy of every value, ordered by key
    pub fn snapshot(&self) -> BTreeMap<PropertyKey, String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lookup key for a locally served property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPropertyKey {
    pub device_id: u32,
    pub object: ObjectIdentifier,
    pub property: PropertyIdentifier,
}

/// Character-string properties of the client's own device
#[derive(Debug, Default)]
pub struct LocalProperties {
    values: RwLock<HashMap<LocalPropertyKey, String>>,
}

impl LocalProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table serving the device object's name
    pub fn for_device(device_id: u32, name: impl Into<String>) -> Self {
        let properties = Self::new();
        properties.set(
            device_id,
            ObjectIdentifier::new(ObjectType::Device, device_id),
            PropertyIdentifier::ObjectName,
            name,
        );
        properties
    }

    pub fn set(
        &self,
        device_id: u32,
        object: ObjectIdentifier,
        property: PropertyIdentifier,
        value: impl Into<String>,
    ) {
        let key = LocalPropertyKey {
            device_id,
            object,
            property,
        };
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.into());
    }

    pub fn get(&self, key: &LocalPropertyKey) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(instance: u32) -> ObjectIdentifier {
        ObjectIdentifier::new(ObjectType::Device, instance)
    }

    #[test]
    fn test_put_overwrites() {
        let store = PropertyStore::new();
        let key = PropertyKey::new(389001, device(389001), "objectName");

        assert_eq!(store.put(key.clone(), "first"), None);
        assert_eq!(store.put(key.clone(), "second"), Some("first".to_string()));
        assert_eq!(store.get(&key).as_deref(), Some("second"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_route_scopes_keys() {
        let store = PropertyStore::new();
        let local = PropertyKey::new(7, device(7), "objectName");
        let routed = local.clone().routed_via(Some(2001));

        store.put(local.clone(), "local");
        store.put(routed.clone(), "behind router");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&local).as_deref(), Some("local"));
        assert_eq!(store.get(&routed).as_deref(), Some("behind router"));
    }

    #[test]
    fn test_key_display() {
        let key = PropertyKey::new(389001, device(389001), "objectName");
        assert_eq!(key.to_string(), "389001/device/389001/objectName");
        assert_eq!(
            key.routed_via(Some(5)).to_string(),
            "5/389001/device/389001/objectName"
        );
    }

    #[test]
    fn test_local_properties() {
        let local = LocalProperties::for_device(389005, "Example name");
        let key = LocalPropertyKey {
            device_id: 389005,
            object: device(389005),
            property: PropertyIdentifier::ObjectName,
        };
        assert_eq!(local.get(&key).as_deref(), Some("Example name"));

        let missing = LocalPropertyKey {
            property: PropertyIdentifier::Description,
            ..key
        };
        assert_eq!(local.get(&missing), None);
    }
}
