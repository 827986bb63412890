//! Pending-Request Table
//!
//! Outstanding confirmed requests waiting for their acknowledgement. Invoke
//! IDs are assigned per peer, so the key is always the pair of connection and
//! invoke ID: the same invoke ID on two connections names two requests.
//!
//! A response claims its request with [`PendingRequestTable::take_if_present`],
//! which looks up and removes under one lock so a request is consumed at most
//! once even if the poller and the correlator run on different threads.

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::warn;

use crate::{
    address::{ConnectionDescriptor, RoutingPair},
    error::{ClientError, Result},
    object::ObjectIdentifier,
};

/// Composite key of an outstanding request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingKey {
    pub connection: ConnectionDescriptor,
    pub invoke_id: u8,
}

impl PendingKey {
    pub fn new(connection: ConnectionDescriptor, invoke_id: u8) -> Self {
        Self {
            connection,
            invoke_id,
        }
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.connection, self.invoke_id)
    }
}

/// What a request asked for, recorded at send time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Device instance the request was addressed to
    pub device_id: u32,
    /// Object whose properties were requested
    pub object: ObjectIdentifier,
    /// Route used when the request was sent
    pub route: Option<RoutingPair>,
    /// When the request was handed to the engine
    pub issued_at: Instant,
}

impl PendingRequest {
    pub fn new(device_id: u32, object: ObjectIdentifier, route: Option<RoutingPair>) -> Self {
        Self {
            device_id,
            object,
            route,
            issued_at: Instant::now(),
        }
    }
}

/// Thread-safe table of outstanding requests
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    requests: Mutex<HashMap<PendingKey, PendingRequest>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn requests(&self) -> MutexGuard<'_, HashMap<PendingKey, PendingRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a request. An unconsumed entry under the same key is kept and
    /// the new one rejected with [`ClientError::DuplicateKey`].
    pub fn insert(
        &self,
        connection: ConnectionDescriptor,
        invoke_id: u8,
        request: PendingRequest,
    ) -> Result<()> {
        let key = PendingKey::new(connection, invoke_id);
        let mut requests = self.requests();
        if requests.contains_key(&key) {
            return Err(ClientError::DuplicateKey {
                connection,
                invoke_id,
            });
        }
        requests.insert(key, request);
        Ok(())
    }

    /// Remove and return the request under this key, if any
    pub fn take_if_present(
        &self,
        connection: ConnectionDescriptor,
        invoke_id: u8,
    ) -> Option<PendingRequest> {
        self.requests()
            .remove(&PendingKey::new(connection, invoke_id))
    }

    pub fn contains(&self, connection: ConnectionDescriptor, invoke_id: u8) -> bool {
        self.requests()
            .contains_key(&PendingKey::new(connection, invoke_id))
    }

    pub fn len(&self) -> usize {
        self.requests().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests().is_empty()
    }

    /// Copy of every entry, ordered by key
    pub fn snapshot(&self) -> Vec<(PendingKey, PendingRequest)> {
        let mut entries: Vec<_> = self
            .requests()
            .iter()
            .map(|(key, request)| (*key, request.clone()))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }

    /// Drop every request issued more than `ttl` before `now` and return them
    pub fn evict_expired(&self, ttl: Duration, now: Instant) -> Vec<(PendingKey, PendingRequest)> {
        let mut expired = Vec::new();
        self.requests().retain(|key, request| {
            if now.saturating_duration_since(request.issued_at) > ttl {
                expired.push((*key, request.clone()));
                false
            } else {
                true
            }
        });

        for (key, request) in &expired {
            warn!(
                "Request {} for device {} expired without a response after {:?}",
                key, request.device_id, ttl
            );
        }
        expired.sort_by_key(|(key, _)| *key);
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectType;
    use proptest::prelude::*;
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    fn conn(s: &str) -> ConnectionDescriptor {
        s.parse().unwrap()
    }

    fn request(device_id: u32) -> PendingRequest {
        PendingRequest::new(
            device_id,
            ObjectIdentifier::new(ObjectType::Device, device_id),
            None,
        )
    }

    #[test]
    fn test_insert_take_exactly_once() {
        let table = PendingRequestTable::new();
        let c = conn("10.0.0.2:47808");

        table.insert(c, 5, request(389001)).unwrap();
        assert!(table.contains(c, 5));

        let taken = table.take_if_present(c, 5).unwrap();
        assert_eq!(taken.device_id, 389001);
        assert!(table.take_if_present(c, 5).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_key_rejected_and_original_kept() {
        let table = PendingRequestTable::new();
        let c = conn("10.0.0.2:47808");

        table.insert(c, 5, request(1)).unwrap();
        let err = table.insert(c, 5, request(2)).unwrap_err();
        assert!(matches!(
            err,
            ClientError::DuplicateKey { invoke_id: 5, .. }
        ));

        assert_eq!(table.take_if_present(c, 5).unwrap().device_id, 1);
    }

    #[test]
    fn test_same_invoke_id_on_different_connections_does_not_alias() {
        let table = PendingRequestTable::new();
        let a = conn("10.0.0.2:47808");
        let b = conn("10.0.0.3:47808");

        table.insert(a, 7, request(100)).unwrap();
        table.insert(b, 7, request(200)).unwrap();
        assert_eq!(table.len(), 2);

        assert_eq!(table.take_if_present(b, 7).unwrap().device_id, 200);
        assert_eq!(table.take_if_present(a, 7).unwrap().device_id, 100);
    }

    #[test]
    fn test_evict_expired() {
        let table = PendingRequestTable::new();
        let c = conn("10.0.0.2:47808");
        table.insert(c, 1, request(1)).unwrap();
        table.insert(c, 2, request(2)).unwrap();

        let now = Instant::now();
        assert!(table.evict_expired(Duration::from_secs(30), now).is_empty());
        assert_eq!(table.len(), 2);

        let later = now + Duration::from_secs(31);
        let expired = table.evict_expired(Duration::from_secs(30), later);
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].0, PendingKey::new(c, 1));
        assert!(table.is_empty());

        // Key is free again once the stale entry is gone
        table.insert(c, 1, request(1)).unwrap();
    }

    #[test]
    fn test_concurrent_takes_consume_once() {
        let table = Arc::new(PendingRequestTable::new());
        let c = conn("10.0.0.2:47808");

        for _ in 0..50 {
            table.insert(c, 9, request(1)).unwrap();
            let barrier = Arc::new(Barrier::new(4));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let table = Arc::clone(&table);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        table.take_if_present(c, 9).is_some()
                    })
                })
                .collect();
            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
        }
    }

    #[test]
    fn test_insert_racing_take_on_same_key() {
        let table = Arc::new(PendingRequestTable::new());
        let c = conn("10.0.0.2:47808");

        for _ in 0..50 {
            table.insert(c, 3, request(1)).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let inserter = {
                let table = Arc::clone(&table);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    table.insert(c, 3, request(2)).is_ok()
                })
            };
            let taker = {
                let table = Arc::clone(&table);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    table.take_if_present(c, 3)
                })
            };

            let inserted = inserter.join().unwrap();
            let taken = taker.join().unwrap().expect("original entry is always taken once");
            if inserted {
                // Take ran first: the original is consumed and the new request is pending
                assert_eq!(taken.device_id, 1);
                assert_eq!(table.take_if_present(c, 3).unwrap().device_id, 2);
            } else {
                // Insert was rejected: only the original existed
                assert_eq!(taken.device_id, 1);
                assert!(table.take_if_present(c, 3).is_none());
            }
        }
    }

    proptest! {
        #[test]
        fn prop_take_returns_each_insert_once(ids in proptest::collection::hash_set(any::<u8>(), 0..64)) {
            let table = PendingRequestTable::new();
            let c = conn("192.168.1.10:47808");
            for id in &ids {
                table.insert(c, *id, request(*id as u32)).unwrap();
            }
            for id in &ids {
                let taken = table.take_if_present(c, *id);
                prop_assert_eq!(taken.map(|r| r.device_id), Some(*id as u32));
                prop_assert!(table.take_if_present(c, *id).is_none());
            }
            prop_assert!(table.is_empty());
        }
    }
}
