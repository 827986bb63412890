//! Inbound Frame Queue
//!
//! Decouples datagram arrival from protocol processing. The socket task only
//! ever calls [`InboundFrameQueue::enqueue`]; the engine's tick is the only
//! consumer and pulls frames in arrival order through the host's receive
//! callback. Enqueue never blocks on the consumer and never drops a frame.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;

use crate::address::ConnectionDescriptor;

/// A datagram waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Raw BACnet/IP payload
    pub payload: Bytes,
    /// Peer the datagram came from
    pub sender: ConnectionDescriptor,
}

impl InboundFrame {
    pub fn new(payload: impl Into<Bytes>, sender: ConnectionDescriptor) -> Self {
        Self {
            payload: payload.into(),
            sender,
        }
    }
}

/// FIFO of received datagrams
#[derive(Debug, Default)]
pub struct InboundFrameQueue {
    frames: Mutex<VecDeque<InboundFrame>>,
}

impl InboundFrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn frames(&self) -> MutexGuard<'_, VecDeque<InboundFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame at the tail
    pub fn enqueue(&self, payload: impl Into<Bytes>, sender: ConnectionDescriptor) {
        self.frames().push_back(InboundFrame::new(payload, sender));
    }

    /// Remove and return the oldest frame
    pub fn dequeue(&self) -> Option<InboundFrame> {
        self.frames().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    fn peer(last: u8) -> ConnectionDescriptor {
        format!("10.0.0.{}:47808", last).parse().unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let queue = InboundFrameQueue::new();
        assert!(queue.dequeue().is_none());

        queue.enqueue(vec![1u8], peer(1));
        queue.enqueue(vec![2u8], peer(2));
        queue.enqueue(vec![3u8], peer(1));
        assert_eq!(queue.len(), 3);

        let first = queue.dequeue().unwrap();
        assert_eq!(first.payload.as_ref(), &[1]);
        assert_eq!(first.sender, peer(1));
        assert_eq!(queue.dequeue().unwrap().payload.as_ref(), &[2]);
        assert_eq!(queue.dequeue().unwrap().payload.as_ref(), &[3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_identical_frames_not_coalesced() {
        let queue = InboundFrameQueue::new();
        queue.enqueue(vec![0xAAu8], peer(1));
        queue.enqueue(vec![0xAAu8], peer(1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(InboundFrameQueue::new());
        let producers: Vec<_> = (0..4u8)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250u8 {
                        queue.enqueue(vec![p, i], peer(p));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(queue.len(), 1000);

        // Per-producer order is preserved
        let mut last_seen = [None::<u8>; 4];
        while let Some(frame) = queue.dequeue() {
            let (p, i) = (frame.payload[0] as usize, frame.payload[1]);
            if let Some(prev) = last_seen[p] {
                assert!(i > prev);
            }
            last_seen[p] = Some(i);
        }
    }
}
