use std::{collections::VecDeque, fmt};

use crate::{packet::Packet, units::Bytes};

mod priority;
mod wfq;

pub use priority::PriorityQ;
pub use wfq::WfqQ;

/// A bounded queueing discipline attached to a link.
///
/// Capacity is counted in packets.
pub trait QDisc: fmt::Debug {
    fn enqueue(&mut self, pkt: Packet) -> Admission;

    fn dequeue(&mut self) -> Option<Packet>;

    /// Number of queued packets.
    fn len(&self) -> usize;

    /// Total size of queued packets.
    fn size(&self) -> Bytes;

    fn capacity(&self) -> usize;

    /// Changes the capacity. Packets already queued beyond a smaller capacity stay queued.
    fn set_capacity(&mut self, capacity: usize);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The outcome of offering a packet to a queue.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Admission {
    Queued,
    /// The offered packet was refused.
    Dropped(Packet),
    /// The offered packet was queued in place of this one.
    Evicted(Packet),
}

/// A queue class index.
///
/// Each class has its own FIFO; multi-class disciplines decide between them.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct QIndex(usize);

impl QIndex {
    /// Queue index zero.
    pub const ZERO: QIndex = QIndex::new(0);
    /// Queue index one.
    pub const ONE: QIndex = QIndex::new(1);

    /// Create a new queue index.
    pub const fn new(val: usize) -> Self {
        Self(val)
    }

    /// Get the inner value of the queue index.
    pub const fn inner(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Queue {
    inner: VecDeque<Packet>,
    qsize: Bytes,
}

impl Queue {
    pub(crate) fn enqueue(&mut self, pkt: Packet) {
        self.qsize += pkt.size();
        self.inner.push_back(pkt);
    }

    pub(crate) fn dequeue(&mut self) -> Option<Packet> {
        let pkt = self.inner.pop_front()?;
        self.qsize -= pkt.size();
        Some(pkt)
    }

    /// Removes the most recently queued packet.
    pub(crate) fn evict_tail(&mut self) -> Option<Packet> {
        let pkt = self.inner.pop_back()?;
        self.qsize -= pkt.size();
        Some(pkt)
    }

    pub(crate) fn size(&self) -> Bytes {
        self.qsize
    }

    delegate::delegate! {
        to self.inner {
            pub(crate) fn len(&self) -> usize;
        }
    }
}

/// First-in first-out; arrivals to a full queue are dropped.
#[derive(Debug, Clone, derive_new::new)]
pub struct DropTailQ {
    capacity: usize,
    #[new(default)]
    inner: Queue,
}

impl QDisc for DropTailQ {
    fn enqueue(&mut self, pkt: Packet) -> Admission {
        if self.inner.len() < self.capacity {
            self.inner.enqueue(pkt);
            Admission::Queued
        } else {
            Admission::Dropped(pkt)
        }
    }

    fn dequeue(&mut self) -> Option<Packet> {
        self.inner.dequeue()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn size(&self) -> Bytes {
        self.inner.size()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }
}
