use crate::{packet::Packet, units::Bytes};

use super::{Admission, QDisc, QIndex, Queue};

/// Strict two-class priority.
///
/// Class [`QIndex::ZERO`] is served first; every other class index shares the low-priority
/// FIFO. When the buffer is full, a high-priority arrival pushes out the most recently queued
/// low-priority packet instead of being dropped.
#[derive(Debug, Clone, derive_new::new)]
pub struct PriorityQ {
    capacity: usize,
    #[new(default)]
    high: Queue,
    #[new(default)]
    low: Queue,
}

impl PriorityQ {
    fn is_high(pkt: &Packet) -> bool {
        pkt.class == QIndex::ZERO
    }
}

impl QDisc for PriorityQ {
    fn enqueue(&mut self, pkt: Packet) -> Admission {
        let high = Self::is_high(&pkt);
        if self.len() < self.capacity {
            if high {
                self.high.enqueue(pkt);
            } else {
                self.low.enqueue(pkt);
            }
            return Admission::Queued;
        }
        if high {
            if let Some(victim) = self.low.evict_tail() {
                self.high.enqueue(pkt);
                return Admission::Evicted(victim);
            }
        }
        Admission::Dropped(pkt)
    }

    fn dequeue(&mut self) -> Option<Packet> {
        self.high.dequeue().or_else(|| self.low.dequeue())
    }

    fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }

    fn size(&self) -> Bytes {
        self.high.size() + self.low.size()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }
}
