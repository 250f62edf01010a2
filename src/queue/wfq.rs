use std::collections::VecDeque;

use crate::{packet::Packet, units::Bytes};

use super::{Admission, QDisc, Queue};

/// Weighted fair queuing over a fixed set of classes.
///
/// Every packet is stamped with a virtual finish time when it is admitted:
/// `max(vtime, last_finish[class]) + size / weight[class]`. The head with the smallest finish
/// time is served next and `vtime` advances to it (self-clocked). Packets whose class index
/// exceeds the configured classes are served from the last class.
#[derive(Debug, Clone)]
pub struct WfqQ {
    capacity: usize,
    classes: Vec<Class>,
    vtime: f64,
}

#[derive(Debug, Clone)]
struct Class {
    weight: f64,
    queue: Queue,
    finish: VecDeque<f64>,
    last_finish: f64,
}

impl WfqQ {
    /// # Panics
    ///
    /// Panics if `weights` is empty or any weight is not a positive finite number.
    pub fn new(capacity: usize, weights: &[f64]) -> Self {
        assert!(!weights.is_empty(), "WFQ needs at least one class");
        assert!(
            weights.iter().all(|w| w.is_finite() && *w > 0.0),
            "WFQ weights must be positive"
        );
        let classes = weights
            .iter()
            .map(|&weight| Class {
                weight,
                queue: Queue::default(),
                finish: VecDeque::new(),
                last_finish: 0.0,
            })
            .collect();
        Self {
            capacity,
            classes,
            vtime: 0.0,
        }
    }

    fn class_of(&self, pkt: &Packet) -> usize {
        pkt.class.inner().min(self.classes.len() - 1)
    }

    fn finish_time(&self, idx: usize, pkt: &Packet) -> f64 {
        let class = &self.classes[idx];
        self.vtime.max(class.last_finish) + pkt.size().into_f64() / class.weight
    }

    fn admit(&mut self, idx: usize, finish: f64, pkt: Packet) {
        let class = &mut self.classes[idx];
        class.queue.enqueue(pkt);
        class.finish.push_back(finish);
        class.last_finish = finish;
    }

    // The other nonempty class whose newest packet finishes last
    fn latest_tail(&self, except: usize) -> Option<(usize, f64)> {
        self.classes
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx != except)
            .filter_map(|(idx, class)| class.finish.back().map(|&f| (idx, f)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl QDisc for WfqQ {
    fn enqueue(&mut self, pkt: Packet) -> Admission {
        let idx = self.class_of(&pkt);
        let finish = self.finish_time(idx, &pkt);
        if self.len() < self.capacity {
            self.admit(idx, finish, pkt);
            return Admission::Queued;
        }
        match self.latest_tail(idx) {
            Some((other, tail)) if finish < tail => {
                let vtime = self.vtime;
                let victim = {
                    let class = &mut self.classes[other];
                    class.finish.pop_back();
                    class.last_finish = class.finish.back().copied().unwrap_or(vtime);
                    class.queue.evict_tail().expect("finish times out of sync with queue")
                };
                self.admit(idx, finish, pkt);
                Admission::Evicted(victim)
            }
            _ => Admission::Dropped(pkt),
        }
    }

    fn dequeue(&mut self) -> Option<Packet> {
        // Ties go to the lower class index
        let idx = self
            .classes
            .iter()
            .enumerate()
            .filter_map(|(idx, class)| class.finish.front().map(|&f| (idx, f)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))?
            .0;
        let class = &mut self.classes[idx];
        let finish = class.finish.pop_front()?;
        self.vtime = self.vtime.max(finish);
        class.queue.dequeue()
    }

    fn len(&self) -> usize {
        self.classes.iter().map(|c| c.queue.len()).sum()
    }

    fn size(&self) -> Bytes {
        self.classes.iter().map(|c| c.queue.size()).sum()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }
}
