use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::time::{Delta, Time};

use super::{
    event::{Event, EventId},
    Command,
};

/// The virtual clock together with the pending-event heap.
///
/// Cancellation is lazy: a canceled event stays in the heap and is discarded when it reaches
/// the top. `armed` holds every event that has not fired yet, mapped to its canceled flag.
#[derive(Debug, Default)]
pub(crate) struct Schedule {
    now: Time,
    heap: BinaryHeap<Event>,
    armed: FxHashMap<EventId, bool>,
    next_id: usize,
}

impl Schedule {
    pub(crate) fn now(&self) -> Time {
        self.now
    }

    pub(crate) fn schedule(&mut self, delay: Delta, cmd: impl Into<Command>) -> EventId {
        self.schedule_at(self.now + delay, cmd)
    }

    pub(crate) fn schedule_at(&mut self, time: Time, cmd: impl Into<Command>) -> EventId {
        assert!(time >= self.now, "cannot schedule into the past");
        let id = EventId::new(self.next_id);
        self.next_id += 1;
        let ev = Event::new(time, id, cmd);
        tracing::trace!(time = %time, id = %id, cmd = ?ev.cmd, "schedule");
        self.armed.insert(id, false);
        self.heap.push(ev);
        id
    }

    /// Marks a pending event inert. Returns `false` if it already fired (or never existed).
    pub(crate) fn cancel(&mut self, id: EventId) -> bool {
        match self.armed.get_mut(&id) {
            Some(canceled) => {
                *canceled = true;
                true
            }
            None => false,
        }
    }

    /// Time of the earliest live event.
    pub(crate) fn peek_time(&mut self) -> Option<Time> {
        self.discard_canceled();
        self.heap.peek().map(Event::time)
    }

    /// Removes the earliest live event and advances the clock to it.
    pub(crate) fn pop(&mut self) -> Option<Event> {
        self.discard_canceled();
        let ev = self.heap.pop()?;
        self.armed.remove(&ev.id());
        assert!(self.now <= ev.time(), "virtual clock moved backwards");
        self.now = ev.time();
        Some(ev)
    }

    /// Moves the clock forward without running anything.
    pub(crate) fn advance_to(&mut self, time: Time) {
        assert!(self.now <= time, "virtual clock moved backwards");
        self.now = time;
    }

    fn discard_canceled(&mut self) {
        while let Some(ev) = self.heap.peek() {
            let id = ev.id();
            if self.armed.get(&id).copied().unwrap_or(false) {
                self.heap.pop();
                self.armed.remove(&id);
            } else {
                break;
            }
        }
    }
}
