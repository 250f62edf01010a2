#![allow(clippy::non_canonical_partial_ord_impl)]

use std::cmp::Reverse;

use crate::time::Time;

use super::Command;

identifier!(EventId);

/// A scheduled command.
///
/// Events are ordered so that a max-heap pops the earliest time first and, among equal
/// times, the one inserted first.
#[derive(Debug, derivative::Derivative)]
#[derivative(PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Event {
    time: Reverse<Time>,
    id: Reverse<EventId>,
    #[derivative(PartialEq = "ignore", PartialOrd = "ignore", Ord = "ignore")]
    pub(crate) cmd: Command,
}

impl Event {
    pub(crate) fn new(time: Time, id: EventId, cmd: impl Into<Command>) -> Self {
        Self {
            time: Reverse(time),
            id: Reverse(id),
            cmd: cmd.into(),
        }
    }

    pub(crate) fn time(&self) -> Time {
        self.time.0
    }

    pub(crate) fn id(&self) -> EventId {
        self.id.0
    }
}
