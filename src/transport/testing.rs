//! A scripted environment for driving endpoints without a simulator.

use rustc_hash::FxHashMap;

use crate::{
    packet::{Message, Packet},
    seq::SeqNum,
    simulation::event::EventId,
    time::{Delta, Time},
};

use super::{ReceiverEnv, SenderEnv};

#[derive(Debug, Default)]
pub(crate) struct MockEnv {
    pub(crate) now: Time,
    pub(crate) sent: Vec<Packet>,
    pub(crate) delivered: Vec<Message>,
    pub(crate) ready: usize,
    pub(crate) given_up: Vec<SeqNum>,
    pub(crate) timers: FxHashMap<EventId, (Time, SeqNum)>,
    next_timer: usize,
}

impl MockEnv {
    pub(crate) fn advance(&mut self, delta: Delta) {
        self.now += delta;
    }

    /// Armed timers, earliest first.
    pub(crate) fn armed(&self) -> Vec<(Time, SeqNum)> {
        let mut armed: Vec<_> = self.timers.values().copied().collect();
        armed.sort();
        armed
    }

    pub(crate) fn take_sent(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }
}

impl SenderEnv for MockEnv {
    fn now(&self) -> Time {
        self.now
    }

    fn to_network(&mut self, pkt: Packet) {
        self.sent.push(pkt);
    }

    fn ready_for_more_from_application(&mut self) {
        self.ready += 1;
    }

    fn start_timer(&mut self, after: Delta, seq: SeqNum) -> EventId {
        let id = EventId::new(self.next_timer);
        self.next_timer += 1;
        self.timers.insert(id, (self.now + after, seq));
        id
    }

    fn cancel_timer(&mut self, timer: EventId) {
        self.timers.remove(&timer);
    }

    fn give_up(&mut self, seq: SeqNum) {
        self.given_up.push(seq);
    }
}

impl ReceiverEnv for MockEnv {
    fn now(&self) -> Time {
        self.now
    }

    fn to_network(&mut self, pkt: Packet) {
        self.sent.push(pkt);
    }

    fn to_application(&mut self, msg: Message) {
        self.delivered.push(msg);
    }
}

pub(crate) fn msg(text: &str) -> Message {
    Message::new(text.as_bytes().to_vec(), false)
}

pub(crate) fn data(seq: u64, text: &str, sent_at: Time) -> Packet {
    Packet::builder()
        .data(text.as_bytes().to_vec())
        .seq_num(SeqNum::new(seq))
        .timestamp(sent_at)
        .build()
}

pub(crate) fn ack(seq: u64, echo: Time) -> Packet {
    Packet::builder()
        .ack_num(SeqNum::new(seq))
        .timestamp(echo)
        .build()
}
