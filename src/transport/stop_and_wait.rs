use tracing::{debug, warn};

use crate::{
    packet::{Message, Packet},
    seq::SeqNum,
    simulation::event::EventId,
    time::Delta,
};

use super::{Receiver, ReceiverEnv, Sender, SenderEnv};

fn flip(bit: SeqNum) -> SeqNum {
    if bit == SeqNum::ZERO {
        SeqNum::ONE
    } else {
        SeqNum::ZERO
    }
}

/// Alternating-bit sender: one frame in flight, resent on a fixed timeout.
///
/// A frame that runs out of retries keeps the sender busy until an ACK for its bit shows up.
#[derive(Debug)]
pub struct StopAndWaitSender {
    timeout: Delta,
    max_retries: Option<u32>,
    bit: SeqNum,
    in_flight: Option<InFlight>,
}

#[derive(Debug)]
struct InFlight {
    pkt: Packet,
    // None once the frame has been given up
    timer: Option<EventId>,
    retries: u32,
}

impl StopAndWaitSender {
    pub fn new(timeout: f64, max_retries: Option<u32>) -> Self {
        Self {
            timeout: Delta::from_units(timeout),
            max_retries,
            bit: SeqNum::ZERO,
            in_flight: None,
        }
    }

    fn transmit(&self, mut pkt: Packet, retries: u32, env: &mut dyn SenderEnv) -> InFlight {
        pkt.timestamp = Some(env.now());
        env.to_network(pkt.clone());
        let timer = env.start_timer(self.timeout, self.bit);
        InFlight {
            pkt,
            timer: Some(timer),
            retries,
        }
    }
}

impl Sender for StopAndWaitSender {
    fn from_application(&mut self, msg: &Message, env: &mut dyn SenderEnv) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        let pkt = Packet::builder()
            .data(msg.data.clone())
            .is_end(msg.is_end)
            .seq_num(self.bit)
            .build();
        self.in_flight = Some(self.transmit(pkt, 0, env));
        true
    }

    fn from_network(&mut self, pkt: Packet, env: &mut dyn SenderEnv) {
        let Some(ack) = pkt.ack_num else {
            return;
        };
        if ack != self.bit {
            debug!(%ack, expected = %self.bit, "ignoring ACK for the other bit");
            return;
        }
        let Some(done) = self.in_flight.take() else {
            return;
        };
        if let Some(timer) = done.timer {
            env.cancel_timer(timer);
        }
        self.bit = flip(self.bit);
        env.ready_for_more_from_application();
    }

    fn on_timeout(&mut self, seq: SeqNum, env: &mut dyn SenderEnv) {
        if seq != self.bit {
            return;
        }
        let Some(entry) = self.in_flight.as_mut() else {
            return;
        };
        if entry.timer.is_none() {
            return;
        }
        if self.max_retries.is_some_and(|max| entry.retries >= max) {
            warn!(%seq, retries = entry.retries, "giving up on frame");
            entry.timer = None;
            env.give_up(seq);
            return;
        }
        if let Some(stale) = self.in_flight.take() {
            debug!(%seq, retry = stale.retries + 1, "retransmitting");
            self.in_flight = Some(self.transmit(stale.pkt, stale.retries + 1, env));
        }
    }

    fn outstanding(&self) -> usize {
        usize::from(self.in_flight.is_some())
    }
}

/// Alternating-bit receiver: delivers a frame unless it repeats the last one, and always
/// acknowledges what it saw.
#[derive(Debug, Default, derive_new::new)]
pub struct StopAndWaitReceiver {
    #[new(default)]
    last: Option<SeqNum>,
}

impl Receiver for StopAndWaitReceiver {
    fn from_network(&mut self, pkt: Packet, env: &mut dyn ReceiverEnv) {
        let Some(seq) = pkt.seq_num else {
            return;
        };
        if self.last == Some(seq) {
            debug!(%seq, "duplicate frame");
        } else {
            env.to_application(pkt.to_message());
            self.last = Some(seq);
        }
        env.to_network(Packet::ack_for(&pkt, seq));
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        time::Time,
        transport::testing::{ack, data, msg, MockEnv},
    };

    use super::*;

    #[test]
    fn alternates_bits() {
        let mut env = MockEnv::default();
        let mut sender = StopAndWaitSender::new(10.0, None);
        assert!(sender.from_application(&msg("a"), &mut env));
        assert!(!sender.from_application(&msg("b"), &mut env));
        sender.from_network(ack(0, Time::ZERO), &mut env);
        assert_eq!(env.ready, 1);
        assert!(sender.from_application(&msg("b"), &mut env));
        let seqs: Vec<_> = env.sent.iter().map(|p| p.seq_num.unwrap()).collect();
        assert_eq!(seqs, vec![SeqNum::ZERO, SeqNum::ONE]);
    }

    #[test]
    fn wrong_bit_ack_ignored() {
        let mut env = MockEnv::default();
        let mut sender = StopAndWaitSender::new(10.0, None);
        assert!(sender.from_application(&msg("a"), &mut env));
        sender.from_network(ack(1, Time::ZERO), &mut env);
        assert_eq!(env.ready, 0);
        assert_eq!(sender.outstanding(), 1);
    }

    #[test]
    fn resends_on_timeout() {
        let mut env = MockEnv::default();
        let mut sender = StopAndWaitSender::new(10.0, None);
        assert!(sender.from_application(&msg("a"), &mut env));
        env.advance(Delta::from_units(10.0));
        sender.on_timeout(SeqNum::ZERO, &mut env);
        assert_eq!(env.sent.len(), 2);
        assert_eq!(env.sent[1].data, b"a".to_vec());
        assert_eq!(env.sent[1].timestamp, Some(env.now));
        assert_eq!(env.armed().last(), Some(&(Time::from_units(20.0), SeqNum::ZERO)));

        sender.from_network(ack(0, env.now), &mut env);
        sender.on_timeout(SeqNum::ZERO, &mut env);
        assert_eq!(env.sent.len(), 2);
    }

    #[test]
    fn bounded_retries_give_up() {
        let mut env = MockEnv::default();
        let mut sender = StopAndWaitSender::new(1.0, Some(2));
        assert!(sender.from_application(&msg("a"), &mut env));
        for _ in 0..4 {
            sender.on_timeout(SeqNum::ZERO, &mut env);
        }
        assert_eq!(env.sent.len(), 3);
        assert_eq!(env.given_up, vec![SeqNum::ZERO]);
        // Still busy until the bit is acknowledged
        assert!(!sender.from_application(&msg("b"), &mut env));
        sender.from_network(ack(0, Time::ZERO), &mut env);
        assert_eq!(env.ready, 1);
        assert!(sender.from_application(&msg("b"), &mut env));
        assert_eq!(env.sent[3].seq_num, Some(SeqNum::ONE));
    }

    #[test]
    fn receiver_drops_repeat_but_acks() {
        let mut env = MockEnv::default();
        let mut receiver = StopAndWaitReceiver::new();
        receiver.from_network(data(0, "a", Time::ZERO), &mut env);
        receiver.from_network(data(0, "a", Time::ONE), &mut env);
        receiver.from_network(data(1, "b", Time::ONE), &mut env);
        assert_eq!(env.delivered, vec![msg("a"), msg("b")]);
        let acks: Vec<_> = env.sent.iter().map(|p| p.ack_num.unwrap()).collect();
        assert_eq!(acks, vec![SeqNum::ZERO, SeqNum::ZERO, SeqNum::ONE]);
        assert_eq!(env.sent[1].timestamp, Some(Time::ONE));
    }
}
