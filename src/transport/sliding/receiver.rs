use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    packet::Packet,
    seq::{SeqNum, SeqSpace},
    transport::{Receiver, ReceiverEnv, TransportConfig},
};

/// Delivers in order, buffering anything that arrives early but inside the window.
#[derive(Debug)]
pub struct SlidingReceiver {
    space: SeqSpace,
    window: u64,
    last_frame_received: SeqNum,
    buffer: FxHashMap<SeqNum, Packet>,
}

impl SlidingReceiver {
    pub fn new(cfg: &TransportConfig) -> Self {
        let space = cfg.seq_space();
        Self {
            space,
            window: cfg.window,
            last_frame_received: space.max_seq(),
            buffer: FxHashMap::default(),
        }
    }

    pub fn last_frame_received(&self) -> SeqNum {
        self.last_frame_received
    }

    pub fn last_acceptable_frame(&self) -> SeqNum {
        self.space.add(self.last_frame_received, self.window)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn deliver(&mut self, pkt: Packet, env: &mut dyn ReceiverEnv) {
        if let Some(seq) = pkt.seq_num {
            self.last_frame_received = seq;
        }
        env.to_application(pkt.to_message());
    }
}

impl Receiver for SlidingReceiver {
    fn from_network(&mut self, pkt: Packet, env: &mut dyn ReceiverEnv) {
        let Some(seq) = pkt.seq_num else {
            trace!("ignoring packet without a sequence number");
            return;
        };
        let mut reply = Packet::ack_for(&pkt, self.last_frame_received);
        let ahead = self.space.delta(self.last_frame_received, seq);
        if ahead == 0 || ahead > self.window {
            debug!(%seq, lfr = %self.last_frame_received, "frame outside window");
        } else if ahead == 1 {
            self.deliver(pkt, env);
            while let Some(next) = self
                .buffer
                .remove(&self.space.next(self.last_frame_received))
            {
                self.deliver(next, env);
            }
        } else {
            trace!(%seq, lfr = %self.last_frame_received, "buffering early frame");
            self.buffer.entry(seq).or_insert(pkt);
        }
        reply.ack_num = Some(self.last_frame_received);
        env.to_network(reply);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::{
        packet::Message,
        time::Time,
        transport::testing::{data, MockEnv},
    };

    use super::*;

    fn receiver(window: u64, max_seq: u64) -> SlidingReceiver {
        let cfg = TransportConfig::builder()
            .window(window)
            .max_window(window)
            .max_seq(max_seq)
            .build();
        SlidingReceiver::new(&cfg)
    }

    fn acks(env: &mut MockEnv) -> Vec<u64> {
        env.take_sent()
            .into_iter()
            .map(|p| p.ack_num.unwrap().into_u64())
            .collect()
    }

    fn texts(env: &MockEnv) -> Vec<String> {
        env.delivered
            .iter()
            .map(|m| String::from_utf8_lossy(&m.data).into_owned())
            .collect()
    }

    #[test]
    fn in_order_delivery_acks_each_frame() {
        let mut env = MockEnv::default();
        let mut r = receiver(4, 100);
        for (i, text) in ["a", "b", "c"].into_iter().enumerate() {
            r.from_network(data(i as u64, text, Time::ZERO), &mut env);
        }
        assert_eq!(texts(&env), vec!["a", "b", "c"]);
        assert_eq!(acks(&mut env), vec![0, 1, 2]);
    }

    #[test]
    fn reorders_buffered_frames() {
        let mut env = MockEnv::default();
        let mut r = receiver(4, 100);
        r.from_network(data(2, "c", Time::ZERO), &mut env);
        r.from_network(data(1, "b", Time::ZERO), &mut env);
        assert!(env.delivered.is_empty());
        assert_eq!(r.buffered(), 2);
        r.from_network(data(0, "a", Time::ZERO), &mut env);
        assert_eq!(texts(&env), vec!["a", "b", "c"]);
        assert_eq!(r.buffered(), 0);
        // Early frames re-ACK the last in-order frame
        assert_eq!(acks(&mut env), vec![100, 100, 2]);
    }

    #[test]
    fn duplicates_are_reacked_not_redelivered() {
        let mut env = MockEnv::default();
        let mut r = receiver(4, 100);
        r.from_network(data(0, "a", Time::ZERO), &mut env);
        r.from_network(data(0, "a", Time::ZERO), &mut env);
        r.from_network(data(2, "c", Time::ZERO), &mut env);
        r.from_network(data(2, "c", Time::ZERO), &mut env);
        assert_eq!(r.buffered(), 1);
        assert_eq!(texts(&env), vec!["a"]);
        assert_eq!(acks(&mut env), vec![0, 0, 0, 0]);
    }

    #[test]
    fn frames_beyond_window_dropped() {
        let mut env = MockEnv::default();
        let mut r = receiver(2, 100);
        assert_eq!(r.last_acceptable_frame(), SeqNum::ONE);
        r.from_network(data(2, "c", Time::ZERO), &mut env);
        assert_eq!(r.buffered(), 0);
        assert!(env.delivered.is_empty());
        assert_eq!(acks(&mut env), vec![100]);
    }

    #[test]
    fn ack_echoes_trigger_timestamp() {
        let mut env = MockEnv::default();
        let mut r = receiver(4, 100);
        r.from_network(data(1, "b", Time::new(5)), &mut env);
        r.from_network(data(0, "a", Time::new(9)), &mut env);
        let sent = env.take_sent();
        assert_eq!(sent[0].timestamp, Some(Time::new(5)));
        assert_eq!(sent[1].timestamp, Some(Time::new(9)));
        assert_eq!(sent[1].ack_num, Some(SeqNum::ONE));
    }

    #[test]
    fn end_marker_survives_buffering() {
        let mut env = MockEnv::default();
        let mut r = receiver(4, 100);
        let mut last = data(1, "z", Time::ZERO);
        last.is_end = true;
        r.from_network(last, &mut env);
        r.from_network(data(0, "y", Time::ZERO), &mut env);
        assert_eq!(
            env.delivered,
            vec![
                Message::new(b"y".to_vec(), false),
                Message::new(b"z".to_vec(), true)
            ]
        );
    }

    #[test]
    fn wraps_around_small_space() {
        let mut env = MockEnv::default();
        let mut r = receiver(2, 3);
        for (i, text) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            r.from_network(data(i as u64 % 4, text, Time::ZERO), &mut env);
        }
        assert_eq!(texts(&env), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(acks(&mut env), vec![0, 1, 2, 3, 0]);
    }

    proptest! {
        #[test]
        fn delivers_in_order_despite_reordering(
            perm in Just((0..4u64).collect::<Vec<_>>()).prop_shuffle(),
            blocks in 1u64..6,
            dup in 0usize..4,
        ) {
            let (window, max_seq) = (4, 9);
            let mut env = MockEnv::default();
            let mut r = receiver(window, max_seq);
            let space = SeqSpace::new(max_seq);
            for block in 0..blocks {
                for (k, &offset) in perm.iter().enumerate() {
                    let n = block * window + offset;
                    let seq = n % (max_seq + 1);
                    let copies = if k == dup { 2 } else { 1 };
                    for _ in 0..copies {
                        r.from_network(data(seq, &n.to_string(), Time::ZERO), &mut env);
                        for buffered in r.buffer.keys() {
                            prop_assert!(space.in_window(r.last_frame_received(), *buffered, window));
                        }
                    }
                }
            }
            let expected: Vec<_> = (0..blocks * window).map(|n| n.to_string()).collect();
            prop_assert_eq!(texts(&env), expected);
            prop_assert_eq!(r.buffered(), 0);
        }
    }
}
