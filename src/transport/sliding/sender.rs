use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::{
    packet::{Message, Packet},
    seq::{SeqNum, SeqSpace},
    simulation::event::EventId,
    time::Delta,
    transport::{Sender, SenderEnv, TransportConfig},
};

use super::{MIN_TIMEOUT, RTT_GAIN};

#[derive(Debug)]
pub struct SlidingSender {
    space: SeqSpace,
    window: u64,
    max_window: u64,
    initial_timeout: Delta,
    max_retries: Option<u32>,

    last_frame_sent: SeqNum,
    last_ack_received: SeqNum,
    // Smoothed round-trip time in time units, once sampled
    avg_rtt: Option<f64>,
    unacked: FxHashMap<SeqNum, Unacked>,
}

#[derive(Debug)]
struct Unacked {
    pkt: Packet,
    timer: EventId,
    retries: u32,
}

impl SlidingSender {
    pub fn new(cfg: &TransportConfig) -> Self {
        let space = cfg.seq_space();
        Self {
            space,
            window: cfg.window,
            max_window: cfg.max_window,
            initial_timeout: Delta::from_units(cfg.initial_timeout),
            max_retries: cfg.max_retries,
            last_frame_sent: space.max_seq(),
            last_ack_received: space.max_seq(),
            avg_rtt: None,
            unacked: FxHashMap::default(),
        }
    }

    pub fn last_frame_sent(&self) -> SeqNum {
        self.last_frame_sent
    }

    pub fn last_ack_received(&self) -> SeqNum {
        self.last_ack_received
    }

    pub fn smoothed_rtt(&self) -> Option<f64> {
        self.avg_rtt
    }

    /// Frames in `(LAR, LFS]`.
    pub fn in_flight(&self) -> u64 {
        self.space
            .delta(self.last_ack_received, self.last_frame_sent)
    }

    pub fn has_room(&self) -> bool {
        self.in_flight() < self.window
    }

    /// Twice the smoothed RTT, or the configured initial timeout before the first sample.
    pub fn timeout(&self) -> Delta {
        match self.avg_rtt {
            Some(rtt) => Delta::from_units((2.0 * rtt).max(MIN_TIMEOUT)),
            None => self.initial_timeout,
        }
    }

    fn transmit(&mut self, seq: SeqNum, mut pkt: Packet, retries: u32, env: &mut dyn SenderEnv) {
        pkt.timestamp = Some(env.now());
        env.to_network(pkt.clone());
        let timer = env.start_timer(self.timeout(), seq);
        self.unacked.insert(
            seq,
            Unacked {
                pkt,
                timer,
                retries,
            },
        );
    }

    fn sample_rtt(&mut self, sample: f64) {
        self.avg_rtt = Some(match self.avg_rtt {
            Some(avg) => RTT_GAIN * sample + (1.0 - RTT_GAIN) * avg,
            None => sample,
        });
    }
}

impl Sender for SlidingSender {
    fn from_application(&mut self, msg: &Message, env: &mut dyn SenderEnv) -> bool {
        if !self.has_room() {
            trace!(in_flight = self.in_flight(), window = self.window, "window full");
            return false;
        }
        let seq = self.space.next(self.last_frame_sent);
        let pkt = Packet::builder()
            .data(msg.data.clone())
            .is_end(msg.is_end)
            .seq_num(seq)
            .build();
        self.last_frame_sent = seq;
        self.transmit(seq, pkt, 0, env);
        true
    }

    fn from_network(&mut self, pkt: Packet, env: &mut dyn SenderEnv) {
        let Some(ack) = pkt.ack_num else {
            trace!("ignoring non-ACK packet");
            return;
        };
        let lar = self.last_ack_received;
        let advance = self.space.delta(lar, ack);
        if advance > self.max_window || advance > self.in_flight() {
            debug!(%ack, %lar, lfs = %self.last_frame_sent, "ignoring stale ACK");
        } else if advance > 0 {
            while self.last_ack_received != ack {
                self.last_ack_received = self.space.next(self.last_ack_received);
                if let Some(done) = self.unacked.remove(&self.last_ack_received) {
                    env.cancel_timer(done.timer);
                }
            }
            if let Some(sent_at) = pkt.timestamp {
                self.sample_rtt(env.now().saturating_sub(sent_at).into_units());
            }
            trace!(%ack, in_flight = self.in_flight(), rtt = ?self.avg_rtt, "window advanced");
        }
        if self.has_room() {
            env.ready_for_more_from_application();
        }
    }

    fn on_timeout(&mut self, seq: SeqNum, env: &mut dyn SenderEnv) {
        // The ACK may have landed while this timer was already due
        if !self
            .space
            .in_window(self.last_ack_received, seq, self.in_flight())
        {
            return;
        }
        let Some(entry) = self.unacked.remove(&seq) else {
            return;
        };
        if self.max_retries.is_some_and(|max| entry.retries >= max) {
            warn!(%seq, retries = entry.retries, "giving up on frame");
            env.give_up(seq);
            return;
        }
        debug!(%seq, retry = entry.retries + 1, "retransmitting");
        self.transmit(seq, entry.pkt, entry.retries + 1, env);
    }

    fn outstanding(&self) -> usize {
        self.in_flight() as usize
    }
}
