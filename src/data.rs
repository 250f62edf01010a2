use std::fmt;

use crate::{ConnId, LinkId};

/// End-of-run statistics for one connection.
///
/// Time-valued fields are in time units. Statistics with no samples are NaN, which serializes
/// as `null`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConnectionRecord {
    pub id: ConnId,
    /// Messages produced by the workload.
    pub generated: u64,
    /// Mean generation rate, for paced workloads.
    pub generate_rate: Option<f64>,
    /// Messages accepted by the sender.
    pub sent: u64,
    /// Messages handed up by the receiver while some were still expected.
    pub received: u64,
    /// Messages passed over by a later delivery.
    pub skipped: u64,
    /// Deliveries that matched nothing expected.
    pub corrupt: u64,
    /// Messages accepted by the sender but never delivered.
    pub in_flight: u64,
    /// Messages the sender had no room for at the end.
    pub pending: u64,
    /// Frames the sender still counted as unacknowledged.
    pub outstanding: u64,
    /// Times the sender turned the application away.
    pub refused: u64,
    /// Frames the sender stopped retransmitting.
    pub abandoned: u64,
    pub start: Option<f64>,
    /// Delivery time of the end-of-stream message.
    pub finish: Option<f64>,
    /// From `start` to `finish`, or to the end of the run if unfinished.
    pub duration: f64,
    pub received_rate: f64,
    pub latency_mean: f64,
    pub latency_sd: f64,
}

impl ConnectionRecord {
    /// Whether the oracle saw anything other than a clean in-order stream.
    pub fn is_damaged(&self) -> bool {
        self.in_flight > 0 || self.skipped > 0 || self.corrupt > 0
    }
}

/// End-of-run statistics for one link.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LinkRecord {
    pub id: LinkId,
    /// Packets offered to the link.
    pub sent: u64,
    pub delivered: u64,
    /// Refused or evicted by the buffer.
    pub dropped_buffer: u64,
    /// Lost on the wire.
    pub dropped_random: u64,
    /// Still in the buffer.
    pub queued: u64,
    /// Still on the wire.
    pub propagating: u64,
    pub wrong_seq_num: u64,
    pub capacity: usize,
    pub max_occupancy: usize,
    pub mean_occupancy: f64,
    pub delay: f64,
    pub jitter: f64,
    pub drop_rate: f64,
}

impl LinkRecord {
    /// Every packet offered is accounted for exactly once.
    pub fn is_conserved(&self) -> bool {
        self.sent
            == self.delivered
                + self.dropped_buffer
                + self.dropped_random
                + self.queued
                + self.propagating
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Report {
    /// Virtual time when the run stopped.
    pub time: f64,
    pub seed: u64,
    pub connections: Vec<ConnectionRecord>,
    pub links: Vec<LinkRecord>,
}

impl Report {
    pub fn connection(&self, id: ConnId) -> Option<&ConnectionRecord> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn link(&self, id: LinkId) -> Option<&LinkRecord> {
        self.links.iter().find(|l| l.id == id)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "finished at time {:.1} (seed {})", self.time, self.seed)?;
        for c in &self.connections {
            if let Some(rate) = c.generate_rate {
                writeln!(f, "C{}: generated {rate:.1} messages/time unit", c.id)?;
            }
            writeln!(
                f,
                "C{}: received {} in {:.1} ({:.1} messages/time unit)",
                c.id, c.received, c.duration, c.received_rate
            )?;
            writeln!(
                f,
                "C{}: latency: mean {:.2} +/- sd {:.2}",
                c.id, c.latency_mean, c.latency_sd
            )?;
            if c.refused > 0 || c.abandoned > 0 {
                writeln!(
                    f,
                    "C{}: {} refusals, {} frames abandoned",
                    c.id, c.refused, c.abandoned
                )?;
            }
            if c.is_damaged() {
                writeln!(
                    f,
                    "C{}: {} messages skipped, {} not received at end, {} corrupt or received out-of-order",
                    c.id, c.skipped, c.in_flight, c.corrupt
                )?;
                writeln!(f, "ERROR --- messages corrupted or missing")?;
            }
        }
        for l in &self.links {
            writeln!(
                f,
                "L{}: sent {}, delivered {}, dropped {} in buffer and {} at random",
                l.id, l.sent, l.delivered, l.dropped_buffer, l.dropped_random
            )?;
            writeln!(
                f,
                "L{}: buffer capacity {}, max occupancy {}, mean occupancy {:.2}",
                l.id, l.capacity, l.max_occupancy, l.mean_occupancy
            )?;
            if l.wrong_seq_num > 0 {
                writeln!(
                    f,
                    "L{}: {} packets with sequence number out of range",
                    l.id, l.wrong_seq_num
                )?;
            }
        }
        Ok(())
    }
}
