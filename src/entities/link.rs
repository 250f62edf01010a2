use rand::Rng;
use rand_distr::{Distribution, Exp};
use tracing::{error, trace};

use crate::{
    data::LinkRecord,
    driver::Error,
    packet::{Dest, Packet},
    queue::{Admission, QDisc},
    seq::SeqSpace,
    simulation::Context,
    time::{Delta, Time},
    units::Bandwidth,
};

identifier!(LinkId);

/// A one-way channel: a bounded buffer drained at the link bandwidth, followed by a
/// propagation delay with optional exponential jitter and random loss.
#[derive(Debug)]
pub(crate) struct Link<Q: QDisc> {
    id: LinkId,
    bandwidth: Bandwidth,
    delay: Delta,
    jitter: f64,
    jitter_dist: Option<Exp<f64>>,
    drop_rate: f64,
    space: SeqSpace,
    queue: Q,
    status: Status,
    stats: LinkStats,
    occupancy: Occupancy,
}

impl<Q: QDisc> Link<Q> {
    pub(crate) fn new(desc: LinkDesc<Q>, space: SeqSpace) -> Result<Self, Error> {
        check_probability(desc.drop_rate)?;
        check_duration(desc.delay)?;
        check_duration(desc.jitter)?;
        let rate = desc.bandwidth.rate();
        if rate.is_nan() || rate <= 0.0 {
            return Err(Error::InvalidBandwidth(rate));
        }
        let jitter_dist = if desc.jitter > 0.0 {
            Some(Exp::new(1.0 / desc.jitter).map_err(|_| Error::InvalidDuration(desc.jitter))?)
        } else {
            None
        };
        Ok(Self {
            id: desc.id,
            bandwidth: desc.bandwidth,
            delay: Delta::from_units(desc.delay),
            jitter: desc.jitter,
            jitter_dist,
            drop_rate: desc.drop_rate,
            space,
            queue: desc.queue,
            status: Status::default(),
            stats: LinkStats::default(),
            occupancy: Occupancy::default(),
        })
    }

    /// Takes ownership of `pkt`, stamps its destination and offers it to the buffer.
    pub(crate) fn enqueue(&mut self, mut pkt: Packet, dest: Dest, ctx: &mut Context) {
        if let Some(seq) = pkt.seq_num.filter(|seq| !self.space.contains(*seq)) {
            error!(link = %self.id, %seq, max_seq = %self.space.max_seq(), "sequence number out of range");
            self.stats.wrong_seq_num += 1;
        }
        pkt.dest = Some(dest);
        self.stats.sent += 1;
        self.occupancy.observe(ctx.now(), self.queue.len());
        match self.queue.enqueue(pkt) {
            Admission::Queued => {}
            Admission::Dropped(lost) | Admission::Evicted(lost) => {
                trace!(link = %self.id, seq = ?lost.seq_num, ack = ?lost.ack_num, "buffer drop");
                self.stats.dropped_buffer += 1;
            }
        }
        self.occupancy.max = self.occupancy.max.max(self.queue.len());
        if self.status == Status::Blocked {
            self.transmit_next(ctx);
        }
    }

    /// Puts the head of the buffer on the wire and schedules the next departure.
    pub(crate) fn transmit_next(&mut self, ctx: &mut Context) {
        self.occupancy.observe(ctx.now(), self.queue.len());
        let Some(pkt) = self.queue.dequeue() else {
            self.status = Status::Blocked;
            return;
        };
        self.status = Status::Running;
        let serialization = self.bandwidth.length(pkt.size());
        if ctx.rng.gen::<f64>() < self.drop_rate {
            trace!(link = %self.id, seq = ?pkt.seq_num, ack = ?pkt.ack_num, "random drop");
            self.stats.dropped_random += 1;
        } else {
            let jitter = match &self.jitter_dist {
                Some(dist) => Delta::from_units(dist.sample(&mut *ctx.rng)),
                None => Delta::ZERO,
            };
            self.stats.propagating += 1;
            ctx.schedule(self.delay + jitter, LinkCmd::Arrive { link: self.id, pkt });
        }
        ctx.schedule(serialization, LinkCmd::TransmitNext(self.id));
    }

    /// Accounts for a packet leaving the far end of the link.
    pub(crate) fn arrive(&mut self, pkt: Packet) -> Packet {
        self.stats.propagating -= 1;
        self.stats.delivered += 1;
        pkt
    }

    pub(crate) fn reconfigure(&mut self, update: &LinkUpdate) {
        trace!(link = %self.id, ?update, "reconfigure");
        if let Some(drop_rate) = update.drop_rate {
            self.drop_rate = drop_rate;
        }
        if let Some(capacity) = update.capacity {
            self.queue.set_capacity(capacity);
        }
    }

    pub(crate) fn record(&self, now: Time) -> LinkRecord {
        LinkRecord {
            id: self.id,
            sent: self.stats.sent,
            delivered: self.stats.delivered,
            dropped_buffer: self.stats.dropped_buffer,
            dropped_random: self.stats.dropped_random,
            queued: self.queue.len() as u64,
            propagating: self.stats.propagating,
            wrong_seq_num: self.stats.wrong_seq_num,
            capacity: self.queue.capacity(),
            max_occupancy: self.occupancy.max,
            mean_occupancy: self.occupancy.mean(now, self.queue.len()),
            delay: self.delay.into_units(),
            jitter: self.jitter,
            drop_rate: self.drop_rate,
        }
    }
}

pub(crate) fn check_probability(p: f64) -> Result<(), Error> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(Error::InvalidProbability(p))
    }
}

pub(crate) fn check_duration(d: f64) -> Result<(), Error> {
    if d.is_finite() && d >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidDuration(d))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum LinkCmd {
    TransmitNext(LinkId),
    Arrive { link: LinkId, pkt: Packet },
    Reconfigure(LinkUpdate),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, derivative::Derivative)]
#[derivative(Default)]
enum Status {
    Running,
    #[derivative(Default)]
    Blocked,
}

#[derive(Debug, Default, Clone, Copy)]
struct LinkStats {
    sent: u64,
    delivered: u64,
    dropped_buffer: u64,
    dropped_random: u64,
    propagating: u64,
    wrong_seq_num: u64,
}

/// Time-weighted buffer occupancy.
#[derive(Debug, Default, Clone, Copy)]
struct Occupancy {
    last_change: Time,
    // Packet-time-units accumulated up to `last_change`
    area: f64,
    max: usize,
}

impl Occupancy {
    /// Must be called with the occupancy in force just before it changes.
    fn observe(&mut self, now: Time, len: usize) {
        self.area += len as f64 * now.saturating_sub(self.last_change).into_units();
        self.last_change = now;
    }

    fn mean(&self, now: Time, len: usize) -> f64 {
        let elapsed = now.into_units();
        if elapsed <= 0.0 {
            return len as f64;
        }
        let area = self.area + len as f64 * now.saturating_sub(self.last_change).into_units();
        area / elapsed
    }
}

/// A link configuration.
#[derive(Debug, typed_builder::TypedBuilder)]
pub struct LinkDesc<Q: QDisc> {
    pub id: LinkId,
    #[builder(default)]
    pub bandwidth: Bandwidth,
    /// Propagation delay in time units.
    #[builder(default)]
    pub delay: f64,
    /// Mean of the exponential jitter added to each packet's delay, in time units.
    #[builder(default)]
    pub jitter: f64,
    /// Probability that a transmitted packet is lost.
    #[builder(default)]
    pub drop_rate: f64,
    pub queue: Q,
}

/// A change applied to a link at a given time.
#[derive(
    Debug, Clone, Copy, PartialEq, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize,
)]
pub struct LinkUpdate {
    /// When the change takes effect, in time units.
    pub at: f64,
    pub link: LinkId,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub drop_rate: Option<f64>,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub capacity: Option<usize>,
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use crate::{
        entities::connection::ConnId,
        packet::Side,
        queue::DropTailQ,
        seq::SeqNum,
        simulation::{schedule::Schedule, Command},
    };

    use super::*;

    fn link(capacity: usize, bandwidth: Bandwidth, drop_rate: f64) -> Link<DropTailQ> {
        let desc = LinkDesc::builder()
            .id(LinkId::ZERO)
            .bandwidth(bandwidth)
            .delay(1.0)
            .drop_rate(drop_rate)
            .queue(DropTailQ::new(capacity))
            .build();
        Link::new(desc, SeqSpace::new(7)).unwrap()
    }

    fn pkt(seq: u64) -> Packet {
        Packet::builder().seq_num(SeqNum::new(seq)).build()
    }

    fn dest() -> Dest {
        Dest::new(ConnId::ZERO, Side::Receiver)
    }

    fn conserved(l: &Link<DropTailQ>) -> bool {
        let r = l.record(Time::ZERO);
        r.sent == r.delivered + r.dropped_buffer + r.dropped_random + r.queued + r.propagating
    }

    #[test]
    fn idle_link_transmits_immediately() {
        let mut sched = Schedule::default();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = Context::new(&mut sched, &mut rng);
        let mut l = link(4, Bandwidth::Packets(2.0), 0.0);
        l.enqueue(pkt(0), dest(), &mut ctx);
        l.enqueue(pkt(1), dest(), &mut ctx);
        assert_eq!(l.queue.len(), 1);
        assert_eq!(l.status, Status::Running);
        assert!(conserved(&l));

        // The next departure waits out serialization; arrival only the propagation delay
        let next = sched.pop().unwrap();
        assert_eq!(next.time(), Time::ZERO + Delta::from_units(0.5));
        assert!(matches!(next.cmd, Command::Link(LinkCmd::TransmitNext(_))));
        let arrival = sched.pop().unwrap();
        assert_eq!(arrival.time(), Time::ZERO + Delta::from_units(1.0));
        assert!(matches!(arrival.cmd, Command::Link(LinkCmd::Arrive { .. })));
    }

    #[test]
    fn buffer_overflow_counts_drops() {
        let mut sched = Schedule::default();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = Context::new(&mut sched, &mut rng);
        let mut l = link(1, Bandwidth::Packets(1.0), 0.0);
        for i in 0..4 {
            l.enqueue(pkt(i), dest(), &mut ctx);
        }
        let r = l.record(Time::ZERO);
        assert_eq!(r.sent, 4);
        assert_eq!(r.queued, 1);
        assert_eq!(r.propagating, 1);
        assert_eq!(r.dropped_buffer, 2);
        assert_eq!(r.max_occupancy, 1);
        assert!(conserved(&l));
    }

    #[test]
    fn certain_loss_drops_everything() {
        let mut sched = Schedule::default();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = Context::new(&mut sched, &mut rng);
        let mut l = link(4, Bandwidth::Unlimited, 1.0);
        l.enqueue(pkt(0), dest(), &mut ctx);
        let r = l.record(Time::ZERO);
        assert_eq!(r.dropped_random, 1);
        assert_eq!(r.propagating, 0);
        assert!(conserved(&l));
    }

    #[test]
    fn out_of_range_seq_is_counted_not_fatal() {
        let mut sched = Schedule::default();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = Context::new(&mut sched, &mut rng);
        let mut l = link(4, Bandwidth::Unlimited, 0.0);
        l.enqueue(pkt(8), dest(), &mut ctx);
        let r = l.record(Time::ZERO);
        assert_eq!(r.wrong_seq_num, 1);
        assert_eq!(r.propagating, 1);
    }

    #[test]
    fn reconfigure_changes_capacity_and_loss() {
        let mut l = link(0, Bandwidth::Unlimited, 0.5);
        l.reconfigure(&LinkUpdate::builder().at(1.0).link(LinkId::ZERO).capacity(3).build());
        assert_eq!(l.queue.capacity(), 3);
        assert_eq!(l.drop_rate, 0.5);
        l.reconfigure(&LinkUpdate::builder().at(2.0).link(LinkId::ZERO).drop_rate(0.0).build());
        assert_eq!(l.drop_rate, 0.0);
    }

    #[test]
    fn occupancy_is_time_weighted() {
        let mut occ = Occupancy::default();
        // One packet for two units, then empty for two units
        occ.observe(Time::ZERO, 0);
        let two = Time::ZERO + Delta::from_units(2.0);
        occ.observe(two, 1);
        let four = Time::ZERO + Delta::from_units(4.0);
        assert!((occ.mean(four, 0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_parameters() {
        let bad_drop = LinkDesc::builder()
            .id(LinkId::ZERO)
            .drop_rate(1.5)
            .queue(DropTailQ::new(1))
            .build();
        assert!(matches!(
            Link::new(bad_drop, SeqSpace::new(7)),
            Err(Error::InvalidProbability(_))
        ));
        let bad_bw = LinkDesc::builder()
            .id(LinkId::ZERO)
            .bandwidth(Bandwidth::Packets(0.0))
            .queue(DropTailQ::new(1))
            .build();
        assert!(matches!(
            Link::new(bad_bw, SeqSpace::new(7)),
            Err(Error::InvalidBandwidth(_))
        ));
        let bad_jitter = LinkDesc::builder()
            .id(LinkId::ZERO)
            .jitter(-1.0)
            .queue(DropTailQ::new(1))
            .build();
        assert!(matches!(
            Link::new(bad_jitter, SeqSpace::new(7)),
            Err(Error::InvalidDuration(_))
        ));
    }
}
