use std::collections::VecDeque;

use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::{
    data::ConnectionRecord,
    driver::Error,
    packet::{Dest, Message, Packet, Side},
    queue::QIndex,
    seq::SeqNum,
    simulation::{event::EventId, schedule::Schedule, Context},
    time::{Delta, Time},
    transport::{Receiver, ReceiverEnv, Sender, SenderEnv, TransportConfig},
};

use super::{
    link::LinkId,
    workload::{Generator, Workload},
};

identifier!(ConnId);

/// How far past the expected message a delivery is searched for before it is declared corrupt.
const MAX_SKIP_SCAN: usize = 10_000;

/// A packet a connection wants put on one of its links.
#[derive(Debug)]
pub(crate) struct Transmit {
    pub(crate) link: LinkId,
    pub(crate) pkt: Packet,
    pub(crate) dest: Dest,
}

pub(crate) type Outgoing = SmallVec<[Transmit; 4]>;

/// One sender/receiver pair, plus the application oracle that checks what comes out of the
/// receiver against what went into the sender.
#[derive(Debug)]
pub(crate) struct Connection {
    id: ConnId,
    forward: LinkId,
    backward: LinkId,
    class: QIndex,
    missing_is_error: bool,

    sender: Box<dyn Sender>,
    receiver: Box<dyn Receiver>,
    workload: Workload,
    generator: Generator,

    pending: VecDeque<Message>,
    in_flight: VecDeque<(Time, Message)>,
    stats: ConnStats,
    start: Option<Time>,
    finish: Option<Time>,
}

impl Connection {
    pub(crate) fn new(desc: ConnectionDesc, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            id: desc.id,
            forward: desc.forward,
            backward: desc.backward,
            class: desc.class,
            missing_is_error: desc.missing_is_error,
            sender: transport.sender(),
            receiver: transport.receiver(),
            workload: desc.workload,
            generator: Generator::new(desc.id, desc.workload)?,
            pending: VecDeque::new(),
            in_flight: VecDeque::new(),
            stats: ConnStats::default(),
            start: None,
            finish: None,
        })
    }

    pub(crate) fn links(&self) -> [LinkId; 2] {
        [self.forward, self.backward]
    }

    #[must_use]
    pub(crate) fn generate(&mut self, ctx: &mut Context) -> Outgoing {
        let (batch, next) = self.generator.step(ctx.rng);
        if let Some(delay) = next {
            ctx.schedule(delay, ConnCmd::Generate(self.id));
        }
        if batch.is_empty() {
            return Outgoing::new();
        }
        trace!(conn = %self.id, count = batch.len(), "generated");
        self.start.get_or_insert(ctx.now());
        self.pending.extend(batch);
        let mut up = Upcalls::new(self.id, ctx.sched);
        self.send_pending(&mut up);
        self.settle(up)
    }

    #[must_use]
    pub(crate) fn on_timeout(&mut self, seq: SeqNum, ctx: &mut Context) -> Outgoing {
        let mut up = Upcalls::new(self.id, ctx.sched);
        self.sender.on_timeout(seq, &mut up);
        self.settle(up)
    }

    /// Hands a packet that came off a link to the endpoint on `side`.
    #[must_use]
    pub(crate) fn receive(&mut self, side: Side, pkt: Packet, ctx: &mut Context) -> Outgoing {
        let mut up = Upcalls::new(self.id, ctx.sched);
        match side {
            Side::Sender => self.sender.from_network(pkt, &mut up),
            Side::Receiver => self.receiver.from_network(pkt, &mut up),
        }
        self.settle(up)
    }

    fn send_pending(&mut self, up: &mut Upcalls) {
        while let Some(msg) = self.pending.front() {
            if !self.sender.from_application(msg, up) {
                self.stats.refused += 1;
                trace!(conn = %self.id, pending = self.pending.len(), "sender refused");
                break;
            }
            if let Some(msg) = self.pending.pop_front() {
                self.stats.sent += 1;
                self.in_flight.push_back((up.sched.now(), msg));
            }
        }
    }

    /// Runs the upcalls collected during an endpoint call to completion.
    fn settle(&mut self, mut up: Upcalls) -> Outgoing {
        loop {
            let now = up.sched.now();
            for msg in std::mem::take(&mut up.delivered) {
                self.record_received(msg, now);
            }
            for seq in std::mem::take(&mut up.given_up) {
                debug!(conn = %self.id, %seq, "frame abandoned");
                self.stats.abandoned += 1;
            }
            if !std::mem::take(&mut up.ready) {
                break;
            }
            self.send_pending(&mut up);
        }
        up.packets
            .into_iter()
            .map(|(side, mut pkt)| {
                pkt.label = self.id;
                pkt.class = self.class;
                let link = match side {
                    Side::Receiver => self.forward,
                    Side::Sender => self.backward,
                };
                Transmit {
                    link,
                    pkt,
                    dest: Dest::new(self.id, side),
                }
            })
            .collect()
    }

    /// Matches a delivered message against the oldest one still in flight.
    fn record_received(&mut self, msg: Message, now: Time) {
        if msg.is_end {
            self.finish = Some(now);
        }
        let Some((submitted, expected)) = self.in_flight.pop_front() else {
            self.stats.corrupt += 1;
            if self.missing_is_error {
                error!(conn = %self.id, "received excess message when none expected");
            }
            return;
        };
        self.stats.received += 1;
        let submitted = if expected == msg {
            Some(submitted)
        } else {
            let found = self
                .in_flight
                .iter()
                .take(MAX_SKIP_SCAN)
                .position(|(_, m)| *m == msg);
            match found {
                Some(pos) => {
                    let skipped = pos as u64 + 1;
                    let submitted = self.in_flight.drain(..=pos).last().map(|(t, _)| t);
                    if self.missing_is_error {
                        error!(
                            conn = %self.id,
                            skipped,
                            received = self.stats.received,
                            "messages missing before delivery"
                        );
                    }
                    self.stats.skipped += skipped;
                    submitted
                }
                None => {
                    if self.missing_is_error {
                        error!(
                            conn = %self.id,
                            received = self.stats.received,
                            got = %String::from_utf8_lossy(&msg.data),
                            expected = %String::from_utf8_lossy(&expected.data),
                            "message corrupted"
                        );
                    }
                    self.stats.corrupt += 1;
                    None
                }
            }
        };
        if let Some(submitted) = submitted {
            let latency = now.saturating_sub(submitted).into_units();
            self.stats.latency.add(latency);
            trace!(conn = %self.id, latency, "delivered");
        }
    }

    pub(crate) fn record(&self, now: Time) -> ConnectionRecord {
        let start = self.start.unwrap_or(now);
        let end = self.finish.unwrap_or(now);
        let duration = end.saturating_sub(start).into_units();
        let received_rate = if duration > 0.0 {
            self.stats.received as f64 / duration
        } else {
            f64::NAN
        };
        ConnectionRecord {
            id: self.id,
            generated: self.generator.generated(),
            generate_rate: self.workload.rate(),
            sent: self.stats.sent,
            received: self.stats.received,
            skipped: self.stats.skipped,
            corrupt: self.stats.corrupt,
            in_flight: self.in_flight.len() as u64,
            pending: self.pending.len() as u64,
            outstanding: self.sender.outstanding() as u64,
            refused: self.stats.refused,
            abandoned: self.stats.abandoned,
            start: self.start.map(Time::into_units),
            finish: self.finish.map(Time::into_units),
            duration,
            received_rate,
            latency_mean: self.stats.latency.mean(),
            latency_sd: self.stats.latency.sd(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ConnCmd {
    Generate(ConnId),
    Timeout { conn: ConnId, seq: SeqNum },
}

#[derive(Debug, Default, Clone, Copy)]
struct ConnStats {
    sent: u64,
    received: u64,
    skipped: u64,
    corrupt: u64,
    refused: u64,
    abandoned: u64,
    latency: Moments,
}

/// Running first and second moments.
#[derive(Debug, Default, Clone, Copy)]
struct Moments {
    n: u64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn add(&mut self, x: f64) {
        self.n += 1;
        self.sum += x;
        self.sum_sq += x * x;
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            return f64::NAN;
        }
        self.sum / self.n as f64
    }

    fn sd(&self) -> f64 {
        if self.n == 0 {
            return f64::NAN;
        }
        let mean = self.mean();
        // Rounding can push the difference slightly negative
        (self.sum_sq / self.n as f64 - mean * mean).max(0.0).sqrt()
    }
}

/// The environment endpoints see during one call. Side effects are buffered and applied by
/// [`Connection::settle`] once the endpoint returns.
struct Upcalls<'a> {
    conn: ConnId,
    sched: &'a mut Schedule,
    // Destination side of each outgoing packet
    packets: SmallVec<[(Side, Packet); 4]>,
    delivered: SmallVec<[Message; 4]>,
    given_up: SmallVec<[SeqNum; 2]>,
    ready: bool,
}

impl<'a> Upcalls<'a> {
    fn new(conn: ConnId, sched: &'a mut Schedule) -> Self {
        Self {
            conn,
            sched,
            packets: SmallVec::new(),
            delivered: SmallVec::new(),
            given_up: SmallVec::new(),
            ready: false,
        }
    }
}

impl SenderEnv for Upcalls<'_> {
    fn now(&self) -> Time {
        self.sched.now()
    }

    fn to_network(&mut self, pkt: Packet) {
        self.packets.push((Side::Receiver, pkt));
    }

    fn ready_for_more_from_application(&mut self) {
        self.ready = true;
    }

    fn start_timer(&mut self, after: Delta, seq: SeqNum) -> EventId {
        self.sched.schedule(after, ConnCmd::Timeout { conn: self.conn, seq })
    }

    fn cancel_timer(&mut self, timer: EventId) {
        self.sched.cancel(timer);
    }

    fn give_up(&mut self, seq: SeqNum) {
        self.given_up.push(seq);
    }
}

impl ReceiverEnv for Upcalls<'_> {
    fn now(&self) -> Time {
        self.sched.now()
    }

    fn to_network(&mut self, pkt: Packet) {
        self.packets.push((Side::Sender, pkt));
    }

    fn to_application(&mut self, msg: Message) {
        self.delivered.push(msg);
    }
}

fn yes() -> bool {
    true
}

/// A connection configuration.
#[derive(Debug, Clone, Copy, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct ConnectionDesc {
    pub id: ConnId,
    /// Carries data from sender to receiver.
    pub forward: LinkId,
    /// Carries ACKs back.
    pub backward: LinkId,
    pub workload: Workload,
    /// Queue class stamped on every packet.
    #[builder(default)]
    #[serde(default)]
    pub class: QIndex,
    /// Whether skipped or corrupted deliveries are logged as errors.
    #[builder(default = true)]
    #[serde(default = "yes")]
    pub missing_is_error: bool,
}
