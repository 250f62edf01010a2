pub(crate) mod event;
pub(crate) mod schedule;

use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::{
    data::Report,
    entities::{
        connection::{ConnCmd, ConnId, Connection, Outgoing},
        link::{Link, LinkCmd, LinkId, LinkUpdate},
    },
    queue::QDisc,
    time::{Delta, Time},
};

use self::{event::EventId, schedule::Schedule};

#[derive(Debug, typed_builder::TypedBuilder)]
pub(crate) struct Simulation<Q: QDisc> {
    // Run-time
    #[builder(default, setter(skip))]
    schedule: Schedule,
    rng: StdRng,
    seed: u64,

    // Entities
    links: FxHashMap<LinkId, Link<Q>>,
    connections: FxHashMap<ConnId, Connection>,
    #[builder(default)]
    updates: Vec<LinkUpdate>,

    // Used for termination
    time_limit: Option<Time>,
}

impl<Q: QDisc> Simulation<Q> {
    pub(crate) fn run(mut self) -> Report {
        // Reconfigurations go first so that ones due at time zero precede any traffic
        for update in std::mem::take(&mut self.updates) {
            self.schedule
                .schedule_at(Time::from_units(update.at), LinkCmd::Reconfigure(update));
        }
        let mut ids = self.connections.keys().copied().collect::<Vec<_>>();
        ids.sort();
        for id in ids {
            self.schedule.schedule(Delta::ZERO, ConnCmd::Generate(id));
        }
        // Run the simulation
        while let Some(time) = self.schedule.peek_time() {
            if let Some(limit) = self.time_limit.filter(|&limit| time > limit) {
                debug!(limit = limit.into_units(), "time limit reached");
                self.schedule.advance_to(limit);
                break;
            }
            self.step();
        }
        info!(time = self.schedule.now().into_units(), "simulation finished");
        self.finish()
    }

    fn step(&mut self) {
        let ev = self.schedule.pop().expect("peeked event vanished");
        let Self {
            schedule,
            rng,
            links,
            connections,
            ..
        } = self;
        let mut ctx = Context::new(schedule, rng);
        match ev.cmd {
            Command::Link(cmd) => apply_link(links, connections, cmd, &mut ctx),
            Command::Connection(cmd) => {
                let out = apply_connection(connections, cmd, &mut ctx);
                transmit(links, out, &mut ctx);
            }
            Command::Test => unreachable!(),
        }
    }

    fn finish(self) -> Report {
        let now = self.schedule.now();
        let mut connections = self
            .connections
            .values()
            .map(|c| c.record(now))
            .collect::<Vec<_>>();
        connections.sort_by_key(|r| r.id);
        let mut links = self
            .links
            .values()
            .map(|l| l.record(now))
            .collect::<Vec<_>>();
        links.sort_by_key(|r| r.id);
        Report {
            time: now.into_units(),
            seed: self.seed,
            connections,
            links,
        }
    }
}

// Command handlers
fn apply_link<Q: QDisc>(
    links: &mut FxHashMap<LinkId, Link<Q>>,
    connections: &mut FxHashMap<ConnId, Connection>,
    cmd: LinkCmd,
    ctx: &mut Context,
) {
    match cmd {
        LinkCmd::TransmitNext(id) => {
            let link = links.get_mut(&id).expect("invalid link ID");
            link.transmit_next(ctx);
        }
        LinkCmd::Arrive { link, pkt } => {
            let link = links.get_mut(&link).expect("invalid link ID");
            let pkt = link.arrive(pkt);
            let dest = pkt.dest.expect("packet arrived without a destination");
            let conn = connections
                .get_mut(&dest.conn)
                .expect("invalid connection ID");
            let out = conn.receive(dest.side, pkt, ctx);
            transmit(links, out, ctx);
        }
        LinkCmd::Reconfigure(update) => {
            let link = links.get_mut(&update.link).expect("invalid link ID");
            link.reconfigure(&update);
        }
    }
}

fn apply_connection(
    connections: &mut FxHashMap<ConnId, Connection>,
    cmd: ConnCmd,
    ctx: &mut Context,
) -> Outgoing {
    match cmd {
        ConnCmd::Generate(id) => {
            let conn = connections.get_mut(&id).expect("invalid connection ID");
            conn.generate(ctx)
        }
        ConnCmd::Timeout { conn, seq } => {
            let conn = connections.get_mut(&conn).expect("invalid connection ID");
            conn.on_timeout(seq, ctx)
        }
    }
}

fn transmit<Q: QDisc>(links: &mut FxHashMap<LinkId, Link<Q>>, out: Outgoing, ctx: &mut Context) {
    for t in out {
        let link = links.get_mut(&t.link).expect("invalid link ID");
        link.enqueue(t.pkt, t.dest, ctx);
    }
}

#[derive(Debug, Clone, derive_more::From)]
pub(crate) enum Command {
    Link(LinkCmd),
    Connection(ConnCmd),
    Test,
}

/// What an action may touch besides its own entity.
#[derive(Debug)]
pub(crate) struct Context<'a> {
    pub(crate) sched: &'a mut Schedule,
    pub(crate) rng: &'a mut StdRng,
}

impl<'a> Context<'a> {
    pub(crate) fn new(sched: &'a mut Schedule, rng: &'a mut StdRng) -> Self {
        Self { sched, rng }
    }

    pub(crate) fn now(&self) -> Time {
        self.sched.now()
    }

    pub(crate) fn schedule(&mut self, delta: Delta, cmd: impl Into<Command>) -> EventId {
        self.sched.schedule(delta, cmd)
    }
}
