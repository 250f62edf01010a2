use std::path::Path;

use rand::{rngs::StdRng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::{
    entities::{
        connection::Connection,
        link::{check_duration, check_probability, Link},
    },
    queue::QDisc,
    simulation::Simulation,
    time::Time,
    transport::TransportConfig,
    ConnId, ConnectionDesc, LinkDesc, LinkId, LinkUpdate, Report,
};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, typed_builder::TypedBuilder)]
pub struct Config<Q: QDisc> {
    #[builder(default)]
    transport: TransportConfig,
    links: Vec<LinkDesc<Q>>,
    connections: Vec<ConnectionDesc>,
    #[builder(default)]
    updates: Vec<LinkUpdate>,
    #[builder(default = DEFAULT_SEED)]
    seed: u64,
    /// Stop once the next event would fall after this time (in time units).
    #[builder(default, setter(into))]
    time_limit: Option<f64>,
}

/// Validates `cfg`, builds the network and runs it to quiescence or the time limit.
pub fn run<Q: QDisc>(cfg: Config<Q>) -> Result<Report, Error> {
    cfg.transport.validate()?;
    if let Some(limit) = cfg.time_limit {
        check_duration(limit)?;
    }
    let space = cfg.transport.seq_space();
    let mut links = FxHashMap::default();
    for desc in cfg.links {
        let id = desc.id;
        if links.contains_key(&id) {
            return Err(Error::DuplicateLink(id));
        }
        links.insert(id, Link::new(desc, space)?);
    }
    let mut connections = FxHashMap::default();
    for desc in cfg.connections {
        let id = desc.id;
        if connections.contains_key(&id) {
            return Err(Error::DuplicateConnection(id));
        }
        if cfg.time_limit.is_none() && !desc.workload.is_bounded() {
            return Err(Error::Unbounded(id));
        }
        let conn = Connection::new(desc, &cfg.transport)?;
        if let Some(&link) = conn.links().iter().find(|l| !links.contains_key(*l)) {
            return Err(Error::UnknownLink(link));
        }
        connections.insert(id, conn);
    }
    for update in &cfg.updates {
        check_duration(update.at)?;
        if !links.contains_key(&update.link) {
            return Err(Error::UnknownLink(update.link));
        }
        if let Some(p) = update.drop_rate {
            check_probability(p)?;
        }
    }
    let sim = Simulation::builder()
        .rng(StdRng::seed_from_u64(cfg.seed))
        .seed(cfg.seed)
        .links(links)
        .connections(connections)
        .updates(cfg.updates)
        .time_limit(cfg.time_limit.map(Time::from_units))
        .build();
    Ok(sim.run())
}

/// Reads a JSON array of connection descriptions.
pub fn read_connections(path: impl AsRef<Path>) -> Result<Vec<ConnectionDesc>, Error> {
    let s = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&s)?)
}

/// Reads a JSON array of scheduled link changes.
pub fn read_updates(path: impl AsRef<Path>) -> Result<Vec<LinkUpdate>, Error> {
    let s = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&s)?)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serde error")]
    Serde(#[from] serde_json::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("window must be at least 1")]
    ZeroWindow,

    #[error("window {window} exceeds the maximum window {max_window}")]
    WindowTooLarge { window: u64, max_window: u64 },

    #[error("maximum window {max_window} needs more than {max_seq} as the maximum sequence number")]
    SeqSpaceTooSmall { max_window: u64, max_seq: u64 },

    #[error("{0} is not a probability")]
    InvalidProbability(f64),

    #[error("{0} is not a valid duration")]
    InvalidDuration(f64),

    #[error("{0} is not a valid bandwidth")]
    InvalidBandwidth(f64),

    #[error("{0} is not a valid generation rate")]
    InvalidRate(f64),

    #[error("unknown link {0}")]
    UnknownLink(LinkId),

    #[error("link {0} defined twice")]
    DuplicateLink(LinkId),

    #[error("connection {0} defined twice")]
    DuplicateConnection(ConnId),

    #[error("connection {0} generates messages forever and no time limit is set")]
    Unbounded(ConnId),
}

#[cfg(test)]
mod tests {
    use crate::{queue::DropTailQ, Workload};

    use super::*;

    fn link(id: usize) -> LinkDesc<DropTailQ> {
        LinkDesc::builder()
            .id(LinkId::new(id))
            .delay(1.0)
            .queue(DropTailQ::new(8))
            .build()
    }

    fn conn(id: usize, forward: usize, backward: usize) -> ConnectionDesc {
        ConnectionDesc::builder()
            .id(ConnId::new(id))
            .forward(LinkId::new(forward))
            .backward(LinkId::new(backward))
            .workload(Workload::Batch { count: 1, size: 0 })
            .build()
    }

    #[test]
    fn unknown_link_rejected() {
        let cfg = Config::builder()
            .links(vec![link(0)])
            .connections(vec![conn(0, 0, 1)])
            .build();
        assert!(matches!(run(cfg), Err(Error::UnknownLink(l)) if l == LinkId::ONE));
    }

    #[test]
    fn duplicates_rejected() {
        let cfg = Config::builder()
            .links(vec![link(0), link(0)])
            .connections(vec![])
            .build();
        assert!(matches!(run(cfg), Err(Error::DuplicateLink(_))));
        let cfg = Config::builder()
            .links(vec![link(0), link(1)])
            .connections(vec![conn(0, 0, 1), conn(0, 0, 1)])
            .build();
        assert!(matches!(run(cfg), Err(Error::DuplicateConnection(_))));
    }

    #[test]
    fn bad_update_rejected() {
        let update = LinkUpdate::builder()
            .at(1.0)
            .link(LinkId::ZERO)
            .drop_rate(2.0)
            .build();
        let cfg = Config::builder()
            .links(vec![link(0), link(1)])
            .connections(vec![conn(0, 0, 1)])
            .updates(vec![update])
            .build();
        assert!(matches!(run(cfg), Err(Error::InvalidProbability(_))));
    }

    #[test]
    fn bad_transport_rejected() {
        let cfg = Config::builder()
            .transport(TransportConfig::builder().window(0).build())
            .links(vec![link(0), link(1)])
            .connections(vec![conn(0, 0, 1)])
            .build();
        assert!(matches!(run(cfg), Err(Error::ZeroWindow)));
    }

    #[test]
    fn unbounded_workload_needs_time_limit() -> anyhow::Result<()> {
        let endless = |id| ConnectionDesc {
            workload: Workload::Poisson {
                rate: 1.0,
                count: None,
                size: 0,
            },
            ..conn(id, 0, 1)
        };
        let cfg = Config::builder()
            .links(vec![link(0), link(1)])
            .connections(vec![conn(0, 0, 1), endless(1)])
            .build();
        assert!(matches!(run(cfg), Err(Error::Unbounded(c)) if c == ConnId::ONE));

        let cfg = Config::builder()
            .links(vec![link(0), link(1)])
            .connections(vec![endless(0)])
            .time_limit(20.0)
            .build();
        let report = run(cfg)?;
        assert_eq!(report.time, 20.0);
        Ok(())
    }

    #[test]
    fn empty_network_finishes_immediately() -> anyhow::Result<()> {
        let cfg = Config::<DropTailQ>::builder()
            .links(vec![])
            .connections(vec![])
            .build();
        let report = run(cfg)?;
        assert_eq!(report.time, 0.0);
        assert_eq!(report.seed, DEFAULT_SEED);
        Ok(())
    }

    #[test]
    fn connections_from_json() -> anyhow::Result<()> {
        let json = r#"[
            {"id": 0, "forward": 0, "backward": 1,
             "workload": {"kind": "periodic", "interval": 2.0, "count": 5, "size": 32}},
            {"id": 1, "forward": 0, "backward": 1, "class": 1, "missing_is_error": false,
             "workload": {"kind": "batch", "count": 3, "size": 0}}
        ]"#;
        let conns: Vec<ConnectionDesc> = serde_json::from_str(json)?;
        assert_eq!(conns.len(), 2);
        assert!(conns[0].missing_is_error);
        assert!(!conns[1].missing_is_error);
        assert_eq!(conns[1].class, crate::queue::QIndex::ONE);
        Ok(())
    }
}
