#![allow(dead_code)]

use arqsim::{
    queue::{DropTailQ, QDisc},
    units::Bandwidth,
    ConnId, ConnectionDesc, LinkDesc, LinkId, Workload,
};

pub const FORWARD: LinkId = LinkId::ZERO;
pub const BACKWARD: LinkId = LinkId::ONE;

pub fn link_pair<Q: QDisc>(
    delay: f64,
    drop_rate: f64,
    bandwidth: Bandwidth,
    mut mk_queue: impl FnMut() -> Q,
) -> Vec<LinkDesc<Q>> {
    [FORWARD, BACKWARD]
        .into_iter()
        .map(|id| {
            LinkDesc::builder()
                .id(id)
                .bandwidth(bandwidth)
                .delay(delay)
                .drop_rate(drop_rate)
                .queue(mk_queue())
                .build()
        })
        .collect()
}

pub fn lossless(delay: f64) -> Vec<LinkDesc<DropTailQ>> {
    link_pair(delay, 0.0, Bandwidth::Unlimited, || DropTailQ::new(100))
}

pub fn connection(id: usize, workload: Workload) -> ConnectionDesc {
    ConnectionDesc::builder()
        .id(ConnId::new(id))
        .forward(FORWARD)
        .backward(BACKWARD)
        .workload(workload)
        .build()
}

pub fn batch(count: u64) -> Workload {
    Workload::Batch { count, size: 16 }
}
