use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};
use smallvec::SmallVec;

use crate::{driver::Error, packet::Message, time::Delta};

use super::connection::ConnId;

/// How a connection's application produces messages.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Workload {
    /// Everything submitted at time zero.
    Batch { count: u64, size: usize },
    /// Exponentially distributed inter-arrival times with the given mean rate.
    Poisson {
        rate: f64,
        #[serde(default)]
        count: Option<u64>,
        size: usize,
    },
    /// One message every `interval` time units.
    Periodic {
        interval: f64,
        #[serde(default)]
        count: Option<u64>,
        size: usize,
    },
}

impl Workload {
    /// Mean messages per time unit, if the workload has one.
    pub fn rate(&self) -> Option<f64> {
        match *self {
            Workload::Batch { .. } => None,
            Workload::Poisson { rate, .. } => Some(rate),
            Workload::Periodic { interval, .. } => Some(1.0 / interval),
        }
    }

    /// Whether the workload eventually stops producing messages.
    pub fn is_bounded(&self) -> bool {
        match *self {
            Workload::Batch { .. } => true,
            Workload::Poisson { count, .. } | Workload::Periodic { count, .. } => count.is_some(),
        }
    }
}

pub(crate) type Batch = SmallVec<[Message; 1]>;

#[derive(Debug, Clone)]
pub(crate) struct Generator {
    conn: ConnId,
    count: Option<u64>,
    size: usize,
    pacing: Pacing,
    generated: u64,
}

#[derive(Debug, Clone, Copy)]
enum Pacing {
    AllAtOnce,
    Exponential(Exp<f64>),
    Fixed(Delta),
}

impl Generator {
    pub(crate) fn new(conn: ConnId, workload: Workload) -> Result<Self, Error> {
        let (count, size, pacing) = match workload {
            Workload::Batch { count, size } => (Some(count), size, Pacing::AllAtOnce),
            Workload::Poisson { rate, count, size } => {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(Error::InvalidRate(rate));
                }
                let exp = Exp::new(rate).map_err(|_| Error::InvalidRate(rate))?;
                (count, size, Pacing::Exponential(exp))
            }
            Workload::Periodic {
                interval,
                count,
                size,
            } => {
                if !interval.is_finite() || interval <= 0.0 {
                    return Err(Error::InvalidDuration(interval));
                }
                (count, size, Pacing::Fixed(Delta::from_units(interval)))
            }
        };
        Ok(Self {
            conn,
            count,
            size,
            pacing,
            generated: 0,
        })
    }

    pub(crate) fn generated(&self) -> u64 {
        self.generated
    }

    fn is_done(&self) -> bool {
        self.count.is_some_and(|count| self.generated >= count)
    }

    fn next_message(&mut self) -> Message {
        self.generated += 1;
        let mut data = format!("C{:<4}M{:#015x}", self.conn.into_usize(), self.generated).into_bytes();
        if data.len() < self.size {
            data.resize(self.size, b'.');
        }
        Message::new(data, self.count == Some(self.generated))
    }

    /// Produces the messages due now and the delay until the next call, if any.
    pub(crate) fn step(&mut self, rng: &mut StdRng) -> (Batch, Option<Delta>) {
        let mut batch = Batch::new();
        match self.pacing {
            Pacing::AllAtOnce => {
                while !self.is_done() {
                    batch.push(self.next_message());
                }
                (batch, None)
            }
            Pacing::Exponential(exp) => {
                if !self.is_done() {
                    batch.push(self.next_message());
                }
                let next = (!self.is_done()).then(|| Delta::from_units(exp.sample(rng)));
                (batch, next)
            }
            Pacing::Fixed(interval) => {
                if !self.is_done() {
                    batch.push(self.next_message());
                }
                (batch, (!self.is_done()).then_some(interval))
            }
        }
    }
}
