//! A deterministic discrete-event simulator for ARQ transport protocols.
//!
//! Connections pair a [`transport::Sender`] with a [`transport::Receiver`] over two one-way
//! links that impose bandwidth, delay, jitter, loss and finite buffering. A run is a pure
//! function of its [`Config`] and seed.

#[macro_use]
mod ident;

pub mod driver;
pub mod packet;
pub mod queue;
pub mod seq;
pub mod time;
pub mod transport;
pub mod units;

pub(crate) mod data;
pub(crate) mod entities;
pub(crate) mod simulation;

pub use data::{ConnectionRecord, LinkRecord, Report};
pub use driver::{read_connections, read_updates, run, Config, Error};
pub use entities::{
    connection::{ConnId, ConnectionDesc},
    link::{LinkDesc, LinkId, LinkUpdate},
    workload::Workload,
};
pub use packet::{Message, Packet};
pub use simulation::event::EventId;
