//! Transport endpoints.
//!
//! A connection owns one [`Sender`] and one [`Receiver`]. Both are pure state machines: they
//! never touch the simulator directly but act through the environment handed to each call,
//! which supplies the clock, timers and the `to_network` / `to_application` upcalls.

use std::fmt;

use crate::{
    driver::Error,
    packet::{Message, Packet},
    seq::{SeqNum, SeqSpace},
    simulation::event::EventId,
    time::{Delta, Time},
};

mod no_ack;
mod sliding;
mod stop_and_wait;

#[cfg(test)]
pub(crate) mod testing;

pub use no_ack::{NoAckReceiver, NoAckSender};
pub use sliding::{SlidingReceiver, SlidingSender};
pub use stop_and_wait::{StopAndWaitReceiver, StopAndWaitSender};

/// What a sender may ask of the world around it.
pub trait SenderEnv {
    fn now(&self) -> Time;

    fn to_network(&mut self, pkt: Packet);

    /// Edge-triggered notice that the window has room again.
    fn ready_for_more_from_application(&mut self);

    /// Arms a retransmission timer that calls back [`Sender::on_timeout`] with `seq`.
    fn start_timer(&mut self, after: Delta, seq: SeqNum) -> EventId;

    fn cancel_timer(&mut self, timer: EventId);

    /// Reports a frame the sender stopped retrying.
    fn give_up(&mut self, seq: SeqNum);
}

/// What a receiver may ask of the world around it.
pub trait ReceiverEnv {
    fn now(&self) -> Time;

    fn to_network(&mut self, pkt: Packet);

    fn to_application(&mut self, msg: Message);
}

pub trait Sender: fmt::Debug {
    /// Offers a message for transmission. Returns `false` if the sender has no room; the
    /// caller keeps the message and retries after the next readiness notice.
    fn from_application(&mut self, msg: &Message, env: &mut dyn SenderEnv) -> bool;

    fn from_network(&mut self, pkt: Packet, env: &mut dyn SenderEnv);

    fn on_timeout(&mut self, seq: SeqNum, env: &mut dyn SenderEnv);

    /// Number of frames sent but not yet acknowledged.
    fn outstanding(&self) -> usize;
}

pub trait Receiver: fmt::Debug {
    fn from_network(&mut self, pkt: Packet, env: &mut dyn ReceiverEnv);
}

/// The protocol run by both ends of every connection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    derivative::Derivative,
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
)]
#[derivative(Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Fire and forget.
    NoAck,
    /// Alternating-bit stop-and-wait.
    StopAndWait,
    /// Go-back-N style window with cumulative ACKs and receiver-side reordering.
    #[derivative(Default)]
    SlidingWindow,
}

/// Protocol parameters shared by all endpoints.
#[derive(Debug, Clone, Copy, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize)]
pub struct TransportConfig {
    #[builder(default)]
    pub mode: Mode,
    #[builder(default = 5)]
    pub window: u64,
    #[builder(default = 1_000_000)]
    pub max_seq: u64,
    #[builder(default = 100)]
    pub max_window: u64,
    /// Retransmission timeout (time units) used until the first RTT sample.
    #[builder(default = 100.0)]
    pub initial_timeout: f64,
    /// Retransmissions per frame before giving up. `None` retries forever.
    #[builder(default, setter(strip_option))]
    pub max_retries: Option<u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl TransportConfig {
    pub fn seq_space(&self) -> SeqSpace {
        SeqSpace::new(self.max_seq)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.initial_timeout.is_finite() || self.initial_timeout <= 0.0 {
            return Err(Error::InvalidDuration(self.initial_timeout));
        }
        match self.mode {
            Mode::NoAck => return Ok(()),
            // The alternating bit needs sequence numbers 0 and 1
            Mode::StopAndWait if self.max_seq < 1 => {
                return Err(Error::SeqSpaceTooSmall {
                    max_window: 1,
                    max_seq: self.max_seq,
                })
            }
            Mode::StopAndWait => return Ok(()),
            Mode::SlidingWindow => {}
        }
        if self.window == 0 {
            return Err(Error::ZeroWindow);
        }
        if self.window > self.max_window {
            return Err(Error::WindowTooLarge {
                window: self.window,
                max_window: self.max_window,
            });
        }
        let usable = self.seq_space().max_usable_window();
        if self.max_window > usable {
            return Err(Error::SeqSpaceTooSmall {
                max_window: self.max_window,
                max_seq: self.max_seq,
            });
        }
        Ok(())
    }

    pub fn sender(&self) -> Box<dyn Sender> {
        match self.mode {
            Mode::NoAck => Box::new(NoAckSender::new()),
            Mode::StopAndWait => Box::new(StopAndWaitSender::new(
                self.initial_timeout,
                self.max_retries,
            )),
            Mode::SlidingWindow => Box::new(SlidingSender::new(self)),
        }
    }

    pub fn receiver(&self) -> Box<dyn Receiver> {
        match self.mode {
            Mode::NoAck => Box::new(NoAckReceiver::new()),
            Mode::StopAndWait => Box::new(StopAndWaitReceiver::new()),
            Mode::SlidingWindow => Box::new(SlidingReceiver::new(self)),
        }
    }
}
