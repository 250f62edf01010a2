//! Sliding-window ARQ.
//!
//! Both ends start with their window edges at `max_seq`, so the first frame is numbered 0.
//! ACKs are cumulative: `ack_num = n` confirms every frame up to and including `n`.

mod receiver;
mod sender;

pub use receiver::SlidingReceiver;
pub use sender::SlidingSender;

/// Weight of a new RTT sample in the smoothed estimate.
pub const RTT_GAIN: f64 = 0.2;

/// Floor on the retransmission timeout, in time units. Keeps zero-latency links from firing
/// timers in the same instant as the ACK they are racing.
pub const MIN_TIMEOUT: f64 = 1e-3;
