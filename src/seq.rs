//! Modular sequence-number arithmetic.
//!
//! Sequence numbers live in `[0, max_seq]` and wrap. All window tests are phrased in terms of
//! the forward distance [`SeqSpace::delta`], which is never negative: an "earlier" number
//! simply shows up as a very large distance.

/// A frame sequence number.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct SeqNum(u64);

impl SeqNum {
    pub const ZERO: SeqNum = SeqNum::new(0);
    pub const ONE: SeqNum = SeqNum::new(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

/// The sequence space `[0, max_seq]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_new::new)]
pub struct SeqSpace {
    max_seq: u64,
}

impl SeqSpace {
    pub const fn max_seq(&self) -> SeqNum {
        SeqNum(self.max_seq)
    }

    /// Number of distinct sequence numbers.
    pub const fn modulus(&self) -> u128 {
        self.max_seq as u128 + 1
    }

    /// The largest window for which duplicates stay distinguishable across wraparound.
    pub const fn max_usable_window(&self) -> u64 {
        (self.modulus() / 2) as u64
    }

    pub fn contains(&self, seq: SeqNum) -> bool {
        seq.0 <= self.max_seq
    }

    pub fn next(&self, i: SeqNum) -> SeqNum {
        self.add(i, 1)
    }

    pub fn add(&self, i: SeqNum, n: u64) -> SeqNum {
        let m = self.modulus();
        SeqNum(((i.0 as u128 + n as u128 % m) % m) as u64)
    }

    /// Forward distance from `i` to `j`.
    ///
    /// `delta(max_seq, 0) == 1`, and `delta(5, 4) == max_seq`.
    pub fn delta(&self, i: SeqNum, j: SeqNum) -> u64 {
        let m = self.modulus();
        ((j.0 as u128 + m - i.0 as u128 % m) % m) as u64
    }

    /// Whether `j` lies in the half-open window `(i, i + width]`.
    pub fn in_window(&self, i: SeqNum, j: SeqNum, width: u64) -> bool {
        let d = self.delta(i, j);
        d > 0 && d <= width
    }
}
