use crate::time::Delta;

macro_rules! unit {
    ($name: ident) => {
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
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::Display,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            pub const ZERO: $name = Self::new(0);
            pub const ONE: $name = Self::new(1);
            pub const MAX: $name = Self::new(u64::MAX);

            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn into_u64(self) -> u64 {
                self.0
            }

            pub const fn into_f64(self) -> f64 {
                self.0 as f64
            }

            pub const fn into_usize(self) -> usize {
                self.0 as usize
            }

            pub const fn saturating_sub(self, rhs: Self) -> Self {
                Self::new(self.0.saturating_sub(rhs.0))
            }
        }
    };
}

unit!(Bytes);

impl From<usize> for Bytes {
    fn from(val: usize) -> Self {
        Self(val as u64)
    }
}

/// The serialization rate of a link.
///
/// A link sends one packet at a time; the next packet may leave only after the previous one
/// has been clocked out, which takes [`Bandwidth::length`].
#[derive(Debug, Clone, Copy, PartialEq, derivative::Derivative, serde::Serialize, serde::Deserialize)]
#[derivative(Default)]
#[serde(rename_all = "kebab-case")]
pub enum Bandwidth {
    /// Packets leave back-to-back with no serialization delay.
    #[derivative(Default)]
    Unlimited,
    /// Packets per time unit, regardless of size.
    Packets(f64),
    /// Size units (bytes) per time unit.
    Bytes(f64),
}

impl Bandwidth {
    /// Time needed to put a packet of `size` on the wire.
    pub fn length(&self, size: Bytes) -> Delta {
        match *self {
            Bandwidth::Unlimited => Delta::ZERO,
            Bandwidth::Packets(rate) => Delta::from_units(1.0 / rate),
            Bandwidth::Bytes(rate) => {
                if size == Bytes::ZERO {
                    return Delta::ZERO;
                }
                Delta::from_units(size.into_f64() / rate)
            }
        }
    }

    pub(crate) fn rate(&self) -> f64 {
        match *self {
            Bandwidth::Unlimited => f64::INFINITY,
            Bandwidth::Packets(rate) | Bandwidth::Bytes(rate) => rate,
        }
    }
}
