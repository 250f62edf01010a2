use std::ops::{Add, AddAssign, Sub};

/// Number of clock ticks in one model time unit.
///
/// Configuration and reports speak in fractional time units; the scheduler runs on integer
/// ticks so that events are totally ordered.
pub const TICKS_PER_UNIT: u128 = 1_000_000_000;

macro_rules! time_unit {
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
            derive_more::Display,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(u128);

        impl $name {
            pub const ZERO: $name = Self::new(0);
            pub const ONE: $name = Self::new(1);
            pub const MAX: $name = Self::new(u128::MAX);

            pub const fn new(value: u128) -> Self {
                Self(value)
            }

            pub const fn into_u128(self) -> u128 {
                self.0
            }

            /// Converts a non-negative number of time units into ticks, rounding to the
            /// nearest tick. Non-finite or negative inputs saturate.
            pub fn from_units(units: f64) -> Self {
                if units.is_nan() || units <= 0.0 {
                    return Self::ZERO;
                }
                let ticks = units * TICKS_PER_UNIT as f64;
                if ticks >= u128::MAX as f64 {
                    Self::MAX
                } else {
                    Self(ticks.round() as u128)
                }
            }

            pub fn into_units(self) -> f64 {
                self.0 as f64 / TICKS_PER_UNIT as f64
            }
        }
    };
}

time_unit!(Time);

impl Time {
    pub const fn saturating_sub(self, rhs: Time) -> Delta {
        Delta::new(self.0.saturating_sub(rhs.0))
    }
}

time_unit!(Delta);

impl Add<Delta> for Time {
    type Output = Time;

    fn add(self, rhs: Delta) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub<Time> for Time {
    type Output = Delta;

    fn sub(self, rhs: Time) -> Self::Output {
        Delta::new(self.0 - rhs.0)
    }
}

impl AddAssign<Delta> for Time {
    fn add_assign(&mut self, rhs: Delta) {
        *self = *self + rhs
    }
}
