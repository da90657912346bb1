//! Virtual simulation time.
//!
//! [`Time`] is a signed picosecond count. All executor arithmetic
//! (`smallest + lookahead`, granted-window comparisons) happens on this
//! type, so the upper bound is [`Time::MAX`] = `i64::MAX / 2`: half the
//! raw range is kept as headroom so adding a lookahead to the largest
//! representable timestamp can never wrap.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

/// A point in (or span of) virtual time, in picoseconds.
///
/// `Time` is used both as an absolute timestamp and as a delay; the two
/// are distinguished by context, not by type. Comparisons are plain
/// integer comparisons, so ordering is total and deterministic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Time(i64);

impl Time {
    /// Time zero.
    pub const ZERO: Time = Time(0);

    /// The largest usable simulation time.
    ///
    /// `i64::MAX / 2` rather than `i64::MAX`: the granted-window
    /// computation adds a lookahead to this value, and the headroom
    /// keeps that addition from overflowing.
    pub const MAX: Time = Time(i64::MAX / 2);

    /// Construct from a raw picosecond count.
    pub const fn from_ps(ps: i64) -> Time {
        Time(ps)
    }

    /// Construct from nanoseconds.
    pub const fn from_ns(ns: i64) -> Time {
        Time(ns * 1_000)
    }

    /// Construct from microseconds.
    pub const fn from_us(us: i64) -> Time {
        Time(us * 1_000_000)
    }

    /// Construct from milliseconds.
    pub const fn from_ms(ms: i64) -> Time {
        Time(ms * 1_000_000_000)
    }

    /// Construct from whole seconds.
    pub const fn from_secs(s: i64) -> Time {
        Time(s * 1_000_000_000_000)
    }

    /// The raw picosecond count.
    pub const fn ps(self) -> i64 {
        self.0
    }

    /// The timestamp as an unsigned event-key field.
    ///
    /// # Panics
    ///
    /// Panics if the time is negative; event keys are never negative.
    pub fn ts(self) -> u64 {
        debug_assert!(self.0 >= 0, "negative timestamp {} in event key", self.0);
        self.0 as u64
    }

    /// Construct from an unsigned event-key timestamp.
    pub fn from_ts(ts: u64) -> Time {
        Time(ts as i64)
    }

    /// Whether this time is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The smaller of two times.
    pub fn min(self, other: Time) -> Time {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// The larger of two times.
    pub fn max(self, other: Time) -> Time {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// Saturating addition: clamps at [`Time::MAX`].
    pub fn saturating_add(self, other: Time) -> Time {
        Time(self.0.saturating_add(other.0).min(Time::MAX.0))
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time(self.0 + rhs.0)
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        self.0 += rhs.0;
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        Time(self.0 - rhs.0)
    }
}

impl SubAssign for Time {
    fn sub_assign(&mut self, rhs: Time) {
        self.0 -= rhs.0;
    }
}

impl Mul<i64> for Time {
    type Output = Time;

    fn mul(self, rhs: i64) -> Time {
        Time(self.0 * rhs)
    }
}

impl Div<i64> for Time {
    type Output = Time;

    fn div(self, rhs: i64) -> Time {
        Time(self.0 / rhs)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ps", self.0)
    }
}
