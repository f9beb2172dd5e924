//! Logical time types for the desync protocol.
//!
//! The simulation never reads a wall clock. Every point in time is a
//! [`Timestamp`] counted in abstract ticks from simulation start, and every
//! span is a [`Duration`] in the same unit. Keeping the two apart prevents
//! adding two instants together by accident.

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Point in logical time, in ticks since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Simulation start.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Latest representable instant.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    #[inline]
    pub const fn from_ticks(ticks: u64) -> Self {
        Timestamp(ticks)
    }

    #[inline]
    pub const fn as_ticks(self) -> u64 {
        self.0
    }

    /// Position of this instant within a repeating frame of length `period`.
    ///
    /// Returns `0` for a zero-length period.
    #[inline]
    pub const fn phase(self, period: Duration) -> u64 {
        match self.0.checked_rem(period.0) {
            Some(p) => p,
            None => 0,
        }
    }

    /// Saturating addition of a duration.
    #[inline]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.0))
    }

    /// Saturating subtraction of another timestamp, returning a duration.
    #[inline]
    pub const fn saturating_sub(self, other: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }

    /// Checked subtraction of another timestamp.
    #[inline]
    pub const fn checked_sub(self, other: Timestamp) -> Option<Duration> {
        match self.0.checked_sub(other.0) {
            Some(d) => Some(Duration(d)),
            None => None,
        }
    }

    /// Signed distance `self - other` in ticks.
    #[inline]
    pub const fn signed_diff(self, other: Timestamp) -> i64 {
        (self.0 as i64).wrapping_sub(other.0 as i64)
    }

    /// Shift by a signed number of ticks, saturating at zero.
    #[inline]
    pub const fn offset(self, ticks: i64) -> Self {
        if ticks >= 0 {
            Timestamp(self.0.saturating_add(ticks as u64))
        } else {
            Timestamp(self.0.saturating_sub(ticks.unsigned_abs()))
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 - rhs.0)
    }
}

/// Span of logical time in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    /// Zero duration.
    pub const ZERO: Duration = Duration(0);

    /// One tick, the smallest non-zero span.
    pub const TICK: Duration = Duration(1);

    #[inline]
    pub const fn from_ticks(ticks: u64) -> Self {
        Duration(ticks)
    }

    #[inline]
    pub const fn as_ticks(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Saturating multiplication.
    #[inline]
    pub const fn saturating_mul(self, n: u64) -> Self {
        Duration(self.0.saturating_mul(n))
    }

    /// Integer division, `None` when `n` is zero.
    #[inline]
    pub const fn checked_div(self, n: u64) -> Option<Duration> {
        match self.0.checked_div(n) {
            Some(d) => Some(Duration(d)),
            None => None,
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ticks", self.0)
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t1 = Timestamp::from_ticks(10);
        let d = Duration::from_ticks(5);

        assert_eq!((t1 + d).as_ticks(), 15);
        assert_eq!((Timestamp::from_ticks(20) - t1).as_ticks(), 10);
        assert_eq!((t1 - d).as_ticks(), 5);
    }

    #[test]
    fn test_phase() {
        let period = Duration::from_ticks(1000);
        assert_eq!(Timestamp::from_ticks(0).phase(period), 0);
        assert_eq!(Timestamp::from_ticks(2750).phase(period), 750);
        assert_eq!(Timestamp::from_ticks(42).phase(Duration::ZERO), 0);
    }

    #[test]
    fn test_signed_helpers() {
        let a = Timestamp::from_ticks(100);
        let b = Timestamp::from_ticks(350);
        assert_eq!(a.signed_diff(b), -250);
        assert_eq!(b.signed_diff(a), 250);
        assert_eq!(a.offset(-30), Timestamp::from_ticks(70));
        assert_eq!(a.offset(-500), Timestamp::ZERO);
        assert_eq!(a.offset(25), Timestamp::from_ticks(125));
    }

    #[test]
    fn test_saturating_operations() {
        assert_eq!(Timestamp::MAX.saturating_add(Duration::TICK), Timestamp::MAX);

        let t1 = Timestamp::from_ticks(5);
        let t2 = Timestamp::from_ticks(10);
        assert_eq!(t1.saturating_sub(t2), Duration::ZERO);
        assert_eq!(t1.checked_sub(t2), None);
        assert_eq!(Duration::from_ticks(9).checked_div(0), None);
    }
}
