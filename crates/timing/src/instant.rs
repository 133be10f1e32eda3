use std::ops::{Add, Sub};
use std::time::Instant as StdInstant;

use crate::Duration;

/// A monotonic timestamp with two sentinel states `std::time::Instant`
/// has no const for: `ZERO` stands in for "never happened" (so
/// `Repeater` can be built with a timer that fires on its very first
/// check) and `MAX` stands in for "as far in the future as possible"
/// (so a deadline set to it is never due). The two are deliberately
/// distinct reprs, not just distinct names for the same value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Repr {
    Zero,
    At(StdInstant),
    Max,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(Repr);

impl Default for Instant {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Instant {
    pub const ZERO: Self = Self(Repr::Zero);
    pub const MAX: Self = Self(Repr::Max);

    #[inline]
    pub fn now() -> Self {
        Self(Repr::At(StdInstant::now()))
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        match self.0 {
            Repr::At(i) => Duration::from(i.elapsed()),
            Repr::Zero => Duration::MAX,
            Repr::Max => Duration::ZERO,
        }
    }

    #[inline]
    pub fn elapsed_since(&self, since: Instant) -> Duration {
        self.saturating_sub(since)
    }

    /// `self - other`, saturated at `Duration::ZERO` if `other` is later
    /// than `self`. `ZERO` behaves as the earliest possible instant and
    /// `MAX` as the latest, so e.g. `MAX.saturating_sub(Instant::now())`
    /// is `Duration::MAX` and `Instant::ZERO.saturating_sub(Instant::now())`
    /// is `Duration::ZERO`.
    #[inline]
    pub fn saturating_sub(&self, other: Instant) -> Duration {
        match (self.0, other.0) {
            (Repr::At(a), Repr::At(b)) => Duration::from(a.saturating_duration_since(b)),
            (Repr::Max, Repr::Max) | (Repr::Zero, Repr::Zero) => Duration::ZERO,
            (Repr::Max, _) => Duration::MAX,
            (_, Repr::Zero) => Duration::MAX,
            _ => Duration::ZERO,
        }
    }
}

impl Sub for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.saturating_sub(rhs)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        match self.0 {
            Repr::At(i) => Instant(Repr::At(i + rhs.as_std())),
            Repr::Zero => Instant(Repr::Zero),
            Repr::Max => Instant(Repr::Max),
        }
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        match self.0 {
            Repr::At(i) => match i.checked_sub(rhs.as_std()) {
                Some(i) => Instant(Repr::At(i)),
                None => Instant(Repr::Zero),
            },
            Repr::Zero => Instant(Repr::Zero),
            Repr::Max => Instant(Repr::Max),
        }
    }
}
