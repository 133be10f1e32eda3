use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};

/// A thin, `Copy` wrapper around [`std::time::Duration`] with the
/// arithmetic operators the rest of this workspace expects (`Repeater`
/// in particular adds/subtracts intervals directly).
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(StdDuration);

impl Duration {
    pub const ZERO: Self = Self(StdDuration::ZERO);
    pub const MAX: Self = Self(StdDuration::MAX);
    pub const MILLIS_10: Self = Self::from_millis(10);
    pub const MILLIS_5: Self = Self::from_millis(5);

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(StdDuration::from_secs(secs))
    }

    #[inline]
    pub fn from_mins(mins: u64) -> Self {
        Self::from_secs(mins * 60)
    }

    #[inline]
    pub fn from_secs_f64(s: f64) -> Self {
        Self(StdDuration::from_secs_f64(s))
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(StdDuration::from_millis(millis))
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Self(StdDuration::from_micros(micros))
    }

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(StdDuration::from_nanos(nanos))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Duration) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn saturating_add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn as_secs(&self) -> f64 {
        self.0.as_secs_f64()
    }

    #[inline]
    pub fn as_millis(&self) -> f64 {
        self.0.as_secs_f64() * 1_000.0
    }

    #[inline]
    pub fn as_micros(&self) -> f64 {
        self.0.as_secs_f64() * 1_000_000.0
    }

    #[inline]
    pub fn as_micros_u128(&self) -> u128 {
        self.0.as_micros()
    }

    #[inline]
    pub fn as_nanos(&self) -> f64 {
        self.0.as_nanos() as f64
    }

    #[inline]
    pub fn as_std(&self) -> StdDuration {
        self.0
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        humantime::format_duration(self.0).fmt(f)
    }
}

impl From<StdDuration> for Duration {
    #[inline]
    fn from(value: StdDuration) -> Self {
        Self(value)
    }
}

impl From<Duration> for StdDuration {
    #[inline]
    fn from(value: Duration) -> Self {
        value.0
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Duration {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Duration {
    #[inline]
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Mul<u32> for Duration {
    type Output = Duration;

    #[inline]
    fn mul(self, rhs: u32) -> Duration {
        Duration(self.0 * rhs)
    }
}

impl MulAssign<u32> for Duration {
    #[inline]
    fn mul_assign(&mut self, rhs: u32) {
        *self = *self * rhs;
    }
}

impl Div<u32> for Duration {
    type Output = Duration;

    #[inline]
    fn div(self, rhs: u32) -> Duration {
        Duration(self.0 / rhs)
    }
}

impl DivAssign<u32> for Duration {
    #[inline]
    fn div_assign(&mut self, rhs: u32) {
        *self = *self / rhs;
    }
}

impl Div<Duration> for Duration {
    type Output = f64;

    #[inline]
    fn div(self, rhs: Duration) -> f64 {
        self.0.as_secs_f64() / rhs.0.as_secs_f64()
    }
}

impl From<Duration> for f64 {
    #[inline]
    fn from(value: Duration) -> f64 {
        value.0.as_secs_f64()
    }
}

impl std::iter::Sum for Duration {
    #[inline]
    fn sum<I>(iter: I) -> Self
    where
        I: Iterator<Item = Self>,
    {
        iter.fold(Duration::ZERO, |acc, d| acc + d)
    }
}

impl<'a> std::iter::Sum<&'a Self> for Duration {
    #[inline]
    fn sum<I>(iter: I) -> Self
    where
        I: Iterator<Item = &'a Self>,
    {
        iter.fold(Duration::ZERO, |acc, d| acc + *d)
    }
}
