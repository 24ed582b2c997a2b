use std::ops::{Add, Sub};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds on a process-wide monotonic clock.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Self = Timestamp(0);

    pub fn now() -> Self {
        let epoch = EPOCH.get_or_init(Instant::now);
        Timestamp(epoch.elapsed().as_micros() as i64)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp((secs * 1e6).round() as i64)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e6
    }

    /// Signed seconds from `earlier` to `self`.
    pub fn secs_since(self, earlier: Timestamp) -> f64 {
        (self.0 - earlier.0) as f64 / 1e6
    }

    /// Time elapsed since `earlier`, saturating at zero.
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0).max(0) as u64)
    }

    pub fn elapsed(self) -> Duration {
        Timestamp::now().duration_since(self)
    }

    pub fn midpoint(self, other: Timestamp) -> Timestamp {
        Timestamp(self.0 + (other.0 - self.0) / 2)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs.as_micros() as i64)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 - rhs.as_micros() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
    }

    #[test]
    fn test_secs_round_trip() {
        let t = Timestamp::from_secs_f64(1.25);
        assert_eq!(t, Timestamp(1_250_000));
        assert_eq!(t.as_secs_f64(), 1.25);
        assert_eq!(Timestamp::ZERO.secs_since(t), -1.25);
    }

    #[test]
    fn test_duration_since_saturates() {
        let early = Timestamp(100);
        let late = early + Duration::from_millis(2);
        assert_eq!(late.duration_since(early), Duration::from_millis(2));
        assert_eq!(early.duration_since(late), Duration::ZERO);
        assert_eq!(early.midpoint(late), Timestamp(1100));
    }
}
