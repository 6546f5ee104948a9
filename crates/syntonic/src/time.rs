//! Time representations used across the engine.
//!
//! [`TimeStamp`] is the PTP wire timestamp (48-bit seconds, 32-bit
//! nanoseconds). All offset and delay arithmetic is carried out on
//! [`TimeInterval`], a signed 64-bit nanosecond count, after normalization;
//! this keeps the 48/32 boundary out of the servo math.
//!
//! [`Instant`] is a monotonic local reference used only for aging foreign
//! master records and has no relation to the PTP timescale.

pub use core::time::Duration;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A PTP timestamp: 48-bit seconds and nanoseconds since the epoch of the
/// clock's timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeStamp {
    seconds: u64,
    nanos: u32,
}

impl TimeStamp {
    pub fn new(seconds: u64, nanos: u32) -> Self {
        assert!(seconds < (1 << 48));
        assert!(nanos < 1_000_000_000);
        Self { seconds, nanos }
    }

    pub const ZERO: TimeStamp = TimeStamp {
        seconds: 0,
        nanos: 0,
    };

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    pub fn to_wire(&self) -> [u8; 10] {
        let mut buf = [0; 10];
        buf[0..2].copy_from_slice(&((self.seconds >> 32) as u16).to_be_bytes());
        buf[2..6].copy_from_slice(&(self.seconds as u32).to_be_bytes());
        buf[6..10].copy_from_slice(&self.nanos.to_be_bytes());
        buf
    }

    pub fn from_wire(buf: &[u8; 10]) -> Self {
        let high = u16::from_be_bytes([buf[0], buf[1]]) as u64;
        let low = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]) as u64;
        let nanos = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        Self::new((high << 32) | low, nanos)
    }

    pub fn checked_add(self, interval: TimeInterval) -> Option<TimeStamp> {
        let nanos = self.nanos as i64 + interval.nanos % NANOS_PER_SEC;
        let seconds = self.seconds as i64 + interval.nanos / NANOS_PER_SEC;

        let (seconds, nanos) = if nanos < 0 {
            (seconds - 1, nanos + NANOS_PER_SEC)
        } else if nanos >= NANOS_PER_SEC {
            (seconds + 1, nanos - NANOS_PER_SEC)
        } else {
            (seconds, nanos)
        };

        if (0..(1 << 48)).contains(&seconds) {
            Some(TimeStamp::new(seconds as u64, nanos as u32))
        } else {
            None
        }
    }
}

impl core::ops::Sub for TimeStamp {
    type Output = TimeInterval;

    /// Difference between two timestamps as a signed nanosecond count.
    ///
    /// Saturates at the `i64` range; at realistic clock values the difference
    /// is far below the saturation point.
    fn sub(self, rhs: Self) -> Self::Output {
        let delta_seconds = self.seconds as i64 - rhs.seconds as i64;
        let delta_nanos = self.nanos as i64 - rhs.nanos as i64;

        TimeInterval::from_nanos(
            delta_seconds
                .saturating_mul(NANOS_PER_SEC)
                .saturating_add(delta_nanos),
        )
    }
}

/// A signed duration in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeInterval {
    nanos: i64,
}

impl TimeInterval {
    pub const ZERO: TimeInterval = TimeInterval { nanos: 0 };

    pub fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    pub fn from_secs(seconds: i64) -> Self {
        Self {
            nanos: seconds * NANOS_PER_SEC,
        }
    }

    pub fn from_micros(micros: i64) -> Self {
        Self {
            nanos: micros * 1_000,
        }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis * 1_000_000,
        }
    }

    pub fn nanos(&self) -> i64 {
        self.nanos
    }

    pub fn half(&self) -> TimeInterval {
        Self {
            nanos: self.nanos / 2,
        }
    }

    pub fn abs(&self) -> TimeInterval {
        Self {
            nanos: self.nanos.saturating_abs(),
        }
    }
}

impl core::ops::Add for TimeInterval {
    type Output = TimeInterval;

    fn add(self, rhs: Self) -> Self::Output {
        TimeInterval::from_nanos(self.nanos.saturating_add(rhs.nanos))
    }
}

impl core::ops::Sub for TimeInterval {
    type Output = TimeInterval;

    fn sub(self, rhs: Self) -> Self::Output {
        TimeInterval::from_nanos(self.nanos.saturating_sub(rhs.nanos))
    }
}

impl core::ops::Neg for TimeInterval {
    type Output = TimeInterval;

    fn neg(self) -> Self::Output {
        TimeInterval::from_nanos(self.nanos.saturating_neg())
    }
}

/// The correction field of the common PTP header: nanoseconds scaled by 2^16.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionField {
    scaled_nanos: i64,
}

impl CorrectionField {
    pub const ZERO: CorrectionField = CorrectionField { scaled_nanos: 0 };

    pub fn new(scaled_nanos: i64) -> Self {
        Self { scaled_nanos }
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            scaled_nanos: nanos << 16,
        }
    }

    pub fn scaled_nanos(&self) -> i64 {
        self.scaled_nanos
    }

    /// Whole nanoseconds, rounded toward zero.
    pub fn interval(&self) -> TimeInterval {
        let v = self.scaled_nanos;
        let rounded = if v < 0 { (v + (1 << 16) - 1) >> 16 } else { v >> 16 };
        TimeInterval::from_nanos(rounded)
    }
}

/// A monotonic local reference, used to age foreign master records.
///
/// Not related to the PTP timescale: hosts derive it from a monotonic source
/// that keeps advancing even while the local clock is being stepped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant {
    nanos: u64,
}

impl Instant {
    pub fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub fn from_secs(seconds: u64) -> Self {
        Self {
            nanos: seconds * NANOS_PER_SEC as u64,
        }
    }

    pub fn saturating_elapsed_since(&self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }
}

/// A log2 message interval as used in configuration: the period is
/// `2^log` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogInterval {
    log: i8,
}

impl LogInterval {
    pub fn new(log: i8) -> Self {
        Self { log }
    }

    pub fn raw(&self) -> i8 {
        self.log
    }

    pub fn interval(&self) -> Duration {
        if self.log >= 0 {
            Duration::from_secs(1u64 << self.log)
        } else {
            Duration::from_nanos((NANOS_PER_SEC as u64) >> -self.log)
        }
    }
}

/// The `logMessageInterval` header field carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMessageInterval {
    log: i8,
}

impl LogMessageInterval {
    /// Wire value for message types that do not carry an interval.
    pub const UNSPECIFIED: LogMessageInterval = LogMessageInterval { log: 0x7f };

    pub fn new(log: i8) -> Self {
        Self { log }
    }

    pub fn raw(&self) -> i8 {
        self.log
    }

    pub fn log_interval(&self) -> LogInterval {
        LogInterval::new(self.log)
    }
}

impl From<LogInterval> for LogMessageInterval {
    fn from(value: LogInterval) -> Self {
        LogMessageInterval::new(value.raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn timestamp_new_panics_on_invalid_seconds() {
        let _ = TimeStamp::new(1 << 48, 500_000_000);
    }

    #[test]
    #[should_panic]
    fn timestamp_new_panics_on_invalid_nanos() {
        let _ = TimeStamp::new(1, 1_000_000_000);
    }

    #[test]
    fn timestamp_subtraction() {
        let ts1 = TimeStamp::new(1, 500_000_000);
        let ts2 = TimeStamp::new(1, 200_000_000);

        assert_eq!(ts1 - ts2, TimeInterval::from_millis(300));
        assert_eq!(ts2 - ts1, TimeInterval::from_millis(-300));
    }

    #[test]
    fn timestamp_subtraction_crossing_seconds() {
        let ts1 = TimeStamp::new(2, 100_000_000);
        let ts2 = TimeStamp::new(1, 900_000_000);

        assert_eq!(ts1 - ts2, TimeInterval::from_millis(200));
        assert_eq!(ts2 - ts1, TimeInterval::from_millis(-200));
    }

    #[test]
    fn timestamp_wire_round_trip() {
        let ts = TimeStamp::new((1 << 48) - 1, 999_999_999);

        assert_eq!(TimeStamp::from_wire(&ts.to_wire()), ts);
    }

    #[test]
    fn timestamp_checked_add_normalizes_nanos() {
        let ts = TimeStamp::new(1, 900_000_000);

        assert_eq!(
            ts.checked_add(TimeInterval::from_millis(200)),
            Some(TimeStamp::new(2, 100_000_000))
        );
        assert_eq!(
            ts.checked_add(TimeInterval::from_millis(-950)),
            Some(TimeStamp::new(0, 950_000_000))
        );
    }

    #[test]
    fn timestamp_checked_add_rejects_underflow() {
        let ts = TimeStamp::new(1, 0);

        assert_eq!(ts.checked_add(TimeInterval::from_secs(-2)), None);
    }

    #[test]
    fn correction_field_rounds_toward_zero() {
        assert_eq!(
            CorrectionField::new((70 << 16) + 40_000).interval(),
            TimeInterval::from_nanos(70)
        );
        assert_eq!(
            CorrectionField::new(-(70 << 16) - 40_000).interval(),
            TimeInterval::from_nanos(-70)
        );
    }

    #[test]
    fn log_interval_covers_sub_second_periods() {
        assert_eq!(LogInterval::new(1).interval(), Duration::from_secs(2));
        assert_eq!(LogInterval::new(0).interval(), Duration::from_secs(1));
        assert_eq!(LogInterval::new(-2).interval(), Duration::from_millis(250));
    }

    #[test]
    fn instant_elapsed_saturates() {
        let earlier = Instant::from_secs(5);
        let later = Instant::from_secs(7);

        assert_eq!(
            later.saturating_elapsed_since(earlier),
            Duration::from_secs(2)
        );
        assert_eq!(
            earlier.saturating_elapsed_since(later),
            Duration::from_secs(0)
        );
    }
}
