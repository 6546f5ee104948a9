//! Clock identities, quality, datasets, and the local clock boundary.
//!
//! The dataset structs mirror IEEE 1588-2019 §8: one `DefaultDS`,
//! `CurrentDS`, `ParentDS`, and `TimePropertiesDS` per clock instance, plus
//! one `PortDS` per port. `ParentDS` and `TimePropertiesDS` are owned by the
//! clock-wide state decision (see [`crate::selection`]) and replaced
//! atomically when the selected master changes.

use core::cell::Cell;

use crate::port::{DomainNumber, PortIdentity, PortNumber};
use crate::portstate::PortStateKind;
use crate::result::HalError;
use crate::servo::{Servo, ServoSample, ServoState};
use crate::time::{LogInterval, TimeInterval, TimeStamp};

/// 8-byte globally unique clock identifier (EUI-64 derived).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockIdentity {
    octets: [u8; 8],
}

impl ClockIdentity {
    pub fn new(octets: &[u8; 8]) -> Self {
        Self { octets: *octets }
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.octets
    }
}

impl core::fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (index, octet) in self.octets.iter().enumerate() {
            if index > 0 {
                write!(f, ":")?;
            }
            write!(f, "{octet:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority1(u8);

impl Priority1 {
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority2(u8);

impl Priority2 {
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Clock accuracy as the IEEE 1588 enumeration octet. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockAccuracy(u8);

impl ClockAccuracy {
    pub const WITHIN_100_NS: ClockAccuracy = ClockAccuracy(0x21);
    pub const WITHIN_1_US: ClockAccuracy = ClockAccuracy(0x23);
    pub const WITHIN_1_MS: ClockAccuracy = ClockAccuracy(0x29);
    pub const UNKNOWN: ClockAccuracy = ClockAccuracy(0xfe);

    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Grandmaster-capable quality of a clock. Lower values are better on every
/// field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockQuality {
    pub clock_class: u8,
    pub clock_accuracy: ClockAccuracy,
    pub offset_scaled_log_variance: u16,
}

impl ClockQuality {
    pub fn new(clock_class: u8, clock_accuracy: ClockAccuracy, offset_scaled_log_variance: u16) -> Self {
        Self {
            clock_class,
            clock_accuracy,
            offset_scaled_log_variance,
        }
    }
}

/// Number of clock hops between a candidate and its grandmaster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct StepsRemoved(u16);

impl StepsRemoved {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn increment(&self) -> StepsRemoved {
        StepsRemoved(self.0.saturating_add(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeScale {
    /// The PTP epoch (TAI-based).
    Ptp,
    /// An arbitrary timescale, meaningful only within the domain.
    Arb,
}

/// The `timeSource` enumeration octet carried in Announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSource(u8);

impl TimeSource {
    pub const ATOMIC_CLOCK: TimeSource = TimeSource(0x10);
    pub const GPS: TimeSource = TimeSource(0x20);
    pub const PTP: TimeSource = TimeSource(0x40);
    pub const INTERNAL_OSCILLATOR: TimeSource = TimeSource(0xa0);

    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Static attributes of the local clock. Mutated only by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultDS {
    pub clock_identity: ClockIdentity,
    pub number_ports: u16,
    pub clock_quality: ClockQuality,
    pub priority1: Priority1,
    pub priority2: Priority2,
    pub domain_number: DomainNumber,
    pub slave_only: bool,
}

/// Synchronization distance and quality to the current master.
///
/// `steps_removed` is non-zero only while the clock is synchronized to a
/// foreign master; it is reset together with offset and delay when the clock
/// becomes master itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CurrentDS {
    pub steps_removed: StepsRemoved,
    pub offset_from_master: TimeInterval,
    pub mean_path_delay: TimeInterval,
}

pub const OBSERVED_VARIANCE_NOT_COMPUTED: u16 = 0xffff;
pub const OBSERVED_PHASE_CHANGE_RATE_NOT_COMPUTED: i32 = 0x7fff_ffff;

/// Identity and quality of the selected parent and grandmaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentDS {
    pub parent_port_identity: PortIdentity,
    pub observed_parent_offset_scaled_log_variance: u16,
    pub observed_parent_clock_phase_change_rate: i32,
    pub grandmaster_identity: ClockIdentity,
    pub grandmaster_clock_quality: ClockQuality,
    pub grandmaster_priority1: Priority1,
    pub grandmaster_priority2: Priority2,
}

impl ParentDS {
    /// The parent dataset of a clock that is its own grandmaster.
    pub fn local(default_ds: &DefaultDS) -> Self {
        Self {
            parent_port_identity: PortIdentity::new(
                default_ds.clock_identity,
                PortNumber::new(0),
            ),
            observed_parent_offset_scaled_log_variance: OBSERVED_VARIANCE_NOT_COMPUTED,
            observed_parent_clock_phase_change_rate: OBSERVED_PHASE_CHANGE_RATE_NOT_COMPUTED,
            grandmaster_identity: default_ds.clock_identity,
            grandmaster_clock_quality: default_ds.clock_quality,
            grandmaster_priority1: default_ds.priority1,
            grandmaster_priority2: default_ds.priority2,
        }
    }
}

/// Properties of the timescale distributed by the current grandmaster.
///
/// Copied down from the selected master's Announce body; when the local clock
/// is grandmaster these describe the local timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePropertiesDS {
    pub current_utc_offset: i16,
    pub current_utc_offset_valid: bool,
    pub leap59: bool,
    pub leap61: bool,
    pub time_traceable: bool,
    pub frequency_traceable: bool,
    pub ptp_timescale: bool,
    pub time_source: TimeSource,
}

impl TimePropertiesDS {
    /// Timescale properties of a free-running local oscillator.
    pub fn local_default(time_scale: TimeScale) -> Self {
        Self {
            current_utc_offset: 37,
            current_utc_offset_valid: false,
            leap59: false,
            leap61: false,
            time_traceable: false,
            frequency_traceable: false,
            ptp_timescale: matches!(time_scale, TimeScale::Ptp),
            time_source: TimeSource::INTERNAL_OSCILLATOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayMechanismKind {
    EndToEnd,
}

/// Per-port configuration and state as visible to management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDS {
    pub port_identity: PortIdentity,
    pub port_state: PortStateKind,
    pub log_announce_interval: LogInterval,
    pub announce_receipt_timeout: u8,
    pub log_sync_interval: LogInterval,
    pub delay_mechanism: DelayMechanismKind,
    pub log_min_delay_req_interval: LogInterval,
}

/// A readable clock.
pub trait Clock {
    fn now(&self) -> TimeStamp;
    fn time_scale(&self) -> TimeScale;
}

/// A command issued by the servo toward the physical clock,
/// see [`SynchronizableClock::adjust`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCommand {
    /// One-shot phase correction.
    PhaseStep(TimeInterval),
    /// Steer the clock frequency by the given parts-per-billion.
    FrequencyTrim(i64),
}

/// A clock that can be disciplined.
pub trait SynchronizableClock: Clock {
    fn adjust(&self, command: ClockCommand) -> core::result::Result<(), HalError>;
}

/// The local clock together with its datasets and servo.
///
/// `discipline` is the single entry point through which servo samples reach
/// the physical clock; it also maintains the offset and delay members of
/// [`CurrentDS`].
pub struct LocalClock<C: SynchronizableClock> {
    clock: C,
    default_ds: DefaultDS,
    servo: Servo,
    current: Cell<CurrentDS>,
}

impl<C: SynchronizableClock> LocalClock<C> {
    pub fn new(clock: C, default_ds: DefaultDS, servo: Servo) -> Self {
        Self {
            clock,
            default_ds,
            servo,
            current: Cell::new(CurrentDS::default()),
        }
    }

    pub fn identity(&self) -> &ClockIdentity {
        &self.default_ds.clock_identity
    }

    pub fn default_ds(&self) -> &DefaultDS {
        &self.default_ds
    }

    pub fn current_ds(&self) -> CurrentDS {
        self.current.get()
    }

    pub fn now(&self) -> TimeStamp {
        self.clock.now()
    }

    pub fn time_scale(&self) -> TimeScale {
        self.clock.time_scale()
    }

    pub(crate) fn set_steps_removed(&self, steps_removed: StepsRemoved) {
        let mut current = self.current.get();
        current.steps_removed = steps_removed;
        self.current.set(current);
    }

    /// Zero the current dataset when the clock becomes master.
    pub(crate) fn reset_current_ds(&self) {
        self.current.set(CurrentDS::default());
        self.servo.reset();
    }

    /// Feed a servo sample into the discipline pipeline.
    pub fn discipline(&self, sample: ServoSample) -> ServoState {
        let mut current = self.current.get();
        current.offset_from_master = sample.offset_from_master;
        current.mean_path_delay = sample.mean_path_delay;
        self.current.set(current);

        let (state, command) = self.servo.update(sample, self.clock.now());
        match command {
            Some(command) => match self.clock.adjust(command) {
                Ok(()) => state,
                Err(_) => ServoState::AdjustFailed,
            },
            None => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::log::NOOP_CLOCK_METRICS;
    use crate::servo::SteppingServo;
    use crate::test_support::{FakeClock, TestClockCatalog};

    #[test]
    fn local_clock_discipline_updates_current_ds() {
        let local_clock = LocalClock::new(
            FakeClock::default(),
            TestClockCatalog::mid_grade().default_ds(),
            Servo::Stepping(SteppingServo::new(&NOOP_CLOCK_METRICS)),
        );

        let sample = ServoSample {
            offset_from_master: TimeInterval::from_nanos(-10),
            mean_path_delay: TimeInterval::from_nanos(70),
            ingress_timestamp: TimeStamp::new(1, 60),
        };

        let state = local_clock.discipline(sample);

        assert_eq!(state, ServoState::Locked);
        let current = local_clock.current_ds();
        assert_eq!(current.offset_from_master, TimeInterval::from_nanos(-10));
        assert_eq!(current.mean_path_delay, TimeInterval::from_nanos(70));
    }

    #[test]
    fn local_clock_reset_zeroes_current_ds() {
        let local_clock = LocalClock::new(
            FakeClock::default(),
            TestClockCatalog::mid_grade().default_ds(),
            Servo::Stepping(SteppingServo::new(&NOOP_CLOCK_METRICS)),
        );
        local_clock.set_steps_removed(StepsRemoved::new(2));

        local_clock.reset_current_ds();

        assert_eq!(local_clock.current_ds(), CurrentDS::default());
    }
}
