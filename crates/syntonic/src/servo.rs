//! Clock servos: turn offset measurements into clock commands.
//!
//! [`SteppingServo`] simply steps the phase on every sample and suits
//! simulation and coarse startup. [`FilteringServo`] runs an integer
//! first-order low-pass over the measured offset and steers the clock
//! frequency, stepping only when the offset exceeds its threshold. All
//! arithmetic is on `i64` nanoseconds so the servo runs unchanged on targets
//! without an FPU.

use core::cell::Cell;

use crate::clock::ClockCommand;
use crate::log::ClockMetrics;
use crate::time::{TimeInterval, TimeStamp};

/// One synchronization measurement, produced by the delay mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoSample {
    pub offset_from_master: TimeInterval,
    pub mean_path_delay: TimeInterval,
    /// Local receipt time of the Sync the offset was measured against.
    pub ingress_timestamp: TimeStamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoState {
    Locked,
    /// The offset is growing sample over sample; the measurements cannot be
    /// trusted and the servo has reset itself.
    Divergent,
    /// The clock rejected the command; see
    /// [`crate::clock::LocalClock::discipline`].
    AdjustFailed,
}

pub enum Servo {
    Stepping(SteppingServo),
    Filtering(FilteringServo),
}

impl Servo {
    pub fn update(&self, sample: ServoSample, now: TimeStamp) -> (ServoState, Option<ClockCommand>) {
        match self {
            Servo::Stepping(servo) => servo.update(sample, now),
            Servo::Filtering(servo) => servo.update(sample, now),
        }
    }

    pub fn reset(&self) {
        match self {
            Servo::Stepping(_) => {}
            Servo::Filtering(servo) => servo.reset(),
        }
    }
}

/// Steps the clock phase on every sample.
pub struct SteppingServo {
    metrics: &'static dyn ClockMetrics,
}

impl SteppingServo {
    pub fn new(metrics: &'static dyn ClockMetrics) -> Self {
        Self { metrics }
    }

    fn update(&self, sample: ServoSample, now: TimeStamp) -> (ServoState, Option<ClockCommand>) {
        self.metrics.offset_from_master(sample.offset_from_master);
        self.metrics.mean_path_delay(sample.mean_path_delay);

        // The sample is aged by the time it reaches the servo; correct for
        // the local time elapsed since ingress as well.
        let step = (sample.ingress_timestamp - now) - sample.offset_from_master;
        self.metrics.phase_step(step);
        (ServoState::Locked, Some(ClockCommand::PhaseStep(step)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoConfig {
    /// Offsets above this magnitude are stepped out instead of steered.
    pub step_threshold: TimeInterval,
    /// Right-shift of the low-pass filter; larger is smoother and slower.
    pub filter_shift: u8,
    /// Divisor mapping filtered nanoseconds to a ppb trim.
    pub gain_divisor: i64,
    /// Consecutive samples with growing offset before the servo declares
    /// divergence.
    pub divergence_window: u8,
    pub max_trim_ppb: i64,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            step_threshold: TimeInterval::from_millis(1),
            filter_shift: 3,
            gain_divisor: 2,
            divergence_window: 8,
            max_trim_ppb: 100_000,
        }
    }
}

/// Low-pass filters the offset and steers the clock frequency.
pub struct FilteringServo {
    config: ServoConfig,
    metrics: &'static dyn ClockMetrics,
    filtered_nanos: Cell<i64>,
    last_abs_offset: Cell<Option<i64>>,
    growing_run: Cell<u8>,
}

impl FilteringServo {
    pub fn new(config: ServoConfig, metrics: &'static dyn ClockMetrics) -> Self {
        Self {
            config,
            metrics,
            filtered_nanos: Cell::new(0),
            last_abs_offset: Cell::new(None),
            growing_run: Cell::new(0),
        }
    }

    fn update(&self, sample: ServoSample, now: TimeStamp) -> (ServoState, Option<ClockCommand>) {
        self.metrics.offset_from_master(sample.offset_from_master);
        self.metrics.mean_path_delay(sample.mean_path_delay);

        let offset = sample.offset_from_master.nanos();

        if offset.saturating_abs() > self.config.step_threshold.nanos() {
            self.reset();
            let step = (sample.ingress_timestamp - now) - sample.offset_from_master;
            self.metrics.phase_step(step);
            return (ServoState::Locked, Some(ClockCommand::PhaseStep(step)));
        }

        let abs = offset.saturating_abs();
        let growing = match self.last_abs_offset.get() {
            Some(previous) => abs > previous,
            None => false,
        };
        self.last_abs_offset.set(Some(abs));
        if growing {
            let run = self.growing_run.get() + 1;
            if run >= self.config.divergence_window {
                self.metrics.servo_divergence();
                self.reset();
                return (ServoState::Divergent, None);
            }
            self.growing_run.set(run);
        } else {
            self.growing_run.set(0);
        }

        let filtered =
            self.filtered_nanos.get() + ((offset - self.filtered_nanos.get()) >> self.config.filter_shift);
        self.filtered_nanos.set(filtered);

        let trim = (-(filtered / self.config.gain_divisor))
            .clamp(-self.config.max_trim_ppb, self.config.max_trim_ppb);
        self.metrics.frequency_trim(trim);
        (ServoState::Locked, Some(ClockCommand::FrequencyTrim(trim)))
    }

    fn reset(&self) {
        self.filtered_nanos.set(0);
        self.last_abs_offset.set(None);
        self.growing_run.set(0);
    }
}
