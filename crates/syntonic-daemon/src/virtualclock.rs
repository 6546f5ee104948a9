//! A deterministic, in-process clock for daemon bring-up and tests.
//!
//! [`VirtualClock`] stands in for a real disciplinable oscillator. It keeps a
//! base timestamp, the monotonic instant that base was captured at, and a
//! multiplicative rate factor; `now()` returns `base + elapsed * rate`.
//! Adjustment commands from the servo update the base (phase steps) or the
//! rate (frequency trims).

use std::sync::{Arc, Mutex};
use std::time::Instant as StdInstant;

use syntonic::clock::{Clock, ClockCommand, SynchronizableClock, TimeScale};
use syntonic::result::HalError;
use syntonic::time::{TimeInterval, TimeStamp};

pub struct VirtualClock {
    start: Mutex<StdInstant>,
    base: Mutex<TimeStamp>,
    rate: Mutex<f64>,
    time_scale: TimeScale,
}

impl VirtualClock {
    /// `start_ts` is the initial reading; `rate` is a multiplicative factor
    /// where 1.0 is nominal.
    pub fn new(start_ts: TimeStamp, rate: f64, time_scale: TimeScale) -> Self {
        Self {
            start: Mutex::new(StdInstant::now()),
            base: Mutex::new(start_ts),
            rate: Mutex::new(rate),
            time_scale,
        }
    }

    /// Capture the current reading as the new base so a subsequent rate or
    /// base change does not move time backwards.
    fn rebase(&self) -> TimeStamp {
        let current = self.now();
        *self.start.lock().unwrap() = StdInstant::now();
        *self.base.lock().unwrap() = current;
        current
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> TimeStamp {
        let start = self.start.lock().unwrap();
        let rate = *self.rate.lock().unwrap();
        let base = *self.base.lock().unwrap();

        let elapsed_nanos = start.elapsed().as_nanos() as f64 * rate;
        let interval = TimeInterval::from_nanos(elapsed_nanos as i64);

        // On overflow fall back to the base; the clock is wedged but still
        // monotonic.
        base.checked_add(interval).unwrap_or(base)
    }

    fn time_scale(&self) -> TimeScale {
        self.time_scale
    }
}

impl SynchronizableClock for VirtualClock {
    fn adjust(&self, command: ClockCommand) -> Result<(), HalError> {
        match command {
            ClockCommand::PhaseStep(step) => {
                let current = self.rebase();
                let stepped = current.checked_add(step).ok_or(HalError::Adjust)?;
                *self.base.lock().unwrap() = stepped;
            }
            ClockCommand::FrequencyTrim(ppb) => {
                self.rebase();
                *self.rate.lock().unwrap() = 1.0 + ppb as f64 * 1e-9;
            }
        }
        Ok(())
    }
}

/// A cloneable handle to a [`VirtualClock`] shared between components, e.g.
/// the local clock and the timestamping path of the same node.
#[derive(Clone)]
pub struct SharedVirtualClock(pub Arc<VirtualClock>);

impl Clock for SharedVirtualClock {
    fn now(&self) -> TimeStamp {
        self.0.now()
    }

    fn time_scale(&self) -> TimeScale {
        self.0.time_scale()
    }
}

impl SynchronizableClock for SharedVirtualClock {
    fn adjust(&self, command: ClockCommand) -> Result<(), HalError> {
        self.0.adjust(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_is_monotonic_for_fixed_rate() {
        let clock = VirtualClock::new(TimeStamp::new(1, 0), 1.0, TimeScale::Arb);

        let t1 = clock.now();
        let t2 = clock.now();

        assert!(t2 >= t1);
    }

    #[test]
    fn phase_step_moves_the_reading() {
        let clock = VirtualClock::new(TimeStamp::new(10, 0), 1.0, TimeScale::Arb);

        clock
            .adjust(ClockCommand::PhaseStep(TimeInterval::from_secs(5)))
            .unwrap();

        assert!(clock.now() >= TimeStamp::new(15, 0));
    }

    #[test]
    fn frequency_trim_does_not_move_time_backwards() {
        let clock = VirtualClock::new(TimeStamp::new(1, 0), 1.0, TimeScale::Arb);

        let t1 = clock.now();
        clock.adjust(ClockCommand::FrequencyTrim(-50_000)).unwrap();
        let t2 = clock.now();

        assert!(t2 >= t1);
    }
}
