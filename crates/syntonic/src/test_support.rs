//! Fakes for the engine's infrastructure traits.
//!
//! Everything here is deterministic and records what the engine did to it,
//! so tests drive timers and the network by hand. Enable the `test-support`
//! feature to use these from downstream integration tests.

extern crate std;

use core::cell::{Cell, RefCell};
use std::rc::Rc;
use std::vec::Vec;

use crate::bmca::{ErbestSnapshot, ForeignClockDS, SelectionTrigger};
use crate::clock::{
    Clock, ClockAccuracy, ClockCommand, ClockIdentity, ClockQuality, DefaultDS, Priority1,
    Priority2, SynchronizableClock, TimePropertiesDS, TimeScale, TimeSource,
};
use crate::message::{EventMessage, GeneralMessage, SystemMessage};
use crate::port::{DomainNumber, PhysicalPort, PortNumber, TimerHost, Timeout};
use crate::result::HalError;
use crate::time::{Duration, TimeStamp};
use crate::timestamping::TxTimestamping;
use crate::wire;

/// A settable clock that records the adjustment commands it receives.
pub struct FakeClock {
    now: Cell<TimeStamp>,
    time_scale: TimeScale,
    commands: RefCell<Vec<ClockCommand>>,
}

impl FakeClock {
    pub fn new(now: TimeStamp, time_scale: TimeScale) -> Self {
        Self {
            now: Cell::new(now),
            time_scale,
            commands: RefCell::new(Vec::new()),
        }
    }

    pub fn set_now(&self, now: TimeStamp) {
        self.now.set(now);
    }

    pub fn take_commands(&self) -> Vec<ClockCommand> {
        self.commands.take()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(TimeStamp::ZERO, TimeScale::Ptp)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> TimeStamp {
        self.now.get()
    }

    fn time_scale(&self) -> TimeScale {
        self.time_scale
    }
}

impl SynchronizableClock for FakeClock {
    fn adjust(&self, command: ClockCommand) -> core::result::Result<(), HalError> {
        self.commands.borrow_mut().push(command);
        Ok(())
    }
}

/// Captures sent frames and decodes them back for assertions.
pub struct FakePort {
    frames: RefCell<Vec<Vec<u8>>>,
}

impl FakePort {
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.borrow().is_empty()
    }

    pub fn contains_event_message(&self, expected: &EventMessage) -> bool {
        self.contains(|inbound| match inbound {
            wire::Inbound::Event { msg, .. } => msg == expected,
            _ => false,
        })
    }

    pub fn contains_general_message(&self, expected: &GeneralMessage) -> bool {
        self.contains(|inbound| match inbound {
            wire::Inbound::General { msg, .. } => msg == expected,
            _ => false,
        })
    }

    fn contains(&self, pred: impl Fn(&wire::Inbound<'_>) -> bool) -> bool {
        self.frames.borrow().iter().any(|frame| {
            wire::decode(frame, DomainNumber::new(0))
                .map(|packet| pred(&wire::inbound(packet)))
                .unwrap_or(false)
        })
    }
}

impl Default for FakePort {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalPort for FakePort {
    fn send(&self, frame: &[u8]) -> core::result::Result<(), HalError> {
        self.frames.borrow_mut().push(frame.to_vec());
        Ok(())
    }
}

/// A port whose sends always fail.
pub struct FailingPort;

impl PhysicalPort for FailingPort {
    fn send(&self, _frame: &[u8]) -> core::result::Result<(), HalError> {
        Err(HalError::Send)
    }
}

/// A port that fails the next `n` sends and then recovers.
pub struct FlakyPort {
    failures_left: Cell<u8>,
}

impl FlakyPort {
    pub fn new() -> Self {
        Self {
            failures_left: Cell::new(0),
        }
    }

    pub fn fail_next(&self, failures: u8) {
        self.failures_left.set(failures);
    }
}

impl Default for FlakyPort {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalPort for FlakyPort {
    fn send(&self, _frame: &[u8]) -> core::result::Result<(), HalError> {
        let left = self.failures_left.get();
        if left > 0 {
            self.failures_left.set(left - 1);
            Err(HalError::Send)
        } else {
            Ok(())
        }
    }
}

/// A timeout that records its restarts instead of scheduling anything.
#[derive(Debug)]
pub struct FakeTimeout {
    msg: SystemMessage,
    restarts: RefCell<Vec<Duration>>,
    cancelled: Cell<bool>,
    host: Option<Rc<RefCell<Vec<SystemMessage>>>>,
}

impl FakeTimeout {
    pub fn new(msg: SystemMessage) -> Self {
        Self {
            msg,
            restarts: RefCell::new(Vec::new()),
            cancelled: Cell::new(false),
            host: None,
        }
    }

    pub fn restarts(&self) -> Vec<Duration> {
        self.restarts.borrow().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

impl PartialEq for FakeTimeout {
    fn eq(&self, other: &Self) -> bool {
        self.msg == other.msg
    }
}

impl Timeout for FakeTimeout {
    fn restart(&self, delay: Duration) {
        self.cancelled.set(false);
        self.restarts.borrow_mut().push(delay);
        if let Some(host) = &self.host {
            host.borrow_mut().push(self.msg);
        }
    }

    fn cancel(&self) {
        self.cancelled.set(true);
    }
}

/// Hands out [`FakeTimeout`]s and records which timers were armed, in order.
pub struct FakeTimerHost {
    armed: Rc<RefCell<Vec<SystemMessage>>>,
}

impl FakeTimerHost {
    pub fn new() -> Self {
        Self {
            armed: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Drain the messages of every timer restart since the last call.
    pub fn take_system_messages(&self) -> Vec<SystemMessage> {
        self.armed.borrow_mut().drain(..).collect()
    }
}

impl Default for FakeTimerHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHost for FakeTimerHost {
    type Timeout = FakeTimeout;

    fn timeout(&self, msg: SystemMessage) -> FakeTimeout {
        FakeTimeout {
            msg,
            restarts: RefCell::new(Vec::new()),
            cancelled: Cell::new(false),
            host: Some(Rc::clone(&self.armed)),
        }
    }
}

/// Records the event messages handed over for egress timestamping.
pub struct FakeTimestamping {
    stamped: RefCell<Vec<EventMessage>>,
}

impl FakeTimestamping {
    pub fn new() -> Self {
        Self {
            stamped: RefCell::new(Vec::new()),
        }
    }

    pub fn take_stamped(&self) -> Vec<EventMessage> {
        self.stamped.take()
    }
}

impl Default for FakeTimestamping {
    fn default() -> Self {
        Self::new()
    }
}

impl TxTimestamping for FakeTimestamping {
    fn stamp_egress(&self, msg: EventMessage) {
        self.stamped.borrow_mut().push(msg);
    }
}

/// Records Erbest change notifications instead of running selection.
pub struct FakeSelectionTrigger {
    events: RefCell<Vec<(PortNumber, ErbestSnapshot)>>,
}

impl FakeSelectionTrigger {
    pub fn new() -> Self {
        Self {
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn take_events(&self) -> Vec<(PortNumber, ErbestSnapshot)> {
        self.events.take()
    }
}

impl Default for FakeSelectionTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionTrigger for FakeSelectionTrigger {
    fn erbest_changed(&self, port: PortNumber, erbest: ErbestSnapshot) {
        self.events.borrow_mut().push((port, erbest));
    }
}

/// Ready-made clock datasets spanning the quality spectrum.
#[derive(Debug, Clone, Copy)]
pub struct TestClockCatalog {
    identity_octet: u8,
    clock_class: u8,
    clock_accuracy: u8,
    offset_scaled_log_variance: u16,
    slave_only: bool,
    time_traceable: bool,
}

impl TestClockCatalog {
    /// A GPS-grade grandmaster candidate.
    pub fn high_grade() -> Self {
        Self {
            identity_octet: 0x01,
            clock_class: 6,
            clock_accuracy: 0x20,
            offset_scaled_log_variance: 0x4000,
            slave_only: false,
            time_traceable: true,
        }
    }

    /// A holdover-quality clock.
    pub fn mid_grade() -> Self {
        Self {
            identity_octet: 0x02,
            clock_class: 187,
            clock_accuracy: 0xfe,
            offset_scaled_log_variance: 0xffff,
            slave_only: false,
            time_traceable: false,
        }
    }

    /// A free-running default clock.
    pub fn low_grade() -> Self {
        Self {
            identity_octet: 0x03,
            clock_class: 248,
            clock_accuracy: 0xfe,
            offset_scaled_log_variance: 0xffff,
            slave_only: false,
            time_traceable: false,
        }
    }

    pub fn low_grade_slave_only() -> Self {
        Self {
            slave_only: true,
            clock_class: 255,
            ..Self::low_grade()
        }
    }

    pub fn default_ds(&self) -> DefaultDS {
        DefaultDS {
            clock_identity: ClockIdentity::new(&[
                0x00,
                0x1b,
                0x19,
                0xff,
                0xfe,
                0x00,
                0x00,
                self.identity_octet,
            ]),
            number_ports: 1,
            clock_quality: ClockQuality::new(
                self.clock_class,
                ClockAccuracy::new(self.clock_accuracy),
                self.offset_scaled_log_variance,
            ),
            priority1: Priority1::new(128),
            priority2: Priority2::new(128),
            domain_number: DomainNumber::new(0),
            slave_only: self.slave_only,
        }
    }

    /// The dataset this clock would claim about itself in an Announce.
    pub fn foreign_ds(&self) -> ForeignClockDS {
        ForeignClockDS::from_default_ds(&self.default_ds())
    }

    pub fn time_properties(&self) -> TimePropertiesDS {
        if self.time_traceable {
            TimePropertiesDS {
                current_utc_offset: 37,
                current_utc_offset_valid: true,
                leap59: false,
                leap61: false,
                time_traceable: true,
                frequency_traceable: true,
                ptp_timescale: true,
                time_source: TimeSource::GPS,
            }
        } else {
            TimePropertiesDS::local_default(TimeScale::Ptp)
        }
    }
}
