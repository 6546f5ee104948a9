//! Logging and metrics boundaries.
//!
//! The engine never writes to a log sink itself; ports report [`PortEvent`]s
//! through [`PortLog`] and the servo reports through [`ClockMetrics`]. Hosts
//! map these to their logging framework; `NoopPortLog` and
//! [`NOOP_CLOCK_METRICS`] discard everything.

use crate::port::ParentPortIdentity;
use crate::time::TimeInterval;

/// A notable event in the life of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    Static(&'static str),
    MessageReceived(&'static str),
    MessageSent(&'static str),
    Initialized,
    RecommendedSlave { parent: ParentPortIdentity },
    RecommendedMaster,
    RecommendedPassive,
    MasterClockSelected,
    AnnounceReceiptTimeout,
    QualificationTimeout,
    SynchronizationFault,
    FaultDetected,
    FaultCleared,
    PortDisabled,
    PortEnabled,
}

pub trait PortLog {
    fn event(&self, event: PortEvent);
}

impl<L: PortLog> PortLog for &L {
    fn event(&self, event: PortEvent) {
        (*self).event(event)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NoopPortLog;

impl PortLog for NoopPortLog {
    fn event(&self, _event: PortEvent) {}
}

/// Servo observability. All methods default to no-ops so hosts implement
/// only what they report.
pub trait ClockMetrics: Sync {
    fn offset_from_master(&self, _offset: TimeInterval) {}
    fn mean_path_delay(&self, _delay: TimeInterval) {}
    fn phase_step(&self, _step: TimeInterval) {}
    fn frequency_trim(&self, _ppb: i64) {}
    fn servo_divergence(&self) {}
}

pub struct NoopClockMetrics;

impl ClockMetrics for NoopClockMetrics {}

pub static NOOP_CLOCK_METRICS: NoopClockMetrics = NoopClockMetrics;
