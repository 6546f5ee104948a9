//! Port identities and the infrastructure boundary of a port.
//!
//! [`Port`] is the seam between the state machine and the host: it provides
//! the local clock, message transmission, timer creation, and logging. The
//! provided [`DomainPort`] implementation binds those concerns to a raw
//! [`PhysicalPort`] and the wire codec, and tracks consecutive send failures
//! so that a run of HAL errors (not a single drop) faults the port.

use core::cell::Cell;

use crate::clock::{ClockIdentity, LocalClock, SynchronizableClock};
use crate::log::{PortEvent, PortLog};
use crate::message::{EventMessage, GeneralMessage, SystemMessage};
use crate::result::HalError;
use crate::time::Duration;
use crate::timestamping::TxTimestamping;
use crate::wire;

/// Port number within a clock. Real ports number contiguously from 1; port 0
/// denotes "this clock" in a grandmaster's parent dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortNumber(u16);

impl PortNumber {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainNumber(u8);

impl DomainNumber {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// `(ClockIdentity, portNumber)`, unique per port within a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortIdentity {
    pub clock_identity: ClockIdentity,
    pub port_number: PortNumber,
}

impl PortIdentity {
    pub fn new(clock_identity: ClockIdentity, port_number: PortNumber) -> Self {
        Self {
            clock_identity,
            port_number,
        }
    }

    /// The all-ones identity used as a wildcard target in Signaling.
    pub fn wildcard() -> Self {
        Self {
            clock_identity: ClockIdentity::new(&[0xff; 8]),
            port_number: PortNumber::new(0xffff),
        }
    }

    pub fn to_wire(&self) -> [u8; 10] {
        let mut buf = [0; 10];
        buf[0..8].copy_from_slice(self.clock_identity.as_bytes());
        buf[8..10].copy_from_slice(&self.port_number.raw().to_be_bytes());
        buf
    }

    pub fn from_wire(buf: &[u8; 10]) -> Self {
        let mut identity = [0; 8];
        identity.copy_from_slice(&buf[0..8]);
        Self {
            clock_identity: ClockIdentity::new(&identity),
            port_number: PortNumber::new(u16::from_be_bytes([buf[8], buf[9]])),
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn fake() -> Self {
        Self::new(
            ClockIdentity::new(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x00, 0x00, 0x01]),
            PortNumber::new(1),
        )
    }
}

/// The port identity of the master a slave port is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentPortIdentity(PortIdentity);

impl ParentPortIdentity {
    pub fn new(identity: PortIdentity) -> Self {
        Self(identity)
    }

    pub fn identity(&self) -> &PortIdentity {
        &self.0
    }
}

impl core::fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}", self.clock_identity, self.port_number.raw())
    }
}

/// A send failure. `fault` is set once the consecutive-failure threshold of
/// the port is exceeded, at which point the state machine isolates the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError {
    fault: bool,
}

impl SendError {
    pub fn transient() -> Self {
        Self { fault: false }
    }

    pub fn fault() -> Self {
        Self { fault: true }
    }

    pub fn is_fault(&self) -> bool {
        self.fault
    }
}

pub type SendResult = core::result::Result<(), SendError>;

/// A restartable one-shot timer that posts a [`SystemMessage`] on expiry.
///
/// Dropping a timeout cancels it; implementations must not deliver the
/// message after the value is dropped or [`cancel`](Timeout::cancel)ed.
pub trait Timeout {
    fn restart(&self, delay: Duration);
    fn cancel(&self);
}

impl<T: Timeout> Timeout for &T {
    fn restart(&self, delay: Duration) {
        (*self).restart(delay)
    }

    fn cancel(&self) {
        (*self).cancel()
    }
}

/// Creates [`Timeout`]s bound to the port's event queue.
pub trait TimerHost {
    type Timeout: Timeout;

    fn timeout(&self, msg: SystemMessage) -> Self::Timeout;
}

impl<T: TimerHost> TimerHost for &T {
    type Timeout = T::Timeout;

    fn timeout(&self, msg: SystemMessage) -> Self::Timeout {
        (*self).timeout(msg)
    }
}

/// Raw frame transmission toward the network.
pub trait PhysicalPort {
    fn send(&self, frame: &[u8]) -> core::result::Result<(), HalError>;
}

impl<P: PhysicalPort> PhysicalPort for &P {
    fn send(&self, frame: &[u8]) -> core::result::Result<(), HalError> {
        (*self).send(frame)
    }
}

/// The infrastructure boundary consumed by the port state machine.
pub trait Port {
    type Clock: SynchronizableClock;
    type Timeout: Timeout;

    fn local_clock(&self) -> &LocalClock<Self::Clock>;
    fn identity(&self) -> PortIdentity;
    fn domain_number(&self) -> DomainNumber;
    fn send_event(&self, msg: EventMessage) -> SendResult;
    fn send_general(&self, msg: GeneralMessage) -> SendResult;
    fn timeout(&self, msg: SystemMessage) -> Self::Timeout;
    fn log(&self, event: PortEvent);
}

const DEFAULT_FAULT_THRESHOLD: u8 = 3;

/// A [`Port`] bound to one PTP domain.
///
/// Encodes outgoing messages with the port's domain number and source
/// identity, requests egress timestamps for event messages, and counts
/// consecutive send failures against the fault threshold.
pub struct DomainPort<'a, C: SynchronizableClock, T: TimerHost, X: TxTimestamping, L: PortLog> {
    local_clock: &'a LocalClock<C>,
    physical_port: &'a dyn PhysicalPort,
    timer_host: T,
    timestamping: X,
    log: L,
    domain_number: DomainNumber,
    port_number: PortNumber,
    consecutive_failures: Cell<u8>,
    fault_threshold: u8,
}

impl<'a, C: SynchronizableClock, T: TimerHost, X: TxTimestamping, L: PortLog>
    DomainPort<'a, C, T, X, L>
{
    pub fn new(
        local_clock: &'a LocalClock<C>,
        physical_port: &'a dyn PhysicalPort,
        timer_host: T,
        timestamping: X,
        log: L,
        domain_number: DomainNumber,
        port_number: PortNumber,
    ) -> Self {
        Self {
            local_clock,
            physical_port,
            timer_host,
            timestamping,
            log,
            domain_number,
            port_number,
            consecutive_failures: Cell::new(0),
            fault_threshold: DEFAULT_FAULT_THRESHOLD,
        }
    }

    pub fn with_fault_threshold(mut self, threshold: u8) -> Self {
        assert!(threshold >= 1);
        self.fault_threshold = threshold;
        self
    }

    fn send(&self, frame: &[u8]) -> SendResult {
        match self.physical_port.send(frame) {
            Ok(()) => {
                self.consecutive_failures.set(0);
                Ok(())
            }
            Err(_) => {
                let failures = self.consecutive_failures.get().saturating_add(1);
                self.consecutive_failures.set(failures);
                if failures >= self.fault_threshold {
                    Err(SendError::fault())
                } else {
                    Err(SendError::transient())
                }
            }
        }
    }
}

impl<'a, C: SynchronizableClock, T: TimerHost, X: TxTimestamping, L: PortLog> Port
    for DomainPort<'a, C, T, X, L>
{
    type Clock = C;
    type Timeout = T::Timeout;

    fn local_clock(&self) -> &LocalClock<Self::Clock> {
        self.local_clock
    }

    fn identity(&self) -> PortIdentity {
        PortIdentity::new(*self.local_clock.identity(), self.port_number)
    }

    fn domain_number(&self) -> DomainNumber {
        self.domain_number
    }

    fn send_event(&self, msg: EventMessage) -> SendResult {
        let packet = wire::event_packet(self.identity(), self.domain_number, &msg);
        let mut buf = [0; wire::MAX_FRAME_LEN];
        let len = wire::encode(&packet, &mut buf);

        self.send(&buf[..len])?;
        self.timestamping.stamp_egress(msg);
        Ok(())
    }

    fn send_general(&self, msg: GeneralMessage) -> SendResult {
        let packet = wire::general_packet(self.identity(), self.domain_number, &msg);
        let mut buf = [0; wire::MAX_FRAME_LEN];
        let len = wire::encode(&packet, &mut buf);

        self.send(&buf[..len])
    }

    fn timeout(&self, msg: SystemMessage) -> Self::Timeout {
        self.timer_host.timeout(msg)
    }

    fn log(&self, event: PortEvent) {
        self.log.event(event);
    }
}

/// The announce receipt timeout of a port, preconfigured with its interval.
pub struct AnnounceReceiptTimeout<T: Timeout> {
    timeout: T,
    interval: Duration,
}

impl<T: Timeout> AnnounceReceiptTimeout<T> {
    pub fn new(timeout: T, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn restart(&self) {
        self.timeout.restart(self.interval);
    }
}
