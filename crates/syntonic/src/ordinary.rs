//! Single-port clock orchestration.

use crate::bmca::ForeignClockRecords;
use crate::boundary::{BoundaryClock, SelectionQueue};
use crate::clock::{CurrentDS, DefaultDS, LocalClock, ParentDS, PortDS, TimePropertiesDS};
use crate::message::SystemMessage;
use crate::port::{Port, PortNumber};
use crate::profile::PortProfile;
use crate::result::DecodeError;
use crate::signaling::{RegistrationError, SignalingHandler};
use crate::time::{Instant, TimeStamp};

/// A PTP clock with exactly one port.
///
/// This is [`BoundaryClock`] specialized to a single port, with the port
/// number dropped from the API. An ordinary clock ends up MASTER or SLAVE;
/// it never bridges time between network segments.
pub struct OrdinaryClock<'a, P: Port, S: ForeignClockRecords> {
    inner: BoundaryClock<'a, P, S, 1>,
}

const PORT: PortNumber = PortNumber::new(1);

impl<'a, P: Port, S: ForeignClockRecords> OrdinaryClock<'a, P, S> {
    pub fn new(
        local_clock: &'a LocalClock<P::Clock>,
        selection: &'a SelectionQueue<1>,
        port: P,
        records: S,
        profile: PortProfile,
    ) -> Self {
        let mut parts = Some((port, records, profile));
        Self {
            inner: BoundaryClock::new(local_clock, selection, |_| {
                // Infallible: the closure runs exactly once for N = 1.
                match parts.take() {
                    Some(parts) => parts,
                    None => unreachable!(),
                }
            }),
        }
    }

    pub fn default_ds(&self) -> &DefaultDS {
        self.inner.default_ds()
    }

    pub fn current_ds(&self) -> CurrentDS {
        self.inner.current_ds()
    }

    pub fn parent_ds(&self) -> ParentDS {
        self.inner.parent_ds()
    }

    pub fn time_properties_ds(&self) -> TimePropertiesDS {
        self.inner.time_properties_ds()
    }

    pub fn port_ds(&self) -> Option<PortDS> {
        self.inner.port_ds(PORT)
    }

    pub fn register_signaling_handler(
        &mut self,
        tlv_type: u16,
        handler: &'a dyn SignalingHandler,
    ) -> Result<(), RegistrationError> {
        self.inner.register_signaling_handler(tlv_type, handler)
    }

    pub fn on_message_received(
        &mut self,
        frame: &[u8],
        ingress_timestamp: TimeStamp,
        now: Instant,
    ) -> Result<(), DecodeError> {
        self.inner
            .on_message_received(PORT, frame, ingress_timestamp, now)
    }

    pub fn on_system_message(&mut self, msg: SystemMessage) {
        self.inner.on_system_message(PORT, msg);
    }

    pub fn disable_port(&mut self) {
        self.inner.disable_port(PORT);
    }

    pub fn enable_port(&mut self) {
        self.inner.enable_port(PORT);
    }

    pub fn clear_fault(&mut self) {
        self.inner.clear_fault(PORT);
    }

    pub fn tick(&mut self, now: Instant) {
        self.inner.tick(now);
    }
}
