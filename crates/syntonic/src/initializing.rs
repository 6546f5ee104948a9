use crate::bmca::{ForeignClockRecords, ListeningBmca};
use crate::log::PortEvent;
use crate::port::Port;
use crate::portstate::PortState;
use crate::profile::PortProfile;
use crate::time::Instant;

/// A port whose HAL resources are still being brought up. No messages are
/// sent or accepted until the host posts `Initialized`.
pub struct InitializingPort<'a, P: Port, S: ForeignClockRecords> {
    port: P,
    bmca: ListeningBmca<'a, S>,
    profile: PortProfile,
}

impl<'a, P: Port, S: ForeignClockRecords> InitializingPort<'a, P, S> {
    pub(crate) fn new(port: P, bmca: ListeningBmca<'a, S>, profile: PortProfile) -> Self {
        port.log(PortEvent::Static("Become InitializingPort"));
        Self {
            port,
            bmca,
            profile,
        }
    }

    pub(crate) fn initialized(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::Initialized);
        self.profile.listening(self.port, self.bmca)
    }

    pub(crate) fn prune_foreign(&mut self, now: Instant) {
        self.bmca.prune(now);
    }

    pub(crate) fn fault_detected(mut self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::FaultDetected);
        self.bmca.clear();
        self.profile.faulty(self.port, self.bmca)
    }

    pub(crate) fn port_disabled(mut self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::PortDisabled);
        self.bmca.clear();
        self.profile.disabled(self.port, self.bmca)
    }
}
