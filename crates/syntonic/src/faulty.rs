use crate::bmca::{ForeignClockRecords, ListeningBmca};
use crate::log::PortEvent;
use crate::port::Port;
use crate::portstate::PortState;
use crate::profile::PortProfile;

/// An isolated port. Sends nothing, processes nothing; leaves only when the
/// host clears the fault, at which point it reinitializes from scratch.
pub struct FaultyPort<'a, P: Port, S: ForeignClockRecords> {
    port: P,
    bmca: ListeningBmca<'a, S>,
    profile: PortProfile,
}

impl<'a, P: Port, S: ForeignClockRecords> FaultyPort<'a, P, S> {
    pub(crate) fn new(port: P, bmca: ListeningBmca<'a, S>, profile: PortProfile) -> Self {
        port.log(PortEvent::Static("Become FaultyPort"));
        Self {
            port,
            bmca,
            profile,
        }
    }

    pub(crate) fn fault_cleared(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::FaultCleared);
        self.profile.initializing(self.port, self.bmca)
    }

    pub(crate) fn port_disabled(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::PortDisabled);
        self.profile.disabled(self.port, self.bmca)
    }
}
