use crate::bmca::{ForeignClockRecords, ListeningBmca};
use crate::log::PortEvent;
use crate::port::Port;
use crate::portstate::PortState;
use crate::profile::PortProfile;

/// An administratively disabled port. Ignores everything, including faults,
/// until the host enables it again.
pub struct DisabledPort<'a, P: Port, S: ForeignClockRecords> {
    port: P,
    bmca: ListeningBmca<'a, S>,
    profile: PortProfile,
}

impl<'a, P: Port, S: ForeignClockRecords> DisabledPort<'a, P, S> {
    pub(crate) fn new(port: P, bmca: ListeningBmca<'a, S>, profile: PortProfile) -> Self {
        port.log(PortEvent::Static("Become DisabledPort"));
        Self {
            port,
            bmca,
            profile,
        }
    }

    pub(crate) fn enabled(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::PortEnabled);
        self.profile.initializing(self.port, self.bmca)
    }
}
