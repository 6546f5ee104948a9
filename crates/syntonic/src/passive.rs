use crate::bmca::{BmcaMasterDecision, ForeignClockRecords, ListeningBmca};
use crate::log::PortEvent;
use crate::message::AnnounceMessage;
use crate::port::{AnnounceReceiptTimeout, ParentPortIdentity, Port, PortIdentity};
use crate::portstate::{PortState, StateDecision};
use crate::profile::PortProfile;
use crate::time::Instant;

/// A port on a path that would form a loop: it neither masters nor slaves,
/// but keeps watching announces so it can rejoin selection when the
/// topology changes.
pub struct PassivePort<'a, P: Port, S: ForeignClockRecords> {
    port: P,
    bmca: ListeningBmca<'a, S>,
    announce_receipt_timeout: AnnounceReceiptTimeout<P::Timeout>,
    profile: PortProfile,
}

impl<'a, P: Port, S: ForeignClockRecords> PassivePort<'a, P, S> {
    pub(crate) fn new(
        port: P,
        bmca: ListeningBmca<'a, S>,
        announce_receipt_timeout: AnnounceReceiptTimeout<P::Timeout>,
        profile: PortProfile,
    ) -> Self {
        port.log(PortEvent::Static("Become PassivePort"));
        Self {
            port,
            bmca,
            announce_receipt_timeout,
            profile,
        }
    }

    pub(crate) fn process_announce(
        &mut self,
        msg: AnnounceMessage,
        source_port_identity: PortIdentity,
        now: Instant,
    ) -> Option<StateDecision> {
        self.port.log(PortEvent::MessageReceived("Announce"));
        self.announce_receipt_timeout.restart();
        self.bmca.observe_announce(source_port_identity, &msg, now);
        None
    }

    pub(crate) fn announce_receipt_timeout_expired(mut self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::AnnounceReceiptTimeout);
        self.bmca.clear();
        self.profile.listening(self.port, self.bmca)
    }

    pub(crate) fn recommended_slave(self, parent: ParentPortIdentity) -> PortState<'a, P, S> {
        self.port.log(PortEvent::RecommendedSlave { parent });
        self.profile
            .uncalibrated(self.port, self.bmca.into_parent_tracking(parent))
    }

    pub(crate) fn recommended_master(self, decision: BmcaMasterDecision) -> PortState<'a, P, S> {
        self.port.log(PortEvent::RecommendedMaster);
        let Self {
            port,
            bmca,
            profile,
            ..
        } = self;
        decision.apply(|policy, grandmaster, time_properties| {
            profile.pre_master(
                port,
                bmca.into_grandmaster_tracking(grandmaster, time_properties),
                policy,
            )
        })
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
