use crate::bmca::{BmcaMasterDecision, ForeignClockRecords, GrandMasterTrackingBmca};
use crate::log::PortEvent;
use crate::message::AnnounceMessage;
use crate::port::{ParentPortIdentity, Port, PortIdentity};
use crate::portstate::{PortState, StateDecision};
use crate::profile::PortProfile;
use crate::time::Instant;

/// A port that won selection but is waiting out its qualification interval
/// before it starts announcing. Sends nothing yet; keeps listening so a
/// better master appearing during qualification can still preempt it.
pub struct PreMasterPort<'a, P: Port, S: ForeignClockRecords> {
    port: P,
    bmca: GrandMasterTrackingBmca<'a, S>,
    // Held for its cancel-on-drop behavior.
    _qualification_timeout: P::Timeout,
    profile: PortProfile,
}

impl<'a, P: Port, S: ForeignClockRecords> PreMasterPort<'a, P, S> {
    pub(crate) fn new(
        port: P,
        bmca: GrandMasterTrackingBmca<'a, S>,
        qualification_timeout: P::Timeout,
        profile: PortProfile,
    ) -> Self {
        port.log(PortEvent::Static("Become PreMasterPort"));
        Self {
            port,
            bmca,
            _qualification_timeout: qualification_timeout,
            profile,
        }
    }

    pub(crate) fn qualified(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::QualificationTimeout);
        self.profile.master(self.port, self.bmca)
    }

    pub(crate) fn process_announce(
        &mut self,
        msg: AnnounceMessage,
        source_port_identity: PortIdentity,
        now: Instant,
    ) -> Option<StateDecision> {
        self.port.log(PortEvent::MessageReceived("Announce"));
        self.bmca.observe_announce(source_port_identity, &msg, now);
        None
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
            profile.pre_master(port, bmca.retarget(grandmaster, time_properties), policy)
        })
    }

    pub(crate) fn recommended_passive(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::RecommendedPassive);
        self.profile.passive(self.port, self.bmca.into_listening())
    }

    pub(crate) fn prune_foreign(&mut self, now: Instant) {
        self.bmca.prune(now);
    }

    pub(crate) fn fault_detected(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::FaultDetected);
        let mut bmca = self.bmca.into_listening();
        bmca.clear();
        self.profile.faulty(self.port, bmca)
    }

    pub(crate) fn port_disabled(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::PortDisabled);
        let mut bmca = self.bmca.into_listening();
        bmca.clear();
        self.profile.disabled(self.port, bmca)
    }
}
