use crate::bmca::{BmcaMasterDecision, ForeignClockRecords, ParentTrackingBmca};
use crate::e2e::EndToEndDelayMechanism;
use crate::log::PortEvent;
use crate::message::{
    AnnounceMessage, DelayRequestMessage, DelayResponseMessage, EventMessage, FollowUpMessage,
    OneStepSyncMessage, TwoStepSyncMessage,
};
use crate::port::{AnnounceReceiptTimeout, ParentPortIdentity, Port, PortIdentity, SendResult};
use crate::portstate::{PortState, StateDecision};
use crate::profile::PortProfile;
use crate::servo::ServoState;
use crate::time::{Instant, TimeStamp};

/// A port locked to its parent: measures continuously and disciplines the
/// local clock with every completed Sync exchange.
///
/// Leaves for UNCALIBRATED when the servo loses the lock, and for LISTENING
/// when the parent stops announcing.
pub struct SlavePort<'a, P: Port, S: ForeignClockRecords> {
    port: P,
    bmca: ParentTrackingBmca<'a, S>,
    announce_receipt_timeout: AnnounceReceiptTimeout<P::Timeout>,
    delay_mechanism: EndToEndDelayMechanism<P::Timeout>,
    profile: PortProfile,
}

impl<'a, P: Port, S: ForeignClockRecords> SlavePort<'a, P, S> {
    pub(crate) fn new(
        port: P,
        bmca: ParentTrackingBmca<'a, S>,
        announce_receipt_timeout: AnnounceReceiptTimeout<P::Timeout>,
        delay_mechanism: EndToEndDelayMechanism<P::Timeout>,
        profile: PortProfile,
    ) -> Self {
        port.log(PortEvent::Static("Become SlavePort"));
        Self {
            port,
            bmca,
            announce_receipt_timeout,
            delay_mechanism,
            profile,
        }
    }

    fn try_discipline(&mut self) -> Option<StateDecision> {
        let sample = self.delay_mechanism.take_sample()?;
        match self.port.local_clock().discipline(sample) {
            ServoState::Locked => None,
            ServoState::Divergent | ServoState::AdjustFailed => {
                Some(StateDecision::SynchronizationFault)
            }
        }
    }

    pub(crate) fn process_one_step_sync(
        &mut self,
        msg: OneStepSyncMessage,
        source_port_identity: PortIdentity,
        ingress_timestamp: TimeStamp,
    ) -> Option<StateDecision> {
        if !self.bmca.matches_parent(&source_port_identity) {
            return None;
        }
        self.port.log(PortEvent::MessageReceived("Sync"));
        self.delay_mechanism
            .record_one_step_sync(&msg, ingress_timestamp);
        self.try_discipline()
    }

    pub(crate) fn process_two_step_sync(
        &mut self,
        msg: TwoStepSyncMessage,
        source_port_identity: PortIdentity,
        ingress_timestamp: TimeStamp,
    ) -> Option<StateDecision> {
        if !self.bmca.matches_parent(&source_port_identity) {
            return None;
        }
        self.port.log(PortEvent::MessageReceived("Sync"));
        self.delay_mechanism
            .record_two_step_sync(&msg, ingress_timestamp);
        None
    }

    pub(crate) fn process_follow_up(
        &mut self,
        msg: FollowUpMessage,
        source_port_identity: PortIdentity,
    ) -> Option<StateDecision> {
        if !self.bmca.matches_parent(&source_port_identity) {
            return None;
        }
        self.port.log(PortEvent::MessageReceived("FollowUp"));
        self.delay_mechanism.record_follow_up(&msg);
        self.try_discipline()
    }

    pub(crate) fn process_delay_response(
        &mut self,
        msg: DelayResponseMessage,
        source_port_identity: PortIdentity,
    ) -> Option<StateDecision> {
        if !self.bmca.matches_parent(&source_port_identity) {
            return None;
        }
        if msg.requesting_port_identity != self.port.identity() {
            return None;
        }
        self.port.log(PortEvent::MessageReceived("DelayResp"));
        self.delay_mechanism.record_delay_response(&msg);
        self.try_discipline()
    }

    pub(crate) fn send_delay_request(&mut self) -> SendResult {
        let msg = self.delay_mechanism.delay_request();
        self.port.send_event(EventMessage::DelayReq(msg))?;
        self.port.log(PortEvent::MessageSent("DelayReq"));
        Ok(())
    }

    pub(crate) fn process_delay_request(
        &mut self,
        msg: DelayRequestMessage,
        egress_timestamp: TimeStamp,
    ) -> Option<StateDecision> {
        self.delay_mechanism
            .record_delay_request(&msg, egress_timestamp);
        None
    }

    pub(crate) fn process_announce(
        &mut self,
        msg: AnnounceMessage,
        source_port_identity: PortIdentity,
        now: Instant,
    ) -> Option<StateDecision> {
        self.port.log(PortEvent::MessageReceived("Announce"));
        if self.bmca.matches_parent(&source_port_identity) {
            self.announce_receipt_timeout.restart();
        }
        self.bmca.observe_announce(source_port_identity, &msg, now);
        None
    }

    pub(crate) fn synchronization_fault(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::SynchronizationFault);
        self.profile.uncalibrated(self.port, self.bmca)
    }

    pub(crate) fn announce_receipt_timeout_expired(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::AnnounceReceiptTimeout);
        let mut bmca = self.bmca.into_listening();
        bmca.clear();
        self.profile.listening(self.port, bmca)
    }

    pub(crate) fn recommended_slave(self, parent: ParentPortIdentity) -> PortState<'a, P, S> {
        if self.bmca.matches_parent(parent.identity()) {
            return PortState::Slave(self);
        }
        self.port.log(PortEvent::RecommendedSlave { parent });
        self.profile
            .uncalibrated(self.port, self.bmca.retarget(parent))
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
