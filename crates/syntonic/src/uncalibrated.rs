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

/// A port synchronizing to its selected parent but not yet locked.
///
/// Runs the full delay mechanism like a slave; the first measurement the
/// servo accepts moves the port to SLAVE. Sync and Delay_Resp from anyone
/// but the parent are ignored.
pub struct UncalibratedPort<'a, P: Port, S: ForeignClockRecords> {
    port: P,
    bmca: ParentTrackingBmca<'a, S>,
    announce_receipt_timeout: AnnounceReceiptTimeout<P::Timeout>,
    delay_mechanism: EndToEndDelayMechanism<P::Timeout>,
    profile: PortProfile,
}

impl<'a, P: Port, S: ForeignClockRecords> UncalibratedPort<'a, P, S> {
    pub(crate) fn new(
        port: P,
        bmca: ParentTrackingBmca<'a, S>,
        announce_receipt_timeout: AnnounceReceiptTimeout<P::Timeout>,
        delay_mechanism: EndToEndDelayMechanism<P::Timeout>,
        profile: PortProfile,
    ) -> Self {
        port.log(PortEvent::Static("Become UncalibratedPort"));
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
            ServoState::Locked => Some(StateDecision::MasterClockSelected),
            ServoState::Divergent | ServoState::AdjustFailed => None,
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

    pub(crate) fn master_clock_selected(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::MasterClockSelected);
        self.profile
            .slave(self.port, self.bmca, self.delay_mechanism)
    }

    pub(crate) fn announce_receipt_timeout_expired(self) -> PortState<'a, P, S> {
        self.port.log(PortEvent::AnnounceReceiptTimeout);
        let mut bmca = self.bmca.into_listening();
        bmca.clear();
        self.profile.listening(self.port, bmca)
    }

    /// A fresh recommendation for a different parent keeps the state (and its
    /// running timers) and only swaps the tracked parent.
    pub(crate) fn recommended_slave(self, parent: ParentPortIdentity) -> PortState<'a, P, S> {
        self.port.log(PortEvent::RecommendedSlave { parent });
        let Self {
            port,
            bmca,
            announce_receipt_timeout,
            delay_mechanism,
            profile,
        } = self;
        PortState::Uncalibrated(UncalibratedPort {
            port,
            bmca: bmca.retarget(parent),
            announce_receipt_timeout,
            delay_mechanism,
            profile,
        })
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

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::{DefaultDS, LocalClock};
    use crate::infra::ForeignClockRecordsVec;
    use crate::log::{NOOP_CLOCK_METRICS, NoopPortLog};
    use crate::message::{SequenceId, SystemMessage};
    use crate::port::{DomainNumber, DomainPort, PortNumber};
    use crate::portstate::PortStateKind;
    use crate::servo::{Servo, SteppingServo};
    use crate::test_support::{
        FakeClock, FakePort, FakeSelectionTrigger, FakeTimerHost, FakeTimestamping,
        TestClockCatalog,
    };
    use crate::time::LogMessageInterval;

    struct UncalibratedPortTestSetup {
        local_clock: LocalClock<FakeClock>,
        default_ds: DefaultDS,
        physical_port: FakePort,
        timer_host: FakeTimerHost,
        trigger: FakeSelectionTrigger,
        parent: ParentPortIdentity,
    }

    impl UncalibratedPortTestSetup {
        fn new() -> Self {
            let default_ds = TestClockCatalog::mid_grade().default_ds();
            Self {
                local_clock: LocalClock::new(
                    FakeClock::default(),
                    default_ds,
                    Servo::Stepping(SteppingServo::new(&NOOP_CLOCK_METRICS)),
                ),
                default_ds,
                physical_port: FakePort::new(),
                timer_host: FakeTimerHost::new(),
                trigger: FakeSelectionTrigger::new(),
                parent: ParentPortIdentity::new(PortIdentity::fake()),
            }
        }

        fn uncalibrated(
            &self,
        ) -> UncalibratedPort<
            '_,
            DomainPort<'_, FakeClock, &'_ FakeTimerHost, FakeTimestamping, NoopPortLog>,
            ForeignClockRecordsVec,
        > {
            let port = DomainPort::new(
                &self.local_clock,
                &self.physical_port,
                &self.timer_host,
                FakeTimestamping::new(),
                NoopPortLog,
                DomainNumber::new(0),
                PortNumber::new(1),
            );
            let identity = port.identity();
            let bmca = crate::bmca::ListeningBmca::new(
                &self.default_ds,
                ForeignClockRecordsVec::new(),
                identity,
                3,
                &self.trigger,
            )
            .into_parent_tracking(self.parent);
            match PortProfile::default().uncalibrated(port, bmca) {
                PortState::Uncalibrated(uncalibrated) => uncalibrated,
                _ => unreachable!(),
            }
        }

        fn complete_measurement(
            &self,
            port: &mut UncalibratedPort<
                '_,
                DomainPort<'_, FakeClock, &'_ FakeTimerHost, FakeTimestamping, NoopPortLog>,
                ForeignClockRecordsVec,
            >,
        ) -> Option<StateDecision> {
            port.send_delay_request().unwrap();
            let request = DelayRequestMessage::new(SequenceId::new(1));
            port.process_delay_request(request, TimeStamp::new(0, 2_000_000));
            port.process_delay_response(
                request.response(
                    LogMessageInterval::new(0),
                    TimeStamp::new(0, 2_000_080),
                    PortIdentity::new(self.default_ds.clock_identity, PortNumber::new(1)),
                ),
                *self.parent.identity(),
            );
            port.process_one_step_sync(
                OneStepSyncMessage::new(
                    SequenceId::new(1),
                    LogMessageInterval::new(0),
                    TimeStamp::new(0, 1_000_000),
                ),
                *self.parent.identity(),
                TimeStamp::new(0, 1_000_060),
            )
        }
    }

    #[test]
    fn first_accepted_measurement_selects_the_master_clock() {
        let setup = UncalibratedPortTestSetup::new();
        let mut port = setup.uncalibrated();

        assert_eq!(
            setup.complete_measurement(&mut port),
            Some(StateDecision::MasterClockSelected)
        );
    }

    #[test]
    fn master_clock_selected_hands_the_delay_mechanism_to_the_slave() {
        let setup = UncalibratedPortTestSetup::new();
        let mut port = setup.uncalibrated();

        setup.complete_measurement(&mut port);

        assert_eq!(port.master_clock_selected().kind(), PortStateKind::Slave);
    }

    #[test]
    fn sync_from_a_stranger_is_ignored() {
        let setup = UncalibratedPortTestSetup::new();
        let mut port = setup.uncalibrated();
        let stranger = PortIdentity::new(
            crate::clock::ClockIdentity::new(&[0x66; 8]),
            PortNumber::new(1),
        );

        let decision = port.process_one_step_sync(
            OneStepSyncMessage::new(
                SequenceId::new(1),
                LogMessageInterval::new(0),
                TimeStamp::new(0, 1_000_000),
            ),
            stranger,
            TimeStamp::new(0, 1_000_060),
        );

        assert_eq!(decision, None);
    }

    #[test]
    fn entry_requests_an_immediate_delay_request() {
        let setup = UncalibratedPortTestSetup::new();
        let _port = setup.uncalibrated();

        // ART and the immediate first delay request.
        assert_eq!(
            setup.timer_host.take_system_messages(),
            [
                SystemMessage::AnnounceReceiptTimeout,
                SystemMessage::DelayRequestTimeout
            ]
        );
    }
}
