use crate::bmca::{
    BmcaMasterDecision, ForeignClockDS, ForeignClockRecords, GrandMasterTrackingBmca,
};
use crate::clock::TimePropertiesDS;
use crate::log::PortEvent;
use crate::message::{
    AnnounceMessage, DelayRequestMessage, EventMessage, GeneralMessage, SequenceId,
    TwoStepSyncMessage,
};
use crate::port::{ParentPortIdentity, Port, PortIdentity, SendResult, Timeout};
use crate::portstate::{PortState, StateDecision};
use crate::profile::PortProfile;
use crate::time::{Instant, LogInterval, TimeStamp};

/// The announce cadence of a master port.
pub(crate) struct AnnounceCycle<T> {
    sequence_id: SequenceId,
    timeout: T,
    log_interval: LogInterval,
}

impl<T: Timeout> AnnounceCycle<T> {
    pub(crate) fn new(sequence_id: SequenceId, timeout: T, log_interval: LogInterval) -> Self {
        Self {
            sequence_id,
            timeout,
            log_interval,
        }
    }

    fn next_announce(
        &mut self,
        grandmaster: ForeignClockDS,
        time_properties: TimePropertiesDS,
    ) -> AnnounceMessage {
        self.sequence_id = self.sequence_id.next();
        self.timeout.restart(self.log_interval.interval());
        AnnounceMessage::new(
            self.sequence_id,
            self.log_interval.into(),
            grandmaster,
            time_properties,
        )
    }
}

/// The sync cadence of a master port. Always two-step: the precise origin
/// timestamp travels in the FollowUp once the HAL reports Sync egress.
pub(crate) struct SyncCycle<T> {
    sequence_id: SequenceId,
    timeout: T,
    log_interval: LogInterval,
}

impl<T: Timeout> SyncCycle<T> {
    pub(crate) fn new(sequence_id: SequenceId, timeout: T, log_interval: LogInterval) -> Self {
        Self {
            sequence_id,
            timeout,
            log_interval,
        }
    }

    fn next_sync(&mut self) -> TwoStepSyncMessage {
        self.sequence_id = self.sequence_id.next();
        self.timeout.restart(self.log_interval.interval());
        TwoStepSyncMessage::new(self.sequence_id, self.log_interval.into())
    }
}

/// A port that is the time source of its network segment: announces its
/// grandmaster, sends Sync/FollowUp pairs, and answers delay requests.
pub struct MasterPort<'a, P: Port, S: ForeignClockRecords> {
    port: P,
    bmca: GrandMasterTrackingBmca<'a, S>,
    announce_cycle: AnnounceCycle<P::Timeout>,
    sync_cycle: SyncCycle<P::Timeout>,
    profile: PortProfile,
}

impl<'a, P: Port, S: ForeignClockRecords> MasterPort<'a, P, S> {
    pub(crate) fn new(
        port: P,
        bmca: GrandMasterTrackingBmca<'a, S>,
        announce_cycle: AnnounceCycle<P::Timeout>,
        sync_cycle: SyncCycle<P::Timeout>,
        profile: PortProfile,
    ) -> Self {
        port.log(PortEvent::Static("Become MasterPort"));
        Self {
            port,
            bmca,
            announce_cycle,
            sync_cycle,
            profile,
        }
    }

    pub(crate) fn send_announce(&mut self) -> SendResult {
        let (grandmaster, time_properties) = self.bmca.announce_dataset();
        let msg = self.announce_cycle.next_announce(grandmaster, time_properties);
        self.port.send_general(GeneralMessage::Announce(msg))?;
        self.port.log(PortEvent::MessageSent("Announce"));
        Ok(())
    }

    pub(crate) fn send_sync(&mut self) -> SendResult {
        let msg = self.sync_cycle.next_sync();
        self.port.send_event(EventMessage::TwoStepSync(msg))?;
        self.port.log(PortEvent::MessageSent("Sync"));
        Ok(())
    }

    pub(crate) fn send_follow_up(
        &mut self,
        sync_msg: TwoStepSyncMessage,
        egress_timestamp: TimeStamp,
    ) -> SendResult {
        self.port
            .send_general(GeneralMessage::FollowUp(sync_msg.follow_up(egress_timestamp)))?;
        self.port.log(PortEvent::MessageSent("FollowUp"));
        Ok(())
    }

    pub(crate) fn process_delay_request(
        &mut self,
        msg: DelayRequestMessage,
        ingress_timestamp: TimeStamp,
        source_port_identity: PortIdentity,
    ) -> SendResult {
        self.port.log(PortEvent::MessageReceived("DelayReq"));
        let response = msg.response(
            self.profile.log_min_delay_request_interval.into(),
            ingress_timestamp,
            source_port_identity,
        );
        self.port.send_general(GeneralMessage::DelayResp(response))?;
        self.port.log(PortEvent::MessageSent("DelayResp"));
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bmca::ListeningBmca;
    use crate::clock::{DefaultDS, LocalClock, TimeScale};
    use crate::infra::ForeignClockRecordsVec;
    use crate::log::{NOOP_CLOCK_METRICS, NoopPortLog};
    use crate::message::{DelayResponseMessage, FollowUpMessage, SystemMessage};
    use crate::port::{DomainNumber, DomainPort, PortNumber};
    use crate::servo::{Servo, SteppingServo};
    use crate::test_support::{
        FakeClock, FakePort, FakeSelectionTrigger, FakeTimerHost, FakeTimestamping,
        TestClockCatalog,
    };
    use crate::time::LogMessageInterval;

    struct MasterPortTestSetup {
        local_clock: LocalClock<FakeClock>,
        default_ds: DefaultDS,
        physical_port: FakePort,
        timer_host: FakeTimerHost,
        trigger: FakeSelectionTrigger,
    }

    impl MasterPortTestSetup {
        fn new() -> Self {
            let default_ds = TestClockCatalog::high_grade().default_ds();
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
            }
        }

        fn master(
            &self,
        ) -> MasterPort<
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
            let bmca = ListeningBmca::new(
                &self.default_ds,
                ForeignClockRecordsVec::new(),
                port.identity(),
                3,
                &self.trigger,
            )
            .into_grandmaster_tracking(
                ForeignClockDS::from_default_ds(&self.default_ds),
                TimePropertiesDS::local_default(TimeScale::Ptp),
            );
            match PortProfile::default().master(port, bmca) {
                PortState::Master(master) => master,
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn send_announce_carries_the_tracked_grandmaster() {
        let setup = MasterPortTestSetup::new();
        let mut master = setup.master();

        master.send_announce().unwrap();

        let expected = AnnounceMessage::new(
            1.into(),
            LogMessageInterval::new(1),
            ForeignClockDS::from_default_ds(&setup.default_ds),
            TimePropertiesDS::local_default(TimeScale::Ptp),
        );
        assert!(
            setup
                .physical_port
                .contains_general_message(&GeneralMessage::Announce(expected))
        );
    }

    #[test]
    fn sync_and_follow_up_share_sequence_and_origin() {
        let setup = MasterPortTestSetup::new();
        let mut master = setup.master();

        master.send_sync().unwrap();
        let sync = TwoStepSyncMessage::new(1.into(), LogMessageInterval::new(0));
        assert!(
            setup
                .physical_port
                .contains_event_message(&EventMessage::TwoStepSync(sync))
        );

        let egress = TimeStamp::new(12, 345);
        master.send_follow_up(sync, egress).unwrap();
        let follow_up = FollowUpMessage::new(1.into(), LogMessageInterval::new(0), egress);
        assert!(
            setup
                .physical_port
                .contains_general_message(&GeneralMessage::FollowUp(follow_up))
        );
    }

    #[test]
    fn delay_request_is_answered_with_its_ingress_timestamp() {
        let setup = MasterPortTestSetup::new();
        let mut master = setup.master();
        let requester = PortIdentity::fake();

        master
            .process_delay_request(
                DelayRequestMessage::new(9.into()),
                TimeStamp::new(3, 500),
                requester,
            )
            .unwrap();

        let expected = DelayResponseMessage::new(
            9.into(),
            LogMessageInterval::new(0),
            TimeStamp::new(3, 500),
            requester,
        );
        assert!(
            setup
                .physical_port
                .contains_general_message(&GeneralMessage::DelayResp(expected))
        );
    }

    #[test]
    fn cycles_restart_their_timers_on_entry_and_on_send() {
        let setup = MasterPortTestSetup::new();
        let mut master = setup.master();

        // Entry arms both cycles to fire immediately.
        assert_eq!(
            setup.timer_host.take_system_messages(),
            [
                SystemMessage::AnnounceSendTimeout,
                SystemMessage::SyncTimeout
            ]
        );

        master.send_announce().unwrap();
        master.send_sync().unwrap();
        assert_eq!(
            setup.timer_host.take_system_messages(),
            [
                SystemMessage::AnnounceSendTimeout,
                SystemMessage::SyncTimeout
            ]
        );
    }
}
