//! The port state machine of IEEE 1588-2019 §9.2.5, figure 24.
//!
//! Each state is its own type owning exactly the resources that state needs
//! (timers, BMCA wrapper, delay mechanism); [`PortState`] is the sum of
//! them. Transitions consume the old state and build the new one, so a port
//! can never carry stale timers or tracking data across a transition.
//!
//! Messages and timer expirations are dispatched against `(state, message)`
//! pairs; combinations not listed are silently ignored, as the protocol
//! requires. [`PortState::apply`] panics on a decision that is illegal in
//! the current state: decisions are produced by this crate itself, so such a
//! combination is a bug, not a runtime condition.

use core::panic;

use crate::bmca::{BmcaMasterDecision, ForeignClockRecords};
use crate::disabled::DisabledPort;
use crate::faulty::FaultyPort;
use crate::initializing::InitializingPort;
use crate::listening::ListeningPort;
use crate::master::MasterPort;
use crate::message::{EventMessage, GeneralMessage, SystemMessage};
use crate::passive::PassivePort;
use crate::port::{ParentPortIdentity, Port, PortIdentity, SendResult};
use crate::premaster::PreMasterPort;
use crate::slave::SlavePort;
use crate::time::{Instant, TimeStamp};
use crate::uncalibrated::UncalibratedPort;

/// Events that move the port state machine from one state to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum StateDecision {
    Initialized,
    MasterClockSelected,
    RecommendedSlave(ParentPortIdentity),
    RecommendedMaster(BmcaMasterDecision),
    RecommendedPassive,
    FaultDetected,
    FaultCleared,
    PortDisabled,
    PortEnabled,
    QualificationTimeoutExpired,
    AnnounceReceiptTimeoutExpired,
    SynchronizationFault,
}

/// The name of a port state, as reported in the port dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStateKind {
    Initializing,
    Listening,
    PreMaster,
    Master,
    Passive,
    Uncalibrated,
    Slave,
    Faulty,
    Disabled,
}

#[allow(clippy::large_enum_variant)]
pub enum PortState<'a, P: Port, S: ForeignClockRecords> {
    Initializing(InitializingPort<'a, P, S>),
    Listening(ListeningPort<'a, P, S>),
    PreMaster(PreMasterPort<'a, P, S>),
    Master(MasterPort<'a, P, S>),
    Passive(PassivePort<'a, P, S>),
    Uncalibrated(UncalibratedPort<'a, P, S>),
    Slave(SlavePort<'a, P, S>),
    Faulty(FaultyPort<'a, P, S>),
    Disabled(DisabledPort<'a, P, S>),
}

fn send_outcome(result: SendResult) -> Option<StateDecision> {
    match result {
        Ok(()) => None,
        Err(e) if e.is_fault() => Some(StateDecision::FaultDetected),
        Err(_) => None,
    }
}

impl<'a, P: Port, S: ForeignClockRecords> PortState<'a, P, S> {
    pub fn kind(&self) -> PortStateKind {
        match self {
            PortState::Initializing(_) => PortStateKind::Initializing,
            PortState::Listening(_) => PortStateKind::Listening,
            PortState::PreMaster(_) => PortStateKind::PreMaster,
            PortState::Master(_) => PortStateKind::Master,
            PortState::Passive(_) => PortStateKind::Passive,
            PortState::Uncalibrated(_) => PortStateKind::Uncalibrated,
            PortState::Slave(_) => PortStateKind::Slave,
            PortState::Faulty(_) => PortStateKind::Faulty,
            PortState::Disabled(_) => PortStateKind::Disabled,
        }
    }

    /// Age out silent foreign masters.
    pub(crate) fn prune_foreign(&mut self, now: Instant) {
        match self {
            PortState::Initializing(port) => port.prune_foreign(now),
            PortState::Listening(port) => port.prune_foreign(now),
            PortState::PreMaster(port) => port.prune_foreign(now),
            PortState::Master(port) => port.prune_foreign(now),
            PortState::Passive(port) => port.prune_foreign(now),
            PortState::Uncalibrated(port) => port.prune_foreign(now),
            PortState::Slave(port) => port.prune_foreign(now),
            PortState::Faulty(_) | PortState::Disabled(_) => {}
        }
    }

    pub(crate) fn apply(self, decision: StateDecision) -> Self {
        match decision {
            StateDecision::Initialized => match self {
                PortState::Initializing(initializing) => initializing.initialized(),
                _ => panic!("Initialized can only be applied in Initializing state"),
            },
            StateDecision::AnnounceReceiptTimeoutExpired => match self {
                PortState::Listening(listening) => listening.announce_receipt_timeout_expired(),
                PortState::Uncalibrated(uncalibrated) => {
                    uncalibrated.announce_receipt_timeout_expired()
                }
                PortState::Slave(slave) => slave.announce_receipt_timeout_expired(),
                PortState::Passive(passive) => passive.announce_receipt_timeout_expired(),
                _ => panic!(
                    "AnnounceReceiptTimeoutExpired can only be applied in Listening, Uncalibrated, Slave, or Passive states"
                ),
            },
            StateDecision::MasterClockSelected => match self {
                PortState::Uncalibrated(uncalibrated) => uncalibrated.master_clock_selected(),
                _ => panic!("MasterClockSelected can only be applied in Uncalibrated state"),
            },
            StateDecision::RecommendedSlave(parent) => match self {
                PortState::Listening(listening) => listening.recommended_slave(parent),
                PortState::PreMaster(pre_master) => pre_master.recommended_slave(parent),
                PortState::Master(master) => master.recommended_slave(parent),
                PortState::Passive(passive) => passive.recommended_slave(parent),
                PortState::Uncalibrated(uncalibrated) => uncalibrated.recommended_slave(parent),
                PortState::Slave(slave) => slave.recommended_slave(parent),
                _ => panic!(
                    "RecommendedSlave can only be applied in Listening, PreMaster, Master, Passive, Uncalibrated, or Slave states"
                ),
            },
            StateDecision::RecommendedMaster(decision) => match self {
                PortState::Listening(listening) => listening.recommended_master(decision),
                PortState::PreMaster(pre_master) => pre_master.recommended_master(decision),
                PortState::Master(master) => master.recommended_master(decision),
                PortState::Passive(passive) => passive.recommended_master(decision),
                PortState::Uncalibrated(uncalibrated) => uncalibrated.recommended_master(decision),
                PortState::Slave(slave) => slave.recommended_master(decision),
                _ => panic!(
                    "RecommendedMaster can only be applied in Listening, PreMaster, Master, Passive, Uncalibrated, or Slave states"
                ),
            },
            StateDecision::RecommendedPassive => match self {
                PortState::Listening(listening) => listening.recommended_passive(),
                PortState::PreMaster(pre_master) => pre_master.recommended_passive(),
                PortState::Master(master) => master.recommended_passive(),
                PortState::Passive(passive) => PortState::Passive(passive),
                PortState::Uncalibrated(uncalibrated) => uncalibrated.recommended_passive(),
                PortState::Slave(slave) => slave.recommended_passive(),
                _ => panic!(
                    "RecommendedPassive can only be applied in Listening, PreMaster, Master, Passive, Uncalibrated, or Slave states"
                ),
            },
            StateDecision::QualificationTimeoutExpired => match self {
                PortState::PreMaster(pre_master) => pre_master.qualified(),
                _ => panic!("QualificationTimeoutExpired can only be applied in PreMaster state"),
            },
            StateDecision::SynchronizationFault => match self {
                PortState::Slave(slave) => slave.synchronization_fault(),
                _ => panic!("SynchronizationFault can only be applied in Slave state"),
            },
            StateDecision::FaultDetected => match self {
                PortState::Initializing(initializing) => initializing.fault_detected(),
                PortState::Listening(listening) => listening.fault_detected(),
                PortState::PreMaster(pre_master) => pre_master.fault_detected(),
                PortState::Master(master) => master.fault_detected(),
                PortState::Passive(passive) => passive.fault_detected(),
                PortState::Uncalibrated(uncalibrated) => uncalibrated.fault_detected(),
                PortState::Slave(slave) => slave.fault_detected(),
                PortState::Faulty(faulty) => PortState::Faulty(faulty),
                PortState::Disabled(disabled) => PortState::Disabled(disabled),
            },
            StateDecision::FaultCleared => match self {
                PortState::Faulty(faulty) => faulty.fault_cleared(),
                _ => panic!("FaultCleared can only be applied in Faulty state"),
            },
            StateDecision::PortDisabled => match self {
                PortState::Initializing(initializing) => initializing.port_disabled(),
                PortState::Listening(listening) => listening.port_disabled(),
                PortState::PreMaster(pre_master) => pre_master.port_disabled(),
                PortState::Master(master) => master.port_disabled(),
                PortState::Passive(passive) => passive.port_disabled(),
                PortState::Uncalibrated(uncalibrated) => uncalibrated.port_disabled(),
                PortState::Slave(slave) => slave.port_disabled(),
                PortState::Faulty(faulty) => faulty.port_disabled(),
                PortState::Disabled(disabled) => PortState::Disabled(disabled),
            },
            StateDecision::PortEnabled => match self {
                PortState::Disabled(disabled) => disabled.enabled(),
                _ => panic!("PortEnabled can only be applied in Disabled state"),
            },
        }
    }

    pub(crate) fn dispatch_event(
        &mut self,
        msg: EventMessage,
        source_port_identity: PortIdentity,
        ingress_timestamp: TimeStamp,
    ) -> Option<StateDecision> {
        use EventMessage::*;
        use PortState::*;

        match (self, msg) {
            (Uncalibrated(port), OneStepSync(msg)) => {
                port.process_one_step_sync(msg, source_port_identity, ingress_timestamp)
            }
            (Uncalibrated(port), TwoStepSync(msg)) => {
                port.process_two_step_sync(msg, source_port_identity, ingress_timestamp)
            }
            (Slave(port), OneStepSync(msg)) => {
                port.process_one_step_sync(msg, source_port_identity, ingress_timestamp)
            }
            (Slave(port), TwoStepSync(msg)) => {
                port.process_two_step_sync(msg, source_port_identity, ingress_timestamp)
            }
            (Master(port), DelayReq(msg)) => send_outcome(port.process_delay_request(
                msg,
                ingress_timestamp,
                source_port_identity,
            )),
            _ => None,
        }
    }

    pub(crate) fn dispatch_general(
        &mut self,
        msg: GeneralMessage,
        source_port_identity: PortIdentity,
        now: Instant,
    ) -> Option<StateDecision> {
        use GeneralMessage::*;
        use PortState::*;

        match (self, msg) {
            (Listening(port), Announce(msg)) => {
                port.process_announce(msg, source_port_identity, now)
            }
            (PreMaster(port), Announce(msg)) => {
                port.process_announce(msg, source_port_identity, now)
            }
            (Master(port), Announce(msg)) => port.process_announce(msg, source_port_identity, now),
            (Passive(port), Announce(msg)) => port.process_announce(msg, source_port_identity, now),
            (Uncalibrated(port), Announce(msg)) => {
                port.process_announce(msg, source_port_identity, now)
            }
            (Slave(port), Announce(msg)) => port.process_announce(msg, source_port_identity, now),
            (Uncalibrated(port), FollowUp(msg)) => {
                port.process_follow_up(msg, source_port_identity)
            }
            (Uncalibrated(port), DelayResp(msg)) => {
                port.process_delay_response(msg, source_port_identity)
            }
            (Slave(port), FollowUp(msg)) => port.process_follow_up(msg, source_port_identity),
            (Slave(port), DelayResp(msg)) => port.process_delay_response(msg, source_port_identity),
            _ => None,
        }
    }

    pub(crate) fn dispatch_system(&mut self, msg: SystemMessage) -> Option<StateDecision> {
        use PortState::*;
        use SystemMessage::*;

        match (self, msg) {
            (Initializing(_), Initialized) => Some(StateDecision::Initialized),
            (
                Listening(_) | Uncalibrated(_) | Slave(_) | Passive(_),
                AnnounceReceiptTimeout,
            ) => Some(StateDecision::AnnounceReceiptTimeoutExpired),
            (PreMaster(_), QualificationTimeout) => {
                Some(StateDecision::QualificationTimeoutExpired)
            }
            (Master(port), AnnounceSendTimeout) => send_outcome(port.send_announce()),
            (Master(port), SyncTimeout) => send_outcome(port.send_sync()),
            (Master(port), Timestamp(msg)) => match msg.event_msg {
                EventMessage::TwoStepSync(sync_msg) => {
                    send_outcome(port.send_follow_up(sync_msg, msg.egress_timestamp))
                }
                _ => None,
            },
            (Uncalibrated(port), DelayRequestTimeout) => send_outcome(port.send_delay_request()),
            (Slave(port), DelayRequestTimeout) => send_outcome(port.send_delay_request()),
            (Uncalibrated(port), Timestamp(msg)) => match msg.event_msg {
                EventMessage::DelayReq(req_msg) => {
                    port.process_delay_request(req_msg, msg.egress_timestamp)
                }
                _ => None,
            },
            (Slave(port), Timestamp(msg)) => match msg.event_msg {
                EventMessage::DelayReq(req_msg) => {
                    port.process_delay_request(req_msg, msg.egress_timestamp)
                }
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bmca::{BmcaMasterDecisionPoint, ForeignClockDS, ListeningBmca};
    use crate::clock::{DefaultDS, LocalClock, StepsRemoved, TimePropertiesDS, TimeScale};
    use crate::infra::ForeignClockRecordsVec;
    use crate::log::{NOOP_CLOCK_METRICS, NoopPortLog};
    use crate::port::{DomainNumber, DomainPort, PortNumber};
    use crate::profile::PortProfile;
    use crate::servo::{Servo, SteppingServo};
    use crate::test_support::{
        FailingPort, FakeClock, FakePort, FakeSelectionTrigger, FakeTimerHost, FakeTimestamping,
        TestClockCatalog,
    };

    type PortStateTestDomainPort<'a> =
        DomainPort<'a, FakeClock, &'a FakeTimerHost, FakeTimestamping, NoopPortLog>;

    type TestPortState<'a> = PortState<'a, PortStateTestDomainPort<'a>, ForeignClockRecordsVec>;

    struct PortStateTestSetup {
        local_clock: LocalClock<FakeClock>,
        default_ds: DefaultDS,
        physical_port: FakePort,
        timer_host: FakeTimerHost,
        trigger: FakeSelectionTrigger,
    }

    impl PortStateTestSetup {
        fn new(default_ds: DefaultDS) -> Self {
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

        fn initializing(&self) -> TestPortState<'_> {
            self.initializing_with_port(&self.physical_port)
        }

        fn initializing_with_port<'a>(
            &'a self,
            physical_port: &'a dyn crate::port::PhysicalPort,
        ) -> TestPortState<'a> {
            let port = DomainPort::new(
                &self.local_clock,
                physical_port,
                &self.timer_host,
                FakeTimestamping::new(),
                NoopPortLog,
                DomainNumber::new(0),
                PortNumber::new(1),
            );
            let bmca = ListeningBmca::new(
                &self.default_ds,
                ForeignClockRecordsVec::new(),
                PortIdentity::new(self.default_ds.clock_identity, PortNumber::new(1)),
                3,
                &self.trigger,
            );
            PortProfile::default().initializing(port, bmca)
        }

        fn listening(&self) -> TestPortState<'_> {
            self.initializing().apply(StateDecision::Initialized)
        }

        fn master_decision(&self) -> BmcaMasterDecision {
            BmcaMasterDecision {
                point: BmcaMasterDecisionPoint::M2,
                steps_removed: StepsRemoved::new(0),
                grandmaster: ForeignClockDS::from_default_ds(&self.default_ds),
                time_properties: TimePropertiesDS::local_default(TimeScale::Ptp),
            }
        }
    }

    #[test]
    fn initialized_moves_the_port_to_listening() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup.initializing().apply(StateDecision::Initialized);

        assert_eq!(state.kind(), PortStateKind::Listening);
    }

    #[test]
    fn recommended_slave_moves_the_port_to_uncalibrated() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup
            .listening()
            .apply(StateDecision::RecommendedSlave(ParentPortIdentity::new(
                PortIdentity::fake(),
            )));

        assert_eq!(state.kind(), PortStateKind::Uncalibrated);
    }

    #[test]
    fn recommended_master_qualifies_through_pre_master() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup
            .listening()
            .apply(StateDecision::RecommendedMaster(setup.master_decision()));
        assert_eq!(state.kind(), PortStateKind::PreMaster);

        let state = state.apply(StateDecision::QualificationTimeoutExpired);
        assert_eq!(state.kind(), PortStateKind::Master);
    }

    #[test]
    fn recommended_passive_moves_the_port_to_passive() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup.listening().apply(StateDecision::RecommendedPassive);

        assert_eq!(state.kind(), PortStateKind::Passive);
    }

    #[test]
    fn master_clock_selected_calibrates_the_port() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup
            .listening()
            .apply(StateDecision::RecommendedSlave(ParentPortIdentity::new(
                PortIdentity::fake(),
            )))
            .apply(StateDecision::MasterClockSelected);

        assert_eq!(state.kind(), PortStateKind::Slave);
    }

    #[test]
    fn announce_receipt_timeout_returns_the_slave_to_listening() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup
            .listening()
            .apply(StateDecision::RecommendedSlave(ParentPortIdentity::new(
                PortIdentity::fake(),
            )))
            .apply(StateDecision::MasterClockSelected)
            .apply(StateDecision::AnnounceReceiptTimeoutExpired);

        assert_eq!(state.kind(), PortStateKind::Listening);
    }

    #[test]
    fn announce_receipt_timeout_returns_the_passive_port_to_listening() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup
            .listening()
            .apply(StateDecision::RecommendedPassive)
            .apply(StateDecision::AnnounceReceiptTimeoutExpired);

        assert_eq!(state.kind(), PortStateKind::Listening);
    }

    #[test]
    fn synchronization_fault_returns_the_slave_to_uncalibrated() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup
            .listening()
            .apply(StateDecision::RecommendedSlave(ParentPortIdentity::new(
                PortIdentity::fake(),
            )))
            .apply(StateDecision::MasterClockSelected)
            .apply(StateDecision::SynchronizationFault);

        assert_eq!(state.kind(), PortStateKind::Uncalibrated);
    }

    #[test]
    fn fault_detected_and_cleared_reinitializes_the_port() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup.listening().apply(StateDecision::FaultDetected);
        assert_eq!(state.kind(), PortStateKind::Faulty);

        let state = state.apply(StateDecision::FaultCleared);
        assert_eq!(state.kind(), PortStateKind::Initializing);
    }

    #[test]
    fn disabled_port_only_leaves_on_enable() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let state = setup.listening().apply(StateDecision::PortDisabled);
        assert_eq!(state.kind(), PortStateKind::Disabled);

        let state = state.apply(StateDecision::FaultDetected);
        assert_eq!(state.kind(), PortStateKind::Disabled);

        let state = state.apply(StateDecision::PortEnabled);
        assert_eq!(state.kind(), PortStateKind::Initializing);
    }

    #[test]
    fn initializing_reacts_to_the_initialized_system_message() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let mut state = setup.initializing();

        assert_eq!(
            state.dispatch_system(SystemMessage::Initialized),
            Some(StateDecision::Initialized)
        );
    }

    #[test]
    fn slave_reacts_to_the_announce_receipt_timeout() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let mut state = setup
            .listening()
            .apply(StateDecision::RecommendedSlave(ParentPortIdentity::new(
                PortIdentity::fake(),
            )))
            .apply(StateDecision::MasterClockSelected);

        assert_eq!(
            state.dispatch_system(SystemMessage::AnnounceReceiptTimeout),
            Some(StateDecision::AnnounceReceiptTimeoutExpired)
        );
    }

    #[test]
    fn master_send_failures_fault_the_port_after_the_threshold() {
        let setup = PortStateTestSetup::new(TestClockCatalog::high_grade().default_ds());
        let failing = FailingPort;

        let mut state = setup
            .initializing_with_port(&failing)
            .apply(StateDecision::Initialized)
            .apply(StateDecision::RecommendedMaster(setup.master_decision()))
            .apply(StateDecision::QualificationTimeoutExpired);

        assert_eq!(state.dispatch_system(SystemMessage::SyncTimeout), None);
        assert_eq!(state.dispatch_system(SystemMessage::SyncTimeout), None);
        assert_eq!(
            state.dispatch_system(SystemMessage::SyncTimeout),
            Some(StateDecision::FaultDetected)
        );
    }

    #[test]
    #[should_panic]
    fn master_clock_selected_is_illegal_in_listening() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let _ = setup.listening().apply(StateDecision::MasterClockSelected);
    }

    #[test]
    #[should_panic]
    fn qualification_timeout_is_illegal_outside_pre_master() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let _ = setup
            .listening()
            .apply(StateDecision::QualificationTimeoutExpired);
    }

    #[test]
    #[should_panic]
    fn fault_cleared_is_illegal_outside_faulty() {
        let setup = PortStateTestSetup::new(TestClockCatalog::mid_grade().default_ds());

        let _ = setup.listening().apply(StateDecision::FaultCleared);
    }
}
