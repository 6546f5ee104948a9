//! Multi-port clock orchestration.
//!
//! [`BoundaryClock`] owns the state machines of `N` ports, routes decoded
//! frames and timer expirations to them, and runs the clock-wide state
//! decision whenever a port's Erbest changes. One instance is single-domain
//! and single-threaded; the host serializes all calls per clock.

use core::cell::Cell;

use crate::bmca::{ErbestSnapshot, ForeignClockRecords, ListeningBmca, SelectionTrigger};
use crate::clock::{
    CurrentDS, DefaultDS, DelayMechanismKind, LocalClock, ParentDS, PortDS, TimePropertiesDS,
};
use crate::message::SystemMessage;
use crate::port::{Port, PortIdentity, PortNumber};
use crate::portstate::{PortState, PortStateKind, StateDecision};
use crate::profile::PortProfile;
use crate::result::DecodeError;
use crate::selection::{select, PortErbest, Recommendation, Selection};
use crate::signaling::{RegistrationError, SignalingHandler, SignalingHandlers};
use crate::time::{Instant, TimeStamp};
use crate::wire;

/// Collects Erbest changes from the ports and defers the selection run to
/// the next [`BoundaryClock::tick`].
///
/// Ports raise the trigger from deep inside message processing; queueing
/// keeps selection from re-entering the port that raised it.
pub struct SelectionQueue<const N: usize> {
    pending: Cell<bool>,
    snapshots: [Cell<ErbestSnapshot>; N],
}

impl<const N: usize> SelectionQueue<N> {
    pub fn new() -> Self {
        Self {
            pending: Cell::new(false),
            snapshots: core::array::from_fn(|_| Cell::new(ErbestSnapshot::Empty)),
        }
    }

    fn take_pending(&self) -> bool {
        self.pending.replace(false)
    }

    fn snapshot(&self, index: usize) -> ErbestSnapshot {
        self.snapshots[index].get()
    }
}

impl<const N: usize> Default for SelectionQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SelectionTrigger for SelectionQueue<N> {
    fn erbest_changed(&self, port: PortNumber, erbest: ErbestSnapshot) {
        let Some(index) = port.raw().checked_sub(1) else {
            return;
        };
        let Some(slot) = self.snapshots.get(index as usize) else {
            return;
        };
        slot.set(erbest);
        self.pending.set(true);
    }
}

/// A PTP clock with `N` ports in one domain.
///
/// Frames, egress timestamps, and timer expirations enter through the `on_*`
/// methods; `tick` drives record aging and deferred selection. The parent
/// and time-properties datasets are replaced wholesale by each selection
/// run, never field by field.
pub struct BoundaryClock<'a, P: Port, S: ForeignClockRecords, const N: usize> {
    local_clock: &'a LocalClock<P::Clock>,
    selection: &'a SelectionQueue<N>,
    ports: [Option<PortState<'a, P, S>>; N],
    profiles: [PortProfile; N],
    applied: [Option<Recommendation>; N],
    last_selection: Option<Selection>,
    parent_ds: ParentDS,
    time_properties_ds: TimePropertiesDS,
    signaling: SignalingHandlers<'a>,
}

impl<'a, P: Port, S: ForeignClockRecords, const N: usize> BoundaryClock<'a, P, S, N> {
    /// `make_port` is called once per port number (1..=N) and supplies the
    /// port's infrastructure, record storage, and profile. All ports start
    /// in INITIALIZING and wait for [`SystemMessage::Initialized`].
    pub fn new(
        local_clock: &'a LocalClock<P::Clock>,
        selection: &'a SelectionQueue<N>,
        mut make_port: impl FnMut(PortNumber) -> (P, S, PortProfile),
    ) -> Self {
        let mut profiles = [PortProfile::default(); N];
        let ports = core::array::from_fn(|index| {
            let number = PortNumber::new(index as u16 + 1);
            let (port, records, profile) = make_port(number);
            profiles[index] = profile;
            let bmca = ListeningBmca::new(
                local_clock.default_ds(),
                records,
                PortIdentity::new(*local_clock.identity(), number),
                profile.announce_receipt_timeout,
                selection,
            );
            Some(profile.initializing(port, bmca))
        });

        Self {
            local_clock,
            selection,
            ports,
            profiles,
            applied: [None; N],
            last_selection: None,
            parent_ds: ParentDS::local(local_clock.default_ds()),
            time_properties_ds: TimePropertiesDS::local_default(local_clock.time_scale()),
            signaling: SignalingHandlers::new(),
        }
    }

    pub fn default_ds(&self) -> &DefaultDS {
        self.local_clock.default_ds()
    }

    pub fn current_ds(&self) -> CurrentDS {
        self.local_clock.current_ds()
    }

    pub fn parent_ds(&self) -> ParentDS {
        self.parent_ds
    }

    pub fn time_properties_ds(&self) -> TimePropertiesDS {
        self.time_properties_ds
    }

    pub fn port_ds(&self, port: PortNumber) -> Option<PortDS> {
        let index = self.index(port)?;
        let profile = self.profiles[index];
        Some(PortDS {
            port_identity: PortIdentity::new(*self.local_clock.identity(), port),
            port_state: self.ports[index].as_ref()?.kind(),
            log_announce_interval: profile.log_announce_interval,
            announce_receipt_timeout: profile.announce_receipt_timeout,
            log_sync_interval: profile.log_sync_interval,
            delay_mechanism: DelayMechanismKind::EndToEnd,
            log_min_delay_req_interval: profile.log_min_delay_request_interval,
        })
    }

    /// Handlers must be registered before Signaling traffic arrives;
    /// registration is a configuration step, not a runtime one.
    pub fn register_signaling_handler(
        &mut self,
        tlv_type: u16,
        handler: &'a dyn SignalingHandler,
    ) -> Result<(), RegistrationError> {
        self.signaling.register(tlv_type, handler)
    }

    /// Feed one received frame to a port.
    ///
    /// A decode failure drops the frame and reports why; no state changes.
    pub fn on_message_received(
        &mut self,
        port: PortNumber,
        frame: &[u8],
        ingress_timestamp: TimeStamp,
        now: Instant,
    ) -> Result<(), DecodeError> {
        let packet = wire::decode(frame, self.local_clock.default_ds().domain_number)?;
        let Some(index) = self.index(port) else {
            return Ok(());
        };

        match wire::inbound(packet) {
            wire::Inbound::Event { source, msg } => {
                let decision = self.ports[index]
                    .as_mut()
                    .and_then(|state| state.dispatch_event(msg, source, ingress_timestamp));
                self.apply(index, decision);
            }
            wire::Inbound::General { source, msg } => {
                let decision = self.ports[index]
                    .as_mut()
                    .and_then(|state| state.dispatch_general(msg, source, now));
                self.apply(index, decision);
            }
            wire::Inbound::Signaling {
                source,
                target,
                tlvs,
            } => {
                let own = PortIdentity::new(*self.local_clock.identity(), port);
                if target == own || target == PortIdentity::wildcard() {
                    self.signaling.dispatch(source, tlvs);
                }
            }
        }
        Ok(())
    }

    /// Feed a timer expiration or infrastructure notification to a port.
    pub fn on_system_message(&mut self, port: PortNumber, msg: SystemMessage) {
        let Some(index) = self.index(port) else {
            return;
        };
        let decision = self.ports[index]
            .as_mut()
            .and_then(|state| state.dispatch_system(msg));
        self.apply(index, decision);
    }

    pub fn disable_port(&mut self, port: PortNumber) {
        if let Some(index) = self.index(port) {
            self.apply(index, Some(StateDecision::PortDisabled));
        }
    }

    pub fn enable_port(&mut self, port: PortNumber) {
        if let Some(index) = self.index(port) {
            if self.kind(index) == Some(PortStateKind::Disabled) {
                self.apply(index, Some(StateDecision::PortEnabled));
            }
        }
    }

    /// Clear a fault raised by the port's send path; the port reinitializes.
    pub fn clear_fault(&mut self, port: PortNumber) {
        if let Some(index) = self.index(port) {
            if self.kind(index) == Some(PortStateKind::Faulty) {
                self.apply(index, Some(StateDecision::FaultCleared));
            }
        }
    }

    /// Periodic housekeeping: age out silent foreign masters and run any
    /// deferred selection.
    pub fn tick(&mut self, now: Instant) {
        for state in self.ports.iter_mut().flatten() {
            state.prune_foreign(now);
        }
        while self.selection.take_pending() {
            self.run_selection();
        }
    }

    fn index(&self, port: PortNumber) -> Option<usize> {
        let index = port.raw().checked_sub(1)? as usize;
        (index < N).then_some(index)
    }

    fn kind(&self, index: usize) -> Option<PortStateKind> {
        self.ports[index].as_ref().map(|state| state.kind())
    }

    fn apply(&mut self, index: usize, decision: Option<StateDecision>) {
        let Some(decision) = decision else {
            return;
        };
        if let Some(state) = self.ports[index].take() {
            self.ports[index] = Some(state.apply(decision));
        }
        // The port moved for a reason outside selection; its cached
        // recommendation no longer describes it.
        self.applied[index] = None;
    }

    fn run_selection(&mut self) {
        let default_ds = self.local_clock.default_ds();
        let erbests: [PortErbest; N] = core::array::from_fn(|index| {
            let number = PortNumber::new(index as u16 + 1);
            PortErbest {
                port: number,
                receiver: PortIdentity::new(default_ds.clock_identity, number),
                erbest: self.selection.snapshot(index),
            }
        });

        let mut recommendations: [Option<Recommendation>; N] = [None; N];
        let local_time_properties = TimePropertiesDS::local_default(self.local_clock.time_scale());
        let selection = select(
            default_ds,
            local_time_properties,
            &erbests,
            |port, recommendation| {
                if let Some(index) = port.raw().checked_sub(1) {
                    if let Some(slot) = recommendations.get_mut(index as usize) {
                        *slot = Some(recommendation);
                    }
                }
            },
        );

        for (index, recommendation) in recommendations.into_iter().enumerate() {
            let Some(recommendation) = recommendation else {
                continue;
            };
            if self.applied[index] == Some(recommendation) {
                continue;
            }
            // Ports outside the protocol-running states pick their
            // recommendation up at the selection run after they rejoin.
            match self.kind(index) {
                Some(
                    PortStateKind::Initializing | PortStateKind::Faulty | PortStateKind::Disabled,
                )
                | None => continue,
                Some(_) => {}
            }
            let decision = match recommendation {
                Recommendation::Master(decision) => StateDecision::RecommendedMaster(decision),
                Recommendation::Slave(parent) => StateDecision::RecommendedSlave(parent),
                Recommendation::Passive => StateDecision::RecommendedPassive,
            };
            if let Some(state) = self.ports[index].take() {
                self.ports[index] = Some(state.apply(decision));
            }
            self.applied[index] = Some(recommendation);
        }

        if self.last_selection != Some(selection) {
            self.parent_ds = selection.parent_ds;
            self.time_properties_ds = selection.time_properties_ds;
            if selection.steps_removed.raw() == 0 {
                self.local_clock.reset_current_ds();
            } else {
                self.local_clock.set_steps_removed(selection.steps_removed);
            }
            self.last_selection = Some(selection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::{ClockIdentity, LocalClock, StepsRemoved};
    use crate::infra::ForeignClockRecordsVec;
    use crate::log::{NOOP_CLOCK_METRICS, NoopPortLog};
    use crate::message::{AnnounceMessage, GeneralMessage, SequenceId};
    use crate::port::{DomainNumber, DomainPort};
    use crate::servo::{Servo, SteppingServo};
    use crate::signaling::Tlv;
    use crate::test_support::{
        FakeClock, FakePort, FakeTimerHost, FakeTimestamping, TestClockCatalog,
    };
    use crate::time::LogMessageInterval;

    type TestPort<'a> = DomainPort<'a, FakeClock, &'a FakeTimerHost, FakeTimestamping, NoopPortLog>;
    type TestBoundaryClock<'a, const N: usize> =
        BoundaryClock<'a, TestPort<'a>, ForeignClockRecordsVec, N>;

    struct BoundaryClockTestSetup {
        local_clock: LocalClock<FakeClock>,
        physical_ports: Vec<FakePort>,
        timer_host: FakeTimerHost,
    }

    impl BoundaryClockTestSetup {
        fn new(catalog: TestClockCatalog, port_count: usize) -> Self {
            Self {
                local_clock: LocalClock::new(
                    FakeClock::default(),
                    catalog.default_ds(),
                    Servo::Stepping(SteppingServo::new(&NOOP_CLOCK_METRICS)),
                ),
                physical_ports: (0..port_count).map(|_| FakePort::new()).collect(),
                timer_host: FakeTimerHost::new(),
            }
        }

        fn clock<'a, const N: usize>(
            &'a self,
            selection: &'a SelectionQueue<N>,
        ) -> TestBoundaryClock<'a, N> {
            BoundaryClock::new(&self.local_clock, selection, |number| {
                (
                    DomainPort::new(
                        &self.local_clock,
                        &self.physical_ports[number.raw() as usize - 1],
                        &self.timer_host,
                        FakeTimestamping::new(),
                        NoopPortLog,
                        DomainNumber::new(0),
                        number,
                    ),
                    ForeignClockRecordsVec::new(),
                    PortProfile::default(),
                )
            })
        }
    }

    fn initialize<const N: usize>(clock: &mut TestBoundaryClock<'_, N>) {
        for n in 1..=N as u16 {
            clock.on_system_message(PortNumber::new(n), SystemMessage::Initialized);
        }
        clock.tick(Instant::from_secs(0));
    }

    fn announce_frame(source: PortIdentity, catalog: TestClockCatalog, seq: u16) -> Vec<u8> {
        let msg = AnnounceMessage::new(
            SequenceId::new(seq),
            LogMessageInterval::new(1),
            catalog.foreign_ds(),
            catalog.time_properties(),
        );
        let packet = wire::general_packet(source, DomainNumber::new(0), &GeneralMessage::Announce(msg));
        let mut buf = [0; wire::MAX_FRAME_LEN];
        let len = wire::encode(&packet, &mut buf);
        buf[..len].to_vec()
    }

    fn qualify_master<const N: usize>(
        clock: &mut TestBoundaryClock<'_, N>,
        port: PortNumber,
        source: PortIdentity,
        catalog: TestClockCatalog,
    ) {
        for seq in 1..=2u16 {
            clock
                .on_message_received(
                    port,
                    &announce_frame(source, catalog, seq),
                    TimeStamp::ZERO,
                    Instant::from_secs(seq as u64),
                )
                .unwrap();
        }
        clock.tick(Instant::from_secs(3));
    }

    fn kind<const N: usize>(clock: &TestBoundaryClock<'_, N>, port: u16) -> PortStateKind {
        clock.port_ds(PortNumber::new(port)).unwrap().port_state
    }

    #[test]
    fn lone_clock_selects_itself_master_on_every_port() {
        let setup = BoundaryClockTestSetup::new(TestClockCatalog::mid_grade(), 2);
        let selection = SelectionQueue::new();
        let mut clock: TestBoundaryClock<'_, 2> = setup.clock(&selection);

        initialize(&mut clock);
        assert_eq!(kind(&clock, 1), PortStateKind::PreMaster);
        assert_eq!(kind(&clock, 2), PortStateKind::PreMaster);

        clock.on_system_message(PortNumber::new(1), SystemMessage::QualificationTimeout);
        clock.on_system_message(PortNumber::new(2), SystemMessage::QualificationTimeout);
        assert_eq!(kind(&clock, 1), PortStateKind::Master);
        assert_eq!(kind(&clock, 2), PortStateKind::Master);

        assert_eq!(
            clock.parent_ds(),
            ParentDS::local(setup.local_clock.default_ds())
        );
        assert_eq!(clock.current_ds().steps_removed, StepsRemoved::new(0));
    }

    #[test]
    fn better_foreign_master_slaves_its_port_and_masters_downstream() {
        let setup = BoundaryClockTestSetup::new(TestClockCatalog::low_grade(), 2);
        let selection = SelectionQueue::new();
        let mut clock: TestBoundaryClock<'_, 2> = setup.clock(&selection);
        initialize(&mut clock);

        let gm_port = PortIdentity::new(ClockIdentity::new(&[0x01; 8]), PortNumber::new(1));
        qualify_master(&mut clock, PortNumber::new(1), gm_port, TestClockCatalog::high_grade());

        assert_eq!(kind(&clock, 1), PortStateKind::Uncalibrated);
        assert_eq!(kind(&clock, 2), PortStateKind::PreMaster);
        assert_eq!(clock.parent_ds().parent_port_identity, gm_port);
        assert_eq!(
            clock.parent_ds().grandmaster_identity,
            TestClockCatalog::high_grade().foreign_ds().grandmaster_identity
        );
        assert_eq!(clock.current_ds().steps_removed, StepsRemoved::new(1));
    }

    #[test]
    fn repeated_selection_runs_do_not_disturb_the_ports() {
        let setup = BoundaryClockTestSetup::new(TestClockCatalog::low_grade(), 2);
        let selection = SelectionQueue::new();
        let mut clock: TestBoundaryClock<'_, 2> = setup.clock(&selection);
        initialize(&mut clock);

        let gm_port = PortIdentity::new(ClockIdentity::new(&[0x01; 8]), PortNumber::new(1));
        qualify_master(&mut clock, PortNumber::new(1), gm_port, TestClockCatalog::high_grade());
        let parent_before = clock.parent_ds();

        // A third announce changes nothing; neither does another tick.
        clock
            .on_message_received(
                PortNumber::new(1),
                &announce_frame(gm_port, TestClockCatalog::high_grade(), 3),
                TimeStamp::ZERO,
                Instant::from_secs(4),
            )
            .unwrap();
        clock.tick(Instant::from_secs(5));

        assert_eq!(kind(&clock, 1), PortStateKind::Uncalibrated);
        assert_eq!(kind(&clock, 2), PortStateKind::PreMaster);
        assert_eq!(clock.parent_ds(), parent_before);
    }

    #[test]
    fn frames_for_a_foreign_domain_are_reported_and_dropped() {
        let setup = BoundaryClockTestSetup::new(TestClockCatalog::low_grade(), 1);
        let selection = SelectionQueue::new();
        let mut clock: TestBoundaryClock<'_, 1> = setup.clock(&selection);
        initialize(&mut clock);

        let source = PortIdentity::fake();
        let msg = AnnounceMessage::new(
            SequenceId::new(1),
            LogMessageInterval::new(1),
            TestClockCatalog::high_grade().foreign_ds(),
            TestClockCatalog::high_grade().time_properties(),
        );
        let packet = wire::general_packet(
            source,
            DomainNumber::new(7),
            &GeneralMessage::Announce(msg),
        );
        let mut buf = [0; wire::MAX_FRAME_LEN];
        let len = wire::encode(&packet, &mut buf);

        assert_eq!(
            clock.on_message_received(
                PortNumber::new(1),
                &buf[..len],
                TimeStamp::ZERO,
                Instant::from_secs(1)
            ),
            Err(DecodeError::DomainMismatch)
        );
        assert_eq!(kind(&clock, 1), PortStateKind::Listening);
    }

    #[test]
    fn disabled_port_rejoins_selection_after_enable() {
        let setup = BoundaryClockTestSetup::new(TestClockCatalog::mid_grade(), 1);
        let selection = SelectionQueue::new();
        let mut clock: TestBoundaryClock<'_, 1> = setup.clock(&selection);
        initialize(&mut clock);

        clock.disable_port(PortNumber::new(1));
        assert_eq!(kind(&clock, 1), PortStateKind::Disabled);

        clock.enable_port(PortNumber::new(1));
        assert_eq!(kind(&clock, 1), PortStateKind::Initializing);

        clock.on_system_message(PortNumber::new(1), SystemMessage::Initialized);
        clock.tick(Instant::from_secs(10));
        assert_eq!(kind(&clock, 1), PortStateKind::PreMaster);
    }

    struct RecordingHandler {
        seen: core::cell::RefCell<Vec<u16>>,
    }

    impl SignalingHandler for RecordingHandler {
        fn handle(&self, _source: PortIdentity, tlv: Tlv<'_>) {
            self.seen.borrow_mut().push(tlv.tlv_type);
        }
    }

    #[test]
    fn signaling_is_routed_to_the_registered_handler() {
        let setup = BoundaryClockTestSetup::new(TestClockCatalog::mid_grade(), 1);
        let selection = SelectionQueue::new();
        let mut clock: TestBoundaryClock<'_, 1> = setup.clock(&selection);
        initialize(&mut clock);

        let handler = RecordingHandler {
            seen: core::cell::RefCell::new(Vec::new()),
        };
        clock.register_signaling_handler(3, &handler).unwrap();

        let tlvs = [0x00, 0x03, 0x00, 0x02, 0xaa, 0xbb];
        let packet = wire::Packet {
            header: wire::Header {
                transport_specific: 0,
                domain_number: DomainNumber::new(0),
                flags: wire::Flags::default(),
                correction_field: crate::time::CorrectionField::ZERO,
                source_port_identity: PortIdentity::fake(),
                sequence_id: SequenceId::new(1),
                log_message_interval: LogMessageInterval::UNSPECIFIED,
            },
            body: wire::Body::Signaling {
                target_port_identity: PortIdentity::wildcard(),
                tlvs: &tlvs,
            },
        };
        let mut buf = [0; wire::MAX_FRAME_LEN];
        let len = wire::encode(&packet, &mut buf);

        clock
            .on_message_received(
                PortNumber::new(1),
                &buf[..len],
                TimeStamp::ZERO,
                Instant::from_secs(1),
            )
            .unwrap();

        assert_eq!(handler.seen.borrow().as_slice(), [3]);
    }
}
