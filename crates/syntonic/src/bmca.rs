//! Best master clock algorithm: dataset comparison and per-port foreign
//! master tracking.
//!
//! Each port keeps a set of [`ForeignClockRecord`]s fed from received
//! Announce messages. A record qualifies once [`QUALIFICATION_THRESHOLD`]
//! announces with a consistent dataset have arrived; the best qualified
//! record is the port's Erbest. Whenever the Erbest changes the port raises
//! a [`SelectionTrigger`], and the clock-wide selection in
//! [`crate::selection`] recomputes the recommended state of every port.
//!
//! The per-state wrappers ([`ListeningBmca`], [`ParentTrackingBmca`],
//! [`GrandMasterTrackingBmca`]) carry the tracking machinery through the
//! state machine while exposing only what each state may do with it.

use crate::clock::{
    ClockIdentity, ClockQuality, DefaultDS, Priority1, Priority2, StepsRemoved, TimePropertiesDS,
};
use crate::message::AnnounceMessage;
use crate::port::{ParentPortIdentity, PortIdentity, PortNumber};
use crate::time::{Duration, Instant, LogInterval};

/// Announces with a consistent dataset required before a foreign master is
/// considered in selection.
pub const QUALIFICATION_THRESHOLD: u8 = 2;

/// Announces claiming this many steps or more are malformed and dropped.
const MAX_STEPS_REMOVED: u16 = 255;

/// The grandmaster-describing fields of an Announce, as used in dataset
/// comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignClockDS {
    pub grandmaster_priority1: Priority1,
    pub grandmaster_clock_quality: ClockQuality,
    pub grandmaster_priority2: Priority2,
    pub grandmaster_identity: ClockIdentity,
    pub steps_removed: StepsRemoved,
}

impl ForeignClockDS {
    pub fn new(
        grandmaster_priority1: Priority1,
        grandmaster_clock_quality: ClockQuality,
        grandmaster_priority2: Priority2,
        grandmaster_identity: ClockIdentity,
        steps_removed: StepsRemoved,
    ) -> Self {
        Self {
            grandmaster_priority1,
            grandmaster_clock_quality,
            grandmaster_priority2,
            grandmaster_identity,
            steps_removed,
        }
    }

    /// The dataset a clock would announce about itself (the `D0` dataset).
    pub fn from_default_ds(default_ds: &DefaultDS) -> Self {
        Self {
            grandmaster_priority1: default_ds.priority1,
            grandmaster_clock_quality: default_ds.clock_quality,
            grandmaster_priority2: default_ds.priority2,
            grandmaster_identity: default_ds.clock_identity,
            steps_removed: StepsRemoved::new(0),
        }
    }

    fn quality_key(&self) -> (u8, u8, u8, u16, u8, [u8; 8]) {
        (
            self.grandmaster_priority1.raw(),
            self.grandmaster_clock_quality.clock_class,
            self.grandmaster_clock_quality.clock_accuracy.raw(),
            self.grandmaster_clock_quality.offset_scaled_log_variance,
            self.grandmaster_priority2.raw(),
            *self.grandmaster_identity.as_bytes(),
        )
    }

    /// Strict quality ordering irrespective of topology, used by bounded
    /// record stores to pick an eviction victim.
    pub fn outranks(&self, other: &ForeignClockDS) -> bool {
        self.quality_key() < other.quality_key()
    }
}

/// One side of a dataset comparison: the announced grandmaster dataset plus
/// the identities of the announcing port and the receiving port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterCandidate {
    pub ds: ForeignClockDS,
    pub sender_port_identity: PortIdentity,
    pub receiver_port_identity: PortIdentity,
}

impl MasterCandidate {
    pub fn new(
        ds: ForeignClockDS,
        sender_port_identity: PortIdentity,
        receiver_port_identity: PortIdentity,
    ) -> Self {
        Self {
            ds,
            sender_port_identity,
            receiver_port_identity,
        }
    }
}

/// Outcome of comparing two master candidates.
///
/// The `ByTopology` variants mean the grandmasters were of equal quality and
/// the tie was broken by path attributes; selection uses this distinction to
/// put a losing port into PASSIVE instead of MASTER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetOrdering {
    ABetter,
    ABetterByTopology,
    BBetter,
    BBetterByTopology,
    /// Both candidates claim the same grandmaster but with inconsistent
    /// quality fields; neither can be trusted.
    Error,
}

/// IEEE 1588-2019 §9.3.4 dataset comparison.
pub fn compare(a: &MasterCandidate, b: &MasterCandidate) -> DatasetOrdering {
    if a.ds.grandmaster_identity == b.ds.grandmaster_identity {
        return compare_same_grandmaster(a, b);
    }

    if a.ds.quality_key() < b.ds.quality_key() {
        DatasetOrdering::ABetter
    } else {
        DatasetOrdering::BBetter
    }
}

fn compare_same_grandmaster(a: &MasterCandidate, b: &MasterCandidate) -> DatasetOrdering {
    let consistent = a.ds.grandmaster_priority1 == b.ds.grandmaster_priority1
        && a.ds.grandmaster_clock_quality == b.ds.grandmaster_clock_quality
        && a.ds.grandmaster_priority2 == b.ds.grandmaster_priority2;
    if !consistent {
        return DatasetOrdering::Error;
    }

    match a.ds.steps_removed.raw() as i32 - b.ds.steps_removed.raw() as i32 {
        d if d > 1 => DatasetOrdering::BBetter,
        d if d < -1 => DatasetOrdering::ABetter,
        1 => DatasetOrdering::BBetterByTopology,
        -1 => DatasetOrdering::ABetterByTopology,
        _ => match a.sender_port_identity.cmp(&b.sender_port_identity) {
            core::cmp::Ordering::Less => DatasetOrdering::ABetterByTopology,
            core::cmp::Ordering::Greater => DatasetOrdering::BBetterByTopology,
            core::cmp::Ordering::Equal => match a
                .receiver_port_identity
                .cmp(&b.receiver_port_identity)
            {
                core::cmp::Ordering::Greater => DatasetOrdering::BBetterByTopology,
                _ => DatasetOrdering::ABetterByTopology,
            },
        },
    }
}

/// Effect of feeding an Announce into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordUpdate {
    /// Dataset and qualification status are as before.
    Unchanged,
    /// The dataset changed or the record crossed the qualification threshold.
    Changed,
}

/// Tracking state for one foreign master as seen from one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignClockRecord {
    source_port_identity: PortIdentity,
    ds: ForeignClockDS,
    time_properties: TimePropertiesDS,
    announce_log_interval: LogInterval,
    last_seen: Instant,
    announces: u8,
}

impl ForeignClockRecord {
    pub fn new(source_port_identity: PortIdentity, msg: &AnnounceMessage, now: Instant) -> Self {
        Self {
            source_port_identity,
            ds: msg.grandmaster,
            time_properties: msg.time_properties,
            announce_log_interval: announce_interval(msg),
            last_seen: now,
            announces: 1,
        }
    }

    pub fn source_port_identity(&self) -> PortIdentity {
        self.source_port_identity
    }

    pub fn ds(&self) -> &ForeignClockDS {
        &self.ds
    }

    pub fn time_properties(&self) -> &TimePropertiesDS {
        &self.time_properties
    }

    pub fn same_source_as(&self, source: &PortIdentity) -> bool {
        self.source_port_identity == *source
    }

    pub fn is_qualified(&self) -> bool {
        self.announces >= QUALIFICATION_THRESHOLD
    }

    /// A record is stale when no announce arrived for `multiplier` announce
    /// intervals of the foreign master.
    pub fn is_stale(&self, now: Instant, multiplier: u8) -> bool {
        now.saturating_elapsed_since(self.last_seen)
            > self.announce_log_interval.interval() * multiplier as u32
    }

    /// Fold the next Announce from the same source into the record.
    pub fn consider(&mut self, msg: &AnnounceMessage, now: Instant) -> RecordUpdate {
        self.last_seen = now;
        self.announce_log_interval = announce_interval(msg);

        if self.ds != msg.grandmaster || self.time_properties != msg.time_properties {
            self.ds = msg.grandmaster;
            self.time_properties = msg.time_properties;
            self.announces = 1;
            return RecordUpdate::Changed;
        }

        let was_qualified = self.is_qualified();
        self.announces = self.announces.saturating_add(1);
        if self.is_qualified() != was_qualified {
            RecordUpdate::Changed
        } else {
            RecordUpdate::Unchanged
        }
    }
}

// Announce senders always carry a real interval, but the field is attacker
// controlled; clamp so staleness arithmetic stays in range.
fn announce_interval(msg: &AnnounceMessage) -> LogInterval {
    LogInterval::new(msg.log_message_interval.raw().clamp(-8, 8))
}

/// Outcome of [`ForeignClockRecords::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// No record for that source exists yet.
    NotFound,
    Applied(RecordUpdate),
}

/// Storage for a port's foreign master records.
///
/// Implementations decide capacity and eviction; see
/// [`crate::infra::ForeignClockRecordsVec`] for hosts with an allocator and
/// [`crate::heapless::HeaplessForeignClockRecords`] for bounded-memory
/// targets.
pub trait ForeignClockRecords {
    fn update<F>(&mut self, source: &PortIdentity, f: F) -> UpdateResult
    where
        F: FnOnce(&mut ForeignClockRecord) -> RecordUpdate;

    fn insert(&mut self, record: ForeignClockRecord);

    fn remove_stale(&mut self, now: Instant, multiplier: u8);

    fn records(&self) -> &[ForeignClockRecord];

    fn clear(&mut self);
}

/// The best qualified foreign master of one port, or the absence of one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErbestSnapshot {
    #[default]
    Empty,
    Qualified {
        ds: ForeignClockDS,
        time_properties: TimePropertiesDS,
        source_port_identity: PortIdentity,
        received_on_port: PortNumber,
    },
}

/// Receives Erbest changes; implemented by the clock-wide selection queue.
pub trait SelectionTrigger {
    fn erbest_changed(&self, port: PortNumber, erbest: ErbestSnapshot);
}

impl<T: SelectionTrigger> SelectionTrigger for &T {
    fn erbest_changed(&self, port: PortNumber, erbest: ErbestSnapshot) {
        (*self).erbest_changed(port, erbest)
    }
}

/// Maintains the foreign master records of one port and the Erbest derived
/// from them.
struct ErbestTracker<S> {
    records: S,
    receiver: PortIdentity,
    announce_receipt_timeout: u8,
    current: ErbestSnapshot,
}

impl<S: ForeignClockRecords> ErbestTracker<S> {
    fn new(records: S, receiver: PortIdentity, announce_receipt_timeout: u8) -> Self {
        Self {
            records,
            receiver,
            announce_receipt_timeout,
            current: ErbestSnapshot::Empty,
        }
    }

    fn observe(&mut self, source: PortIdentity, msg: &AnnounceMessage, now: Instant) -> bool {
        match self.records.update(&source, |record| record.consider(msg, now)) {
            UpdateResult::NotFound => {
                self.records.insert(ForeignClockRecord::new(source, msg, now));
            }
            UpdateResult::Applied(_) => {}
        }
        self.recompute()
    }

    fn prune(&mut self, now: Instant) -> bool {
        self.records.remove_stale(now, self.announce_receipt_timeout);
        self.recompute()
    }

    fn clear(&mut self) {
        self.records.clear();
        self.current = ErbestSnapshot::Empty;
    }

    fn erbest(&self) -> ErbestSnapshot {
        self.current
    }

    fn port(&self) -> PortNumber {
        self.receiver.port_number
    }

    fn recompute(&mut self) -> bool {
        let mut best: Option<&ForeignClockRecord> = None;
        for record in self.records.records() {
            if !record.is_qualified() {
                continue;
            }
            best = match best {
                None => Some(record),
                Some(current) => {
                    let a = MasterCandidate::new(
                        *current.ds(),
                        current.source_port_identity(),
                        self.receiver,
                    );
                    let b = MasterCandidate::new(
                        *record.ds(),
                        record.source_port_identity(),
                        self.receiver,
                    );
                    match compare(&a, &b) {
                        DatasetOrdering::BBetter | DatasetOrdering::BBetterByTopology => {
                            Some(record)
                        }
                        _ => Some(current),
                    }
                }
            };
        }

        let snapshot = match best {
            Some(record) => ErbestSnapshot::Qualified {
                ds: *record.ds(),
                time_properties: *record.time_properties(),
                source_port_identity: record.source_port_identity(),
                received_on_port: self.receiver.port_number,
            },
            None => ErbestSnapshot::Empty,
        };

        let changed = snapshot != self.current;
        self.current = snapshot;
        changed
    }
}

/// The BMCA machinery of one port.
///
/// Filters announces that must never enter selection (from the local clock
/// itself, or claiming an out-of-range steps count), and raises the
/// selection trigger whenever the port's Erbest changes.
pub struct PortBmca<'a, S> {
    local: &'a DefaultDS,
    tracker: ErbestTracker<S>,
    trigger: &'a dyn SelectionTrigger,
}

impl<'a, S: ForeignClockRecords> PortBmca<'a, S> {
    pub fn new(
        local: &'a DefaultDS,
        records: S,
        receiver: PortIdentity,
        announce_receipt_timeout: u8,
        trigger: &'a dyn SelectionTrigger,
    ) -> Self {
        Self {
            local,
            tracker: ErbestTracker::new(records, receiver, announce_receipt_timeout),
            trigger,
        }
    }

    pub fn observe_announce(&mut self, source: PortIdentity, msg: &AnnounceMessage, now: Instant) {
        if source.clock_identity == self.local.clock_identity {
            return;
        }
        if msg.grandmaster.steps_removed.raw() >= MAX_STEPS_REMOVED {
            return;
        }
        if self.tracker.observe(source, msg, now) {
            self.trigger_selection();
        }
    }

    /// Drop records whose master went silent; raises the trigger if the
    /// Erbest changed as a result.
    pub fn prune(&mut self, now: Instant) {
        if self.tracker.prune(now) {
            self.trigger_selection();
        }
    }

    /// Unconditionally hand the current Erbest to selection.
    pub fn trigger_selection(&self) {
        self.trigger
            .erbest_changed(self.tracker.port(), self.tracker.erbest());
    }

    pub fn erbest(&self) -> ErbestSnapshot {
        self.tracker.erbest()
    }

    fn clear(&mut self) {
        self.tracker.clear();
        self.trigger_selection();
    }
}

/// BMCA of a port with no role yet: tracks foreign masters, nothing else.
pub struct ListeningBmca<'a, S> {
    bmca: PortBmca<'a, S>,
}

impl<'a, S: ForeignClockRecords> ListeningBmca<'a, S> {
    pub fn new(
        local: &'a DefaultDS,
        records: S,
        receiver: PortIdentity,
        announce_receipt_timeout: u8,
        trigger: &'a dyn SelectionTrigger,
    ) -> Self {
        Self {
            bmca: PortBmca::new(local, records, receiver, announce_receipt_timeout, trigger),
        }
    }

    pub fn observe_announce(&mut self, source: PortIdentity, msg: &AnnounceMessage, now: Instant) {
        self.bmca.observe_announce(source, msg, now)
    }

    pub fn prune(&mut self, now: Instant) {
        self.bmca.prune(now)
    }

    pub fn trigger_selection(&self) {
        self.bmca.trigger_selection()
    }

    pub fn erbest(&self) -> ErbestSnapshot {
        self.bmca.erbest()
    }

    /// Forget all foreign masters, e.g. when the port faults.
    pub fn clear(&mut self) {
        self.bmca.clear()
    }

    pub fn into_parent_tracking(self, parent: ParentPortIdentity) -> ParentTrackingBmca<'a, S> {
        ParentTrackingBmca {
            bmca: self.bmca,
            parent,
        }
    }

    pub fn into_grandmaster_tracking(
        self,
        grandmaster: ForeignClockDS,
        time_properties: TimePropertiesDS,
    ) -> GrandMasterTrackingBmca<'a, S> {
        GrandMasterTrackingBmca {
            bmca: self.bmca,
            grandmaster,
            time_properties,
        }
    }
}

/// BMCA of a port synchronizing to a selected parent.
pub struct ParentTrackingBmca<'a, S> {
    bmca: PortBmca<'a, S>,
    parent: ParentPortIdentity,
}

impl<'a, S: ForeignClockRecords> ParentTrackingBmca<'a, S> {
    pub fn observe_announce(&mut self, source: PortIdentity, msg: &AnnounceMessage, now: Instant) {
        self.bmca.observe_announce(source, msg, now)
    }

    pub fn prune(&mut self, now: Instant) {
        self.bmca.prune(now)
    }

    pub fn trigger_selection(&self) {
        self.bmca.trigger_selection()
    }

    /// Whether a message came from the port this state is synchronizing to.
    /// Sync and Delay_Resp from anyone else are ignored.
    pub fn matches_parent(&self, source: &PortIdentity) -> bool {
        self.parent.identity() == source
    }

    pub fn parent(&self) -> ParentPortIdentity {
        self.parent
    }

    pub fn retarget(self, parent: ParentPortIdentity) -> Self {
        Self {
            bmca: self.bmca,
            parent,
        }
    }

    pub fn into_listening(self) -> ListeningBmca<'a, S> {
        ListeningBmca { bmca: self.bmca }
    }

    pub fn into_grandmaster_tracking(
        self,
        grandmaster: ForeignClockDS,
        time_properties: TimePropertiesDS,
    ) -> GrandMasterTrackingBmca<'a, S> {
        GrandMasterTrackingBmca {
            bmca: self.bmca,
            grandmaster,
            time_properties,
        }
    }
}

/// BMCA of a port announcing a grandmaster (its own clock's, or the one the
/// clock is synchronized to on another port).
pub struct GrandMasterTrackingBmca<'a, S> {
    bmca: PortBmca<'a, S>,
    grandmaster: ForeignClockDS,
    time_properties: TimePropertiesDS,
}

impl<'a, S: ForeignClockRecords> GrandMasterTrackingBmca<'a, S> {
    pub fn observe_announce(&mut self, source: PortIdentity, msg: &AnnounceMessage, now: Instant) {
        self.bmca.observe_announce(source, msg, now)
    }

    pub fn prune(&mut self, now: Instant) {
        self.bmca.prune(now)
    }

    pub fn trigger_selection(&self) {
        self.bmca.trigger_selection()
    }

    /// The dataset this port puts into its Announce messages.
    pub fn announce_dataset(&self) -> (ForeignClockDS, TimePropertiesDS) {
        (self.grandmaster, self.time_properties)
    }

    /// Keep tracking, but announce a different grandmaster from now on.
    pub fn retarget(
        self,
        grandmaster: ForeignClockDS,
        time_properties: TimePropertiesDS,
    ) -> Self {
        Self {
            bmca: self.bmca,
            grandmaster,
            time_properties,
        }
    }

    pub fn into_listening(self) -> ListeningBmca<'a, S> {
        ListeningBmca { bmca: self.bmca }
    }

    pub fn into_parent_tracking(self, parent: ParentPortIdentity) -> ParentTrackingBmca<'a, S> {
        ParentTrackingBmca {
            bmca: self.bmca,
            parent,
        }
    }
}

/// The state decision point that recommended MASTER for a port.
///
/// `M1`/`M2` ports are (or front for) the grandmaster and skip
/// qualification; `M3` ports won against their own Erbest only and must wait
/// out a qualification interval before taking over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmcaMasterDecisionPoint {
    M1,
    M2,
    M3,
}

/// How long a PRE_MASTER port waits before entering MASTER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualificationTimeoutPolicy {
    point: BmcaMasterDecisionPoint,
    steps_removed: StepsRemoved,
}

impl QualificationTimeoutPolicy {
    pub fn new(point: BmcaMasterDecisionPoint, steps_removed: StepsRemoved) -> Self {
        Self {
            point,
            steps_removed,
        }
    }

    pub fn duration(&self, log_announce_interval: LogInterval) -> Duration {
        match self.point {
            BmcaMasterDecisionPoint::M1 | BmcaMasterDecisionPoint::M2 => Duration::ZERO,
            BmcaMasterDecisionPoint::M3 => {
                log_announce_interval.interval() * (self.steps_removed.raw() as u32 + 1)
            }
        }
    }
}

/// A MASTER recommendation: the decision point, the grandmaster dataset the
/// port will announce, and the properties of that grandmaster's timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BmcaMasterDecision {
    pub point: BmcaMasterDecisionPoint,
    pub steps_removed: StepsRemoved,
    pub grandmaster: ForeignClockDS,
    pub time_properties: TimePropertiesDS,
}

impl BmcaMasterDecision {
    pub fn apply<R>(
        self,
        f: impl FnOnce(QualificationTimeoutPolicy, ForeignClockDS, TimePropertiesDS) -> R,
    ) -> R {
        f(
            QualificationTimeoutPolicy::new(self.point, self.steps_removed),
            self.grandmaster,
            self.time_properties,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::infra::ForeignClockRecordsVec;
    use crate::port::PortNumber;
    use crate::test_support::{FakeSelectionTrigger, TestClockCatalog};
    use crate::time::LogMessageInterval;

    fn receiver() -> PortIdentity {
        PortIdentity::new(ClockIdentity::new(&[0xaa; 8]), PortNumber::new(1))
    }

    fn candidate(ds: ForeignClockDS, sender: PortIdentity) -> MasterCandidate {
        MasterCandidate::new(ds, sender, receiver())
    }

    fn announce(ds: ForeignClockDS) -> AnnounceMessage {
        AnnounceMessage::new(
            0.into(),
            LogMessageInterval::new(1),
            ds,
            TestClockCatalog::high_grade().time_properties(),
        )
    }

    #[test]
    fn lower_clock_class_wins() {
        let a = candidate(TestClockCatalog::high_grade().foreign_ds(), PortIdentity::fake());
        let b = candidate(TestClockCatalog::mid_grade().foreign_ds(), PortIdentity::fake());

        assert_eq!(compare(&a, &b), DatasetOrdering::ABetter);
        assert_eq!(compare(&b, &a), DatasetOrdering::BBetter);
    }

    #[test]
    fn priority1_precedes_clock_class() {
        let mut worse_class = TestClockCatalog::mid_grade().foreign_ds();
        worse_class.grandmaster_priority1 = Priority1::new(1);
        let a = candidate(worse_class, PortIdentity::fake());
        let b = candidate(TestClockCatalog::high_grade().foreign_ds(), PortIdentity::fake());

        assert_eq!(compare(&a, &b), DatasetOrdering::ABetter);
    }

    #[test]
    fn identity_breaks_full_quality_tie() {
        let a_ds = TestClockCatalog::high_grade().foreign_ds();
        let mut b_ds = a_ds;
        b_ds.grandmaster_identity = ClockIdentity::new(&[0xff; 8]);
        let a = candidate(a_ds, PortIdentity::fake());
        let b = candidate(b_ds, PortIdentity::fake());

        assert_eq!(compare(&a, &b), DatasetOrdering::ABetter);
    }

    #[test]
    fn same_grandmaster_with_inconsistent_quality_is_an_error() {
        let a_ds = TestClockCatalog::high_grade().foreign_ds();
        let mut b_ds = a_ds;
        b_ds.grandmaster_priority2 = Priority2::new(200);

        let a = candidate(a_ds, PortIdentity::fake());
        let b = candidate(b_ds, PortIdentity::fake());

        assert_eq!(compare(&a, &b), DatasetOrdering::Error);
    }

    #[test]
    fn same_grandmaster_fewer_steps_wins() {
        let near = TestClockCatalog::high_grade().foreign_ds();
        let mut far = near;
        far.steps_removed = StepsRemoved::new(3);

        let a = candidate(near, PortIdentity::fake());
        let b = candidate(far, PortIdentity::fake());

        assert_eq!(compare(&a, &b), DatasetOrdering::ABetter);
        assert_eq!(compare(&b, &a), DatasetOrdering::BBetter);
    }

    #[test]
    fn same_grandmaster_one_step_apart_is_a_topology_decision() {
        let near = TestClockCatalog::high_grade().foreign_ds();
        let mut far = near;
        far.steps_removed = StepsRemoved::new(1);

        let a = candidate(near, PortIdentity::fake());
        let b = candidate(far, PortIdentity::fake());

        assert_eq!(compare(&a, &b), DatasetOrdering::ABetterByTopology);
        assert_eq!(compare(&b, &a), DatasetOrdering::BBetterByTopology);
    }

    #[test]
    fn same_grandmaster_equal_steps_breaks_tie_on_sender() {
        let ds = TestClockCatalog::high_grade().foreign_ds();
        let low_sender = PortIdentity::new(ClockIdentity::new(&[0x01; 8]), PortNumber::new(1));
        let high_sender = PortIdentity::new(ClockIdentity::new(&[0x02; 8]), PortNumber::new(1));

        let a = candidate(ds, low_sender);
        let b = candidate(ds, high_sender);

        assert_eq!(compare(&a, &b), DatasetOrdering::ABetterByTopology);
        assert_eq!(compare(&b, &a), DatasetOrdering::BBetterByTopology);
    }

    #[test]
    fn self_comparison_is_not_an_error() {
        let a = candidate(TestClockCatalog::high_grade().foreign_ds(), PortIdentity::fake());

        assert_eq!(compare(&a, &a), DatasetOrdering::ABetterByTopology);
    }

    #[test]
    fn record_qualifies_after_threshold_announces() {
        let source = PortIdentity::fake();
        let msg = announce(TestClockCatalog::high_grade().foreign_ds());
        let mut record = ForeignClockRecord::new(source, &msg, Instant::from_secs(0));

        assert!(!record.is_qualified());
        assert_eq!(
            record.consider(&msg, Instant::from_secs(2)),
            RecordUpdate::Changed
        );
        assert!(record.is_qualified());
        assert_eq!(
            record.consider(&msg, Instant::from_secs(4)),
            RecordUpdate::Unchanged
        );
    }

    #[test]
    fn record_restarts_qualification_when_dataset_changes() {
        let source = PortIdentity::fake();
        let msg = announce(TestClockCatalog::high_grade().foreign_ds());
        let mut record = ForeignClockRecord::new(source, &msg, Instant::from_secs(0));
        record.consider(&msg, Instant::from_secs(2));
        assert!(record.is_qualified());

        let changed = announce(TestClockCatalog::mid_grade().foreign_ds());
        assert_eq!(
            record.consider(&changed, Instant::from_secs(4)),
            RecordUpdate::Changed
        );
        assert!(!record.is_qualified());
    }

    #[test]
    fn record_goes_stale_after_timeout_multiple() {
        let msg = announce(TestClockCatalog::high_grade().foreign_ds());
        let record = ForeignClockRecord::new(PortIdentity::fake(), &msg, Instant::from_secs(0));

        // log interval 1 => 2 s period; 3 periods = 6 s.
        assert!(!record.is_stale(Instant::from_secs(6), 3));
        assert!(record.is_stale(Instant::from_secs(7), 3));
    }

    fn port_bmca<'a>(
        local: &'a DefaultDS,
        trigger: &'a FakeSelectionTrigger,
    ) -> PortBmca<'a, ForeignClockRecordsVec> {
        PortBmca::new(local, ForeignClockRecordsVec::new(), receiver(), 3, trigger)
    }

    #[test]
    fn erbest_appears_once_a_record_qualifies() {
        let local = TestClockCatalog::low_grade().default_ds();
        let trigger = FakeSelectionTrigger::new();
        let mut bmca = port_bmca(&local, &trigger);

        let source = PortIdentity::fake();
        let msg = announce(TestClockCatalog::high_grade().foreign_ds());

        bmca.observe_announce(source, &msg, Instant::from_secs(0));
        assert_eq!(trigger.take_events(), []);

        bmca.observe_announce(source, &msg, Instant::from_secs(2));
        assert_eq!(
            trigger.take_events(),
            [(
                PortNumber::new(1),
                ErbestSnapshot::Qualified {
                    ds: TestClockCatalog::high_grade().foreign_ds(),
                    time_properties: TestClockCatalog::high_grade().time_properties(),
                    source_port_identity: source,
                    received_on_port: PortNumber::new(1),
                }
            )]
        );
    }

    #[test]
    fn better_foreign_master_displaces_erbest() {
        let local = TestClockCatalog::low_grade().default_ds();
        let trigger = FakeSelectionTrigger::new();
        let mut bmca = port_bmca(&local, &trigger);

        let mid_source = PortIdentity::new(ClockIdentity::new(&[0x02; 8]), PortNumber::new(1));
        let mid = announce(TestClockCatalog::mid_grade().foreign_ds());
        bmca.observe_announce(mid_source, &mid, Instant::from_secs(0));
        bmca.observe_announce(mid_source, &mid, Instant::from_secs(2));

        let high_source = PortIdentity::new(ClockIdentity::new(&[0x01; 8]), PortNumber::new(1));
        let high = announce(TestClockCatalog::high_grade().foreign_ds());
        bmca.observe_announce(high_source, &high, Instant::from_secs(3));
        bmca.observe_announce(high_source, &high, Instant::from_secs(5));

        match bmca.erbest() {
            ErbestSnapshot::Qualified { ds, .. } => {
                assert_eq!(ds, TestClockCatalog::high_grade().foreign_ds());
            }
            ErbestSnapshot::Empty => panic!("expected a qualified Erbest"),
        }
    }

    #[test]
    fn announces_from_the_local_clock_are_ignored() {
        let local = TestClockCatalog::low_grade().default_ds();
        let trigger = FakeSelectionTrigger::new();
        let mut bmca = port_bmca(&local, &trigger);

        let own_port = PortIdentity::new(local.clock_identity, PortNumber::new(2));
        let msg = announce(TestClockCatalog::high_grade().foreign_ds());

        bmca.observe_announce(own_port, &msg, Instant::from_secs(0));
        bmca.observe_announce(own_port, &msg, Instant::from_secs(2));

        assert_eq!(bmca.erbest(), ErbestSnapshot::Empty);
    }

    #[test]
    fn announces_with_out_of_range_steps_are_ignored() {
        let local = TestClockCatalog::low_grade().default_ds();
        let trigger = FakeSelectionTrigger::new();
        let mut bmca = port_bmca(&local, &trigger);

        let mut ds = TestClockCatalog::high_grade().foreign_ds();
        ds.steps_removed = StepsRemoved::new(255);
        let msg = announce(ds);

        bmca.observe_announce(PortIdentity::fake(), &msg, Instant::from_secs(0));
        bmca.observe_announce(PortIdentity::fake(), &msg, Instant::from_secs(2));

        assert_eq!(bmca.erbest(), ErbestSnapshot::Empty);
    }

    #[test]
    fn pruning_a_silent_master_empties_the_erbest() {
        let local = TestClockCatalog::low_grade().default_ds();
        let trigger = FakeSelectionTrigger::new();
        let mut bmca = port_bmca(&local, &trigger);

        let msg = announce(TestClockCatalog::high_grade().foreign_ds());
        bmca.observe_announce(PortIdentity::fake(), &msg, Instant::from_secs(0));
        bmca.observe_announce(PortIdentity::fake(), &msg, Instant::from_secs(2));
        let _ = trigger.take_events();

        // Timeout multiplier 3 at a 2 s announce interval.
        bmca.prune(Instant::from_secs(20));

        assert_eq!(
            trigger.take_events(),
            [(PortNumber::new(1), ErbestSnapshot::Empty)]
        );
    }

    #[test]
    fn qualification_timeout_is_zero_for_grandmaster_decisions() {
        let policy =
            QualificationTimeoutPolicy::new(BmcaMasterDecisionPoint::M1, StepsRemoved::new(0));

        assert_eq!(policy.duration(LogInterval::new(1)), Duration::ZERO);
    }

    #[test]
    fn qualification_timeout_scales_with_steps_removed() {
        let policy =
            QualificationTimeoutPolicy::new(BmcaMasterDecisionPoint::M3, StepsRemoved::new(1));

        assert_eq!(policy.duration(LogInterval::new(1)), Duration::from_secs(4));
    }
}
