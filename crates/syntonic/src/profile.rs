//! Per-port protocol configuration, and the state factories that apply it.
//!
//! Every port state is created through a [`PortProfile`] method. The factory
//! owns the entry actions of figure 24: it creates and starts the timers the
//! new state needs, so a state value is fully armed the moment it exists and
//! a dropped state cancels everything it armed.

use crate::bmca::{
    ForeignClockRecords, GrandMasterTrackingBmca, ListeningBmca, ParentTrackingBmca,
    QualificationTimeoutPolicy,
};
use crate::disabled::DisabledPort;
use crate::e2e::EndToEndDelayMechanism;
use crate::faulty::FaultyPort;
use crate::initializing::InitializingPort;
use crate::listening::ListeningPort;
use crate::master::{AnnounceCycle, MasterPort, SyncCycle};
use crate::message::{SequenceId, SystemMessage};
use crate::passive::PassivePort;
use crate::port::{AnnounceReceiptTimeout, Port, Timeout};
use crate::portstate::PortState;
use crate::premaster::PreMasterPort;
use crate::slave::SlavePort;
use crate::time::{Duration, LogInterval};
use crate::uncalibrated::UncalibratedPort;

/// The configurable intervals and timeouts of a port.
///
/// Defaults follow the IEEE 1588 default profile: 2 s announces, a timeout
/// of 3 missed announces, 1 s syncs and delay requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortProfile {
    pub log_announce_interval: LogInterval,
    /// Announce intervals without an announce from the tracked master before
    /// the port gives up on it.
    pub announce_receipt_timeout: u8,
    pub log_sync_interval: LogInterval,
    pub log_min_delay_request_interval: LogInterval,
}

impl Default for PortProfile {
    fn default() -> Self {
        Self {
            log_announce_interval: LogInterval::new(1),
            announce_receipt_timeout: 3,
            log_sync_interval: LogInterval::new(0),
            log_min_delay_request_interval: LogInterval::new(0),
        }
    }
}

impl PortProfile {
    pub fn announce_receipt_timeout_interval(&self) -> Duration {
        self.log_announce_interval.interval() * self.announce_receipt_timeout as u32
    }

    fn announce_receipt_timeout<P: Port>(&self, port: &P) -> AnnounceReceiptTimeout<P::Timeout> {
        let timeout = AnnounceReceiptTimeout::new(
            port.timeout(SystemMessage::AnnounceReceiptTimeout),
            self.announce_receipt_timeout_interval(),
        );
        timeout.restart();
        timeout
    }

    pub fn initializing<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: ListeningBmca<'a, S>,
    ) -> PortState<'a, P, S> {
        PortState::Initializing(InitializingPort::new(port, bmca, self))
    }

    /// Entering LISTENING triggers a selection run: a clock with no foreign
    /// masters in view recommends itself master here.
    pub(crate) fn listening<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: ListeningBmca<'a, S>,
    ) -> PortState<'a, P, S> {
        let announce_receipt_timeout = self.announce_receipt_timeout(&port);
        bmca.trigger_selection();
        PortState::Listening(ListeningPort::new(
            port,
            bmca,
            announce_receipt_timeout,
            self,
        ))
    }

    pub(crate) fn pre_master<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: GrandMasterTrackingBmca<'a, S>,
        policy: QualificationTimeoutPolicy,
    ) -> PortState<'a, P, S> {
        let qualification_timeout = port.timeout(SystemMessage::QualificationTimeout);
        qualification_timeout.restart(policy.duration(self.log_announce_interval));
        PortState::PreMaster(PreMasterPort::new(port, bmca, qualification_timeout, self))
    }

    pub(crate) fn master<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: GrandMasterTrackingBmca<'a, S>,
    ) -> PortState<'a, P, S> {
        // Expiring immediately makes the first announce and sync go out on
        // entry; the cycles then pace themselves.
        let announce_timeout = port.timeout(SystemMessage::AnnounceSendTimeout);
        announce_timeout.restart(Duration::ZERO);
        let sync_timeout = port.timeout(SystemMessage::SyncTimeout);
        sync_timeout.restart(Duration::ZERO);

        PortState::Master(MasterPort::new(
            port,
            bmca,
            AnnounceCycle::new(SequenceId::default(), announce_timeout, self.log_announce_interval),
            SyncCycle::new(SequenceId::default(), sync_timeout, self.log_sync_interval),
            self,
        ))
    }

    pub(crate) fn passive<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: ListeningBmca<'a, S>,
    ) -> PortState<'a, P, S> {
        let announce_receipt_timeout = self.announce_receipt_timeout(&port);
        PortState::Passive(PassivePort::new(
            port,
            bmca,
            announce_receipt_timeout,
            self,
        ))
    }

    pub(crate) fn uncalibrated<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: ParentTrackingBmca<'a, S>,
    ) -> PortState<'a, P, S> {
        let announce_receipt_timeout = self.announce_receipt_timeout(&port);
        let delay_timeout = port.timeout(SystemMessage::DelayRequestTimeout);
        delay_timeout.restart(Duration::ZERO);
        let delay_mechanism =
            EndToEndDelayMechanism::new(delay_timeout, self.log_min_delay_request_interval);

        PortState::Uncalibrated(UncalibratedPort::new(
            port,
            bmca,
            announce_receipt_timeout,
            delay_mechanism,
            self,
        ))
    }

    pub(crate) fn slave<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: ParentTrackingBmca<'a, S>,
        delay_mechanism: EndToEndDelayMechanism<P::Timeout>,
    ) -> PortState<'a, P, S> {
        let announce_receipt_timeout = self.announce_receipt_timeout(&port);
        PortState::Slave(SlavePort::new(
            port,
            bmca,
            announce_receipt_timeout,
            delay_mechanism,
            self,
        ))
    }

    pub(crate) fn faulty<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: ListeningBmca<'a, S>,
    ) -> PortState<'a, P, S> {
        PortState::Faulty(FaultyPort::new(port, bmca, self))
    }

    pub(crate) fn disabled<'a, P: Port, S: ForeignClockRecords>(
        self,
        port: P,
        bmca: ListeningBmca<'a, S>,
    ) -> PortState<'a, P, S> {
        PortState::Disabled(DisabledPort::new(port, bmca, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_announce_receipt_timeout_is_six_seconds() {
        let profile = PortProfile::default();

        assert_eq!(
            profile.announce_receipt_timeout_interval(),
            Duration::from_secs(6)
        );
    }
}
