//! The typed PTP message family.
//!
//! Messages are tagged enums decoded once from the wire and matched
//! exhaustively. [`EventMessage`]s are timestamped at ingress/egress,
//! [`GeneralMessage`]s are not. [`SystemMessage`]s never appear on the wire:
//! they are timer expirations and infrastructure notifications delivered
//! through the host's serialized event queue.

use crate::bmca::ForeignClockDS;
use crate::clock::TimePropertiesDS;
use crate::port::PortIdentity;
use crate::time::{CorrectionField, LogMessageInterval, TimeStamp};

/// Monotonically increasing (wrapping) per-message-type sequence number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SequenceId(u16);

impl SequenceId {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn next(&self) -> SequenceId {
        SequenceId(self.0.wrapping_add(1))
    }
}

impl From<u16> for SequenceId {
    fn from(value: u16) -> Self {
        SequenceId(value)
    }
}

/// A Sync whose origin timestamp is inserted on the fly by a one-step clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneStepSyncMessage {
    pub sequence_id: SequenceId,
    pub log_message_interval: LogMessageInterval,
    pub origin_timestamp: TimeStamp,
    pub correction: CorrectionField,
}

impl OneStepSyncMessage {
    pub fn new(
        sequence_id: SequenceId,
        log_message_interval: LogMessageInterval,
        origin_timestamp: TimeStamp,
    ) -> Self {
        Self {
            sequence_id,
            log_message_interval,
            origin_timestamp,
            correction: CorrectionField::ZERO,
        }
    }

    pub fn with_correction(mut self, correction: CorrectionField) -> Self {
        self.correction = correction;
        self
    }
}

/// A Sync from a two-step clock; the precise origin follows in a FollowUp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoStepSyncMessage {
    pub sequence_id: SequenceId,
    pub log_message_interval: LogMessageInterval,
    pub correction: CorrectionField,
}

impl TwoStepSyncMessage {
    pub fn new(sequence_id: SequenceId, log_message_interval: LogMessageInterval) -> Self {
        Self {
            sequence_id,
            log_message_interval,
            correction: CorrectionField::ZERO,
        }
    }

    pub fn with_correction(mut self, correction: CorrectionField) -> Self {
        self.correction = correction;
        self
    }

    /// The FollowUp completing this two-step Sync once its egress timestamp
    /// is known.
    pub fn follow_up(&self, precise_origin_timestamp: TimeStamp) -> FollowUpMessage {
        FollowUpMessage::new(
            self.sequence_id,
            self.log_message_interval,
            precise_origin_timestamp,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRequestMessage {
    pub sequence_id: SequenceId,
}

impl DelayRequestMessage {
    pub fn new(sequence_id: SequenceId) -> Self {
        Self { sequence_id }
    }

    /// The DelayResp answering this request.
    pub fn response(
        &self,
        log_message_interval: LogMessageInterval,
        receive_timestamp: TimeStamp,
        requesting_port_identity: PortIdentity,
    ) -> DelayResponseMessage {
        DelayResponseMessage::new(
            self.sequence_id,
            log_message_interval,
            receive_timestamp,
            requesting_port_identity,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpMessage {
    pub sequence_id: SequenceId,
    pub log_message_interval: LogMessageInterval,
    pub precise_origin_timestamp: TimeStamp,
    pub correction: CorrectionField,
}

impl FollowUpMessage {
    pub fn new(
        sequence_id: SequenceId,
        log_message_interval: LogMessageInterval,
        precise_origin_timestamp: TimeStamp,
    ) -> Self {
        Self {
            sequence_id,
            log_message_interval,
            precise_origin_timestamp,
            correction: CorrectionField::ZERO,
        }
    }

    pub fn with_correction(mut self, correction: CorrectionField) -> Self {
        self.correction = correction;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayResponseMessage {
    pub sequence_id: SequenceId,
    pub log_message_interval: LogMessageInterval,
    pub receive_timestamp: TimeStamp,
    pub requesting_port_identity: PortIdentity,
    pub correction: CorrectionField,
}

impl DelayResponseMessage {
    pub fn new(
        sequence_id: SequenceId,
        log_message_interval: LogMessageInterval,
        receive_timestamp: TimeStamp,
        requesting_port_identity: PortIdentity,
    ) -> Self {
        Self {
            sequence_id,
            log_message_interval,
            receive_timestamp,
            requesting_port_identity,
            correction: CorrectionField::ZERO,
        }
    }

    pub fn with_correction(mut self, correction: CorrectionField) -> Self {
        self.correction = correction;
        self
    }
}

/// An Announce: the sender's claim about the grandmaster it is synchronized
/// to, plus the properties of that grandmaster's timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceMessage {
    pub sequence_id: SequenceId,
    pub log_message_interval: LogMessageInterval,
    pub origin_timestamp: TimeStamp,
    pub grandmaster: ForeignClockDS,
    pub time_properties: TimePropertiesDS,
}

impl AnnounceMessage {
    pub fn new(
        sequence_id: SequenceId,
        log_message_interval: LogMessageInterval,
        grandmaster: ForeignClockDS,
        time_properties: TimePropertiesDS,
    ) -> Self {
        Self {
            sequence_id,
            log_message_interval,
            origin_timestamp: TimeStamp::ZERO,
            grandmaster,
            time_properties,
        }
    }
}

/// Messages that are timestamped at ingress and egress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMessage {
    OneStepSync(OneStepSyncMessage),
    TwoStepSync(TwoStepSyncMessage),
    DelayReq(DelayRequestMessage),
}

/// Messages that carry protocol data but need no timestamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralMessage {
    Announce(AnnounceMessage),
    FollowUp(FollowUpMessage),
    DelayResp(DelayResponseMessage),
}

/// An egress timestamp reported by the timestamping infrastructure for a
/// previously sent event message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampMessage {
    pub event_msg: EventMessage,
    pub egress_timestamp: TimeStamp,
}

impl TimestampMessage {
    pub fn new(event_msg: EventMessage, egress_timestamp: TimeStamp) -> Self {
        Self {
            event_msg,
            egress_timestamp,
        }
    }
}

/// Timer expirations and infrastructure notifications, delivered through the
/// host's serialized per-clock event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessage {
    /// The port's HAL resources are ready.
    Initialized,
    AnnounceReceiptTimeout,
    AnnounceSendTimeout,
    SyncTimeout,
    DelayRequestTimeout,
    QualificationTimeout,
    Timestamp(TimestampMessage),
}
