//! Binary codec for the PTP message family.
//!
//! Layouts follow IEEE 1588-2019 §13 (network byte order throughout). The
//! common header is 34 bytes; bodies are fixed-size except Signaling, whose
//! TLV sequence is framed here but passed through opaquely to the handler
//! registry in [`crate::signaling`].
//!
//! `encode` is the exact inverse of `decode` for every value constructible
//! from the data model. Decode failures are recoverable: the caller drops the
//! frame and continues.

use crate::bmca::ForeignClockDS;
use crate::clock::{
    ClockAccuracy, ClockIdentity, ClockQuality, Priority1, Priority2, StepsRemoved,
    TimePropertiesDS, TimeSource,
};
use crate::message::{
    AnnounceMessage, DelayRequestMessage, DelayResponseMessage, EventMessage, FollowUpMessage,
    GeneralMessage, OneStepSyncMessage, SequenceId, TwoStepSyncMessage,
};
use crate::port::{DomainNumber, PortIdentity};
use crate::result::DecodeError;
use crate::time::{CorrectionField, LogMessageInterval, TimeStamp};

const HEADER_LEN: usize = 34;
const VERSION_PTP: u8 = 2;

/// Largest frame the engine itself produces (an Announce).
pub const MAX_FRAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Sync,
    DelayReq,
    FollowUp,
    DelayResp,
    Announce,
    Signaling,
}

impl MessageType {
    fn from_nibble(nibble: u8) -> Option<MessageType> {
        match nibble {
            0x0 => Some(MessageType::Sync),
            0x1 => Some(MessageType::DelayReq),
            0x8 => Some(MessageType::FollowUp),
            0x9 => Some(MessageType::DelayResp),
            0xb => Some(MessageType::Announce),
            0xc => Some(MessageType::Signaling),
            _ => None,
        }
    }

    fn nibble(&self) -> u8 {
        match self {
            MessageType::Sync => 0x0,
            MessageType::DelayReq => 0x1,
            MessageType::FollowUp => 0x8,
            MessageType::DelayResp => 0x9,
            MessageType::Announce => 0xb,
            MessageType::Signaling => 0xc,
        }
    }

    fn control_field(&self) -> u8 {
        match self {
            MessageType::Sync => 0x00,
            MessageType::DelayReq => 0x01,
            MessageType::FollowUp => 0x02,
            MessageType::DelayResp => 0x03,
            _ => 0x05,
        }
    }
}

/// Whether a raw frame carries an event message.
///
/// Transports keep two channels (UDP ports 319/320); this peeks at the
/// message type nibble so hosts can route a frame without decoding it.
pub fn is_event_frame(frame: &[u8]) -> bool {
    matches!(frame.first(), Some(byte) if byte & 0x0f < 0x8)
}

const FLAG_LEAP61: u16 = 0x0001;
const FLAG_LEAP59: u16 = 0x0002;
const FLAG_UTC_OFFSET_VALID: u16 = 0x0004;
const FLAG_PTP_TIMESCALE: u16 = 0x0008;
const FLAG_TIME_TRACEABLE: u16 = 0x0010;
const FLAG_FREQUENCY_TRACEABLE: u16 = 0x0020;
const FLAG_TWO_STEP: u16 = 0x0200;

/// The `flagField` of the common header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u16);

impl Flags {
    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn two_step(&self) -> bool {
        self.0 & FLAG_TWO_STEP != 0
    }

    pub fn with_two_step(mut self, two_step: bool) -> Self {
        if two_step {
            self.0 |= FLAG_TWO_STEP;
        } else {
            self.0 &= !FLAG_TWO_STEP;
        }
        self
    }

    /// The timescale flags carried on Announce.
    pub fn for_time_properties(tp: &TimePropertiesDS) -> Self {
        let mut flags = 0;
        if tp.leap61 {
            flags |= FLAG_LEAP61;
        }
        if tp.leap59 {
            flags |= FLAG_LEAP59;
        }
        if tp.current_utc_offset_valid {
            flags |= FLAG_UTC_OFFSET_VALID;
        }
        if tp.ptp_timescale {
            flags |= FLAG_PTP_TIMESCALE;
        }
        if tp.time_traceable {
            flags |= FLAG_TIME_TRACEABLE;
        }
        if tp.frequency_traceable {
            flags |= FLAG_FREQUENCY_TRACEABLE;
        }
        Flags(flags)
    }

    fn time_properties(&self, current_utc_offset: i16, time_source: TimeSource) -> TimePropertiesDS {
        TimePropertiesDS {
            current_utc_offset,
            current_utc_offset_valid: self.0 & FLAG_UTC_OFFSET_VALID != 0,
            leap59: self.0 & FLAG_LEAP59 != 0,
            leap61: self.0 & FLAG_LEAP61 != 0,
            time_traceable: self.0 & FLAG_TIME_TRACEABLE != 0,
            frequency_traceable: self.0 & FLAG_FREQUENCY_TRACEABLE != 0,
            ptp_timescale: self.0 & FLAG_PTP_TIMESCALE != 0,
            time_source,
        }
    }
}

/// The decoded common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transport_specific: u8,
    pub domain_number: DomainNumber,
    pub flags: Flags,
    pub correction_field: CorrectionField,
    pub source_port_identity: PortIdentity,
    pub sequence_id: SequenceId,
    pub log_message_interval: LogMessageInterval,
}

/// A per-type message body. Signaling TLVs are kept as a validated but
/// uninterpreted byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body<'a> {
    Announce {
        origin_timestamp: TimeStamp,
        current_utc_offset: i16,
        grandmaster_priority1: Priority1,
        grandmaster_clock_quality: ClockQuality,
        grandmaster_priority2: Priority2,
        grandmaster_identity: ClockIdentity,
        steps_removed: StepsRemoved,
        time_source: TimeSource,
    },
    Sync {
        origin_timestamp: TimeStamp,
    },
    DelayReq {
        origin_timestamp: TimeStamp,
    },
    FollowUp {
        precise_origin_timestamp: TimeStamp,
    },
    DelayResp {
        receive_timestamp: TimeStamp,
        requesting_port_identity: PortIdentity,
    },
    Signaling {
        target_port_identity: PortIdentity,
        tlvs: &'a [u8],
    },
}

impl Body<'_> {
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::Announce { .. } => MessageType::Announce,
            Body::Sync { .. } => MessageType::Sync,
            Body::DelayReq { .. } => MessageType::DelayReq,
            Body::FollowUp { .. } => MessageType::FollowUp,
            Body::DelayResp { .. } => MessageType::DelayResp,
            Body::Signaling { .. } => MessageType::Signaling,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Body::Announce { .. } => 30,
            Body::Sync { .. } | Body::DelayReq { .. } | Body::FollowUp { .. } => 10,
            Body::DelayResp { .. } => 20,
            Body::Signaling { tlvs, .. } => 10 + tlvs.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: Header,
    pub body: Body<'a>,
}

fn timestamp_at(buf: &[u8], at: usize) -> TimeStamp {
    let mut wire = [0; 10];
    wire.copy_from_slice(&buf[at..at + 10]);
    TimeStamp::from_wire(&wire)
}

fn port_identity_at(buf: &[u8], at: usize) -> PortIdentity {
    let mut wire = [0; 10];
    wire.copy_from_slice(&buf[at..at + 10]);
    PortIdentity::from_wire(&wire)
}

/// Validate a Signaling TLV sequence: a run of `(type:u16, length:u16,
/// value)` entries exactly filling the slice.
fn validate_tlvs(mut tlvs: &[u8]) -> Result<(), DecodeError> {
    while !tlvs.is_empty() {
        if tlvs.len() < 4 {
            return Err(DecodeError::Truncated);
        }
        let value_len = u16::from_be_bytes([tlvs[2], tlvs[3]]) as usize;
        if tlvs.len() < 4 + value_len {
            return Err(DecodeError::Truncated);
        }
        tlvs = &tlvs[4 + value_len..];
    }
    Ok(())
}

/// Decode one frame addressed to `domain`.
///
/// Frames for other domains are rejected with
/// [`DecodeError::DomainMismatch`]; this is a routing outcome, not a fault.
pub fn decode<'a>(frame: &'a [u8], domain: DomainNumber) -> Result<Packet<'a>, DecodeError> {
    if frame.len() < HEADER_LEN {
        return Err(DecodeError::Truncated);
    }
    if frame[1] & 0x0f != VERSION_PTP {
        return Err(DecodeError::UnsupportedVersion);
    }
    let message_length = u16::from_be_bytes([frame[2], frame[3]]) as usize;
    if message_length != frame.len() {
        return Err(DecodeError::Truncated);
    }
    if frame[4] != domain.raw() {
        return Err(DecodeError::DomainMismatch);
    }
    let message_type =
        MessageType::from_nibble(frame[0] & 0x0f).ok_or(DecodeError::UnknownMessageType)?;

    let header = Header {
        transport_specific: frame[0] >> 4,
        domain_number: domain,
        flags: Flags(u16::from_be_bytes([frame[6], frame[7]])),
        correction_field: CorrectionField::new(i64::from_be_bytes([
            frame[8], frame[9], frame[10], frame[11], frame[12], frame[13], frame[14], frame[15],
        ])),
        source_port_identity: port_identity_at(frame, 20),
        sequence_id: SequenceId::new(u16::from_be_bytes([frame[30], frame[31]])),
        log_message_interval: LogMessageInterval::new(frame[33] as i8),
    };

    let body = &frame[HEADER_LEN..];
    let body = match message_type {
        MessageType::Announce => {
            if body.len() != 30 {
                return Err(DecodeError::Truncated);
            }
            Body::Announce {
                origin_timestamp: timestamp_at(body, 0),
                current_utc_offset: i16::from_be_bytes([body[10], body[11]]),
                grandmaster_priority1: Priority1::new(body[13]),
                grandmaster_clock_quality: ClockQuality::new(
                    body[14],
                    ClockAccuracy::new(body[15]),
                    u16::from_be_bytes([body[16], body[17]]),
                ),
                grandmaster_priority2: Priority2::new(body[18]),
                grandmaster_identity: ClockIdentity::new(&[
                    body[19], body[20], body[21], body[22], body[23], body[24], body[25], body[26],
                ]),
                steps_removed: StepsRemoved::new(u16::from_be_bytes([body[27], body[28]])),
                time_source: TimeSource::new(body[29]),
            }
        }
        MessageType::Sync | MessageType::DelayReq | MessageType::FollowUp => {
            if body.len() != 10 {
                return Err(DecodeError::Truncated);
            }
            let timestamp = timestamp_at(body, 0);
            match message_type {
                MessageType::Sync => Body::Sync {
                    origin_timestamp: timestamp,
                },
                MessageType::DelayReq => Body::DelayReq {
                    origin_timestamp: timestamp,
                },
                _ => Body::FollowUp {
                    precise_origin_timestamp: timestamp,
                },
            }
        }
        MessageType::DelayResp => {
            if body.len() != 20 {
                return Err(DecodeError::Truncated);
            }
            Body::DelayResp {
                receive_timestamp: timestamp_at(body, 0),
                requesting_port_identity: port_identity_at(body, 10),
            }
        }
        MessageType::Signaling => {
            if body.len() < 10 {
                return Err(DecodeError::Truncated);
            }
            let tlvs = &body[10..];
            validate_tlvs(tlvs)?;
            Body::Signaling {
                target_port_identity: port_identity_at(body, 0),
                tlvs,
            }
        }
    };

    Ok(Packet { header, body })
}

/// Encode a packet into `buf`, returning the frame length.
///
/// Panics if `buf` is too small; engine-produced frames always fit in
/// [`MAX_FRAME_LEN`].
pub fn encode(packet: &Packet<'_>, buf: &mut [u8]) -> usize {
    let message_type = packet.body.message_type();
    let len = HEADER_LEN + packet.body.body_len();
    assert!(buf.len() >= len);

    let header = &packet.header;
    buf[0] = (header.transport_specific << 4) | message_type.nibble();
    buf[1] = VERSION_PTP;
    buf[2..4].copy_from_slice(&(len as u16).to_be_bytes());
    buf[4] = header.domain_number.raw();
    buf[5] = 0;
    buf[6..8].copy_from_slice(&header.flags.raw().to_be_bytes());
    buf[8..16].copy_from_slice(&header.correction_field.scaled_nanos().to_be_bytes());
    buf[16..20].copy_from_slice(&0u32.to_be_bytes());
    buf[20..30].copy_from_slice(&header.source_port_identity.to_wire());
    buf[30..32].copy_from_slice(&header.sequence_id.raw().to_be_bytes());
    buf[32] = message_type.control_field();
    buf[33] = header.log_message_interval.raw() as u8;

    let body = &mut buf[HEADER_LEN..len];
    match packet.body {
        Body::Announce {
            origin_timestamp,
            current_utc_offset,
            grandmaster_priority1,
            grandmaster_clock_quality,
            grandmaster_priority2,
            grandmaster_identity,
            steps_removed,
            time_source,
        } => {
            body[0..10].copy_from_slice(&origin_timestamp.to_wire());
            body[10..12].copy_from_slice(&current_utc_offset.to_be_bytes());
            body[12] = 0;
            body[13] = grandmaster_priority1.raw();
            body[14] = grandmaster_clock_quality.clock_class;
            body[15] = grandmaster_clock_quality.clock_accuracy.raw();
            body[16..18]
                .copy_from_slice(&grandmaster_clock_quality.offset_scaled_log_variance.to_be_bytes());
            body[18] = grandmaster_priority2.raw();
            body[19..27].copy_from_slice(grandmaster_identity.as_bytes());
            body[27..29].copy_from_slice(&steps_removed.raw().to_be_bytes());
            body[29] = time_source.raw();
        }
        Body::Sync { origin_timestamp } | Body::DelayReq { origin_timestamp } => {
            body[0..10].copy_from_slice(&origin_timestamp.to_wire());
        }
        Body::FollowUp {
            precise_origin_timestamp,
        } => {
            body[0..10].copy_from_slice(&precise_origin_timestamp.to_wire());
        }
        Body::DelayResp {
            receive_timestamp,
            requesting_port_identity,
        } => {
            body[0..10].copy_from_slice(&receive_timestamp.to_wire());
            body[10..20].copy_from_slice(&requesting_port_identity.to_wire());
        }
        Body::Signaling {
            target_port_identity,
            tlvs,
        } => {
            body[0..10].copy_from_slice(&target_port_identity.to_wire());
            body[10..].copy_from_slice(tlvs);
        }
    }

    len
}

/// A decoded frame classified for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Event {
        source: PortIdentity,
        msg: EventMessage,
    },
    General {
        source: PortIdentity,
        msg: GeneralMessage,
    },
    Signaling {
        source: PortIdentity,
        target: PortIdentity,
        tlvs: &'a [u8],
    },
}

/// Classify a decoded packet into the typed message family.
pub fn inbound(packet: Packet<'_>) -> Inbound<'_> {
    let header = packet.header;
    let source = header.source_port_identity;

    match packet.body {
        Body::Sync { origin_timestamp } => {
            let msg = if header.flags.two_step() {
                EventMessage::TwoStepSync(
                    TwoStepSyncMessage::new(header.sequence_id, header.log_message_interval)
                        .with_correction(header.correction_field),
                )
            } else {
                EventMessage::OneStepSync(
                    OneStepSyncMessage::new(
                        header.sequence_id,
                        header.log_message_interval,
                        origin_timestamp,
                    )
                    .with_correction(header.correction_field),
                )
            };
            Inbound::Event { source, msg }
        }
        Body::DelayReq { .. } => Inbound::Event {
            source,
            msg: EventMessage::DelayReq(DelayRequestMessage::new(header.sequence_id)),
        },
        Body::FollowUp {
            precise_origin_timestamp,
        } => Inbound::General {
            source,
            msg: GeneralMessage::FollowUp(
                FollowUpMessage::new(
                    header.sequence_id,
                    header.log_message_interval,
                    precise_origin_timestamp,
                )
                .with_correction(header.correction_field),
            ),
        },
        Body::DelayResp {
            receive_timestamp,
            requesting_port_identity,
        } => Inbound::General {
            source,
            msg: GeneralMessage::DelayResp(
                DelayResponseMessage::new(
                    header.sequence_id,
                    header.log_message_interval,
                    receive_timestamp,
                    requesting_port_identity,
                )
                .with_correction(header.correction_field),
            ),
        },
        Body::Announce {
            origin_timestamp,
            current_utc_offset,
            grandmaster_priority1,
            grandmaster_clock_quality,
            grandmaster_priority2,
            grandmaster_identity,
            steps_removed,
            time_source,
        } => {
            let mut msg = AnnounceMessage::new(
                header.sequence_id,
                header.log_message_interval,
                ForeignClockDS::new(
                    grandmaster_priority1,
                    grandmaster_clock_quality,
                    grandmaster_priority2,
                    grandmaster_identity,
                    steps_removed,
                ),
                header.flags.time_properties(current_utc_offset, time_source),
            );
            msg.origin_timestamp = origin_timestamp;
            Inbound::General {
                source,
                msg: GeneralMessage::Announce(msg),
            }
        }
        Body::Signaling {
            target_port_identity,
            tlvs,
        } => Inbound::Signaling {
            source,
            target: target_port_identity,
            tlvs,
        },
    }
}

fn header(
    source: PortIdentity,
    domain: DomainNumber,
    sequence_id: SequenceId,
    log_message_interval: LogMessageInterval,
    correction: CorrectionField,
    flags: Flags,
) -> Header {
    Header {
        transport_specific: 0,
        domain_number: domain,
        flags,
        correction_field: correction,
        source_port_identity: source,
        sequence_id,
        log_message_interval,
    }
}

/// Build the wire packet for an outgoing event message.
pub fn event_packet(
    source: PortIdentity,
    domain: DomainNumber,
    msg: &EventMessage,
) -> Packet<'static> {
    match *msg {
        EventMessage::OneStepSync(sync) => Packet {
            header: header(
                source,
                domain,
                sync.sequence_id,
                sync.log_message_interval,
                sync.correction,
                Flags::default().with_two_step(false),
            ),
            body: Body::Sync {
                origin_timestamp: sync.origin_timestamp,
            },
        },
        EventMessage::TwoStepSync(sync) => Packet {
            header: header(
                source,
                domain,
                sync.sequence_id,
                sync.log_message_interval,
                sync.correction,
                Flags::default().with_two_step(true),
            ),
            body: Body::Sync {
                origin_timestamp: TimeStamp::ZERO,
            },
        },
        EventMessage::DelayReq(req) => Packet {
            header: header(
                source,
                domain,
                req.sequence_id,
                LogMessageInterval::UNSPECIFIED,
                CorrectionField::ZERO,
                Flags::default(),
            ),
            body: Body::DelayReq {
                origin_timestamp: TimeStamp::ZERO,
            },
        },
    }
}

/// Build the wire packet for an outgoing general message.
pub fn general_packet(
    source: PortIdentity,
    domain: DomainNumber,
    msg: &GeneralMessage,
) -> Packet<'static> {
    match *msg {
        GeneralMessage::Announce(announce) => Packet {
            header: header(
                source,
                domain,
                announce.sequence_id,
                announce.log_message_interval,
                CorrectionField::ZERO,
                Flags::for_time_properties(&announce.time_properties),
            ),
            body: Body::Announce {
                origin_timestamp: announce.origin_timestamp,
                current_utc_offset: announce.time_properties.current_utc_offset,
                grandmaster_priority1: announce.grandmaster.grandmaster_priority1,
                grandmaster_clock_quality: announce.grandmaster.grandmaster_clock_quality,
                grandmaster_priority2: announce.grandmaster.grandmaster_priority2,
                grandmaster_identity: announce.grandmaster.grandmaster_identity,
                steps_removed: announce.grandmaster.steps_removed,
                time_source: announce.time_properties.time_source,
            },
        },
        GeneralMessage::FollowUp(follow_up) => Packet {
            header: header(
                source,
                domain,
                follow_up.sequence_id,
                follow_up.log_message_interval,
                follow_up.correction,
                Flags::default(),
            ),
            body: Body::FollowUp {
                precise_origin_timestamp: follow_up.precise_origin_timestamp,
            },
        },
        GeneralMessage::DelayResp(resp) => Packet {
            header: header(
                source,
                domain,
                resp.sequence_id,
                resp.log_message_interval,
                resp.correction,
                Flags::default(),
            ),
            body: Body::DelayResp {
                receive_timestamp: resp.receive_timestamp,
                requesting_port_identity: resp.requesting_port_identity,
            },
        },
    }
}
