//! Crate-wide error taxonomy.
//!
//! Every failure that crosses the engine boundary is a typed value. Decode
//! failures drop the offending message, HAL failures are transient and
//! retried on the next scheduled attempt; neither terminates the engine.

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Decode(DecodeError),
    Hal(HalError),
}

/// A malformed or inapplicable frame. The caller drops the frame and
/// continues; no engine state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is shorter than its header or declared length requires.
    Truncated,
    /// The versionPTP field is not a supported version.
    UnsupportedVersion,
    /// The frame belongs to a different PTP domain than the receiving port.
    DomainMismatch,
    /// The messageType nibble does not name a known message.
    UnknownMessageType,
}

/// A transport or clock I/O failure reported by the host HAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    Send,
    Adjust,
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Error::Decode(value)
    }
}

impl From<HalError> for Error {
    fn from(value: HalError) -> Self {
        Error::Hal(value)
    }
}
