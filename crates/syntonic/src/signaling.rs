//! Signaling TLV recognition and routing.
//!
//! The engine does not interpret TLVs itself: decoded Signaling messages are
//! routed to registered [`SignalingHandler`]s by TLV type, and unrecognized
//! TLVs are skipped, as required for forward compatibility. Handlers are
//! registered per clock before the ports start.

use crate::port::PortIdentity;

/// One type-length-value entry of a Signaling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tlv_type: u16,
    pub value: &'a [u8],
}

/// Iterates the TLV sequence of a Signaling body.
///
/// The wire codec has already validated the framing; iteration stops cleanly
/// at the end of the slice.
pub struct TlvIter<'a> {
    rest: &'a [u8],
}

impl<'a> TlvIter<'a> {
    pub fn new(tlvs: &'a [u8]) -> Self {
        Self { rest: tlvs }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Tlv<'a>;

    fn next(&mut self) -> Option<Tlv<'a>> {
        if self.rest.len() < 4 {
            return None;
        }
        let tlv_type = u16::from_be_bytes([self.rest[0], self.rest[1]]);
        let len = u16::from_be_bytes([self.rest[2], self.rest[3]]) as usize;
        if self.rest.len() < 4 + len {
            return None;
        }
        let value = &self.rest[4..4 + len];
        self.rest = &self.rest[4 + len..];
        Some(Tlv { tlv_type, value })
    }
}

/// Receives the TLVs of one registered type.
pub trait SignalingHandler {
    fn handle(&self, source: PortIdentity, tlv: Tlv<'_>);
}

const MAX_HANDLERS: usize = 8;

/// Failure to register a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// The registry is full.
    Exhausted,
    /// A handler for that TLV type is already registered.
    Duplicate,
}

/// Fixed-capacity registry mapping TLV types to handlers.
pub struct SignalingHandlers<'a> {
    handlers: [Option<(u16, &'a dyn SignalingHandler)>; MAX_HANDLERS],
}

impl<'a> SignalingHandlers<'a> {
    pub fn new() -> Self {
        Self {
            handlers: [None; MAX_HANDLERS],
        }
    }

    pub fn register(
        &mut self,
        tlv_type: u16,
        handler: &'a dyn SignalingHandler,
    ) -> Result<(), RegistrationError> {
        if self.lookup(tlv_type).is_some() {
            return Err(RegistrationError::Duplicate);
        }
        for slot in self.handlers.iter_mut() {
            if slot.is_none() {
                *slot = Some((tlv_type, handler));
                return Ok(());
            }
        }
        Err(RegistrationError::Exhausted)
    }

    fn lookup(&self, tlv_type: u16) -> Option<&'a dyn SignalingHandler> {
        self.handlers
            .iter()
            .flatten()
            .find(|(registered, _)| *registered == tlv_type)
            .map(|(_, handler)| *handler)
    }

    /// Route each TLV of a Signaling body to its handler; TLVs without one
    /// are skipped.
    pub fn dispatch(&self, source: PortIdentity, tlvs: &[u8]) {
        for tlv in TlvIter::new(tlvs) {
            if let Some(handler) = self.lookup(tlv.tlv_type) {
                handler.handle(source, tlv);
            }
        }
    }
}

impl Default for SignalingHandlers<'_> {
    fn default() -> Self {
        Self::new()
    }
}
