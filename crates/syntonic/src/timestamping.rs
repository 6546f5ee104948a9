//! Egress timestamping boundary.
//!
//! Event messages are timestamped when they leave the port. The engine does
//! not wait for the timestamp inline: after a successful send it hands the
//! message to [`TxTimestamping::stamp_egress`], and the infrastructure later
//! reports the captured timestamp back through
//! [`crate::message::SystemMessage::Timestamp`] on the port's event queue.
//!
//! This indirection allows hardware timestamping backends (which deliver the
//! timestamp asynchronously, e.g. from a NIC error queue) and software
//! fallbacks (which can read the clock immediately) to present the same
//! interface.

use crate::message::EventMessage;

pub trait TxTimestamping {
    /// Request the egress timestamp for a just-sent event message.
    fn stamp_egress(&self, msg: EventMessage);
}

impl<X: TxTimestamping> TxTimestamping for &X {
    fn stamp_egress(&self, msg: EventMessage) {
        (*self).stamp_egress(msg)
    }
}
