//! Software timestamping against a node's own clock.
//!
//! The core expects egress timestamps to come back asynchronously through its
//! system queue. With no hardware assist the best available stamp is the
//! clock reading right after the send, so [`ClockTimestamping`] reads the
//! clock and posts the `Timestamp` system message immediately.

use tokio::sync::mpsc;

use syntonic::clock::Clock;
use syntonic::message::{EventMessage, SystemMessage, TimestampMessage};
use syntonic::port::PortNumber;
use syntonic::time::TimeStamp;
use syntonic::timestamping::TxTimestamping;

/// Ingress timestamping boundary: stamps a just-received frame.
pub trait RxTimestamping {
    fn ingress_stamp(&self) -> TimeStamp;
}

impl<X: RxTimestamping> RxTimestamping for &X {
    fn ingress_stamp(&self) -> TimeStamp {
        (*self).ingress_stamp()
    }
}

/// Software tx/rx timestamping that reads `clock` at the send or receive
/// call site.
pub struct ClockTimestamping<C: Clock> {
    clock: C,
    port: PortNumber,
    system_tx: mpsc::UnboundedSender<(PortNumber, SystemMessage)>,
}

impl<C: Clock> ClockTimestamping<C> {
    pub fn new(
        clock: C,
        port: PortNumber,
        system_tx: mpsc::UnboundedSender<(PortNumber, SystemMessage)>,
    ) -> Self {
        Self {
            clock,
            port,
            system_tx,
        }
    }
}

impl<C: Clock> TxTimestamping for ClockTimestamping<C> {
    fn stamp_egress(&self, msg: EventMessage) {
        let timestamp = TimestampMessage {
            event_msg: msg,
            egress_timestamp: self.clock.now(),
        };
        let _ = self
            .system_tx
            .send((self.port, SystemMessage::Timestamp(timestamp)));
    }
}

impl<C: Clock> RxTimestamping for ClockTimestamping<C> {
    fn ingress_stamp(&self) -> TimeStamp {
        self.clock.now()
    }
}
