//! End-to-end delay mechanism: assembles Sync/Follow_Up and
//! Delay_Req/Delay_Resp exchanges into [`ServoSample`]s.
//!
//! Both exchanges are latest-value windows: a new Sync displaces an
//! incomplete two-step exchange, and a new Delay_Req abandons an unanswered
//! one. Correction fields accumulated by transparent clocks are subtracted
//! from the respective path direction per IEEE 1588-2019 §11.3.
//!
//! Timestamps t1..t4: t1 Sync egress at the master, t2 Sync ingress here,
//! t3 Delay_Req egress here, t4 Delay_Req ingress at the master.

use crate::message::{
    DelayRequestMessage, DelayResponseMessage, FollowUpMessage, OneStepSyncMessage, SequenceId,
    TwoStepSyncMessage,
};
use crate::port::Timeout;
use crate::servo::ServoSample;
use crate::time::{CorrectionField, LogInterval, TimeInterval, TimeStamp};

#[derive(Debug, Clone, Copy)]
struct PendingSync {
    sequence_id: SequenceId,
    ingress_timestamp: TimeStamp,
    correction: CorrectionField,
}

#[derive(Debug, Clone, Copy)]
struct SyncMeasurement {
    t1: TimeStamp,
    t2: TimeStamp,
    correction: TimeInterval,
}

/// The master-to-slave half of the measurement.
#[derive(Debug, Default, Clone, Copy)]
struct SyncExchange {
    pending: Option<PendingSync>,
    complete: Option<SyncMeasurement>,
}

impl SyncExchange {
    fn record_one_step(&mut self, msg: &OneStepSyncMessage, ingress_timestamp: TimeStamp) {
        self.pending = None;
        self.complete = Some(SyncMeasurement {
            t1: msg.origin_timestamp,
            t2: ingress_timestamp,
            correction: msg.correction.interval(),
        });
    }

    fn record_two_step(&mut self, msg: &TwoStepSyncMessage, ingress_timestamp: TimeStamp) {
        self.pending = Some(PendingSync {
            sequence_id: msg.sequence_id,
            ingress_timestamp,
            correction: msg.correction,
        });
    }

    fn record_follow_up(&mut self, msg: &FollowUpMessage) {
        let Some(pending) = self.pending else {
            return;
        };
        if pending.sequence_id != msg.sequence_id {
            return;
        }
        self.pending = None;
        self.complete = Some(SyncMeasurement {
            t1: msg.precise_origin_timestamp,
            t2: pending.ingress_timestamp,
            correction: pending.correction.interval() + msg.correction.interval(),
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingDelay {
    sequence_id: SequenceId,
    t3: TimeStamp,
}

#[derive(Debug, Clone, Copy)]
struct DelayMeasurement {
    t3: TimeStamp,
    t4: TimeStamp,
    correction: TimeInterval,
}

/// The slave-to-master half of the measurement.
#[derive(Debug, Default, Clone, Copy)]
struct DelayExchange {
    pending: Option<PendingDelay>,
    complete: Option<DelayMeasurement>,
}

impl DelayExchange {
    fn record_request(&mut self, msg: &DelayRequestMessage, egress_timestamp: TimeStamp) {
        self.pending = Some(PendingDelay {
            sequence_id: msg.sequence_id,
            t3: egress_timestamp,
        });
    }

    fn record_response(&mut self, msg: &DelayResponseMessage) {
        let Some(pending) = self.pending else {
            return;
        };
        if pending.sequence_id != msg.sequence_id {
            return;
        }
        self.pending = None;
        self.complete = Some(DelayMeasurement {
            t3: pending.t3,
            t4: msg.receive_timestamp,
            correction: msg.correction.interval(),
        });
    }
}

/// Owns the Delay_Req cadence of a slaved port.
struct DelayCycle<T> {
    sequence_id: SequenceId,
    timeout: T,
    log_interval: LogInterval,
}

impl<T: Timeout> DelayCycle<T> {
    fn next_request(&mut self) -> DelayRequestMessage {
        self.sequence_id = self.sequence_id.next();
        self.timeout.restart(self.log_interval.interval());
        DelayRequestMessage::new(self.sequence_id)
    }
}

/// The delay mechanism of one slaved port.
///
/// Created on entry to UNCALIBRATED and dropped (cancelling the request
/// timer) when the port leaves the slave branch.
pub struct EndToEndDelayMechanism<T> {
    delay_cycle: DelayCycle<T>,
    sync: SyncExchange,
    delay: DelayExchange,
}

impl<T: Timeout> EndToEndDelayMechanism<T> {
    /// `timeout` must post [`crate::message::SystemMessage::DelayRequestTimeout`]
    /// to the port's queue.
    pub fn new(timeout: T, log_min_delay_req_interval: LogInterval) -> Self {
        Self {
            delay_cycle: DelayCycle {
                sequence_id: SequenceId::default(),
                timeout,
                log_interval: log_min_delay_req_interval,
            },
            sync: SyncExchange::default(),
            delay: DelayExchange::default(),
        }
    }

    /// Produce the next Delay_Req and restart the request timer. Any
    /// unanswered previous request stays pending until displaced by the
    /// egress timestamp of this one.
    pub fn delay_request(&mut self) -> DelayRequestMessage {
        self.delay_cycle.next_request()
    }

    pub fn record_one_step_sync(&mut self, msg: &OneStepSyncMessage, ingress_timestamp: TimeStamp) {
        self.sync.record_one_step(msg, ingress_timestamp);
    }

    pub fn record_two_step_sync(&mut self, msg: &TwoStepSyncMessage, ingress_timestamp: TimeStamp) {
        self.sync.record_two_step(msg, ingress_timestamp);
    }

    pub fn record_follow_up(&mut self, msg: &FollowUpMessage) {
        self.sync.record_follow_up(msg);
    }

    /// Feed the egress timestamp of an own Delay_Req. Timestamps for
    /// superseded requests are dropped.
    pub fn record_delay_request(&mut self, msg: &DelayRequestMessage, egress_timestamp: TimeStamp) {
        if msg.sequence_id != self.delay_cycle.sequence_id {
            return;
        }
        self.delay.record_request(msg, egress_timestamp);
    }

    pub fn record_delay_response(&mut self, msg: &DelayResponseMessage) {
        self.delay.record_response(msg);
    }

    /// The current measurement, once both exchange halves have completed.
    ///
    /// Consumes the sync half so each Sync disciplines the clock once; the
    /// delay half is reused until the next Delay_Req/Delay_Resp exchange
    /// refreshes it.
    pub fn take_sample(&mut self) -> Option<ServoSample> {
        let sync = self.sync.complete?;
        let delay = self.delay.complete?;
        self.sync.complete = None;

        let master_to_slave = (sync.t2 - sync.t1) - sync.correction;
        let slave_to_master = (delay.t4 - delay.t3) - delay.correction;
        let mean_path_delay = (master_to_slave + slave_to_master).half();

        Some(ServoSample {
            offset_from_master: master_to_slave - mean_path_delay,
            mean_path_delay,
            ingress_timestamp: sync.t2,
        })
    }
}
