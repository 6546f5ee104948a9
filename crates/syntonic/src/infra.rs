//! `std` storage backends for the engine's pluggable collections.

extern crate std;

use std::vec::Vec;

use crate::bmca::{ForeignClockRecord, ForeignClockRecords, RecordUpdate, UpdateResult};
use crate::port::PortIdentity;
use crate::time::Instant;

/// Unbounded foreign-master storage backed by a `Vec`.
#[derive(Default)]
pub struct ForeignClockRecordsVec {
    records: Vec<ForeignClockRecord>,
}

impl ForeignClockRecordsVec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ForeignClockRecords for ForeignClockRecordsVec {
    fn update<F>(&mut self, source: &PortIdentity, f: F) -> UpdateResult
    where
        F: FnOnce(&mut ForeignClockRecord) -> RecordUpdate,
    {
        match self
            .records
            .iter_mut()
            .find(|record| record.same_source_as(source))
        {
            Some(record) => UpdateResult::Applied(f(record)),
            None => UpdateResult::NotFound,
        }
    }

    fn insert(&mut self, record: ForeignClockRecord) {
        self.records.push(record);
    }

    fn remove_stale(&mut self, now: Instant, announce_receipt_timeout: u8) {
        self.records
            .retain(|record| !record.is_stale(now, announce_receipt_timeout));
    }

    fn records(&self) -> &[ForeignClockRecord] {
        &self.records
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}
