//! Bounded foreign-master storage for allocator-free targets.

use crate::bmca::{ForeignClockRecord, ForeignClockRecords, RecordUpdate, UpdateResult};
use crate::port::PortIdentity;
use crate::time::Instant;

/// Foreign-master storage bounded to `N` records.
///
/// When full, a new master evicts the worst stored one if it outranks it;
/// otherwise the newcomer is dropped. An evicted master that is still
/// announcing simply competes again with a fresh record.
pub struct HeaplessForeignClockRecords<const N: usize> {
    records: heapless::Vec<ForeignClockRecord, N>,
}

impl<const N: usize> HeaplessForeignClockRecords<N> {
    pub fn new() -> Self {
        Self {
            records: heapless::Vec::new(),
        }
    }

    fn worst_index(&self) -> Option<usize> {
        let mut worst: Option<usize> = None;
        for (index, record) in self.records.iter().enumerate() {
            match worst {
                None => worst = Some(index),
                Some(current) => {
                    if self.records[current].ds().outranks(record.ds()) {
                        worst = Some(index);
                    }
                }
            }
        }
        worst
    }
}

impl<const N: usize> Default for HeaplessForeignClockRecords<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ForeignClockRecords for HeaplessForeignClockRecords<N> {
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
        if let Err(record) = self.records.push(record) {
            let Some(worst) = self.worst_index() else {
                return;
            };
            if record.ds().outranks(self.records[worst].ds()) {
                self.records[worst] = record;
            }
        }
    }

    fn remove_stale(&mut self, now: Instant, multiplier: u8) {
        self.records
            .retain(|record| !record.is_stale(now, multiplier));
    }

    fn records(&self) -> &[ForeignClockRecord] {
        &self.records
    }

    fn clear(&mut self) {
        self.records.clear();
    }
}
