//! Bounded in-memory history of finished runs.
//!
//! Records are kept most-recent-first. When the ledger is full, appending
//! evicts the oldest record. Readers always get an owned snapshot, so later
//! appends never show up in a list that was already handed out.

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{OpsError, Result};
use crate::run::RunRecord;

pub const DEFAULT_CAPACITY: usize = 50;

pub struct RunLedger {
    capacity: usize,
    records: RwLock<VecDeque<RunRecord>>,
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RunLedger {
    /// Create a ledger holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend `record`, evicting the oldest entry if at capacity.
    pub fn append(&self, record: RunRecord) {
        let mut records = self.write();
        while records.len() >= self.capacity {
            records.pop_back();
        }
        records.push_front(record);
    }

    /// Snapshot of all records, most recent first.
    pub fn list(&self) -> Vec<RunRecord> {
        self.read().iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Result<RunRecord> {
        self.read()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| OpsError::RunNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A writer that panicked mid-append leaves the deque structurally valid,
    // so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, VecDeque<RunRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<RunRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{RunOutcome, RunStatus};
    use std::sync::Arc;

    fn finished(action: &str) -> RunRecord {
        RunRecord::start(action, false).finish(
            RunOutcome::Exited {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            },
            0.0,
        )
    }

    #[test]
    fn list_is_most_recent_first() {
        let ledger = RunLedger::default();
        let first = finished("ping");
        let second = finished("restart-service");
        ledger.append(first.clone());
        ledger.append(second.clone());

        let ids: Vec<String> = ledger.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let ledger = RunLedger::default();
        let oldest = finished("ping");
        ledger.append(oldest.clone());
        for _ in 0..50 {
            ledger.append(finished("ping"));
        }

        assert_eq!(ledger.len(), 50);
        assert!(ledger.list().iter().all(|r| r.id != oldest.id));
        assert!(matches!(ledger.get(&oldest.id), Err(OpsError::RunNotFound(_))));
    }

    #[test]
    fn get_returns_matching_record() {
        let ledger = RunLedger::new(3);
        let rec = finished("submit-job");
        ledger.append(rec.clone());
        let got = ledger.get(&rec.id).unwrap();
        assert_eq!(got.action_id, "submit-job");
        assert_eq!(got.status, RunStatus::Success);
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let ledger = RunLedger::new(5);
        ledger.append(finished("ping"));
        let snapshot = ledger.list();
        ledger.append(finished("ping"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let ledger = RunLedger::new(0);
        ledger.append(finished("ping"));
        ledger.append(finished("ping"));
        assert_eq!(ledger.capacity(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn concurrent_appends_respect_capacity() {
        let ledger = Arc::new(RunLedger::new(20));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        ledger.append(finished("ping"));
                        assert!(ledger.list().len() <= 20);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.len(), 20);
    }
}
