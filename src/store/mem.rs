//! In-memory record store backed by DashMap.
//!
//! Same semantics as the redb store, without persistence. A batch holds a
//! mutex for its duration so concurrent batches apply one after another,
//! the way redb serializes write transactions.

use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;

use crate::model::NormalizedRecord;
use crate::store::{
    RecordStore, StoreResult, StoredRecord, UpsertReport, apply_record, validate_record,
};

/// Concurrent in-memory record store.
#[derive(Debug, Default)]
pub struct MemRecordStore {
    rows: DashMap<String, StoredRecord>,
    write_lock: Mutex<()>,
}

impl MemRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all identifiers, sorted (not consistent under concurrent writes).
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rows.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl RecordStore for MemRecordStore {
    fn upsert_batch(&self, records: &[NormalizedRecord]) -> StoreResult<UpsertReport> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Utc::now();
        let mut report = UpsertReport::default();

        for record in records {
            if let Err(reason) = validate_record(record) {
                tracing::warn!(id = %record.id, reason, "record rejected");
                report.fail(&record.id, reason);
                continue;
            }
            let existing = self.rows.get(&record.id).map(|row| row.value().clone());
            let (row, outcome) = apply_record(existing, record, now);
            if let Some(row) = row {
                self.rows.insert(record.id.clone(), row);
            }
            report.record(outcome);
        }
        Ok(report)
    }

    fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        Ok(self.rows.get(id).map(|row| row.value().clone()))
    }

    fn len(&self) -> StoreResult<u64> {
        Ok(self.rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str) -> NormalizedRecord {
        NormalizedRecord {
            id: id.into(),
            title: format!("Title {id}"),
            ..Default::default()
        }
    }

    #[test]
    fn deletion_never_creates_a_row() {
        let store = MemRecordStore::new();
        let report = store
            .upsert_batch(&[NormalizedRecord::tombstone("ghost", None)])
            .unwrap();
        assert_eq!(report.dropped, 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn reapplying_a_batch_is_idempotent() {
        let store = MemRecordStore::new();
        let batch = vec![article("a"), article("b")];
        store.upsert_batch(&batch).unwrap();
        let first = store.get("a").unwrap().unwrap();

        let report = store.upsert_batch(&batch).unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(store.len().unwrap(), 2);
        let again = store.get("a").unwrap().unwrap();
        assert_eq!(again.title, first.title);
        assert_eq!(again.first_seen_at, first.first_seen_at);
        assert_eq!(store.ids(), vec!["a", "b"]);
    }

    fn dated(id: &str, day: u32) -> NormalizedRecord {
        NormalizedRecord {
            modified: chrono::NaiveDate::from_ymd_opt(2024, 1, day),
            ..article(id)
        }
    }

    #[test]
    fn suppressed_row_stays_until_newer_reappearance() {
        let store = MemRecordStore::new();
        store.upsert_batch(&[dated("x", 1)]).unwrap();
        store
            .upsert_batch(&[NormalizedRecord::tombstone(
                "x",
                chrono::NaiveDate::from_ymd_opt(2024, 1, 10),
            )])
            .unwrap();
        assert!(store.get("x").unwrap().unwrap().suppressed);

        // A replay of the pre-deletion sighting, e.g. from an overlapping scope.
        let report = store.upsert_batch(&[dated("x", 1)]).unwrap();
        assert_eq!(report.stale, 1);
        assert!(store.get("x").unwrap().unwrap().suppressed);

        let report = store.upsert_batch(&[dated("x", 12)]).unwrap();
        assert_eq!(report.updated, 1);
        assert!(!store.get("x").unwrap().unwrap().suppressed);
    }
}
