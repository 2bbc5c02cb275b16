//! ACID-durable record store backed by redb.
//!
//! Rows live in the `records` table of the harvest database (identifier →
//! bincode-encoded [`StoredRecord`]). Each batch is one write transaction:
//! records that fail to encode or insert are reported and skipped, while a
//! failure to begin or commit the transaction fails the whole batch.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::error::StoreError;
use crate::model::NormalizedRecord;
use crate::store::{
    RecordStore, StoreResult, StoredRecord, UpsertReport, apply_record, validate_record,
};

/// Identifier → bincode-encoded [`StoredRecord`].
const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Open or create the harvest database at `path`, creating parent
/// directories as needed.
///
/// The handle is shared by the record store and the checkpoint store.
pub fn open_database(path: &Path) -> StoreResult<Arc<Database>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io { source: e })?;
    }
    let db = Database::create(path).map_err(|e| StoreError::Redb {
        message: format!("failed to open redb at {}: {e}", path.display()),
    })?;
    Ok(Arc::new(db))
}

/// Record store using redb.
///
/// All writes go through transactions. Reads use MVCC snapshots.
pub struct RedbRecordStore {
    db: Arc<Database>,
}

impl RedbRecordStore {
    /// Use an already-open database, creating the table if needed.
    pub fn new(db: Arc<Database>) -> StoreResult<Self> {
        let txn = db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        {
            txn.open_table(RECORDS_TABLE).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(Self { db })
    }

    /// Open or create a standalone database file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::new(open_database(path)?)
    }
}

impl RecordStore for RedbRecordStore {
    fn upsert_batch(&self, records: &[NormalizedRecord]) -> StoreResult<UpsertReport> {
        let now = Utc::now();
        let mut report = UpsertReport::default();

        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        {
            let mut table = txn.open_table(RECORDS_TABLE).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;

            for record in records {
                if let Err(reason) = validate_record(record) {
                    tracing::warn!(id = %record.id, reason, "record rejected");
                    report.fail(&record.id, reason);
                    continue;
                }
                let id = record.id.as_str();

                let existing = match table.get(id) {
                    Ok(Some(guard)) => match bincode::deserialize::<StoredRecord>(guard.value()) {
                        Ok(row) => Some(row),
                        Err(e) => {
                            tracing::warn!(id, error = %e, "stored row undecodable");
                            report.fail(id, format!("stored row undecodable: {e}"));
                            continue;
                        }
                    },
                    Ok(None) => None,
                    Err(e) => {
                        report.fail(id, format!("get failed: {e}"));
                        continue;
                    }
                };

                let (row, outcome) = apply_record(existing, record, now);
                if let Some(row) = row {
                    let bytes = match bincode::serialize(&row) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            report.fail(id, format!("encode failed: {e}"));
                            continue;
                        }
                    };
                    if let Err(e) = table.insert(id, bytes.as_slice()) {
                        report.fail(id, format!("insert failed: {e}"));
                        continue;
                    }
                }
                report.record(outcome);
            }
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;

        Ok(report)
    }

    fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(RECORDS_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let result = table.get(id).map_err(|e| StoreError::Redb {
            message: format!("get failed: {e}"),
        })?;
        result
            .map(|guard| {
                bincode::deserialize(guard.value()).map_err(|e| StoreError::Serialization {
                    message: format!("record {id}: {e}"),
                })
            })
            .transpose()
    }

    fn len(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(RECORDS_TABLE).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        table.len().map_err(|e| StoreError::Redb {
            message: format!("len failed: {e}"),
        })
    }
}

impl std::fmt::Debug for RedbRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbRecordStore").finish()
    }
}
