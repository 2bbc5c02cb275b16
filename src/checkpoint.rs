//! Durable per-scope harvest progress.
//!
//! A [`Checkpoint`] records how far a scope has been harvested: the highest
//! modification date seen, the continuation cursor of the last page whose
//! records are safely stored, and a running total. The orchestrator saves one
//! every few pages; a restart picks up from whatever the last save recorded.
//!
//! Two implementations share the update rules in [`Checkpoint::advance`] and
//! [`Checkpoint::transition`]:
//!
//! - [`RedbCheckpointStore`] keeps checkpoints in the `checkpoints` table of
//!   the harvest database (bincode values, one write transaction per call).
//! - [`MemCheckpointStore`] keeps them in a `DashMap` for tests.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, CheckpointResult};
use crate::model::{HarvestScope, ResumptionToken, Watermark};

/// Scope name → bincode-encoded [`Checkpoint`].
const CHECKPOINT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("checkpoints");

/// Lifecycle of a scope's harvest as last recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HarvestStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Progress of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub scope: HarvestScope,
    pub last_watermark: Option<Watermark>,
    pub continuation_cursor: Option<ResumptionToken>,
    /// Records harvested over the scope's lifetime; only ever grows.
    pub total_harvested: u64,
    pub status: HarvestStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// The zero checkpoint a never-harvested scope loads as.
    pub fn new(scope: HarvestScope) -> Self {
        Self {
            scope,
            last_watermark: None,
            continuation_cursor: None,
            total_harvested: 0,
            status: HarvestStatus::Idle,
            started_at: None,
            completed_at: None,
            updated_at: None,
        }
    }

    /// Apply a save: add `delta`, move the watermark forward only, replace
    /// the cursor (absent clears it).
    pub fn advance(
        &mut self,
        watermark: Option<Watermark>,
        cursor: Option<&ResumptionToken>,
        delta: u64,
        now: DateTime<Utc>,
    ) {
        self.total_harvested = self.total_harvested.saturating_add(delta);
        if let Some(w) = watermark {
            if self.last_watermark.is_none_or(|current| w > current) {
                self.last_watermark = Some(w);
            }
        }
        self.continuation_cursor = cursor.cloned();
        self.updated_at = Some(now);
    }

    /// Apply a status change and its timestamps.
    pub fn transition(&mut self, status: HarvestStatus, now: DateTime<Utc>) {
        match status {
            HarvestStatus::Running => {
                self.started_at = Some(now);
                self.completed_at = None;
            }
            HarvestStatus::Completed | HarvestStatus::Failed => {
                self.completed_at = Some(now);
            }
            HarvestStatus::Idle => {}
        }
        self.status = status;
        self.updated_at = Some(now);
    }
}

/// Durable per-scope progress records.
pub trait CheckpointStore: Send + Sync {
    /// Current checkpoint for `scope`; the zero checkpoint if none exists.
    fn load(&self, scope: &HarvestScope) -> CheckpointResult<Checkpoint>;

    /// Record progress. See [`Checkpoint::advance`] for the update rules.
    fn save(
        &self,
        scope: &HarvestScope,
        watermark: Option<Watermark>,
        cursor: Option<&ResumptionToken>,
        delta: u64,
    ) -> CheckpointResult<()>;

    /// Record a lifecycle change. See [`Checkpoint::transition`].
    fn set_status(&self, scope: &HarvestScope, status: HarvestStatus) -> CheckpointResult<()>;

    /// Every stored checkpoint, ordered by scope name.
    fn list(&self) -> CheckpointResult<Vec<Checkpoint>>;
}

// ── redb ────────────────────────────────────────────────────────────────

/// Checkpoints in the `checkpoints` table of a redb database.
pub struct RedbCheckpointStore {
    db: Arc<Database>,
}

impl RedbCheckpointStore {
    /// Use an already-open database, creating the table if needed.
    pub fn new(db: Arc<Database>) -> CheckpointResult<Self> {
        let txn = db.begin_write().map_err(|e| storage_error("*", "begin_write", e))?;
        {
            txn.open_table(CHECKPOINT_TABLE)
                .map_err(|e| storage_error("*", "open_table", e))?;
        }
        txn.commit().map_err(|e| storage_error("*", "commit", e))?;
        Ok(Self { db })
    }

    /// Open (or create) a standalone database file.
    pub fn open(path: &Path) -> CheckpointResult<Self> {
        let db = Database::create(path).map_err(|e| CheckpointError::Storage {
            scope: "*".into(),
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;
        Self::new(Arc::new(db))
    }

    /// Read-modify-write one checkpoint in a single transaction.
    fn update(
        &self,
        scope: &HarvestScope,
        apply: impl FnOnce(&mut Checkpoint),
    ) -> CheckpointResult<()> {
        let name = scope.name();
        let txn = self
            .db
            .begin_write()
            .map_err(|e| storage_error(name, "begin_write", e))?;
        {
            let mut table = txn
                .open_table(CHECKPOINT_TABLE)
                .map_err(|e| storage_error(name, "open_table", e))?;
            let existing = table
                .get(name)
                .map_err(|e| storage_error(name, "get", e))?
                .map(|guard| decode(name, guard.value()))
                .transpose()?;
            let mut checkpoint = existing.unwrap_or_else(|| Checkpoint::new(scope.clone()));
            apply(&mut checkpoint);
            let bytes = encode(&checkpoint)?;
            table
                .insert(name, bytes.as_slice())
                .map_err(|e| storage_error(name, "insert", e))?;
        }
        txn.commit().map_err(|e| storage_error(name, "commit", e))?;
        Ok(())
    }
}

impl CheckpointStore for RedbCheckpointStore {
    fn load(&self, scope: &HarvestScope) -> CheckpointResult<Checkpoint> {
        let name = scope.name();
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage_error(name, "begin_read", e))?;
        let table = txn
            .open_table(CHECKPOINT_TABLE)
            .map_err(|e| storage_error(name, "open_table", e))?;
        let stored = table.get(name).map_err(|e| storage_error(name, "get", e))?;
        match stored {
            Some(guard) => decode(name, guard.value()),
            None => Ok(Checkpoint::new(scope.clone())),
        }
    }

    fn save(
        &self,
        scope: &HarvestScope,
        watermark: Option<Watermark>,
        cursor: Option<&ResumptionToken>,
        delta: u64,
    ) -> CheckpointResult<()> {
        let now = Utc::now();
        self.update(scope, |cp| cp.advance(watermark, cursor, delta, now))
    }

    fn set_status(&self, scope: &HarvestScope, status: HarvestStatus) -> CheckpointResult<()> {
        let now = Utc::now();
        self.update(scope, |cp| cp.transition(status, now))
    }

    fn list(&self) -> CheckpointResult<Vec<Checkpoint>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| storage_error("*", "begin_read", e))?;
        let table = txn
            .open_table(CHECKPOINT_TABLE)
            .map_err(|e| storage_error("*", "open_table", e))?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(|e| storage_error("*", "iter", e))? {
            let (key, value) = entry.map_err(|e| storage_error("*", "iter", e))?;
            out.push(decode(key.value(), value.value())?);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for RedbCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbCheckpointStore").finish()
    }
}

fn storage_error(scope: &str, op: &str, e: impl std::fmt::Display) -> CheckpointError {
    CheckpointError::Storage {
        scope: scope.to_string(),
        message: format!("{op} failed: {e}"),
    }
}

fn encode(checkpoint: &Checkpoint) -> CheckpointResult<Vec<u8>> {
    bincode::serialize(checkpoint).map_err(|e| CheckpointError::Corrupt {
        scope: checkpoint.scope.name().to_string(),
        message: format!("encode failed: {e}"),
    })
}

fn decode(scope: &str, bytes: &[u8]) -> CheckpointResult<Checkpoint> {
    bincode::deserialize(bytes).map_err(|e| CheckpointError::Corrupt {
        scope: scope.to_string(),
        message: format!("decode failed: {e}"),
    })
}

// ── in-memory ───────────────────────────────────────────────────────────

/// Checkpoints held in memory. All data is lost on drop.
#[derive(Debug, Default)]
pub struct MemCheckpointStore {
    checkpoints: DashMap<HarvestScope, Checkpoint>,
}

impl MemCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemCheckpointStore {
    fn load(&self, scope: &HarvestScope) -> CheckpointResult<Checkpoint> {
        Ok(self
            .checkpoints
            .get(scope)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| Checkpoint::new(scope.clone())))
    }

    fn save(
        &self,
        scope: &HarvestScope,
        watermark: Option<Watermark>,
        cursor: Option<&ResumptionToken>,
        delta: u64,
    ) -> CheckpointResult<()> {
        let now = Utc::now();
        self.checkpoints
            .entry(scope.clone())
            .or_insert_with(|| Checkpoint::new(scope.clone()))
            .advance(watermark, cursor, delta, now);
        Ok(())
    }

    fn set_status(&self, scope: &HarvestScope, status: HarvestStatus) -> CheckpointResult<()> {
        let now = Utc::now();
        self.checkpoints
            .entry(scope.clone())
            .or_insert_with(|| Checkpoint::new(scope.clone()))
            .transition(status, now);
        Ok(())
    }

    fn list(&self) -> CheckpointResult<Vec<Checkpoint>> {
        let mut out: Vec<Checkpoint> = self
            .checkpoints
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| a.scope.cmp(&b.scope));
        Ok(out)
    }
}
