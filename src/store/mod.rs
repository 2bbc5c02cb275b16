//! Keyed record storage behind the batch sink.
//!
//! Two backends implement [`RecordStore`]:
//!
//! - [`RedbRecordStore`] — the `records` table of the harvest database (redb)
//! - [`MemRecordStore`] — concurrent hashmap (DashMap), for tests
//!
//! Both apply incoming records through [`apply_record`], so the conflict
//! policy and the deletion rules live in exactly one place.

pub mod durable;
pub mod mem;

pub use durable::{RedbRecordStore, open_database};
pub use mem::MemRecordStore;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use crate::error::StoreResult;
use crate::model::NormalizedRecord;

/// A stored row, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub primary_category: Option<String>,
    pub doi: Option<String>,
    pub journal_ref: Option<String>,
    pub comments: Option<String>,
    pub license: Option<String>,
    pub published: Option<NaiveDate>,
    pub modified: Option<NaiveDate>,
    pub citation_count: u64,
    /// Set when the source deleted the record; the row itself is kept.
    pub suppressed: bool,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub suppressed_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// First sighting of a record.
    pub fn from_new(record: &NormalizedRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            abstract_text: record.abstract_text.clone(),
            authors: record.authors.clone(),
            categories: record.categories.clone(),
            primary_category: record.primary_category.clone(),
            doi: record.doi.clone(),
            journal_ref: record.journal_ref.clone(),
            comments: record.comments.clone(),
            license: record.license.clone(),
            published: record.published,
            modified: record.modified,
            citation_count: record.citation_count.unwrap_or(0),
            suppressed: false,
            first_seen_at: now,
            updated_at: now,
            suppressed_at: None,
        }
    }
}

/// Merge a fresh sighting of a record into its stored row.
///
/// Descriptive fields always take the incoming value. Optional reference
/// fields keep the stored value when the incoming one is empty. The citation
/// count never decreases, the modification date only moves forward, and a
/// stored publication date survives an incoming record without one. A
/// suppressed row is unsuppressed; [`apply_record`] only merges into a
/// suppressed row when the incoming record postdates the deletion.
pub fn merge_into(existing: &mut StoredRecord, incoming: &NormalizedRecord, now: DateTime<Utc>) {
    existing.title = incoming.title.clone();
    existing.abstract_text = incoming.abstract_text.clone();
    existing.authors = incoming.authors.clone();
    existing.categories = incoming.categories.clone();
    existing.primary_category = incoming.primary_category.clone();

    keep_unless_empty(&mut existing.doi, &incoming.doi);
    keep_unless_empty(&mut existing.license, &incoming.license);
    keep_unless_empty(&mut existing.journal_ref, &incoming.journal_ref);
    keep_unless_empty(&mut existing.comments, &incoming.comments);

    if let Some(count) = incoming.citation_count {
        existing.citation_count = existing.citation_count.max(count);
    }
    if incoming.published.is_some() {
        existing.published = incoming.published;
    }
    existing.modified = existing.modified.max(incoming.modified);

    existing.suppressed = false;
    existing.suppressed_at = None;
    existing.updated_at = now;
}

fn keep_unless_empty(slot: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming {
        if !value.is_empty() {
            *slot = Some(value.clone());
        }
    }
}

/// What happened to one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Deletion of a stored record: the row is kept and flagged.
    Suppressed,
    /// Deletion of a record never stored: nothing written.
    Dropped,
    /// Sighting of a deleted record that is not newer than its deletion:
    /// nothing written.
    Stale,
}

/// Apply one record to the current row for its identifier.
///
/// Returns the row to write (if any) and the outcome. Deletions never create
/// rows. A suppressed row's `modified` holds the deletion date, and only a
/// strictly later record revives it, so replaying an older sighting after
/// the deletion leaves the row deleted.
pub fn apply_record(
    existing: Option<StoredRecord>,
    incoming: &NormalizedRecord,
    now: DateTime<Utc>,
) -> (Option<StoredRecord>, UpsertOutcome) {
    match (existing, incoming.deleted) {
        (None, true) => (None, UpsertOutcome::Dropped),
        (Some(mut row), true) => {
            if !row.suppressed {
                row.suppressed = true;
                row.suppressed_at = Some(now);
            }
            row.modified = row.modified.max(incoming.modified);
            row.updated_at = now;
            (Some(row), UpsertOutcome::Suppressed)
        }
        (None, false) => (
            Some(StoredRecord::from_new(incoming, now)),
            UpsertOutcome::Inserted,
        ),
        (Some(row), false) if row.suppressed && incoming.modified <= row.modified => {
            (None, UpsertOutcome::Stale)
        }
        (Some(mut row), false) => {
            merge_into(&mut row, incoming, now);
            (Some(row), UpsertOutcome::Updated)
        }
    }
}

/// A record the store refused; the rest of its batch was still applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub id: String,
    pub message: String,
}

/// Result of one [`RecordStore::upsert_batch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: u64,
    pub updated: u64,
    pub suppressed: u64,
    pub dropped: u64,
    /// Older sightings of deleted rows, ignored.
    pub stale: u64,
    pub failures: Vec<RecordFailure>,
}

impl UpsertReport {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Suppressed => self.suppressed += 1,
            UpsertOutcome::Dropped => self.dropped += 1,
            UpsertOutcome::Stale => self.stale += 1,
        }
    }

    /// Add the counts and failures of a later batch.
    pub fn merge(&mut self, other: UpsertReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.suppressed += other.suppressed;
        self.dropped += other.dropped;
        self.stale += other.stale;
        self.failures.extend(other.failures);
    }

    pub fn fail(&mut self, id: &str, message: impl Into<String>) {
        self.failures.push(RecordFailure {
            id: id.to_string(),
            message: message.into(),
        });
    }

    /// Records that reached a definite outcome.
    pub fn applied(&self) -> u64 {
        self.inserted + self.updated + self.suppressed + self.dropped + self.stale
    }
}

/// Idempotent upsert-by-identifier storage.
pub trait RecordStore: Send + Sync {
    /// Apply `records` in order as one atomic batch.
    ///
    /// Individual records may fail (reported in [`UpsertReport::failures`])
    /// without failing the batch; an `Err` means nothing was written.
    fn upsert_batch(&self, records: &[NormalizedRecord]) -> StoreResult<UpsertReport>;

    /// The stored row for `id`, suppressed or not.
    fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>>;

    /// Number of stored rows, suppressed ones included.
    fn len(&self) -> StoreResult<u64>;

    fn is_empty(&self) -> StoreResult<bool> {
        self.len().map(|n| n == 0)
    }
}

/// Reject records no backend can key.
pub(crate) fn validate_record(record: &NormalizedRecord) -> Result<(), &'static str> {
    if record.id.trim().is_empty() {
        return Err("empty identifier");
    }
    Ok(())
}
