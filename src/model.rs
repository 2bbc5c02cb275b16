//! Core data types shared across the harvesting pipeline.
//!
//! A harvest is keyed by a [`HarvestScope`]; progress is expressed as a
//! [`Watermark`] date plus an opaque [`ResumptionToken`]; every fetched
//! record ends up as a [`NormalizedRecord`] before it reaches storage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A coarse, monotonic progress marker: the modification date of the most
/// recently observed record.
pub type Watermark = NaiveDate;

/// Name of the scope that harvests everything the source exposes.
pub const ALL_SCOPE: &str = "all";

/// One independently checkpointed harvest stream.
///
/// The name doubles as the subset filter sent to the source, except for
/// [`ALL_SCOPE`], which sends no filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HarvestScope(String);

impl HarvestScope {
    /// Scope covering every record of the source.
    pub fn all() -> Self {
        Self(ALL_SCOPE.to_string())
    }

    /// Scope for a named subset (e.g. `cs` or `physics:hep-th`).
    ///
    /// Blank names fall back to [`HarvestScope::all`].
    pub fn named(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            Self::all()
        } else {
            Self(name.to_string())
        }
    }

    /// The checkpoint key for this scope.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The subset filter to send with fresh queries, if any.
    pub fn filter(&self) -> Option<&str> {
        if self.0 == ALL_SCOPE {
            None
        } else {
            Some(&self.0)
        }
    }
}

impl std::fmt::Display for HarvestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source-issued continuation cursor.
///
/// Only the protocol parser creates tokens and only the protocol client
/// reads them back; everything else stores and replays them verbatim.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumptionToken(String);

impl ResumptionToken {
    /// Wrap a cursor as received on the wire. An empty cursor means
    /// "no more pages" and yields `None`.
    pub(crate) fn from_wire(raw: String) -> Option<Self> {
        if raw.is_empty() { None } else { Some(Self(raw)) }
    }

    /// The cursor exactly as it must be sent back to the source.
    pub(crate) fn as_wire(&self) -> &str {
        &self.0
    }

    /// Length of the token in bytes (for diagnostics only).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: empty cursors are never wrapped.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ResumptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResumptionToken(<{} bytes>)", self.0.len())
    }
}

/// Canonical record shape handed to the batch sink.
///
/// A record with `deleted == true` carries only `id` (and `modified` when the
/// source reported it); all content fields are empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Stable external identifier (e.g. `2401.00001`).
    pub id: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    /// Ordered classification list; the first entry is the primary one.
    pub categories: Vec<String>,
    pub primary_category: Option<String>,
    pub doi: Option<String>,
    pub journal_ref: Option<String>,
    pub comments: Option<String>,
    pub license: Option<String>,
    /// First publication date, when known.
    pub published: Option<NaiveDate>,
    /// Last modification date; feeds the harvest watermark.
    pub modified: Option<NaiveDate>,
    pub citation_count: Option<u64>,
    pub deleted: bool,
}

impl NormalizedRecord {
    /// A deletion marker for `id`.
    pub fn tombstone(id: impl Into<String>, modified: Option<NaiveDate>) -> Self {
        Self {
            id: id.into(),
            modified,
            deleted: true,
            ..Default::default()
        }
    }
}
