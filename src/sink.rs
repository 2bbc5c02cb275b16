//! Buffered, bounded writes into the record store.
//!
//! Records are buffered in arrival order and written through
//! [`RecordStore::upsert_batch`] in chunks of at most `batch_size` when the
//! buffer fills or the caller flushes. A chunk the store rejects as a whole
//! stays buffered and the sink stalls: pushes keep buffering without touching
//! the store until an explicit [`BatchSink::flush`] succeeds. The caller is
//! expected to stop producing while the sink is stalled.

use crate::error::{SinkError, SinkResult};
use crate::model::NormalizedRecord;
use crate::store::{RecordStore, UpsertReport};

/// Outcome of one successful flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records handed to the store in this flush.
    pub submitted: usize,
    pub upsert: UpsertReport,
}

impl FlushReport {
    fn merge(&mut self, other: FlushReport) {
        self.submitted += other.submitted;
        self.upsert.merge(other.upsert);
    }
}

/// Accumulates records and writes them in bounded batches.
pub struct BatchSink<'a> {
    store: &'a dyn RecordStore,
    batch_size: usize,
    buffer: Vec<NormalizedRecord>,
    /// Set by a rejected chunk, cleared by the next complete flush.
    stalled: bool,
    /// Chunks written by a flush that failed part way; reported by the next
    /// successful flush.
    carried: FlushReport,
}

impl<'a> BatchSink<'a> {
    /// A zero `batch_size` is treated as 1.
    pub fn new(store: &'a dyn RecordStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            stalled: false,
            carried: FlushReport::default(),
        }
    }

    /// Buffer `record`, flushing when the buffer is full.
    ///
    /// The record is buffered even when the triggered flush fails. A stalled
    /// sink only buffers.
    pub fn push(&mut self, record: NormalizedRecord) -> SinkResult<Option<FlushReport>> {
        self.buffer.push(record);
        if !self.stalled && self.buffer.len() >= self.batch_size {
            self.flush().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Write everything buffered, `batch_size` records per store call.
    ///
    /// On failure the rejected chunk and everything after it stay buffered.
    pub fn flush(&mut self) -> SinkResult<FlushReport> {
        while !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.batch_size);
            match self.store.upsert_batch(&self.buffer[..take]) {
                Ok(upsert) => {
                    for failure in &upsert.failures {
                        tracing::warn!(id = %failure.id, error = %failure.message, "record not stored");
                    }
                    tracing::debug!(
                        submitted = take,
                        inserted = upsert.inserted,
                        updated = upsert.updated,
                        suppressed = upsert.suppressed,
                        dropped = upsert.dropped,
                        stale = upsert.stale,
                        failed = upsert.failures.len(),
                        "batch flushed"
                    );
                    self.buffer.drain(..take);
                    self.carried.merge(FlushReport {
                        submitted: take,
                        upsert,
                    });
                }
                Err(source) => {
                    self.stalled = true;
                    return Err(SinkError::BatchFailed {
                        pending: self.buffer.len(),
                        source,
                    });
                }
            }
        }
        self.stalled = false;
        Ok(std::mem::take(&mut self.carried))
    }

    /// True after a rejected chunk until a flush writes everything.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Records waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl std::fmt::Debug for BatchSink<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSink")
            .field("batch_size", &self.batch_size)
            .field("pending", &self.buffer.len())
            .finish()
    }
}
