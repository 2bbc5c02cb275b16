//! Harvest orchestration: start decision, the fetch / normalize / sink loop,
//! periodic checkpoints, retries, and cooperative cancellation.
//!
//! One [`Harvester::run`] call drives one scope from its start point until the
//! source reports no more pages, the cancellation token fires, the record
//! budget runs out, or a page keeps failing to parse. Every stop flushes the
//! sink and, if the flush succeeded, writes a final checkpoint, so the next
//! run resumes where this one left off.
//!
//! Crash safety comes from ordering: a checkpoint is written only after the
//! sink flushed everything fetched so far, so a stored cursor never points
//! past records that are not yet in the store. A crash between checkpoints
//! re-fetches at most `checkpoint_every` pages, and the keyed upsert makes
//! the re-fetch harmless.

use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::checkpoint::{Checkpoint, CheckpointStore, HarvestStatus};
use crate::client::{ClientError, FetchParams, FreshQuery, MetadataSource};
use crate::config::HarvestConfig;
use crate::error::HarvestResult;
use crate::model::{HarvestScope, ResumptionToken, Watermark};
use crate::normalize::{Normalized, normalize};
use crate::sink::{BatchSink, FlushReport};
use crate::store::RecordStore;

// ── Options ─────────────────────────────────────────────────────────────

/// How a run picks its starting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Explicit `from`, else the stored watermark, else everything.
    #[default]
    Incremental,
    /// Explicit `from`, else everything; the stored watermark is ignored.
    Full,
    /// The stored cursor if there is one, else as [`StartMode::Incremental`].
    Resume,
}

/// Waits and limits for failed fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait after a rate-limit answer; a larger server hint wins.
    pub rate_limit_cooldown: Duration,
    /// Wait before retrying a transient protocol failure or a bad page.
    pub retry_delay: Duration,
    /// Consecutive unparseable answers tolerated before the run fails.
    pub max_parse_retries: u32,
    /// Flush attempts, `retry_delay` apart, while the store rejects batches.
    pub max_sink_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: Duration::from_secs(30),
            retry_delay: Duration::from_secs(10),
            max_parse_retries: 3,
            max_sink_retries: 5,
        }
    }
}

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub mode: StartMode,
    /// Explicit lower bound; overrides the stored watermark.
    pub from: Option<Watermark>,
    /// Upper bound forwarded on fresh queries.
    pub until: Option<Watermark>,
    pub metadata_format: String,
    pub batch_size: usize,
    /// Pages between checkpoints.
    pub checkpoint_every: u32,
    /// Pages between progress log lines (0 = never).
    pub progress_every: u32,
    /// Records fetched per run before stopping (0 = unlimited).
    pub max_records: u64,
    pub retry: RetryPolicy,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self::from_config(&HarvestConfig::default())
    }
}

impl HarvestOptions {
    pub fn from_config(config: &HarvestConfig) -> Self {
        let h = &config.harvest;
        Self {
            mode: StartMode::default(),
            from: None,
            until: None,
            metadata_format: config.source.metadata_format.clone(),
            batch_size: h.batch_size,
            checkpoint_every: h.checkpoint_every_pages,
            progress_every: h.progress_every_pages,
            max_records: h.max_records,
            retry: RetryPolicy {
                rate_limit_cooldown: Duration::from_secs(h.rate_limit_cooldown_secs),
                retry_delay: Duration::from_secs(h.retry_delay_secs),
                max_parse_retries: h.max_parse_retries,
                max_sink_retries: h.max_sink_retries,
            },
        }
    }
}

// ── Start decision ──────────────────────────────────────────────────────

/// Where a run begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPoint {
    /// Continue an interrupted traversal.
    Continuation(ResumptionToken),
    /// New traversal from `from` (everything when absent).
    Fresh { from: Option<Watermark> },
}

/// Pick the start point, in priority order: stored cursor (resume mode
/// only), explicit `from`, stored watermark (not in full mode), everything.
pub fn decide_start(
    mode: StartMode,
    explicit_from: Option<Watermark>,
    checkpoint: &Checkpoint,
) -> StartPoint {
    if mode == StartMode::Resume {
        if let Some(cursor) = &checkpoint.continuation_cursor {
            return StartPoint::Continuation(cursor.clone());
        }
    }
    if explicit_from.is_some() {
        return StartPoint::Fresh {
            from: explicit_from,
        };
    }
    if mode != StartMode::Full {
        if let Some(watermark) = checkpoint.last_watermark {
            return StartPoint::Fresh {
                from: Some(watermark),
            };
        }
    }
    StartPoint::Fresh { from: None }
}

// ── Outcome ─────────────────────────────────────────────────────────────

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub pages: u64,
    /// Wire records received.
    pub fetched: u64,
    pub inserted: u64,
    pub updated: u64,
    /// Records the normalizer could not use.
    pub skipped: u64,
    /// Deletion markers received.
    pub deleted: u64,
    /// Stored rows flagged as deleted.
    pub suppressed: u64,
    /// Deletion markers for records never stored.
    pub dropped: u64,
    /// Sightings of deleted rows older than the deletion.
    pub stale: u64,
    /// Records the store refused individually.
    pub record_failures: u64,
    /// Flushes the store rejected as a whole.
    pub sink_failures: u64,
    pub rate_limited: u64,
    /// Transient fetch failures retried.
    pub retries: u64,
    pub parse_failures: u64,
    pub checkpoints_written: u64,
    pub checkpoints_failed: u64,
}

impl HarvestStats {
    fn absorb(&mut self, report: &FlushReport) {
        self.inserted += report.upsert.inserted;
        self.updated += report.upsert.updated;
        self.suppressed += report.upsert.suppressed;
        self.dropped += report.upsert.dropped;
        self.stale += report.upsert.stale;
        self.record_failures += report.upsert.failures.len() as u64;
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Completed,
    Failed,
    /// Stopped early but resumable.
    Interrupted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source returned its last page.
    Exhausted,
    Cancelled,
    BudgetExhausted,
    ParseRetriesExhausted,
    /// The source rejected the query itself.
    InvalidRequest,
    /// The record store kept rejecting batches, so the tail of the run is
    /// not stored.
    SinkUnavailable,
}

impl StopReason {
    fn state(self) -> RunState {
        match self {
            Self::Exhausted => RunState::Completed,
            Self::Cancelled | Self::BudgetExhausted => RunState::Interrupted,
            Self::ParseRetriesExhausted | Self::InvalidRequest | Self::SinkUnavailable => {
                RunState::Failed
            }
        }
    }

    fn status(self) -> HarvestStatus {
        match self.state() {
            RunState::Completed => HarvestStatus::Completed,
            RunState::Interrupted => HarvestStatus::Idle,
            RunState::Failed => HarvestStatus::Failed,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exhausted => "source exhausted",
            Self::Cancelled => "cancelled",
            Self::BudgetExhausted => "record budget exhausted",
            Self::ParseRetriesExhausted => "parse retries exhausted",
            Self::InvalidRequest => "invalid request",
            Self::SinkUnavailable => "record store unavailable",
        };
        f.write_str(s)
    }
}

/// Result of one [`Harvester::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scope: HarvestScope,
    pub state: RunState,
    pub stop_reason: StopReason,
    pub stats: HarvestStats,
    /// Highest modification date among non-deleted records of this run.
    pub watermark: Option<Watermark>,
    /// Cursor the next resume would continue from.
    pub cursor: Option<ResumptionToken>,
    /// The source's total-size hint, when it sent one.
    pub total_hint: Option<u64>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Records fetched per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.stats.fetched as f64 / secs
        } else {
            0.0
        }
    }
}

// ── Orchestrator ────────────────────────────────────────────────────────

/// Mutable state of one run.
struct RunProgress {
    stats: HarvestStats,
    watermark: Option<Watermark>,
    /// Cursor of the next page to fetch; `None` before the first page of a
    /// fresh traversal and after the last page.
    cursor: Option<ResumptionToken>,
    /// Records handed to the sink since the last successful checkpoint.
    unsaved: u64,
    pages_since_checkpoint: u32,
    total_hint: Option<u64>,
}

impl RunProgress {
    fn observe(&mut self, modified: Option<Watermark>) {
        if let Some(m) = modified {
            self.watermark = self.watermark.max(Some(m));
        }
    }
}

/// Drives harvests over borrowed collaborators.
pub struct Harvester<'a> {
    source: &'a dyn MetadataSource,
    checkpoints: &'a dyn CheckpointStore,
    records: &'a dyn RecordStore,
    options: HarvestOptions,
}

impl<'a> Harvester<'a> {
    pub fn new(
        source: &'a dyn MetadataSource,
        checkpoints: &'a dyn CheckpointStore,
        records: &'a dyn RecordStore,
        options: HarvestOptions,
    ) -> Self {
        Self {
            source,
            checkpoints,
            records,
            options,
        }
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// Harvest `scope` until the source is exhausted or the run stops early.
    ///
    /// Only a failure to load the scope's checkpoint is returned as an error;
    /// everything after that is absorbed into the summary.
    pub fn run(&self, scope: &HarvestScope, cancel: &CancelToken) -> HarvestResult<RunSummary> {
        let started = Instant::now();
        let checkpoint = self.checkpoints.load(scope)?;
        let start = decide_start(self.options.mode, self.options.from, &checkpoint);

        let mut progress = RunProgress {
            stats: HarvestStats::default(),
            watermark: None,
            cursor: None,
            unsaved: 0,
            pages_since_checkpoint: 0,
            total_hint: None,
        };
        let mut params = match start {
            StartPoint::Continuation(token) => {
                progress.cursor = Some(token.clone());
                FetchParams::Continuation(token)
            }
            StartPoint::Fresh { from } => self.fresh_params(scope, from),
        };

        tracing::info!(
            scope = %scope,
            start = %params,
            stored_total = checkpoint.total_harvested,
            "harvest starting"
        );
        if let Err(e) = self.checkpoints.set_status(scope, HarvestStatus::Running) {
            progress.stats.checkpoints_failed += 1;
            tracing::warn!(scope = %scope, error = %e, "could not mark harvest as running");
        }

        let mut sink = BatchSink::new(self.records, self.options.batch_size);
        let mut parse_failures: u32 = 0;

        let stop = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self.options.max_records > 0 && progress.stats.fetched >= self.options.max_records {
                break StopReason::BudgetExhausted;
            }

            let page = match self.source.fetch_page(&params, cancel) {
                Ok(page) => page,
                Err(ClientError::Cancelled) => break StopReason::Cancelled,
                Err(ClientError::RateLimited { retry_after }) => {
                    progress.stats.rate_limited += 1;
                    let wait = retry_after
                        .map_or(self.options.retry.rate_limit_cooldown, |hint| {
                            hint.max(self.options.retry.rate_limit_cooldown)
                        });
                    tracing::warn!(
                        scope = %scope,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited, cooling down"
                    );
                    if !cancel.sleep(wait) {
                        break StopReason::Cancelled;
                    }
                    continue;
                }
                Err(ClientError::Parse { message }) => {
                    parse_failures += 1;
                    progress.stats.parse_failures += 1;
                    if parse_failures > self.options.retry.max_parse_retries {
                        tracing::error!(
                            scope = %scope,
                            attempts = parse_failures,
                            error = %message,
                            "page keeps failing to parse, giving up"
                        );
                        break StopReason::ParseRetriesExhausted;
                    }
                    tracing::warn!(
                        scope = %scope,
                        attempt = parse_failures,
                        error = %message,
                        "unparseable page, retrying"
                    );
                    if !cancel.sleep(self.options.retry.retry_delay) {
                        break StopReason::Cancelled;
                    }
                    continue;
                }
                Err(ClientError::BadCursor { message }) if params.is_continuation() => {
                    progress.stats.retries += 1;
                    let from = self.fallback_from(scope, &checkpoint);
                    tracing::warn!(
                        scope = %scope,
                        error = %message,
                        from = ?from,
                        "cursor rejected, restarting from watermark"
                    );
                    progress.cursor = None;
                    params = self.fresh_params(scope, from);
                    continue;
                }
                Err(ClientError::InvalidRequest { message }) => {
                    tracing::error!(scope = %scope, error = %message, "invalid harvest request");
                    break StopReason::InvalidRequest;
                }
                Err(e @ (ClientError::Protocol { .. } | ClientError::BadCursor { .. })) => {
                    progress.stats.retries += 1;
                    tracing::warn!(
                        scope = %scope,
                        error = %e,
                        retry_in_secs = self.options.retry.retry_delay.as_secs_f64(),
                        "fetch failed, retrying"
                    );
                    if !cancel.sleep(self.options.retry.retry_delay) {
                        break StopReason::Cancelled;
                    }
                    continue;
                }
            };
            parse_failures = 0;

            progress.stats.pages += 1;
            progress.stats.fetched += page.records.len() as u64;
            if page.complete_list_size.is_some() {
                progress.total_hint = page.complete_list_size;
            }

            for wire in &page.records {
                let record = match normalize(wire) {
                    Normalized::Record(record) => record,
                    Normalized::Skipped(reason) => {
                        progress.stats.skipped += 1;
                        tracing::debug!(
                            scope = %scope,
                            identifier = wire.identifier.as_deref().unwrap_or(""),
                            %reason,
                            "record skipped"
                        );
                        continue;
                    }
                };
                if record.deleted {
                    progress.stats.deleted += 1;
                } else {
                    progress.observe(record.modified);
                }
                progress.unsaved += 1;
                match sink.push(record) {
                    Ok(Some(report)) => progress.stats.absorb(&report),
                    Ok(None) => {}
                    Err(e) => {
                        progress.stats.sink_failures += 1;
                        tracing::warn!(scope = %scope, error = %e, "batch write failed, pausing after this page");
                    }
                }
            }

            progress.cursor = page.cursor.clone();
            if sink.is_stalled() {
                if let Some(stop) = self.wait_for_sink(scope, &mut sink, &mut progress, cancel) {
                    break stop;
                }
            }
            let Some(next) = page.cursor else {
                break StopReason::Exhausted;
            };

            progress.pages_since_checkpoint += 1;
            if progress.pages_since_checkpoint >= self.options.checkpoint_every {
                self.checkpoint(scope, &mut sink, &mut progress);
            }
            if self.options.progress_every > 0
                && progress.stats.pages % u64::from(self.options.progress_every) == 0
            {
                tracing::info!(
                    scope = %scope,
                    pages = progress.stats.pages,
                    fetched = progress.stats.fetched,
                    inserted = progress.stats.inserted,
                    updated = progress.stats.updated,
                    skipped = progress.stats.skipped,
                    deleted = progress.stats.deleted,
                    position = ?page.cursor_offset,
                    total = ?progress.total_hint,
                    elapsed_secs = started.elapsed().as_secs(),
                    "harvest progress"
                );
            }
            params = FetchParams::Continuation(next);
        };

        let stop = self.finish(scope, &mut sink, &mut progress, stop);
        let summary = RunSummary {
            scope: scope.clone(),
            state: stop.state(),
            stop_reason: stop,
            stats: progress.stats,
            watermark: progress.watermark,
            cursor: progress.cursor,
            total_hint: progress.total_hint,
            elapsed: started.elapsed(),
        };
        log_summary(&summary);
        Ok(summary)
    }

    fn fresh_params(&self, scope: &HarvestScope, from: Option<Watermark>) -> FetchParams {
        FetchParams::Fresh(FreshQuery {
            scope_filter: scope.filter().map(str::to_string),
            metadata_format: self.options.metadata_format.clone(),
            from,
            until: self.options.until,
        })
    }

    /// Start point after the source rejected a cursor: the run is restarted
    /// as a fresh query, never from the discarded cursor.
    fn fallback_from(&self, scope: &HarvestScope, initial: &Checkpoint) -> Option<Watermark> {
        let mode = match self.options.mode {
            StartMode::Full => StartMode::Full,
            _ => StartMode::Incremental,
        };
        let stored = match self.checkpoints.load(scope) {
            Ok(cp) => cp,
            Err(e) => {
                tracing::warn!(scope = %scope, error = %e, "checkpoint reload failed");
                initial.clone()
            }
        };
        // The in-run watermark may cover records still in the sink buffer;
        // only the stored one is backed by flushed records.
        match decide_start(mode, self.options.from, &stored) {
            StartPoint::Fresh { from } => from,
            StartPoint::Continuation(_) => None,
        }
    }

    /// Hold off fetching while the store rejects batches: retry the flush
    /// every `retry_delay` until it succeeds or the attempts run out.
    fn wait_for_sink(
        &self,
        scope: &HarvestScope,
        sink: &mut BatchSink<'_>,
        progress: &mut RunProgress,
        cancel: &CancelToken,
    ) -> Option<StopReason> {
        for attempt in 1..=self.options.retry.max_sink_retries {
            if !cancel.sleep(self.options.retry.retry_delay) {
                return Some(StopReason::Cancelled);
            }
            match sink.flush() {
                Ok(report) => {
                    progress.stats.absorb(&report);
                    tracing::info!(scope = %scope, attempt, "record store accepted backlog");
                    return None;
                }
                Err(e) => {
                    progress.stats.sink_failures += 1;
                    tracing::warn!(
                        scope = %scope,
                        attempt,
                        pending = sink.pending(),
                        error = %e,
                        "record store still rejecting batches"
                    );
                }
            }
        }
        Some(StopReason::SinkUnavailable)
    }

    /// Flush the sink and, only if that succeeded, persist progress.
    ///
    /// Returns false when the flush failed and nothing was saved.
    fn checkpoint(
        &self,
        scope: &HarvestScope,
        sink: &mut BatchSink<'_>,
        progress: &mut RunProgress,
    ) -> bool {
        match sink.flush() {
            Ok(report) => progress.stats.absorb(&report),
            Err(e) => {
                progress.stats.sink_failures += 1;
                tracing::warn!(scope = %scope, error = %e, "flush failed, checkpoint deferred");
                return false;
            }
        }
        progress.pages_since_checkpoint = 0;
        match self.checkpoints.save(
            scope,
            progress.watermark,
            progress.cursor.as_ref(),
            progress.unsaved,
        ) {
            Ok(()) => {
                progress.stats.checkpoints_written += 1;
                progress.unsaved = 0;
                tracing::debug!(
                    scope = %scope,
                    watermark = ?progress.watermark,
                    cursor_bytes = progress.cursor.as_ref().map_or(0, ResumptionToken::len),
                    "checkpoint saved"
                );
            }
            Err(e) => {
                progress.stats.checkpoints_failed += 1;
                tracing::warn!(
                    scope = %scope,
                    error = %e,
                    unsaved = progress.unsaved,
                    "checkpoint write failed, continuing"
                );
            }
        }
        true
    }

    /// Final flush, checkpoint, and status for `stop`.
    fn finish(
        &self,
        scope: &HarvestScope,
        sink: &mut BatchSink<'_>,
        progress: &mut RunProgress,
        stop: StopReason,
    ) -> StopReason {
        let touched = progress.stats.pages > 0 || progress.unsaved > 0 || sink.pending() > 0;
        let mut stop = stop;
        if touched && !self.checkpoint(scope, sink, progress) {
            tracing::error!(
                scope = %scope,
                pending = sink.pending(),
                "final flush failed, records since the last checkpoint will be re-fetched"
            );
            if stop == StopReason::Exhausted {
                stop = StopReason::SinkUnavailable;
            }
        }
        if let Err(e) = self.checkpoints.set_status(scope, stop.status()) {
            progress.stats.checkpoints_failed += 1;
            tracing::warn!(scope = %scope, error = %e, "could not record final status");
        }
        stop
    }
}

fn log_summary(summary: &RunSummary) {
    let s = &summary.stats;
    tracing::info!(
        scope = %summary.scope,
        state = %summary.state,
        reason = %summary.stop_reason,
        pages = s.pages,
        fetched = s.fetched,
        inserted = s.inserted,
        updated = s.updated,
        skipped = s.skipped,
        deleted = s.deleted,
        suppressed = s.suppressed,
        dropped = s.dropped,
        stale = s.stale,
        record_failures = s.record_failures,
        sink_failures = s.sink_failures,
        rate_limited = s.rate_limited,
        retries = s.retries,
        checkpoints = s.checkpoints_written,
        checkpoint_failures = s.checkpoints_failed,
        total = ?summary.total_hint,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        records_per_sec = summary.throughput(),
        "harvest finished"
    );
}

/// Harvest several scopes at once, one thread per scope.
///
/// The threads share the harvester's collaborators, so they share one rate
/// limiter; scopes only interleave between requests. Results come back in
/// the order of `scopes`.
pub fn harvest_scopes(
    harvester: &Harvester<'_>,
    scopes: &[HarvestScope],
    cancel: &CancelToken,
) -> Vec<HarvestResult<RunSummary>> {
    if let [scope] = scopes {
        return vec![harvester.run(scope, cancel)];
    }
    std::thread::scope(|s| {
        let handles: Vec<_> = scopes
            .iter()
            .map(|scope| s.spawn(move || harvester.run(scope, cancel)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> Watermark {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn checkpoint(watermark: Option<&str>, cursor: Option<&str>) -> Checkpoint {
        let mut cp = Checkpoint::new(HarvestScope::named("cs"));
        cp.last_watermark = watermark.map(date);
        cp.continuation_cursor = cursor.and_then(|c| ResumptionToken::from_wire(c.into()));
        cp
    }

    #[test]
    fn resume_prefers_stored_cursor() {
        let cp = checkpoint(Some("2024-01-01"), Some("tok"));
        let start = decide_start(StartMode::Resume, Some(date("2023-01-01")), &cp);
        assert!(matches!(start, StartPoint::Continuation(_)));
    }

    #[test]
    fn resume_without_cursor_falls_back_to_watermark() {
        let cp = checkpoint(Some("2024-01-01"), None);
        assert_eq!(
            decide_start(StartMode::Resume, None, &cp),
            StartPoint::Fresh {
                from: Some(date("2024-01-01"))
            }
        );
    }

    #[test]
    fn explicit_from_beats_watermark() {
        let cp = checkpoint(Some("2024-01-01"), Some("tok"));
        assert_eq!(
            decide_start(StartMode::Incremental, Some(date("2022-05-05")), &cp),
            StartPoint::Fresh {
                from: Some(date("2022-05-05"))
            }
        );
    }

    #[test]
    fn incremental_ignores_cursor_and_uses_watermark() {
        let cp = checkpoint(Some("2024-01-01"), Some("tok"));
        assert_eq!(
            decide_start(StartMode::Incremental, None, &cp),
            StartPoint::Fresh {
                from: Some(date("2024-01-01"))
            }
        );
    }

    #[test]
    fn full_ignores_watermark() {
        let cp = checkpoint(Some("2024-01-01"), Some("tok"));
        assert_eq!(
            decide_start(StartMode::Full, None, &cp),
            StartPoint::Fresh { from: None }
        );
        assert_eq!(
            decide_start(StartMode::Full, Some(date("2020-01-01")), &cp),
            StartPoint::Fresh {
                from: Some(date("2020-01-01"))
            }
        );
    }

    #[test]
    fn fresh_scope_harvests_everything() {
        let cp = checkpoint(None, None);
        for mode in [StartMode::Incremental, StartMode::Full, StartMode::Resume] {
            assert_eq!(decide_start(mode, None, &cp), StartPoint::Fresh { from: None });
        }
    }

    #[test]
    fn stop_reasons_map_to_states() {
        assert_eq!(StopReason::Exhausted.status(), HarvestStatus::Completed);
        assert_eq!(StopReason::Cancelled.state(), RunState::Interrupted);
        assert_eq!(StopReason::BudgetExhausted.status(), HarvestStatus::Idle);
        assert_eq!(StopReason::ParseRetriesExhausted.status(), HarvestStatus::Failed);
    }

    #[test]
    fn options_follow_config() {
        let mut config = HarvestConfig::default();
        config.harvest.retry_delay_secs = 2;
        config.harvest.max_records = 10;
        let options = HarvestOptions::from_config(&config);
        assert_eq!(options.retry.retry_delay, Duration::from_secs(2));
        assert_eq!(options.max_records, 10);
        assert_eq!(options.checkpoint_every, 5);
        assert_eq!(options.mode, StartMode::Incremental);
    }
}
