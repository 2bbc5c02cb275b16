//! Orchestrator behavior against scripted sources: resume after crashes and
//! interruptions, retries, fallbacks, and the checkpoint bookkeeping that
//! makes them safe.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDate;

use biblio_harvest::cancel::CancelToken;
use biblio_harvest::checkpoint::{
    Checkpoint, CheckpointStore, HarvestStatus, MemCheckpointStore,
};
use biblio_harvest::client::mock::RecordedRequest;
use biblio_harvest::client::{
    ClientError, ClientResult, FetchParams, MetadataSource, MockSource, RawPage, WireRecord,
    parse_page,
};
use biblio_harvest::error::{CheckpointError, CheckpointResult, StoreError};
use biblio_harvest::harvest::{
    HarvestOptions, Harvester, RetryPolicy, RunState, StartMode, StopReason, harvest_scopes,
};
use biblio_harvest::model::{HarvestScope, NormalizedRecord, ResumptionToken, Watermark};
use biblio_harvest::store::{MemRecordStore, RecordStore, StoreResult, StoredRecord, UpsertReport};

const PER_PAGE: usize = 3;

fn date(s: &str) -> Watermark {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// `n` pages of `PER_PAGE` records; page `p` is dated 2024-01-(p+1).
fn pages(n: usize) -> Vec<Vec<WireRecord>> {
    (0..n)
        .map(|p| {
            (0..PER_PAGE)
                .map(|i| {
                    WireRecord::article(
                        &format!("oai:arXiv.org:2401.{p:02}{i:03}"),
                        &format!("Paper {p}.{i}"),
                        &format!("2024-01-{:02}", p + 1),
                    )
                })
                .collect()
        })
        .collect()
}

fn options(mode: StartMode) -> HarvestOptions {
    HarvestOptions {
        mode,
        batch_size: 4,
        checkpoint_every: 5,
        progress_every: 2,
        max_records: 0,
        retry: RetryPolicy {
            rate_limit_cooldown: Duration::from_millis(5),
            retry_delay: Duration::from_millis(5),
            max_parse_retries: 2,
            max_sink_retries: 3,
        },
        ..HarvestOptions::default()
    }
}

fn all() -> HarvestScope {
    HarvestScope::all()
}

fn stored_titles(store: &MemRecordStore) -> Vec<(String, String)> {
    store
        .ids()
        .into_iter()
        .map(|id| {
            let title = store.get(&id).unwrap().unwrap().title;
            (id, title)
        })
        .collect()
}

// ── Test doubles ────────────────────────────────────────────────────────

/// Wraps a source and replaces selected calls with errors.
///
/// Each call pops one plan entry: `None` delegates, `Some(e)` fails with `e`.
/// An empty plan delegates.
struct Scripted<'a> {
    inner: &'a dyn MetadataSource,
    plan: Mutex<VecDeque<Option<ClientError>>>,
}

impl<'a> Scripted<'a> {
    fn new(inner: &'a dyn MetadataSource, plan: Vec<Option<ClientError>>) -> Self {
        Self {
            inner,
            plan: Mutex::new(plan.into()),
        }
    }
}

impl MetadataSource for Scripted<'_> {
    fn fetch_page(&self, params: &FetchParams, cancel: &CancelToken) -> ClientResult<RawPage> {
        let step = self.plan.lock().unwrap().pop_front().flatten();
        match step {
            Some(error) => Err(error),
            None => self.inner.fetch_page(params, cancel),
        }
    }
}

/// Serves literal JSON bodies in order and remembers what was asked.
struct JsonBodies {
    bodies: Mutex<VecDeque<&'static str>>,
    seen: Mutex<Vec<FetchParams>>,
}

impl JsonBodies {
    fn new(bodies: Vec<&'static str>) -> Self {
        Self {
            bodies: Mutex::new(bodies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl MetadataSource for JsonBodies {
    fn fetch_page(&self, params: &FetchParams, _cancel: &CancelToken) -> ClientResult<RawPage> {
        self.seen.lock().unwrap().push(params.clone());
        let body = self
            .bodies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no more scripted bodies");
        parse_page(body)
    }
}

/// Checkpoint store whose first `fail_saves` saves fail.
#[derive(Default)]
struct FlakyCheckpoints {
    inner: MemCheckpointStore,
    fail_saves: AtomicU32,
}

impl CheckpointStore for FlakyCheckpoints {
    fn load(&self, scope: &HarvestScope) -> CheckpointResult<Checkpoint> {
        self.inner.load(scope)
    }

    fn save(
        &self,
        scope: &HarvestScope,
        watermark: Option<Watermark>,
        cursor: Option<&ResumptionToken>,
        delta: u64,
    ) -> CheckpointResult<()> {
        let left = self.fail_saves.load(Ordering::SeqCst);
        if left > 0 {
            self.fail_saves.store(left - 1, Ordering::SeqCst);
            return Err(CheckpointError::Storage {
                scope: scope.name().to_string(),
                message: "disk full".into(),
            });
        }
        self.inner.save(scope, watermark, cursor, delta)
    }

    fn set_status(&self, scope: &HarvestScope, status: HarvestStatus) -> CheckpointResult<()> {
        self.inner.set_status(scope, status)
    }

    fn list(&self) -> CheckpointResult<Vec<Checkpoint>> {
        self.inner.list()
    }
}

/// Record store that rejects every batch while `down` is set.
#[derive(Default)]
struct DownStore {
    inner: MemRecordStore,
    down: AtomicBool,
}

impl RecordStore for DownStore {
    fn upsert_batch(&self, records: &[NormalizedRecord]) -> StoreResult<UpsertReport> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Redb {
                message: "commit failed: read-only filesystem".into(),
            });
        }
        self.inner.upsert_batch(records)
    }

    fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        self.inner.get(id)
    }

    fn len(&self) -> StoreResult<u64> {
        self.inner.len()
    }
}

/// Rejects the first `failures` batches, then accepts; remembers the
/// largest batch it saw.
struct RecoveringStore {
    inner: MemRecordStore,
    failures: AtomicU32,
    largest: AtomicUsize,
}

impl RecoveringStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemRecordStore::new(),
            failures: AtomicU32::new(failures),
            largest: AtomicUsize::new(0),
        }
    }
}

impl RecordStore for RecoveringStore {
    fn upsert_batch(&self, records: &[NormalizedRecord]) -> StoreResult<UpsertReport> {
        self.largest.fetch_max(records.len(), Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Redb {
                message: "commit failed: database locked".into(),
            });
        }
        self.inner.upsert_batch(records)
    }

    fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        self.inner.get(id)
    }

    fn len(&self) -> StoreResult<u64> {
        self.inner.len()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[test]
fn uninterrupted_run_completes() {
    let source = MockSource::new(pages(3));
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Incremental));

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.stats.pages, 3);
    assert_eq!(summary.stats.inserted, 9);
    assert_eq!(summary.total_hint, Some(9));

    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.status, HarvestStatus::Completed);
    assert_eq!(cp.continuation_cursor, None);
    assert_eq!(cp.total_harvested, 9);
    assert_eq!(cp.last_watermark, Some(date("2024-01-03")));
    assert!(cp.completed_at.is_some());
    assert_eq!(records.len().unwrap(), 9);
}

#[test]
fn second_run_starts_from_watermark_and_changes_nothing() {
    let source = MockSource::new(pages(2));
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Incremental));

    harvester.run(&all(), &CancelToken::new()).unwrap();
    let before = stored_titles(&records);
    source.reset_requests();

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.stats.inserted, 0);
    assert_eq!(summary.stats.updated, 6);
    assert_eq!(stored_titles(&records), before);

    let requests = source.requests();
    let RecordedRequest::Fresh(query) = &requests[0] else {
        panic!("incremental run must start fresh");
    };
    assert_eq!(query.from, Some(date("2024-01-02")));
    assert_eq!(query.scope_filter, None);
}

#[test]
fn crash_resume_refetches_only_pages_since_last_checkpoint() {
    let source = MockSource::new(pages(10));
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Resume));
    let cancel = CancelToken::new();

    source.crash_after(7);
    let crashed = std::panic::catch_unwind(AssertUnwindSafe(|| harvester.run(&all(), &cancel)));
    assert!(crashed.is_err());
    assert_eq!(source.served(), 7);

    // Checkpoint from page 5: its cursor points at the sixth page.
    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.status, HarvestStatus::Running);
    assert_eq!(cp.total_harvested, (5 * PER_PAGE) as u64);
    assert_eq!(cp.last_watermark, Some(date("2024-01-05")));
    assert!(cp.continuation_cursor.is_some());

    source.clear_crash();
    source.reset_requests();
    let summary = harvester.run(&all(), &cancel).unwrap();
    assert_eq!(summary.state, RunState::Completed);

    let requests = source.requests();
    assert_eq!(requests[0], RecordedRequest::Continuation { page: 5 });
    let refetched = requests
        .iter()
        .filter(|r| matches!(r, RecordedRequest::Continuation { page } if *page < 7))
        .count();
    assert_eq!(refetched, 2);
    assert!(!requests.iter().any(|r| matches!(r, RecordedRequest::Fresh(_))));

    assert_eq!(records.len().unwrap(), (10 * PER_PAGE) as u64);
    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.status, HarvestStatus::Completed);
    assert_eq!(cp.total_harvested, (10 * PER_PAGE) as u64);
}

#[test]
fn crash_and_resume_matches_uninterrupted_run() {
    let data = pages(8);

    let clean_records = MemRecordStore::new();
    {
        let source = MockSource::new(data.clone());
        let checkpoints = MemCheckpointStore::new();
        let harvester =
            Harvester::new(&source, &checkpoints, &clean_records, options(StartMode::Resume));
        harvester.run(&all(), &CancelToken::new()).unwrap();
    }

    let resumed_records = MemRecordStore::new();
    {
        let source = MockSource::new(data);
        let checkpoints = MemCheckpointStore::new();
        let harvester =
            Harvester::new(&source, &checkpoints, &resumed_records, options(StartMode::Resume));
        source.crash_after(6);
        let crashed = std::panic::catch_unwind(AssertUnwindSafe(|| {
            harvester.run(&all(), &CancelToken::new())
        }));
        assert!(crashed.is_err());
        source.clear_crash();
        harvester.run(&all(), &CancelToken::new()).unwrap();
    }

    assert_eq!(stored_titles(&resumed_records), stored_titles(&clean_records));
}

#[test]
fn insert_then_tombstone_across_two_pages() {
    let source = JsonBodies::new(vec![
        r#"{"records": [{"identifier": "A", "title": "X", "datestamp": "2024-01-01"}],
            "resumption_token": {"value": "tok1"}}"#,
        r#"{"records": [{"identifier": "A", "deleted": true}],
            "resumption_token": {"value": ""}}"#,
    ]);
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let mut opts = options(StartMode::Incremental);
    opts.batch_size = 1;
    let harvester = Harvester::new(&source, &checkpoints, &records, opts);

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.stats.inserted, 1);
    assert_eq!(summary.stats.deleted, 1);
    assert_eq!(summary.stats.suppressed, 1);

    let row = records.get("A").unwrap().unwrap();
    assert!(row.suppressed);
    assert_eq!(row.title, "X");
    assert_eq!(records.len().unwrap(), 1);

    let seen = source.seen.lock().unwrap().clone();
    let tok1 = parse_page(r#"{"resumption_token": {"value": "tok1"}}"#)
        .unwrap()
        .cursor
        .unwrap();
    assert!(matches!(seen[0], FetchParams::Fresh(_)));
    assert_eq!(seen[1], FetchParams::Continuation(tok1));

    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.continuation_cursor, None);
    assert_eq!(cp.status, HarvestStatus::Completed);
    assert_eq!(cp.last_watermark, Some(date("2024-01-01")));
}

#[test]
fn tombstone_for_unknown_record_creates_nothing() {
    let source = MockSource::new(vec![vec![WireRecord::tombstone(
        "oai:arXiv.org:gone",
        "2024-02-01",
    )]]);
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Incremental));

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.stats.dropped, 1);
    assert!(records.is_empty().unwrap());
    // Deletions do not move the watermark.
    assert_eq!(checkpoints.load(&all()).unwrap().last_watermark, None);
}

#[test]
fn cancellation_stops_between_pages_and_is_resumable() {
    let source = MockSource::new(pages(6));
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Resume));

    let cancel = CancelToken::new();
    source.cancel_after(3, cancel.clone());
    let summary = harvester.run(&all(), &cancel).unwrap();

    assert_eq!(summary.state, RunState::Interrupted);
    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert_eq!(source.served(), 3);
    // The in-flight page was processed, flushed, and checkpointed.
    assert_eq!(records.len().unwrap(), (3 * PER_PAGE) as u64);
    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.status, HarvestStatus::Idle);
    assert_eq!(cp.total_harvested, (3 * PER_PAGE) as u64);
    assert!(cp.continuation_cursor.is_some());

    source.reset_requests();
    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(source.requests()[0], RecordedRequest::Continuation { page: 3 });
    assert_eq!(records.len().unwrap(), (6 * PER_PAGE) as u64);
}

#[test]
fn budget_stop_keeps_cursor_for_next_run() {
    let source = MockSource::new(pages(5));
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let mut opts = options(StartMode::Resume);
    opts.max_records = 6;
    let harvester = Harvester::new(&source, &checkpoints, &records, opts);

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Interrupted);
    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(summary.stats.fetched, 6);
    assert_eq!(source.served(), 2);

    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.status, HarvestStatus::Idle);
    assert_eq!(cp.total_harvested, 6);

    source.reset_requests();
    let unlimited = Harvester::new(&source, &checkpoints, &records, options(StartMode::Resume));
    unlimited.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(source.requests()[0], RecordedRequest::Continuation { page: 2 });
    assert_eq!(records.len().unwrap(), (5 * PER_PAGE) as u64);
}

#[test]
fn rejected_cursor_restarts_from_stored_watermark() {
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();

    // Leave a cursor for page 4 behind.
    {
        let source = MockSource::new(pages(6));
        let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Resume));
        let cancel = CancelToken::new();
        source.cancel_after(4, cancel.clone());
        harvester.run(&all(), &cancel).unwrap();
    }

    // The source no longer knows that cursor.
    let source = MockSource::new(pages(2));
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Resume));
    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.stats.retries, 1);

    let requests = source.requests();
    assert_eq!(requests[0], RecordedRequest::UnknownCursor);
    let RecordedRequest::Fresh(query) = &requests[1] else {
        panic!("expected a fresh restart, got {:?}", requests[1]);
    };
    assert_eq!(query.from, Some(date("2024-01-04")));
}

#[test]
fn parse_failures_exhaust_and_keep_last_good_cursor() {
    let mock = MockSource::new(pages(4));
    let source = Scripted::new(
        &mock,
        vec![
            None,
            Some(ClientError::Parse { message: "truncated".into() }),
            Some(ClientError::Parse { message: "truncated".into() }),
            Some(ClientError::Parse { message: "truncated".into() }),
        ],
    );
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Resume));

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Failed);
    assert_eq!(summary.stop_reason, StopReason::ParseRetriesExhausted);
    assert_eq!(summary.stats.parse_failures, 3);

    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.status, HarvestStatus::Failed);
    assert_eq!(cp.total_harvested, PER_PAGE as u64);
    assert!(cp.continuation_cursor.is_some());
    assert_eq!(records.len().unwrap(), PER_PAGE as u64);

    mock.reset_requests();
    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(mock.requests()[0], RecordedRequest::Continuation { page: 1 });
}

#[test]
fn transient_failures_are_retried() {
    let mock = MockSource::new(pages(3));
    let source = Scripted::new(
        &mock,
        vec![
            Some(ClientError::RateLimited {
                retry_after: Some(Duration::from_millis(20)),
            }),
            None,
            Some(ClientError::Protocol {
                status: Some(502),
                message: "bad gateway".into(),
            }),
            Some(ClientError::Parse { message: "garbled".into() }),
        ],
    );
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Incremental));

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.stats.rate_limited, 1);
    assert_eq!(summary.stats.retries, 1);
    assert_eq!(summary.stats.parse_failures, 1);
    assert_eq!(records.len().unwrap(), (3 * PER_PAGE) as u64);
}

#[test]
fn cancel_during_cooldown_interrupts_promptly() {
    let mock = MockSource::new(pages(3));
    let source = Scripted::new(
        &mock,
        vec![Some(ClientError::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
        })],
    );
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Incremental));

    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });
    let started = std::time::Instant::now();
    let summary = harvester.run(&all(), &cancel).unwrap();
    handle.join().unwrap();

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(checkpoints.load(&all()).unwrap().status, HarvestStatus::Idle);
}

#[test]
fn failed_checkpoint_write_carries_delta_to_next_save() {
    let source = MockSource::new(pages(7));
    let checkpoints = FlakyCheckpoints::default();
    checkpoints.fail_saves.store(1, Ordering::SeqCst);
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Incremental));

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.stats.checkpoints_failed, 1);
    assert_eq!(summary.stats.checkpoints_written, 1);

    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.total_harvested, (7 * PER_PAGE) as u64);
}

#[test]
fn store_outage_never_checkpoints_unwritten_records() {
    let source = MockSource::new(pages(3));
    let checkpoints = MemCheckpointStore::new();
    let records = DownStore::default();
    records.down.store(true, Ordering::SeqCst);
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Incremental));

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Failed);
    assert_eq!(summary.stop_reason, StopReason::SinkUnavailable);
    assert!(summary.stats.sink_failures > 0);

    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.status, HarvestStatus::Failed);
    assert_eq!(cp.total_harvested, 0);
    assert_eq!(cp.last_watermark, None);
}

#[test]
fn brief_store_outage_pauses_then_writes_bounded_batches() {
    let source = MockSource::new(pages(4));
    let checkpoints = MemCheckpointStore::new();
    let records = RecoveringStore::new(2);
    let opts = options(StartMode::Incremental);
    let batch_size = opts.batch_size;
    let harvester = Harvester::new(&source, &checkpoints, &records, opts);

    let summary = harvester.run(&all(), &CancelToken::new()).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.stats.sink_failures, 2);
    assert_eq!(summary.stats.inserted, (4 * PER_PAGE) as u64);
    assert!(records.largest.load(Ordering::SeqCst) <= batch_size);
    assert_eq!(records.len().unwrap(), (4 * PER_PAGE) as u64);
    // Fetching stopped while the store was down.
    assert_eq!(source.requests().len(), 4);

    let cp = checkpoints.load(&all()).unwrap();
    assert_eq!(cp.total_harvested, (4 * PER_PAGE) as u64);
}

#[test]
fn scopes_harvest_concurrently_with_separate_checkpoints() {
    let source = MockSource::new(pages(4));
    let checkpoints = MemCheckpointStore::new();
    let records = MemRecordStore::new();
    let harvester = Harvester::new(&source, &checkpoints, &records, options(StartMode::Incremental));
    let scopes = [HarvestScope::named("cs"), HarvestScope::named("math")];

    let results = harvest_scopes(&harvester, &scopes, &CancelToken::new());
    assert_eq!(results.len(), 2);
    for (scope, result) in scopes.iter().zip(results) {
        let summary = result.unwrap();
        assert_eq!(&summary.scope, scope);
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(
            checkpoints.load(scope).unwrap().total_harvested,
            (4 * PER_PAGE) as u64
        );
    }
    assert_eq!(records.len().unwrap(), (4 * PER_PAGE) as u64);

    let filters: Vec<Option<String>> = source
        .requests()
        .into_iter()
        .filter_map(|r| match r {
            RecordedRequest::Fresh(q) => Some(q.scope_filter),
            _ => None,
        })
        .collect();
    assert!(filters.contains(&Some("cs".into())));
    assert!(filters.contains(&Some("math".into())));
}
