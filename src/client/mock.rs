//! In-memory metadata source for tests.
//!
//! Serves a fixed list of pages with deterministic cursors, records every
//! request, and can inject failures, fire a cancellation mid-fetch, or panic
//! to simulate a crash.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::cancel::CancelToken;
use crate::client::error::{ClientError, ClientResult};
use crate::client::{FetchParams, FreshQuery, MetadataSource, RawPage, WireRecord};
use crate::model::ResumptionToken;

const CURSOR_PREFIX: &str = "page:";

/// A request as observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedRequest {
    Fresh(FreshQuery),
    /// Continuation that asked for the page at this index.
    Continuation { page: usize },
    /// Continuation with a cursor the mock never issued.
    UnknownCursor,
}

#[derive(Default)]
struct MockState {
    requests: Vec<RecordedRequest>,
    failures: VecDeque<ClientError>,
    served: usize,
    crash_after: Option<usize>,
    cancel_after: Option<(usize, CancelToken)>,
}

/// Scripted source: page `i` links to page `i + 1`, the last page ends the
/// traversal.
pub struct MockSource {
    pages: Vec<Vec<WireRecord>>,
    state: Mutex<MockState>,
}

impl MockSource {
    pub fn new(pages: Vec<Vec<WireRecord>>) -> Self {
        Self {
            pages,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Fail the next request with `error` (queued, one per request).
    pub fn push_failure(&self, error: ClientError) {
        self.lock().failures.push_back(error);
    }

    /// Panic on the request after `pages` successful pages have been served,
    /// counted from now.
    pub fn crash_after(&self, pages: usize) {
        let mut state = self.lock();
        state.crash_after = Some(state.served + pages);
    }

    /// Stop simulating crashes.
    pub fn clear_crash(&self) {
        self.lock().crash_after = None;
    }

    /// Cancel `token` while serving the `pages`-th page from now, as if a
    /// shutdown signal arrived during that fetch.
    pub fn cancel_after(&self, pages: usize, token: CancelToken) {
        let mut state = self.lock();
        state.cancel_after = Some((state.served + pages, token));
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Forget recorded requests.
    pub fn reset_requests(&self) {
        self.lock().requests.clear();
    }

    /// Number of pages served successfully.
    pub fn served(&self) -> usize {
        self.lock().served
    }

    /// Total records across all pages.
    pub fn total_records(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn page_index(token: &ResumptionToken) -> Option<usize> {
        token.as_wire().strip_prefix(CURSOR_PREFIX)?.parse().ok()
    }
}

impl std::fmt::Debug for MockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource")
            .field("pages", &self.pages.len())
            .finish()
    }
}

impl MetadataSource for MockSource {
    fn fetch_page(&self, params: &FetchParams, cancel: &CancelToken) -> ClientResult<RawPage> {
        params.validate()?;
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let mut state = self.lock();
        if state.crash_after.is_some_and(|limit| state.served >= limit) {
            // Release the lock so the mock stays usable after the unwind.
            drop(state);
            panic!("simulated crash while fetching {params}");
        }

        let index = match params {
            FetchParams::Fresh(q) => {
                state.requests.push(RecordedRequest::Fresh(q.clone()));
                Some(0)
            }
            FetchParams::Continuation(token) => match Self::page_index(token) {
                Some(page) if page < self.pages.len() => {
                    state.requests.push(RecordedRequest::Continuation { page });
                    Some(page)
                }
                _ => {
                    state.requests.push(RecordedRequest::UnknownCursor);
                    None
                }
            },
        };

        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        let Some(index) = index else {
            return Err(ClientError::BadCursor {
                message: "cursor not issued by this source".into(),
            });
        };

        state.served += 1;
        if let Some((at, token)) = &state.cancel_after {
            if state.served == *at {
                token.cancel();
            }
        }

        if self.pages.is_empty() {
            return Ok(RawPage::default());
        }
        let next = index + 1;
        let cursor = if next < self.pages.len() {
            ResumptionToken::from_wire(format!("{CURSOR_PREFIX}{next}"))
        } else {
            None
        };
        Ok(RawPage {
            records: self.pages[index].clone(),
            cursor,
            complete_list_size: Some(self.total_records() as u64),
            cursor_offset: Some(self.pages[..index].iter().map(Vec::len).sum::<usize>() as u64),
        })
    }
}
