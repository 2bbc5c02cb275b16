//! Protocol client for the remote metadata source.
//!
//! `MetadataSource` is the seam the orchestrator drives:
//! - `HttpSource` speaks the list protocol over ureq (sync HTTP), throttled
//!   by its own [`RateLimiter`].
//! - `MockSource` serves scripted pages for tests.
//!
//! A client performs exactly one request per call: no retries and no
//! persistence. Classifying failures is its only policy.

pub mod error;
pub mod mock;
pub mod rate_limit;

use std::collections::BTreeMap;
use std::io::Read;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::config::SourceConfig;
use crate::model::{ResumptionToken, Watermark};

pub use error::{ClientError, ClientResult};
pub use mock::MockSource;
pub use rate_limit::{RateLimiter, RatePermit};

// ── Requests ────────────────────────────────────────────────────────────

/// A query that starts a new list traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshQuery {
    /// Subset filter; `None` lists the whole source.
    pub scope_filter: Option<String>,
    /// Metadata format requested from the source (e.g. `arXiv`).
    pub metadata_format: String,
    /// Inclusive lower bound on record modification dates.
    pub from: Option<Watermark>,
    /// Inclusive upper bound on record modification dates.
    pub until: Option<Watermark>,
}

/// Parameters of one page request.
///
/// A continuation carries the cursor alone; every other parameter is implied
/// by the traversal that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchParams {
    Fresh(FreshQuery),
    Continuation(ResumptionToken),
}

impl FetchParams {
    /// Reject requests the source would refuse anyway.
    pub fn validate(&self) -> ClientResult<()> {
        if let FetchParams::Fresh(FreshQuery {
            from: Some(from),
            until: Some(until),
            ..
        }) = self
        {
            if from > until {
                return Err(ClientError::InvalidRequest {
                    message: format!("from {from} is after until {until}"),
                });
            }
        }
        Ok(())
    }

    pub fn is_continuation(&self) -> bool {
        matches!(self, FetchParams::Continuation(_))
    }
}

impl std::fmt::Display for FetchParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchParams::Fresh(q) => {
                write!(f, "fresh(set={}", q.scope_filter.as_deref().unwrap_or("*"))?;
                if let Some(from) = q.from {
                    write!(f, ", from={from}")?;
                }
                if let Some(until) = q.until {
                    write!(f, ", until={until}")?;
                }
                f.write_str(")")
            }
            FetchParams::Continuation(token) => write!(f, "continuation({} bytes)", token.len()),
        }
    }
}

// ── Wire records ────────────────────────────────────────────────────────

/// An author as sent by the source: either a display string or name parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireAuthor {
    Name(String),
    Parts {
        keyname: String,
        #[serde(default)]
        forenames: Option<String>,
        #[serde(default)]
        suffix: Option<String>,
    },
}

/// Classification field: a space separated string or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireCategories {
    Joined(String),
    List(Vec<String>),
}

/// Structured identifiers attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireIdentifiers {
    #[serde(default)]
    pub doi: Option<String>,
    /// Identifiers the harvester does not interpret.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// One record as it appears in a page, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default, alias = "modified_at")]
    pub datestamp: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    /// Record status marker; `"deleted"` marks a tombstone.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<WireAuthor>,
    #[serde(default)]
    pub categories: Option<WireCategories>,
    #[serde(default)]
    pub identifiers: WireIdentifiers,
    #[serde(default)]
    pub journal_ref: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default, alias = "created_at")]
    pub created: Option<String>,
    #[serde(default)]
    pub citation_count: Option<u64>,
}

impl WireRecord {
    /// A regular record with the fields every source sends.
    pub fn article(identifier: &str, title: &str, datestamp: &str) -> Self {
        Self {
            identifier: Some(identifier.to_string()),
            title: Some(title.to_string()),
            datestamp: Some(datestamp.to_string()),
            ..Default::default()
        }
    }

    /// A deletion tombstone.
    pub fn tombstone(identifier: &str, datestamp: &str) -> Self {
        Self {
            identifier: Some(identifier.to_string()),
            datestamp: Some(datestamp.to_string()),
            status: Some("deleted".to_string()),
            ..Default::default()
        }
    }

    /// Whether the source marked this record as deleted.
    pub fn is_tombstone(&self) -> bool {
        self.deleted
            || self
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("deleted"))
    }
}

/// One response of the list protocol.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Records in source order.
    pub records: Vec<WireRecord>,
    /// Cursor for the next page; `None` means the traversal is complete.
    pub cursor: Option<ResumptionToken>,
    /// Total number of records in the traversal, if the source says.
    pub complete_list_size: Option<u64>,
    /// Position of this page within the traversal, if the source says.
    pub cursor_offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WirePage {
    #[serde(default)]
    records: Vec<WireRecord>,
    #[serde(default)]
    resumption_token: Option<WireToken>,
    #[serde(default)]
    error: Option<WireSourceError>,
}

#[derive(Debug, Deserialize)]
struct WireToken {
    #[serde(default)]
    value: String,
    #[serde(default)]
    complete_list_size: Option<u64>,
    #[serde(default)]
    cursor: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireSourceError {
    code: String,
    #[serde(default)]
    message: String,
}

/// Parse one response body into a page.
///
/// `noRecordsMatch` is the source's way of saying "nothing in this window"
/// and becomes an empty final page.
pub fn parse_page(body: &str) -> ClientResult<RawPage> {
    let wire: WirePage = serde_json::from_str(body).map_err(|e| ClientError::Parse {
        message: format!("page body: {e}"),
    })?;

    if let Some(err) = wire.error {
        return match err.code.as_str() {
            "noRecordsMatch" => Ok(RawPage::default()),
            "badResumptionToken" => Err(ClientError::BadCursor {
                message: err.message,
            }),
            code => Err(ClientError::Protocol {
                status: None,
                message: format!("{code}: {}", err.message),
            }),
        };
    }

    let (cursor, complete_list_size, cursor_offset) = match wire.resumption_token {
        Some(token) => (
            ResumptionToken::from_wire(token.value),
            token.complete_list_size,
            token.cursor,
        ),
        None => (None, None, None),
    };

    Ok(RawPage {
        records: wire.records,
        cursor,
        complete_list_size,
        cursor_offset,
    })
}

// ── MetadataSource trait ────────────────────────────────────────────────

/// A paginated metadata source.
///
/// Implementations must be `Sync`: one client, and therefore one rate
/// limiter, can serve several scopes harvesting on parallel threads.
pub trait MetadataSource: Send + Sync {
    /// Fetch one page. Sleeps for rate limiting first; the sleep is cut
    /// short when `cancel` fires.
    fn fetch_page(&self, params: &FetchParams, cancel: &CancelToken) -> ClientResult<RawPage>;
}

// ── HttpSource ──────────────────────────────────────────────────────────

/// HTTP client for the list protocol using ureq.
pub struct HttpSource {
    agent: ureq::Agent,
    base_url: String,
    limiter: RateLimiter,
}

impl HttpSource {
    /// Create a client (no request is made yet).
    pub fn new(config: &SourceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            base_url: config.base_url.clone(),
            limiter: RateLimiter::new(config.min_request_interval()),
        }
    }

    fn build_request(&self, params: &FetchParams) -> ureq::Request {
        let request = self
            .agent
            .get(&self.base_url)
            .set("Accept", "application/json")
            .query("verb", "ListRecords");
        match params {
            FetchParams::Continuation(token) => request.query("resumptionToken", token.as_wire()),
            FetchParams::Fresh(q) => {
                let mut request = request.query("metadataPrefix", &q.metadata_format);
                if let Some(set) = &q.scope_filter {
                    request = request.query("set", set);
                }
                if let Some(from) = q.from {
                    request = request.query("from", &format_date(from));
                }
                if let Some(until) = q.until {
                    request = request.query("until", &format_date(until));
                }
                request
            }
        }
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("base_url", &self.base_url)
            .field("min_interval", &self.limiter.min_interval())
            .finish()
    }
}

impl MetadataSource for HttpSource {
    fn fetch_page(&self, params: &FetchParams, cancel: &CancelToken) -> ClientResult<RawPage> {
        params.validate()?;
        let request = self.build_request(params);

        let permit = self.limiter.acquire(cancel)?;
        let started = Instant::now();
        let outcome = request.call();

        let body = match outcome {
            Ok(response) => {
                let mut body = String::new();
                response
                    .into_reader()
                    .read_to_string(&mut body)
                    .map_err(|e| ClientError::Protocol {
                        status: None,
                        message: format!("reading response body: {e}"),
                    })?;
                body
            }
            Err(ureq::Error::Status(code, response)) => {
                if code == 429 || code == 503 {
                    let retry_after = parse_retry_after(response.header("Retry-After"));
                    return Err(ClientError::RateLimited { retry_after });
                }
                let body = response.into_string().unwrap_or_default();
                return Err(ClientError::Protocol {
                    status: Some(code),
                    message: preview(&body),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(ClientError::Protocol {
                    status: None,
                    message: transport.to_string(),
                });
            }
        };
        drop(permit);

        tracing::debug!(
            request = %params,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page fetched"
        );
        parse_page(&body)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Interpret a `Retry-After` header: delay in seconds or an HTTP date.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let value = value?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

fn preview(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

// ── Tests ───────────────────────────────────────────────────────────────
