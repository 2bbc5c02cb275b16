//! Wire record → canonical record mapping.
//!
//! Normalization never fails a page: a record that lacks the fields storage
//! needs is reported as [`Normalized::Skipped`] and counted by the caller.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::client::{WireAuthor, WireCategories, WireRecord};
use crate::model::NormalizedRecord;

/// Shape of a bare DOI (`10.<registrant>/<suffix>`).
static DOI_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("DOI pattern is valid"));

/// Result of normalizing one wire record.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Record(NormalizedRecord),
    Skipped(SkipReason),
}

/// Why a record was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingIdentifier,
    MissingTitle,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentifier => f.write_str("missing identifier"),
            Self::MissingTitle => f.write_str("missing title"),
        }
    }
}

/// Map one wire record into its canonical shape.
pub fn normalize(wire: &WireRecord) -> Normalized {
    let Some(id) = wire.identifier.as_deref().and_then(extract_identifier) else {
        return Normalized::Skipped(SkipReason::MissingIdentifier);
    };
    let modified = wire.datestamp.as_deref().and_then(parse_date);

    if wire.is_tombstone() {
        return Normalized::Record(NormalizedRecord::tombstone(id, modified));
    }

    let Some(title) = wire.title.as_deref().and_then(clean_text) else {
        return Normalized::Skipped(SkipReason::MissingTitle);
    };

    let categories = wire
        .categories
        .as_ref()
        .map(split_categories)
        .unwrap_or_default();

    Normalized::Record(NormalizedRecord {
        id,
        title,
        abstract_text: wire
            .abstract_text
            .as_deref()
            .and_then(clean_text)
            .unwrap_or_default(),
        authors: wire.authors.iter().filter_map(render_author).collect(),
        primary_category: categories.first().cloned(),
        categories,
        doi: wire.identifiers.doi.as_deref().and_then(clean_doi),
        journal_ref: wire.journal_ref.as_deref().and_then(clean_text),
        comments: wire.comments.as_deref().and_then(clean_text),
        license: wire.license.as_deref().and_then(clean_text),
        published: wire.created.as_deref().and_then(parse_date),
        modified,
        citation_count: wire.citation_count,
        deleted: false,
    })
}

/// Strip an `oai:<repository>:` prefix; blank identifiers yield `None`.
pub fn extract_identifier(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let id = match raw.strip_prefix("oai:") {
        Some(rest) => rest.split_once(':').map_or(rest, |(_, local)| local),
        None => raw,
    };
    let id = id.trim();
    if id.is_empty() { None } else { Some(id.to_string()) }
}

/// NFC-normalize and collapse runs of whitespace; blank text yields `None`.
pub fn clean_text(raw: &str) -> Option<String> {
    let collapsed = raw
        .nfc()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.is_empty() { None } else { Some(collapsed) }
}

fn render_author(author: &WireAuthor) -> Option<String> {
    match author {
        WireAuthor::Name(name) => clean_text(name),
        WireAuthor::Parts {
            keyname,
            forenames,
            suffix,
        } => {
            let parts = [forenames.as_deref(), Some(keyname.as_str()), suffix.as_deref()];
            let joined = parts.iter().flatten().copied().collect::<Vec<_>>().join(" ");
            clean_text(&joined)
        }
    }
}

/// Ordered, de-duplicated category list.
fn split_categories(raw: &WireCategories) -> Vec<String> {
    let tokens: Vec<&str> = match raw {
        WireCategories::Joined(s) => s
            .split(|c: char| c.is_whitespace() || c == ',')
            .collect(),
        WireCategories::List(items) => items
            .iter()
            .flat_map(|s| s.split(|c: char| c.is_whitespace() || c == ','))
            .collect(),
    };
    let mut out: Vec<String> = Vec::new();
    for token in tokens.into_iter().map(str::trim).filter(|t| !t.is_empty()) {
        if !out.iter().any(|existing| existing == token) {
            out.push(token.to_string());
        }
    }
    out
}

fn clean_doi(raw: &str) -> Option<String> {
    let first = raw.split_whitespace().next()?;
    let lowered = first.to_ascii_lowercase();
    let bare = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lowered.starts_with(prefix).then(|| &first[prefix.len()..]))
        .unwrap_or(first);
    DOI_SHAPE.is_match(bare).then(|| bare.to_string())
}

/// Parse a date using the accepted formats in order; the first match wins.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.date_naive());
    }
    None
}
