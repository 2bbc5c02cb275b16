//! Protocol client error types with rich miette diagnostics.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from a single page request against the metadata source.
#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    #[error("source is rate limiting requests (retry hint: {retry_after:?})")]
    #[diagnostic(
        code(harvest::client::rate_limited),
        help(
            "The source answered 429 or 503. The harvester waits and retries the \
             same page. If this happens constantly, raise min_request_interval_ms."
        )
    )]
    RateLimited { retry_after: Option<Duration> },

    #[error("protocol error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(
        code(harvest::client::protocol),
        help(
            "The request failed at the HTTP or transport level. Check that base_url \
             is reachable; the harvester retries after retry_delay_secs."
        )
    )]
    Protocol {
        status: Option<u16>,
        message: String,
    },

    #[error("malformed page: {message}")]
    #[diagnostic(
        code(harvest::client::parse),
        help(
            "The response body was not a valid record page. The request is retried \
             a few times; a persistent failure stops the run with its last good \
             cursor kept for --resume."
        )
    )]
    Parse { message: String },

    #[error("continuation cursor rejected by source: {message}")]
    #[diagnostic(
        code(harvest::client::bad_cursor),
        help(
            "Cursors expire on the source side. The harvester drops the stored \
             cursor and restarts from the last watermark."
        )
    )]
    BadCursor { message: String },

    #[error("invalid request: {message}")]
    #[diagnostic(
        code(harvest::client::invalid_request),
        help("Check the --from and --until dates: the start must not be after the end.")
    )]
    InvalidRequest { message: String },

    #[error("request cancelled before it was sent")]
    #[diagnostic(code(harvest::client::cancelled))]
    Cancelled,
}

/// Convenience alias for protocol client results.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_shows_status_when_known() {
        let err = ClientError::Protocol {
            status: Some(500),
            message: "internal".into(),
        };
        assert_eq!(err.to_string(), "protocol error (HTTP 500): internal");

        let err = ClientError::Protocol {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "protocol error: connection reset");
    }

    #[test]
    fn rate_limited_display_includes_hint() {
        let err = ClientError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert!(err.to_string().contains("5s"));
    }
}
