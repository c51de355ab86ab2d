use std::error::Error as StdError;
use std::io;

use crate::error::{ClassifiedError, ErrorKind, Failure};

// ordered: the first group with a hit decides the kind
const KEYWORD_GROUPS: [(ErrorKind, &[&str]); 4] = [
    (
        ErrorKind::Network,
        &["econnrefused", "etimedout", "fetch failed", "network timeout"],
    ),
    (
        ErrorKind::Scraping,
        &[
            "selector not found",
            "element not found",
            "page not loaded",
            "waiting for selector",
        ],
    ),
    (
        ErrorKind::Validation,
        &["validation failed", "invalid data", "required field", "schema"],
    ),
    (
        ErrorKind::Configuration,
        &[
            "configuration",
            "invalid setting",
            "environment variable",
            "config validation",
        ],
    ),
];

/// Sort an arbitrary failure into exactly one [`ErrorKind`].
///
/// Already classified failures keep their kind. Transport errors from `std::io`
/// and `reqwest` are recognised by type, everything else by message keywords.
/// Anything unmatched is [`ErrorKind::System`].
pub fn classify<F: Failure + ?Sized>(failure: &F) -> ErrorKind {
    classify_error(failure.as_error())
}

pub fn classify_error(err: &(dyn StdError + 'static)) -> ErrorKind {
    if let Some(kind) = typed_kind(err) {
        return kind;
    }
    classify_message(&error_chain_message(err))
}

/// Keyword classification on a bare message.
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();

    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| message.contains(keyword)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::System)
}

pub fn is_retryable<F: Failure + ?Sized>(failure: &F) -> bool {
    classify(failure).is_retryable()
}

/// Whether another attempt is worthwhile. Out of budget is always `false`,
/// otherwise only network and scraping failures qualify.
pub fn should_retry<F: Failure + ?Sized>(failure: &F, attempt: u32, max_attempts: u32) -> bool {
    if attempt >= max_attempts {
        return false;
    }
    is_retryable(failure)
}

fn typed_kind(err: &(dyn StdError + 'static)) -> Option<ErrorKind> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);

    while let Some(err) = current {
        if let Some(classified) = err.downcast_ref::<ClassifiedError>() {
            return Some(classified.kind);
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if is_transient_io(io_err.kind()) {
                return Some(ErrorKind::Network);
            }
        }
        if let Some(http_err) = err.downcast_ref::<reqwest::Error>() {
            if http_err.is_timeout() || http_err.is_connect() || http_err.is_request() {
                return Some(ErrorKind::Network);
            }
        }
        current = err.source();
    }

    None
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
    )
}

fn error_chain_message(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
