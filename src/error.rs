use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = BoxError> = std::result::Result<T, E>;

/// The fixed set of buckets every failure is sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Scraping,
    Validation,
    Configuration,
    System,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::Network,
        ErrorKind::Scraping,
        ErrorKind::Validation,
        ErrorKind::Configuration,
        ErrorKind::System,
    ];

    /// Transient kinds worth another attempt. Validation and configuration
    /// failures are caller errors and system failures are unknown, so none of
    /// those are ever retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Scraping)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Scraping => write!(f, "scraping"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::System => write!(f, "system"),
        }
    }
}

/// Where and when a failure happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    pub url: Option<String>,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            url: None,
            attempt: 1,
            timestamp: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} error in {}: {message}", .context.operation)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: ErrorContext,
    pub retryable: bool,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, context: ErrorContext) -> Self {
        Self {
            kind,
            message: message.into(),
            context,
            retryable: kind.is_retryable(),
        }
    }

    pub fn network(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(ErrorKind::Network, message, context)
    }

    pub fn scraping(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(ErrorKind::Scraping, message, context)
    }

    pub fn validation(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(ErrorKind::Validation, message, context)
    }

    pub fn configuration(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(ErrorKind::Configuration, message, context)
    }

    pub fn system(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::new(ErrorKind::System, message, context)
    }
}

/// Failures raised by the resilience layer itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResilienceError {
    #[error("Circuit breaker for {resource} is open, retry in {retry_in:?}")]
    CircuitOpen { resource: String, retry_in: Duration },

    #[error("Insufficient data for partial recovery, missing fields: {}", .missing.join(", "))]
    InsufficientPartialData { missing: Vec<String> },

    #[error("Only {succeeded}/{total} operations succeeded, at least {required} required")]
    InsufficientSuccesses {
        succeeded: usize,
        total: usize,
        required: usize,
    },

    #[error("Missing required fields: {}", .missing.join(", "))]
    MissingRequiredFields { missing: Vec<String> },

    #[error("Recovery action failed: {0}")]
    RecoveryFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Anything the classifier can look inside.
///
/// Implemented explicitly rather than blanket over `std::error::Error` so that
/// boxed trait objects and `anyhow::Error` qualify too.
pub trait Failure {
    fn as_error(&self) -> &(dyn std::error::Error + 'static);
}

impl Failure for BoxError {
    fn as_error(&self) -> &(dyn std::error::Error + 'static) {
        &**self
    }
}

impl Failure for anyhow::Error {
    fn as_error(&self) -> &(dyn std::error::Error + 'static) {
        let err: &(dyn std::error::Error + 'static) = self.as_ref();
        err
    }
}

impl Failure for dyn std::error::Error + Send + Sync + 'static {
    fn as_error(&self) -> &(dyn std::error::Error + 'static) {
        self
    }
}

macro_rules! impl_failure {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Failure for $ty {
                fn as_error(&self) -> &(dyn std::error::Error + 'static) {
                    self
                }
            }
        )*
    };
}

impl_failure!(
    ClassifiedError,
    ResilienceError,
    std::io::Error,
    reqwest::Error,
    config::ConfigError,
    toml::de::Error,
);

// conversions for the config layer
impl From<config::ConfigError> for ResilienceError {
    fn from(err: config::ConfigError) -> Self {
        ResilienceError::ConfigError(err.to_string())
    }
}

impl From<toml::de::Error> for ResilienceError {
    fn from(err: toml::de::Error) -> Self {
        ResilienceError::ConfigError(err.to_string())
    }
}

impl From<toml::ser::Error> for ResilienceError {
    fn from(err: toml::ser::Error) -> Self {
        ResilienceError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_follows_kind() {
        let ctx = ErrorContext::new("fetch_page");
        assert!(ClassifiedError::network("down", ctx.clone()).retryable);
        assert!(ClassifiedError::scraping("moved", ctx.clone()).retryable);
        assert!(!ClassifiedError::validation("bad", ctx.clone()).retryable);
        assert!(!ClassifiedError::configuration("bad", ctx.clone()).retryable);
        assert!(!ClassifiedError::system("boom", ctx).retryable);
    }

    #[test]
    fn test_context_builder() {
        let ctx = ErrorContext::new("extract")
            .with_url("https://example.com/fixtures")
            .with_attempt(3);

        assert_eq!(ctx.operation, "extract");
        assert_eq!(ctx.url.as_deref(), Some("https://example.com/fixtures"));
        assert_eq!(ctx.attempt, 3);
    }

    #[test]
    fn test_error_messages() {
        let err = ClassifiedError::scraping("selector not found: .odds", ErrorContext::new("extract_odds"));
        assert_eq!(err.to_string(), "scraping error in extract_odds: selector not found: .odds");

        let err = ResilienceError::MissingRequiredFields {
            missing: vec!["name".to_string(), "date".to_string()],
        };
        assert_eq!(err.to_string(), "Missing required fields: name, date");
    }
}
