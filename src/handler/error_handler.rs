use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, warn};

use crate::error::{ClassifiedError, ErrorContext, ErrorKind, Failure};
use crate::policy::classify;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub total_errors: u64,
    pub errors_by_type: HashMap<ErrorKind, u64>,
}

impl ErrorMetrics {
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.errors_by_type.get(&kind).copied().unwrap_or(0)
    }

    fn record(&mut self, kind: ErrorKind) {
        self.total_errors += 1;
        *self.errors_by_type.entry(kind).or_insert(0) += 1;
    }
}

/// Classifies, counts and logs failures at the edge of the layer.
#[derive(Default)]
pub struct ErrorHandler {
    component: Option<String>,
    metrics: Mutex<ErrorMetrics>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every log line with the owning component.
    pub fn for_component(component: impl Into<String>) -> Self {
        Self {
            component: Some(component.into()),
            metrics: Mutex::new(ErrorMetrics::default()),
        }
    }

    fn lock_metrics(&self) -> MutexGuard<'_, ErrorMetrics> {
        self.metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn handle<F: Failure + ?Sized>(&self, failure: &F, context: ErrorContext) -> ClassifiedError {
        let err = failure.as_error();
        let kind = classify(failure);
        let message = match err.downcast_ref::<ClassifiedError>() {
            Some(classified) => classified.message.clone(),
            None => err.to_string(),
        };
        let classified = ClassifiedError::new(kind, message, context);

        self.lock_metrics().record(kind);
        self.log(&classified);
        classified
    }

    fn log(&self, err: &ClassifiedError) {
        let component = self.component.as_deref().unwrap_or("resilience");
        let url = err.context.url.as_deref().unwrap_or("-");

        match err.kind {
            ErrorKind::Network | ErrorKind::Scraping => warn!(
                "[{}] {} error in {} (attempt {}, url {}): {}",
                component, err.kind, err.context.operation, err.context.attempt, url, err.message
            ),
            ErrorKind::Validation | ErrorKind::Configuration | ErrorKind::System => error!(
                "[{}] {} error in {} (attempt {}, url {}): {}",
                component, err.kind, err.context.operation, err.context.attempt, url, err.message
            ),
        }
    }

    pub fn get_metrics(&self) -> ErrorMetrics {
        self.lock_metrics().clone()
    }

    pub fn reset_metrics(&self) {
        *self.lock_metrics() = ErrorMetrics::default();
    }
}
