use futures::future::join_all;
use std::future::Future;
use tracing::{info, warn};

use crate::error::ResilienceError;

#[derive(Debug)]
pub struct FailedOperation<E> {
    pub error: E,
    /// Position of the operation in the input.
    pub index: usize,
}

#[derive(Debug)]
pub struct PartialResults<T, E> {
    pub successful: Vec<T>,
    pub failed: Vec<FailedOperation<E>>,
    pub success_rate: f64,
}

impl<T, E> PartialResults<T, E> {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

/// Run every operation to completion, independently of the others.
///
/// Both lists keep input order. Fails only when fewer than
/// `min_success_count` operations succeeded.
pub async fn collect_partial_results<I, Fut, T, E>(
    operations: I,
    min_success_count: usize,
) -> Result<PartialResults<T, E>, ResilienceError>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let outcomes = join_all(operations).await;
    let total = outcomes.len();

    let mut successful = Vec::new();
    let mut failed = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => successful.push(value),
            Err(error) => failed.push(FailedOperation { error, index }),
        }
    }

    let success_rate = if total == 0 {
        0.0
    } else {
        successful.len() as f64 / total as f64
    };

    if successful.len() < min_success_count {
        warn!(
            "Only {}/{} operations succeeded, {} required",
            successful.len(),
            total,
            min_success_count
        );
        return Err(ResilienceError::InsufficientSuccesses {
            succeeded: successful.len(),
            total,
            required: min_success_count,
        });
    }

    info!(
        "Partial collection finished: {}/{} succeeded ({:.0}%)",
        successful.len(),
        total,
        success_rate * 100.0
    );

    Ok(PartialResults {
        successful,
        failed,
        success_rate,
    })
}
