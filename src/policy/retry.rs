use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::Failure;
use crate::policy::backoff::{BackoffPolicy, JitterSource, DEFAULT_JITTER, DEFAULT_MAX_DELAY};
use crate::policy::classifier::{classify, should_retry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    pub backoff_factor: f64,
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_delay() -> Duration {
    DEFAULT_MAX_DELAY
}

fn default_jitter() -> f64 {
    DEFAULT_JITTER
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay, self.backoff_factor, self.max_delay).with_jitter(self.jitter)
    }
}

/// Run `operation` until it succeeds or `max_attempts` is used up.
///
/// The last failure is returned exactly as the operation produced it. The
/// operation may run more than once, so it has to be safe to repeat.
pub async fn retry<F, Fut, T, E>(operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Failure,
{
    run(operation, config, None::<&mut ThreadJitter>, false).await
}

/// [`retry`] with an injected jitter source, for reproducible delays.
pub async fn retry_with_jitter<F, Fut, T, E, J>(operation: F, config: &RetryConfig, jitter: &mut J) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Failure,
    J: JitterSource + ?Sized,
{
    run(operation, config, Some(jitter), false).await
}

/// Like [`retry`], but gives up straight away on failures that are not
/// transient (validation, configuration, system).
pub async fn retry_transient<F, Fut, T, E>(operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Failure,
{
    run(operation, config, None::<&mut ThreadJitter>, true).await
}

// stands in for the thread rng, which can't be held across an await
struct ThreadJitter;

impl JitterSource for ThreadJitter {
    fn next_unit(&mut self) -> f64 {
        rand::thread_rng().next_unit()
    }
}

async fn run<F, Fut, T, E, J>(
    mut operation: F,
    config: &RetryConfig,
    mut jitter: Option<&mut J>,
    transient_only: bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Failure,
    J: JitterSource + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);
    let backoff = config.backoff();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {} of {}", attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(err) => {
                let kind = classify(&err);

                if attempt >= max_attempts {
                    warn!(
                        "Operation failed after {} attempts ({} error): {}",
                        attempt,
                        kind,
                        err.as_error()
                    );
                    return Err(err);
                }

                if transient_only && !should_retry(&err, attempt, max_attempts) {
                    warn!(
                        "Not retrying {} error on attempt {}: {}",
                        kind,
                        attempt,
                        err.as_error()
                    );
                    return Err(err);
                }

                let delay = match jitter.as_deref_mut() {
                    Some(source) => backoff.delay_for(attempt, source),
                    None => backoff.delay_for(attempt, &mut ThreadJitter),
                };
                warn!(
                    "Attempt {} of {} failed ({} error): {}. Retrying in {:?}",
                    attempt,
                    max_attempts,
                    kind,
                    err.as_error(),
                    delay
                );
                drop(err);

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
