use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ResilienceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls flow through normally.
    Closed,
    /// The resource is failing, calls are rejected without running.
    Open,
    /// Cooldown elapsed, a single probe call decides what happens next.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerOptions {
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
    /// Failures further apart than this no longer add up while closed.
    #[serde(with = "humantime_serde")]
    pub monitoring_period: Duration,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(120),
        }
    }
}

/// What [`CircuitBreakerState::admit`] decided for an incoming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// First call after the cooldown, runs while the circuit is half-open.
    Probe,
    Rejected { retry_in: Duration },
}

/// The breaker's state machine, free of locks and clocks.
///
/// Every transition takes the current instant from the caller so the machine
/// can be driven directly in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<Instant>,
    pub options: CircuitBreakerOptions,
    probe_in_flight: bool,
}

impl CircuitBreakerState {
    pub fn new(options: CircuitBreakerOptions) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            options,
            probe_in_flight: false,
        }
    }

    pub fn admit(mut self, now: Instant) -> (Self, Admission) {
        match self.state {
            CircuitState::Closed => (self, Admission::Allowed),
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    let retry_in = self.remaining_cooldown(now);
                    (self, Admission::Rejected { retry_in })
                } else {
                    self.probe_in_flight = true;
                    (self, Admission::Probe)
                }
            }
            CircuitState::Open => {
                let retry_in = self.remaining_cooldown(now);
                if retry_in.is_zero() {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    (self, Admission::Probe)
                } else {
                    (self, Admission::Rejected { retry_in })
                }
            }
        }
    }

    pub fn on_success(mut self) -> Self {
        self.failure_count = 0;
        self.success_count += 1;
        self.probe_in_flight = false;
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
        }
        self
    }

    pub fn on_failure(mut self, now: Instant) -> Self {
        // a stale failure streak doesn't count towards the threshold
        if self.state == CircuitState::Closed {
            if let Some(last) = self.last_failure_time {
                if now.saturating_duration_since(last) > self.options.monitoring_period {
                    self.failure_count = 0;
                }
            }
        }

        self.failure_count += 1;
        self.last_failure_time = Some(now);
        self.probe_in_flight = false;

        if self.state == CircuitState::HalfOpen || self.failure_count >= self.options.failure_threshold {
            self.state = CircuitState::Open;
        }
        self
    }

    /// Zeroed counters, closed circuit.
    pub fn reset(self) -> Self {
        Self::new(self.options)
    }

    /// Open circuit with a fresh cooldown starting at `now`.
    pub fn trip(mut self, now: Instant) -> Self {
        self.state = CircuitState::Open;
        self.last_failure_time = Some(now);
        self.probe_in_flight = false;
        self
    }

    fn remaining_cooldown(&self, now: Instant) -> Duration {
        match self.last_failure_time {
            Some(last) => self
                .options
                .reset_timeout
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerStats {
    pub resource: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub rejected_count: u64,
    pub last_failure_time: Option<Instant>,
}

struct Inner {
    machine: CircuitBreakerState,
    rejected_count: u64,
}

/// Guards one resource (typically one target host).
///
/// Owned per resource and never shared between unrelated ones. The lock is
/// only held while a transition is applied, never across the wrapped call.
pub struct CircuitBreaker {
    resource: String,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(resource: impl Into<String>, options: CircuitBreakerOptions) -> Self {
        Self {
            resource: resource.into(),
            inner: Mutex::new(Inner {
                machine: CircuitBreakerState::new(options),
                rejected_count: 0,
            }),
        }
    }

    pub fn with_defaults(resource: impl Into<String>) -> Self {
        Self::new(resource, CircuitBreakerOptions::default())
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex for '{}' was poisoned, recovering", self.resource);
            poisoned.into_inner()
        })
    }

    fn apply<R>(&self, transition: impl FnOnce(CircuitBreakerState) -> (CircuitBreakerState, R)) -> R {
        let mut inner = self.lock_inner();
        let machine = inner.machine.clone();
        let (next, output) = transition(machine);
        inner.machine = next;
        output
    }

    /// Run `operation` unless the circuit is open.
    ///
    /// While open and inside the cooldown the operation is not invoked at all
    /// and [`ResilienceError::CircuitOpen`] is returned. Failures of the
    /// operation itself are always passed back unchanged.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        let admission = {
            let mut inner = self.lock_inner();
            let (next, admission) = inner.machine.clone().admit(Instant::now());
            inner.machine = next;
            if matches!(admission, Admission::Rejected { .. }) {
                inner.rejected_count += 1;
            }
            admission
        };

        let mut probe = None;
        match admission {
            Admission::Rejected { retry_in } => {
                debug!("Circuit for '{}' is open, rejecting call", self.resource);
                return Err(ResilienceError::CircuitOpen {
                    resource: self.resource.clone(),
                    retry_in,
                }
                .into());
            }
            Admission::Probe => {
                info!("Circuit breaker: '{}' is HalfOpen, letting a probe call through", self.resource);
                probe = Some(ProbeGuard { breaker: self });
            }
            Admission::Allowed => {}
        }

        let result = operation().await;
        if let Some(guard) = probe {
            guard.disarm();
        }

        match result {
            Ok(value) => {
                let closed = self.apply(|machine| {
                    let was_half_open = machine.state == CircuitState::HalfOpen;
                    (machine.on_success(), was_half_open)
                });
                if closed {
                    info!("Circuit breaker: closing circuit for '{}' after successful probe", self.resource);
                }
                Ok(value)
            }
            Err(err) => {
                let (opened, failures) = self.apply(|machine| {
                    let before = machine.state;
                    let next = machine.on_failure(Instant::now());
                    let opened = before != CircuitState::Open && next.state == CircuitState::Open;
                    let failures = next.failure_count;
                    (next, (opened, failures))
                });
                if opened {
                    warn!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        self.resource, failures
                    );
                } else {
                    debug!("Circuit breaker: failure for '{}' ({} so far)", self.resource, failures);
                }
                Err(err)
            }
        }
    }

    pub fn get_state(&self) -> CircuitState {
        self.lock_inner().machine.state
    }

    pub fn get_stats(&self) -> CircuitBreakerStats {
        let inner = self.lock_inner();
        CircuitBreakerStats {
            resource: self.resource.clone(),
            state: inner.machine.state,
            failure_count: inner.machine.failure_count,
            success_count: inner.machine.success_count,
            rejected_count: inner.rejected_count,
            last_failure_time: inner.machine.last_failure_time,
        }
    }

    /// Administrative override: closed, counters zeroed.
    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        inner.machine = inner.machine.clone().reset();
        inner.rejected_count = 0;
        info!("Circuit breaker: manually resetting circuit for '{}'", self.resource);
    }

    /// Administrative override: open now, cooldown restarts.
    pub fn trip(&self) {
        self.apply(|machine| (machine.trip(Instant::now()), ()));
        warn!("Circuit breaker: manually tripped circuit for '{}'", self.resource);
    }
}

// frees the half-open slot if the probe's future is dropped before finishing
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
}

impl ProbeGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        debug!("Probe for '{}' was cancelled, releasing half-open slot", self.breaker.resource);
        self.breaker.lock_inner().machine.probe_in_flight = false;
    }
}
