#[cfg(test)]
mod tests {
    use crate::breaker::*;
    use crate::error::{BoxError, ResilienceError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{advance, Instant};

    fn options(threshold: u32, reset_timeout: Duration) -> CircuitBreakerOptions {
        CircuitBreakerOptions {
            failure_threshold: threshold,
            reset_timeout,
            monitoring_period: Duration::from_secs(600),
        }
    }

    async fn failing(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BoxError> {
        breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), BoxError>("ECONNREFUSED".into())
            })
            .await
    }

    async fn succeeding(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<&'static str, BoxError> {
        breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>("page")
            })
            .await
    }

    #[test]
    fn test_state_machine_opens_at_threshold() {
        let now = Instant::now();
        let mut state = CircuitBreakerState::new(options(3, Duration::from_secs(30)));

        state = state.on_failure(now);
        state = state.on_failure(now);
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 2);

        state = state.on_failure(now);
        assert_eq!(state.state, CircuitState::Open);
        assert_eq!(state.last_failure_time, Some(now));
    }

    #[test]
    fn test_state_machine_admission() {
        let now = Instant::now();
        let state = CircuitBreakerState::new(options(1, Duration::from_secs(30))).on_failure(now);

        let (state, admission) = state.admit(now + Duration::from_secs(10));
        assert_eq!(
            admission,
            Admission::Rejected {
                retry_in: Duration::from_secs(20)
            }
        );
        assert_eq!(state.state, CircuitState::Open);

        let (state, admission) = state.admit(now + Duration::from_secs(30));
        assert_eq!(admission, Admission::Probe);
        assert_eq!(state.state, CircuitState::HalfOpen);

        // only one probe at a time
        let (state, admission) = state.admit(now + Duration::from_secs(31));
        assert!(matches!(admission, Admission::Rejected { .. }));

        let state = state.on_success();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.success_count, 1);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let now = Instant::now();
        let state = CircuitBreakerState::new(options(3, Duration::from_secs(5)))
            .on_failure(now)
            .on_failure(now)
            .on_failure(now);
        let (state, _) = state.admit(now + Duration::from_secs(5));
        assert_eq!(state.state, CircuitState::HalfOpen);

        let later = now + Duration::from_secs(6);
        let state = state.on_failure(later);
        assert_eq!(state.state, CircuitState::Open);
        assert_eq!(state.last_failure_time, Some(later));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let now = Instant::now();
        let state = CircuitBreakerState::new(options(3, Duration::from_secs(5)))
            .on_failure(now)
            .on_failure(now)
            .on_success()
            .on_failure(now);

        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 1);
    }

    #[test]
    fn test_stale_failures_fall_out_of_the_window() {
        let now = Instant::now();
        let opts = CircuitBreakerOptions {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(5),
            monitoring_period: Duration::from_secs(60),
        };
        let state = CircuitBreakerState::new(opts)
            .on_failure(now)
            .on_failure(now + Duration::from_secs(61));

        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_operation() {
        let breaker = CircuitBreaker::new("fixtures.example.com", options(3, Duration::from_secs(30)));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let err = failing(&breaker, &calls).await.unwrap_err();
            assert_eq!(err.to_string(), "ECONNREFUSED");
        }
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // fourth call is rejected without running the operation
        let err = succeeding(&breaker, &calls).await.unwrap_err();
        let circuit_err = err.downcast_ref::<ResilienceError>().unwrap();
        assert!(matches!(circuit_err, ResilienceError::CircuitOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.get_stats().rejected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_reset_timeout() {
        let breaker = CircuitBreaker::new("odds.example.com", options(2, Duration::from_secs(30)));
        let calls = AtomicU32::new(0);

        failing(&breaker, &calls).await.unwrap_err();
        failing(&breaker, &calls).await.unwrap_err();
        assert_eq!(breaker.get_state(), CircuitState::Open);

        advance(Duration::from_secs(29)).await;
        assert!(succeeding(&breaker, &calls).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        advance(Duration::from_secs(1)).await;
        assert_eq!(succeeding(&breaker, &calls).await.unwrap(), "page");

        let stats = breaker.get_stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let breaker = CircuitBreaker::new("results.example.com", options(1, Duration::from_secs(10)));
        let calls = AtomicU32::new(0);

        failing(&breaker, &calls).await.unwrap_err();
        advance(Duration::from_secs(10)).await;

        let err = failing(&breaker, &calls).await.unwrap_err();
        assert_eq!(err.to_string(), "ECONNREFUSED");
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // cooldown restarted from the failed probe
        advance(Duration::from_secs(5)).await;
        assert!(succeeding(&breaker, &calls).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_frees_the_slot() {
        let breaker = Arc::new(CircuitBreaker::new("slow.example.com", options(1, Duration::from_secs(10))));
        let calls = AtomicU32::new(0);

        failing(&breaker, &calls).await.unwrap_err();
        advance(Duration::from_secs(10)).await;

        let probe = breaker.execute(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, BoxError>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_secs(1), probe).await;
        assert!(timed_out.is_err());
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);

        assert_eq!(succeeding(&breaker, &calls).await.unwrap(), "page");
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_manual_trip_and_reset() {
        let breaker = CircuitBreaker::with_defaults("admin.example.com");
        let calls = AtomicU32::new(0);

        breaker.trip();
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert!(succeeding(&breaker, &calls).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        breaker.reset();
        let stats = breaker.get_stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.rejected_count, 0);

        assert!(succeeding(&breaker, &calls).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_breakers_are_isolated() {
        let first = CircuitBreaker::new("a.example.com", options(1, Duration::from_secs(60)));
        let second = CircuitBreaker::new("b.example.com", options(1, Duration::from_secs(60)));
        let calls = AtomicU32::new(0);

        failing(&first, &calls).await.unwrap_err();
        assert_eq!(first.get_state(), CircuitState::Open);
        assert_eq!(second.get_state(), CircuitState::Closed);
        assert!(succeeding(&second, &calls).await.is_ok());
    }
}
