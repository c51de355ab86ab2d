pub mod circuit_breaker;

#[cfg(test)]
mod tests;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerOptions, CircuitBreakerState, CircuitBreakerStats, CircuitState,
};
