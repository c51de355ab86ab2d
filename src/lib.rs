pub mod breaker;
pub mod config;
pub mod degradation;
pub mod error;
pub mod handler;
pub mod policy;
pub mod probe;
pub mod recovery;

pub use breaker::{CircuitBreaker, CircuitBreakerOptions, CircuitState};
pub use config::{ConfigManager, FileConfigManager, ResilienceConfig};
pub use degradation::{collect_partial_results, create_resilient_collector, execute_with_fallback};
pub use error::{ClassifiedError, ErrorContext, ErrorKind, ResilienceError, Result};
pub use handler::{instrument, ErrorHandler};
pub use policy::{classify, retry, should_retry, RetryConfig};
pub use recovery::ErrorRecoveryManager;
