pub mod backoff;
pub mod classifier;
pub mod retry;


pub use backoff::{get_retry_delay, BackoffPolicy, JitterSource, NoJitter, DEFAULT_MAX_DELAY};
pub use classifier::{classify, classify_error, classify_message, is_retryable, should_retry};
pub use retry::{retry, retry_transient, retry_with_jitter, RetryConfig};
