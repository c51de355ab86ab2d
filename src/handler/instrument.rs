use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ErrorContext, Failure};
use crate::handler::error_handler::ErrorHandler;

/// Wrap `operation` so every call is timed and every failure goes through
/// `handler` before being returned unchanged.
pub fn instrument<F, Fut, T, E>(
    handler: Arc<ErrorHandler>,
    name: impl Into<String>,
    operation: F,
) -> impl Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Failure + Send + 'static,
{
    let name: Arc<str> = Arc::from(name.into());

    move || {
        let handler = handler.clone();
        let name = name.clone();
        let call = operation();

        Box::pin(async move {
            let started = Instant::now();
            let result = call.await;
            let elapsed = started.elapsed();

            match &result {
                Ok(_) => debug!("{} completed in {:?}", name, elapsed),
                Err(err) => {
                    handler.handle(err, ErrorContext::new(name.as_ref()));
                    debug!("{} failed after {:?}", name, elapsed);
                }
            }
            result
        })
    }
}
