use futures::future::{join_all, BoxFuture};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, ResilienceError};

pub type ExtractorFuture = BoxFuture<'static, Result<Value>>;

pub type Extractor = Arc<dyn Fn() -> ExtractorFuture + Send + Sync>;

/// Box an async closure into an [`Extractor`].
pub fn extractor<F, Fut>(extract: F) -> Extractor
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move || -> ExtractorFuture { Box::pin(extract()) })
}

/// Gathers independent fields, tolerating failures in the optional ones.
///
/// Built by [`create_resilient_collector`] or the builder methods, then run any
/// number of times through [`ResilientCollector::collect`].
#[derive(Clone, Default)]
pub struct ResilientCollector {
    extractors: Vec<(String, Extractor)>,
    required_fields: Vec<String>,
}

impl ResilientCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extractor<F, Fut>(mut self, name: impl Into<String>, extract: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.insert(name.into(), extractor(extract));
        self
    }

    // a later extractor under the same name replaces the earlier one
    fn insert(&mut self, name: String, extract: Extractor) {
        match self.extractors.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = extract,
            None => self.extractors.push((name, extract)),
        }
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.required_fields.contains(&field) {
                self.required_fields.push(field);
            }
        }
        self
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.extractors.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Run every extractor and merge what succeeded, keyed by extractor name.
    ///
    /// Fails only if a required field did not come back, naming exactly those
    /// fields. Optional failures are left out of the result.
    pub async fn collect(&self) -> Result<Map<String, Value>> {
        let runs = self.extractors.iter().map(|(name, extract)| {
            let future = extract();
            async move { (name.as_str(), future.await) }
        });
        let outcomes = join_all(runs).await;

        let mut data = Map::new();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    data.insert(name.to_string(), value);
                    succeeded.push(name);
                }
                Err(e) => {
                    debug!("Extractor '{}' failed: {}", name, e);
                    failed.push(name);
                }
            }
        }

        let total = self.extractors.len();
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded.len() as f64 / total as f64
        };
        info!(
            "Collected fields {:?}, failed {:?} (success rate {:.0}%)",
            succeeded,
            failed,
            success_rate * 100.0
        );

        let missing: Vec<String> = self
            .required_fields
            .iter()
            .filter(|field| !succeeded.contains(&field.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            warn!("Required fields failed: {:?}", missing);
            return Err(ResilienceError::MissingRequiredFields { missing }.into());
        }

        Ok(data)
    }
}

/// Collector over `extractors` that insists on `required_fields`.
pub fn create_resilient_collector<E, N, I, S>(extractors: E, required_fields: I) -> ResilientCollector
where
    E: IntoIterator<Item = (N, Extractor)>,
    N: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut collector = ResilientCollector::new();
    for (name, extract) in extractors {
        collector.insert(name.into(), extract);
    }
    collector.required(required_fields)
}
