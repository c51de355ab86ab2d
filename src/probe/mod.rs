use reqwest::{header, Client, StatusCode, Url};
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::breaker::{CircuitBreaker, CircuitBreakerOptions};
use crate::config::ResilienceConfig;
use crate::degradation::ResilientCollector;
use crate::error::{ClassifiedError, ErrorContext, Result};
use crate::handler::{ErrorHandler, ErrorMetrics};
use crate::policy::{retry_transient, RetryConfig};
use crate::recovery::ErrorRecoveryManager;

/// Fields pulled from every page: (name, primary selector, required).
pub const PAGE_FIELDS: [(&str, &str, bool); 3] = [
    ("title", "title", true),
    ("heading", "h1.page-title", false),
    ("description", "meta[name='description']", false),
];

/// Fetches pages and pulls a few fields out of them, using every part of the
/// resilience layer along the way.
pub struct PageProbe {
    client: Client,
    retry: RetryConfig,
    breaker_options: CircuitBreakerOptions,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    recovery: Arc<ErrorRecoveryManager>,
    handler: Arc<ErrorHandler>,
}

impl PageProbe {
    pub fn new(config: &ResilienceConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.probe.request_timeout).build()?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
            breaker_options: config.circuit_breaker.clone(),
            breakers: Mutex::new(HashMap::new()),
            recovery: Arc::new(ErrorRecoveryManager::from_config(&config.recovery)),
            handler: Arc::new(ErrorHandler::for_component("probe")),
        })
    }

    pub fn recovery(&self) -> Arc<ErrorRecoveryManager> {
        self.recovery.clone()
    }

    pub fn error_metrics(&self) -> ErrorMetrics {
        self.handler.get_metrics()
    }

    /// One breaker per host, created on first use.
    pub fn breaker_for(&self, url: &str) -> Result<Arc<CircuitBreaker>> {
        let parsed = Url::parse(url).map_err(|e| {
            ClassifiedError::validation(
                format!("invalid data: cannot parse url: {}", e),
                ErrorContext::new("resolve_host").with_url(url),
            )
        })?;
        let host = parsed.host_str().unwrap_or_default().to_string();

        let mut breakers = self.breakers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let breaker = breakers
            .entry(host.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(host, self.breaker_options.clone())));
        Ok(breaker.clone())
    }

    /// Fetch with retries through the host's breaker. Only transient failures
    /// are retried, so a 4xx or an open circuit comes back after one call.
    /// When the retry budget runs out the recovery catalog gets one chance
    /// before giving up.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let breaker = self.breaker_for(url)?;
        let attempts = AtomicU32::new(0);

        let result = retry_transient(
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let breaker = breaker.clone();
                async move { breaker.execute(|| self.get(url, attempt)).await }
            },
            &self.retry,
        )
        .await;

        let err = match result {
            Ok(html) => return Ok(html),
            Err(e) => e,
        };

        let attempt = attempts.load(Ordering::SeqCst);
        self.handler.handle(
            &err,
            ErrorContext::new("fetch_page").with_url(url).with_attempt(attempt),
        );

        if self.recovery.can_recover(&err) && self.recovery.execute_recovery(&err).await {
            info!("Recovered from failure on {}, trying once more", url);
            return breaker.execute(|| self.get(url, attempt + 1)).await;
        }
        Err(err)
    }

    async fn get(&self, url: &str, attempt: u32) -> Result<String> {
        let context = || ErrorContext::new("fetch_page").with_url(url).with_attempt(attempt);
        let user_agent = self.recovery.identity().current();
        debug!("Fetching {} (attempt {})", url, attempt);

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, user_agent)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ClassifiedError::network(format!("HTTP {} from target", status), context()).into());
        }
        if !status.is_success() {
            return Err(ClassifiedError::system(format!("HTTP {} from target", status), context()).into());
        }

        Ok(response.text().await?)
    }

    /// Collector over [`PAGE_FIELDS`] for an already fetched page.
    pub fn page_collector(&self, html: Arc<String>, url: &str) -> ResilientCollector {
        let mut collector = ResilientCollector::new();
        let mut required = Vec::new();

        for (name, primary, is_required) in PAGE_FIELDS {
            let mut selectors = vec![primary.to_string()];
            selectors.extend(self.recovery.get_fallback_selectors(primary));

            let html = html.clone();
            let url = url.to_string();
            collector = collector.extractor(name, move || {
                let extracted = extract_first(&html, &selectors, &url);
                async move { extracted }
            });
            if is_required {
                required.push(name);
            }
        }

        collector.required(required)
    }

    pub async fn probe(&self, url: &str) -> Result<Map<String, Value>> {
        let html = Arc::new(self.fetch_page(url).await?);
        let mut page = self.page_collector(html, url).collect().await.map_err(|e| {
            warn!("Extraction failed for {}: {}", url, e);
            e
        })?;

        page.insert("url".to_string(), Value::String(url.to_string()));
        Ok(page)
    }
}

/// Text of the first element matched by the first selector that matches
/// anything. `meta` elements yield their `content` attribute.
pub fn extract_first(html: &str, selectors: &[String], url: &str) -> Result<Value> {
    let document = Html::parse_document(html);

    for raw in selectors {
        let selector = match Selector::parse(raw) {
            Ok(selector) => selector,
            Err(e) => {
                warn!("Skipping unparsable selector '{}': {}", raw, e);
                continue;
            }
        };

        for element in document.select(&selector) {
            let text = if element.value().name() == "meta" {
                element.value().attr("content").unwrap_or_default().trim().to_string()
            } else {
                element.text().collect::<String>().trim().to_string()
            };

            if !text.is_empty() {
                return Ok(Value::String(text));
            }
        }
    }

    let primary = selectors.first().map(String::as_str).unwrap_or_default();
    Err(ClassifiedError::scraping(
        format!("selector not found: {}", primary),
        ErrorContext::new("extract_field").with_url(url),
    )
    .into())
}
