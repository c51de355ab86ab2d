use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Failure, ResilienceError, Result};
use crate::policy::classify;
use crate::recovery::actions::{is_filled, BrowserRestarter, RecoveryAction, RecoveryActionType, RecoveryOutcome};
use crate::recovery::identity::UserAgentRotator;

type SelectorRegistry = Arc<RwLock<HashMap<String, Vec<String>>>>;

/// Selectors known to change between site deploys, with what to try instead.
pub fn default_fallback_selectors() -> HashMap<String, Vec<String>> {
    let seed: [(&str, &[&str]); 7] = [
        (
            ".match-list .match",
            &["[data-testid='match-row']", ".fixture", "li.event"],
        ),
        (
            ".team-name",
            &["[data-testid='team-name']", ".participant__name", ".team"],
        ),
        (".odds-value", &["[data-testid='odds']", ".odds", "span.price"]),
        (".match-date", &["time[datetime]", "[data-testid='kickoff']", ".date"]),
        ("title", &["meta[property='og:title']", "h1"]),
        ("h1.page-title", &["h1", "header h2"]),
        (
            "meta[name='description']",
            &["meta[property='og:description']", "meta[name='twitter:description']"],
        ),
    ];

    seed.iter()
        .map(|(primary, fallbacks)| {
            (
                primary.to_string(),
                fallbacks.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// How long the wait-and-retry action pauses.
    #[serde(with = "humantime_serde")]
    pub wait_delay: Duration,
    /// Pool for user agent rotation, empty means the built-in pool.
    #[serde(default)]
    pub user_agents: Vec<String>,
    /// Extra fallback selectors merged over the built-in ones.
    #[serde(default)]
    pub fallback_selectors: Vec<FallbackSelectorEntry>,
}

/// One registry entry as written in the config file. Kept as a list rather
/// than a table because selectors make poor TOML keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSelectorEntry {
    pub primary: String,
    pub fallbacks: Vec<String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            wait_delay: Duration::from_secs(2),
            user_agents: Vec::new(),
            fallback_selectors: Vec::new(),
        }
    }
}

/// Maps failure kinds to remediation steps and runs them.
///
/// Only network and scraping failures have a catalog. Everything else,
/// system failures included, is left to the caller.
pub struct ErrorRecoveryManager {
    fallback_selectors: SelectorRegistry,
    identity: Arc<UserAgentRotator>,
    browser: Option<Arc<dyn BrowserRestarter>>,
    wait_delay: Duration,
}

impl Default for ErrorRecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRecoveryManager {
    pub fn new() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }

    pub fn from_config(config: &RecoveryConfig) -> Self {
        let manager = Self {
            fallback_selectors: Arc::new(RwLock::new(default_fallback_selectors())),
            identity: Arc::new(UserAgentRotator::new(config.user_agents.clone())),
            browser: None,
            wait_delay: config.wait_delay,
        };

        for entry in &config.fallback_selectors {
            manager.add_fallback_selector(&entry.primary, entry.fallbacks.iter().cloned());
        }
        manager
    }

    pub fn with_browser_restarter(mut self, browser: Arc<dyn BrowserRestarter>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn identity(&self) -> Arc<UserAgentRotator> {
        self.identity.clone()
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<String>>> {
        self.fallback_selectors.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<String>>> {
        self.fallback_selectors.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when the failure is transient and the catalog has something to
    /// try for it.
    pub fn can_recover<F: Failure + ?Sized>(&self, failure: &F) -> bool {
        let kind = classify(failure);
        kind.is_retryable() && !self.actions_for(kind, failure).is_empty()
    }

    pub fn get_recovery_actions<F: Failure + ?Sized>(&self, failure: &F) -> Vec<RecoveryAction> {
        self.actions_for(classify(failure), failure)
    }

    fn actions_for<F: Failure + ?Sized>(&self, kind: ErrorKind, failure: &F) -> Vec<RecoveryAction> {
        match kind {
            ErrorKind::Network => vec![self.wait_and_retry(), self.change_user_agent()],
            ErrorKind::Scraping => vec![
                self.fallback_selector(failure.as_error().to_string()),
                self.restart_browser(),
            ],
            ErrorKind::Validation | ErrorKind::Configuration | ErrorKind::System => Vec::new(),
        }
    }

    /// Try each action in order until one works.
    ///
    /// Action failures are logged and skipped. Returns `false` when there was
    /// nothing to try or nothing worked.
    pub async fn execute_recovery<F: Failure + ?Sized>(&self, failure: &F) -> bool {
        let actions = self.get_recovery_actions(failure);
        if actions.is_empty() {
            debug!("No recovery actions for {} error: {}", classify(failure), failure.as_error());
            return false;
        }

        for action in actions {
            match action.execute().await {
                Ok(_) => {
                    info!("Recovery action {} succeeded: {}", action.action_type(), action.description());
                    return true;
                }
                Err(e) => {
                    warn!("Recovery action {} failed: {}", action.action_type(), e);
                }
            }
        }

        warn!("All recovery actions failed for: {}", failure.as_error());
        false
    }

    /// Register extra fallbacks for `primary`. New entries are appended after
    /// the existing ones, duplicates are skipped.
    pub fn add_fallback_selector<I, S>(&self, primary: &str, fallbacks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = self.write_registry();
        let entry = registry.entry(primary.to_string()).or_default();
        for fallback in fallbacks {
            let fallback = fallback.into();
            if fallback != primary && !entry.contains(&fallback) {
                entry.push(fallback);
            }
        }
        debug!("Fallback selectors for '{}': {:?}", primary, entry);
    }

    /// Registered fallbacks in order, empty for unknown selectors.
    pub fn get_fallback_selectors(&self, primary: &str) -> Vec<String> {
        self.read_registry().get(primary).cloned().unwrap_or_default()
    }

    /// An action that accepts `partial_data` as long as every required field
    /// is present and non-empty.
    pub fn create_partial_data_recovery<S: AsRef<str>>(
        &self,
        partial_data: Map<String, Value>,
        required_fields: &[S],
    ) -> RecoveryAction {
        let required: Vec<String> = required_fields.iter().map(|f| f.as_ref().to_string()).collect();
        let description = format!("continue with partial data ({} required fields)", required.len());

        RecoveryAction::new(RecoveryActionType::SkipOperation, description, move || {
            let data = partial_data.clone();
            let required = required.clone();
            async move {
                let missing: Vec<String> = required
                    .iter()
                    .filter(|field| !data.get(field.as_str()).is_some_and(is_filled))
                    .cloned()
                    .collect();

                if !missing.is_empty() {
                    return Err(ResilienceError::InsufficientPartialData { missing }.into());
                }

                let available: Vec<&String> = data.keys().collect();
                warn!(
                    "Recovering with partial data, available fields: {:?}, required fields: {:?}",
                    available, required
                );
                Ok(RecoveryOutcome::PartialData(data))
            }
        })
    }

    fn wait_and_retry(&self) -> RecoveryAction {
        let delay = self.wait_delay;
        RecoveryAction::new(
            RecoveryActionType::WaitAndRetry,
            format!("wait {:?} before retrying", delay),
            move || async move {
                tokio::time::sleep(delay).await;
                Ok(RecoveryOutcome::Resumed)
            },
        )
    }

    fn change_user_agent(&self) -> RecoveryAction {
        let identity = self.identity.clone();
        RecoveryAction::new(
            RecoveryActionType::ChangeUserAgent,
            "rotate to a different user agent",
            move || {
                let identity = identity.clone();
                async move {
                    match identity.rotate() {
                        Some(user_agent) => {
                            info!("Rotated user agent to: {}", user_agent);
                            Ok(RecoveryOutcome::Resumed)
                        }
                        None => Err(ResilienceError::RecoveryFailed(
                            "no alternative user agent available".to_string(),
                        )
                        .into()),
                    }
                }
            },
        )
    }

    fn fallback_selector(&self, failure_message: String) -> RecoveryAction {
        let registry = self.fallback_selectors.clone();
        RecoveryAction::new(
            RecoveryActionType::FallbackSelector,
            "switch to a registered fallback selector",
            move || {
                let outcome = match_fallback(&registry, &failure_message);
                async move { outcome }
            },
        )
    }

    fn restart_browser(&self) -> RecoveryAction {
        let browser = self.browser.clone();
        RecoveryAction::new(
            RecoveryActionType::RestartBrowser,
            "restart the browser session",
            move || {
                let browser = browser.clone();
                async move {
                    match browser {
                        Some(browser) => {
                            browser.restart().await?;
                            Ok(RecoveryOutcome::Resumed)
                        }
                        None => Err(ResilienceError::RecoveryFailed(
                            "no browser restart handler registered".to_string(),
                        )
                        .into()),
                    }
                }
            },
        )
    }
}

fn match_fallback(registry: &SelectorRegistry, message: &str) -> Result<RecoveryOutcome> {
    let registry = registry.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    // the longest registered selector named in the failure is the most specific
    let matched = registry
        .iter()
        .filter(|(primary, fallbacks)| !fallbacks.is_empty() && message.contains(primary.as_str()))
        .max_by_key(|(primary, _)| primary.len());

    match matched {
        Some((primary, fallbacks)) => {
            info!("Selector '{}' failed, fallbacks available: {:?}", primary, fallbacks);
            Ok(RecoveryOutcome::Resumed)
        }
        None => Err(ResilienceError::RecoveryFailed(format!("no fallback selector registered for: {}", message)).into()),
    }
}
