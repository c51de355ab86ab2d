use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::breaker::CircuitBreakerOptions;
use crate::error::{ResilienceError, Result};
use crate::policy::RetryConfig;
use crate::recovery::RecoveryConfig;

pub const ENV_PREFIX: &str = "RESILIENCE";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerOptions,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// Settings for the page probe binary.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProbeConfig {
    pub targets: Vec<String>,
    pub min_success_count: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            targets: vec!["https://example.com/".to_string()],
            min_success_count: 1,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<ResilienceConfig>;
    async fn save_config(&self, config: &ResilienceConfig) -> Result<()>;
    async fn watch_config_changes(&self) -> Result<mpsc::Receiver<ResilienceConfig>>;
    fn validate_config(&self, config: &ResilienceConfig) -> Result<()>;
}

/// TOML file on disk, overridable through `RESILIENCE_*` environment
/// variables (`__` between nested keys, e.g. `RESILIENCE_RETRY__MAX_ATTEMPTS`).
#[derive(Debug, Clone)]
pub struct FileConfigManager {
    config_path: PathBuf,
    env_prefix: String,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }
}

fn config_error(message: impl Into<String>) -> ResilienceError {
    ResilienceError::ConfigError(message.into())
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<ResilienceConfig> {
        info!("Loading configuration from {:?}", self.config_path);

        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(self.config_path.as_path()).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(ResilienceError::from)?;

        let config: ResilienceConfig = settings.try_deserialize().map_err(ResilienceError::from)?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    async fn save_config(&self, config: &ResilienceConfig) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config).map_err(ResilienceError::from)?;
        fs::write(&self.config_path, toml_content)
            .map_err(|e| config_error(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }

    async fn watch_config_changes(&self) -> Result<mpsc::Receiver<ResilienceConfig>> {
        let (tx, rx) = mpsc::channel(10);
        let config_manager = self.clone();

        tokio::spawn(async move {
            if let Err(e) = config_manager.watch_config_file(tx).await {
                error!("Configuration file watcher error: {}", e);
            }
        });

        Ok(rx)
    }

    fn validate_config(&self, config: &ResilienceConfig) -> Result<()> {
        debug!("Validating configuration");

        let retry = &config.retry;
        if retry.max_attempts == 0 || retry.max_attempts > 10 {
            return Err(config_error("retry.max_attempts must be between 1 and 10").into());
        }
        if !(retry.backoff_factor >= 1.0) {
            return Err(config_error("retry.backoff_factor must be at least 1.0").into());
        }
        if !(0.0..1.0).contains(&retry.jitter) {
            return Err(config_error("retry.jitter must be in [0, 1)").into());
        }
        if retry.base_delay > retry.max_delay {
            return Err(config_error("retry.base_delay cannot exceed retry.max_delay").into());
        }

        let breaker = &config.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err(config_error("circuit_breaker.failure_threshold must be greater than 0").into());
        }
        if breaker.reset_timeout.is_zero() {
            return Err(config_error("circuit_breaker.reset_timeout must be greater than 0").into());
        }

        for entry in &config.recovery.fallback_selectors {
            if entry.primary.trim().is_empty() {
                return Err(config_error("fallback selector primary cannot be empty").into());
            }
            if entry.fallbacks.is_empty() || entry.fallbacks.iter().any(|f| f.trim().is_empty()) {
                return Err(config_error(format!(
                    "fallback selectors for '{}' must be a non-empty list of selectors",
                    entry.primary
                ))
                .into());
            }
        }

        for target in &config.probe.targets {
            if !target.starts_with("http://") && !target.starts_with("https://") {
                return Err(config_error(format!("probe target '{}' must start with http:// or https://", target)).into());
            }
        }
        if config.probe.min_success_count > config.probe.targets.len() {
            return Err(config_error(format!(
                "probe.min_success_count ({}) cannot exceed the number of targets ({})",
                config.probe.min_success_count,
                config.probe.targets.len()
            ))
            .into());
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl FileConfigManager {
    async fn create_default_config(&self) -> Result<()> {
        let toml_content = toml::to_string_pretty(&ResilienceConfig::default()).map_err(ResilienceError::from)?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| config_error(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| config_error(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }

    /// Reload on every change to the file and push valid configs to `tx`.
    /// Invalid edits are logged and skipped.
    async fn watch_config_file(&self, tx: mpsc::Sender<ResilienceConfig>) -> Result<()> {
        let (file_tx, mut file_rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(e) = file_tx.blocking_send(event) {
                    error!("Failed to send file system event: {}", e);
                }
            }
            Err(e) => error!("File system watcher error: {}", e),
        })
        .map_err(|e| config_error(format!("Failed to create file watcher: {}", e)))?;

        let watch_path = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| config_error(format!("Failed to watch config directory: {}", e)))?;

        info!("Started watching configuration file: {:?}", self.config_path);

        while let Some(event) = file_rx.recv().await {
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                continue;
            }
            // events carry absolute paths, the configured one may be relative
            if !event.paths.iter().any(|p| p.file_name() == self.config_path.file_name()) {
                continue;
            }

            debug!("Configuration file changed, reloading...");
            // give the writer a moment to finish
            tokio::time::sleep(Duration::from_millis(100)).await;

            match self.load_config().await {
                Ok(new_config) => {
                    info!("Configuration reloaded successfully");
                    if tx.send(new_config).await.is_err() {
                        debug!("Config receiver dropped, stopping watcher");
                        break;
                    }
                }
                Err(e) => error!("Failed to reload configuration: {}", e),
            }
        }

        Ok(())
    }
}
