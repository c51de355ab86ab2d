use scrape_resilience::config::{ConfigManager, FileConfigManager};
use scrape_resilience::degradation::collect_partial_results;
use scrape_resilience::probe::PageProbe;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> scrape_resilience::error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("resilience.toml"));

    let config_manager = FileConfigManager::new(config_path);
    let config = config_manager.load_config().await?;

    info!("Probing {} targets", config.probe.targets.len());

    let probe = PageProbe::new(&config)?;
    let targets = &config.probe.targets;
    let results = collect_partial_results(
        targets.iter().map(|target| probe.probe(target)),
        config.probe.min_success_count,
    )
    .await?;

    for page in &results.successful {
        let url = page.get("url").and_then(|v| v.as_str()).unwrap_or_default();
        let title = page.get("title").and_then(|v| v.as_str()).unwrap_or_default();
        info!("{} -> {}", url, title);
    }
    for failure in &results.failed {
        warn!("{} failed: {}", targets[failure.index], failure.error);
    }

    let metrics = probe.error_metrics();
    info!(
        "Done: {}/{} targets ok ({:.0}%), {} errors recorded",
        results.successful.len(),
        results.total(),
        results.success_rate * 100.0,
        metrics.total_errors
    );
    for (kind, count) in &metrics.errors_by_type {
        info!("  {}: {}", kind, count);
    }

    Ok(())
}
