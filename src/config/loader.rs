//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

const NETWORKS: [&str; 4] = ["devnet", "testnet", "mainnet-beta", "mainnet"];
const COMMITMENTS: [&str; 3] = ["processed", "confirmed", "finalized"];

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Fails if the file can't be read, TOML parsing fails, or a
/// validation rule is violated.
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    network = %config.app.network,
    backend = %config.backend.base_url,
    rpc = %config.rpc.url,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    NETWORKS.contains(&config.app.network.as_str()),
    "Unknown network '{}', expected one of {:?}",
    config.app.network,
    NETWORKS
  );

  anyhow::ensure!(
    config.backend.base_url.starts_with("http://") || config.backend.base_url.starts_with("https://"),
    "backend.base_url must be an http(s) URL, got '{}'",
    config.backend.base_url
  );
  anyhow::ensure!(
    config.backend.max_retries >= 1,
    "backend.max_retries must be at least 1"
  );
  anyhow::ensure!(
    config.backend.retry_base_delay_ms <= config.backend.retry_max_delay_ms,
    "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
    config.backend.retry_base_delay_ms,
    config.backend.retry_max_delay_ms
  );

  anyhow::ensure!(
    config.rpc.url.starts_with("http://") || config.rpc.url.starts_with("https://"),
    "rpc.url must be an http(s) URL, got '{}'",
    config.rpc.url
  );
  anyhow::ensure!(
    config.rpc.requests_per_second > 0,
    "rpc.requests_per_second must be positive"
  );
  anyhow::ensure!(
    COMMITMENTS.contains(&config.rpc.commitment.as_str()),
    "Unknown commitment '{}'",
    config.rpc.commitment
  );

  let timing = &config.timing;
  anyhow::ensure!(
    timing.health_interval_secs > 0 && timing.pending_poll_secs > 0,
    "Poll intervals must be positive"
  );
  anyhow::ensure!(
    timing.confirmation_poll_ms > 0,
    "confirmation_poll_ms must be positive"
  );
  anyhow::ensure!(
    timing.confirmation_timeout_secs * 1000 > timing.confirmation_poll_ms,
    "confirmation_timeout_secs must exceed one poll interval"
  );

  Ok(())
}
