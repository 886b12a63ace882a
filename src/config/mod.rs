//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Endpoints,
//! network and timing live here. The wallet keypair path is read from
//! `WALLET_KEYPAIR_PATH` and is never part of the file.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::adapters::backend::client::BackendClientConfig;
use crate::adapters::retry::RetryPolicy;
use crate::adapters::rpc::client::RpcClientConfig;
use crate::usecases::submission::ConfirmationTiming;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  pub app: AppSection,
  pub backend: BackendConfig,
  pub rpc: RpcConfig,
  #[serde(default)]
  pub timing: TimingConfig,
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Service identity and cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
  pub name: String,
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Solana cluster: devnet, testnet or mainnet-beta.
  #[serde(default = "default_network")]
  pub network: String,
}

/// Transaction builder backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  pub base_url: String,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Attempts for read requests, including the first.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_retry_base_delay_ms")]
  pub retry_base_delay_ms: u64,
  #[serde(default = "default_retry_max_delay_ms")]
  pub retry_max_delay_ms: u64,
}

/// Solana JSON-RPC endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
  pub url: String,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Public endpoints throttle aggressively.
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
  #[serde(default = "default_commitment")]
  pub commitment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
  #[serde(default = "default_health_interval")]
  pub health_interval_secs: u64,
  #[serde(default = "default_pending_poll")]
  pub pending_poll_secs: u64,
  #[serde(default = "default_confirmation_timeout")]
  pub confirmation_timeout_secs: u64,
  #[serde(default = "default_confirmation_poll")]
  pub confirmation_poll_ms: u64,
  #[serde(default = "default_wallet_error_ttl")]
  pub wallet_error_ttl_secs: u64,
}

impl Default for TimingConfig {
  fn default() -> Self {
    Self {
      health_interval_secs: default_health_interval(),
      pending_poll_secs: default_pending_poll(),
      confirmation_timeout_secs: default_confirmation_timeout(),
      confirmation_poll_ms: default_confirmation_poll(),
      wallet_error_ttl_secs: default_wallet_error_ttl(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Port for `/live`, `/ready` and `/metrics`.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      health_port: default_health_port(),
    }
  }
}

impl AppConfig {
  fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.backend.max_retries,
      base_delay: Duration::from_millis(self.backend.retry_base_delay_ms),
      max_delay: Duration::from_millis(self.backend.retry_max_delay_ms),
    }
  }

  pub fn backend_client(&self) -> BackendClientConfig {
    BackendClientConfig {
      base_url: self.backend.base_url.trim_end_matches('/').to_string(),
      timeout: Duration::from_millis(self.backend.timeout_ms),
      retry: self.retry_policy(),
    }
  }

  /// RPC reads share the backend's backoff schedule.
  pub fn rpc_client(&self) -> RpcClientConfig {
    RpcClientConfig {
      url: self.rpc.url.clone(),
      timeout: Duration::from_millis(self.rpc.timeout_ms),
      requests_per_second: self.rpc.requests_per_second,
      commitment: self.rpc.commitment.clone(),
      retry: self.retry_policy(),
    }
  }

  pub fn confirmation_timing(&self) -> ConfirmationTiming {
    ConfirmationTiming {
      poll_interval: Duration::from_millis(self.timing.confirmation_poll_ms),
      timeout: Duration::from_secs(self.timing.confirmation_timeout_secs),
    }
  }
}

impl TimingConfig {
  pub const fn health_interval(&self) -> Duration {
    Duration::from_secs(self.health_interval_secs)
  }

  pub const fn pending_poll(&self) -> Duration {
    Duration::from_secs(self.pending_poll_secs)
  }

  pub const fn wallet_error_ttl(&self) -> Duration {
    Duration::from_secs(self.wallet_error_ttl_secs)
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_network() -> String {
  "devnet".to_string()
}

fn default_true() -> bool {
  true
}

fn default_timeout_ms() -> u64 {
  30_000
}

fn default_max_retries() -> u32 {
  3
}

fn default_retry_base_delay_ms() -> u64 {
  500
}

fn default_retry_max_delay_ms() -> u64 {
  30_000
}

fn default_requests_per_second() -> u32 {
  10
}

fn default_commitment() -> String {
  "confirmed".to_string()
}

fn default_health_interval() -> u64 {
  30
}

fn default_pending_poll() -> u64 {
  10
}

fn default_confirmation_timeout() -> u64 {
  60
}

fn default_confirmation_poll() -> u64 {
  500
}

fn default_wallet_error_ttl() -> u64 {
  10
}

fn default_health_port() -> u16 {
  8080
}
