//! Chain connectivity snapshot published by the health monitor.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of the most recent `getVersion` probe.
///
/// `reachable` is `None` until the first probe completes. Writes treat
/// unknown as unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
  pub reachable: Option<bool>,
  /// Round-trip time of the last successful probe.
  pub latency_ms: Option<u64>,
  /// Node version reported by the last successful probe.
  pub node_version: Option<String>,
  pub last_error: Option<String>,
  pub consecutive_failures: u32,
  pub checked_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
  /// State before any probe has run.
  pub const fn unknown() -> Self {
    Self {
      reachable: None,
      latency_ms: None,
      node_version: None,
      last_error: None,
      consecutive_failures: 0,
      checked_at: None,
    }
  }

  /// Hard gate for submission, airdrop and balance refresh.
  pub fn is_reachable(&self) -> bool {
    self.reachable == Some(true)
  }

  /// Snapshot after a successful probe.
  pub fn succeeded(&self, latency_ms: u64, node_version: Option<String>) -> Self {
    Self {
      reachable: Some(true),
      latency_ms: Some(latency_ms),
      node_version,
      last_error: None,
      consecutive_failures: 0,
      checked_at: Some(Utc::now()),
    }
  }

  /// Snapshot after a failed probe. Keeps the last known latency.
  pub fn failed(&self, error: impl Into<String>) -> Self {
    Self {
      reachable: Some(false),
      latency_ms: self.latency_ms,
      node_version: self.node_version.clone(),
      last_error: Some(error.into()),
      consecutive_failures: self.consecutive_failures.saturating_add(1),
      checked_at: Some(Utc::now()),
    }
  }
}

impl Default for ConnectionStatus {
  fn default() -> Self {
    Self::unknown()
  }
}
