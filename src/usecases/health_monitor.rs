//! Connection Health Monitor - Periodic RPC Reachability Probe
//!
//! Issues `getVersion` on a fixed interval and publishes the result as an
//! immutable `ConnectionStatus` snapshot. There are no retries inside a
//! probe; the next tick is the retry. The first probe runs immediately.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::connection::ConnectionStatus;
use crate::ports::chain::ChainRpc;

/// Periodic reachability monitor for the Solana RPC endpoint.
pub struct HealthMonitor<C: ChainRpc> {
  chain: Arc<C>,
  interval: Duration,
  status_tx: Arc<watch::Sender<ConnectionStatus>>,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: ChainRpc> HealthMonitor<C> {
  pub fn new(chain: Arc<C>, interval: Duration) -> Self {
    let (status_tx, _) = watch::channel(ConnectionStatus::unknown());
    Self {
      chain,
      interval,
      status_tx: Arc::new(status_tx),
      task: Mutex::new(None),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
    self.status_tx.subscribe()
  }

  pub fn status(&self) -> ConnectionStatus {
    self.status_tx.borrow().clone()
  }

  /// Hard gate for writes. Unknown counts as unreachable.
  pub fn is_reachable(&self) -> bool {
    self.status_tx.borrow().is_reachable()
  }

  /// Run one probe now and publish the result.
  pub async fn probe_once(&self) -> ConnectionStatus {
    probe(self.chain.as_ref(), &self.status_tx).await
  }

  /// Start the periodic probe. No-op if already running.
  pub fn start(&self) {
    let Ok(mut slot) = self.task.lock() else {
      return;
    };
    if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
      return;
    }

    let chain = Arc::clone(&self.chain);
    let status_tx = Arc::clone(&self.status_tx);
    let period = self.interval;
    *slot = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        probe(chain.as_ref(), &status_tx).await;
      }
    }));
    info!(interval_secs = period.as_secs(), "Health monitor started");
  }

  /// Stop the periodic probe.
  pub fn shutdown(&self) {
    if let Ok(mut slot) = self.task.lock() {
      if let Some(handle) = slot.take() {
        handle.abort();
        debug!("Health monitor stopped");
      }
    }
  }
}

impl<C: ChainRpc> Drop for HealthMonitor<C> {
  fn drop(&mut self) {
    self.shutdown();
  }
}

async fn probe<C: ChainRpc + ?Sized>(
  chain: &C,
  status_tx: &watch::Sender<ConnectionStatus>,
) -> ConnectionStatus {
  let started = Instant::now();
  let result = chain.version().await;
  let previous = status_tx.borrow().clone();

  let next = match result {
    Ok(version) => {
      let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
      if previous.reachable != Some(true) {
        info!(latency_ms, version = %version.solana_core, "Solana RPC reachable");
      }
      previous.succeeded(latency_ms, Some(version.solana_core))
    }
    Err(e) => {
      let next = previous.failed(format!("{e:#}"));
      warn!(
        error = %e,
        consecutive_failures = next.consecutive_failures,
        "Solana RPC probe failed"
      );
      next
    }
  };

  status_tx.send_replace(next.clone());
  next
}
