//! Prometheus Metrics Registry - Execution Observability
//!
//! Registers the `drift_signer_*` metrics and keeps them current by
//! observing the state channels the use cases publish. Nothing in the
//! use-case layer knows metrics exist.

use std::sync::Arc;

use prometheus::{
  Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::connection::ConnectionStatus;
use crate::domain::order::{OrderRecord, OrderStatus};
use crate::domain::pending::PendingTrade;
use crate::domain::transaction::MOCK_SIGNATURE_PREFIX;
use crate::domain::wallet::WalletErrorRecord;

/// Centralized Prometheus metrics.
pub struct MetricsRegistry {
  registry: Registry,
  /// Settled orders by outcome (`executed`, `failed`, `mock`).
  pub orders_settled: IntCounterVec,
  /// Wallet errors by adapter error name.
  pub wallet_errors: IntCounterVec,
  /// Latency of the last successful RPC probe.
  pub rpc_latency_ms: Gauge,
  /// 1 when the last probe succeeded.
  pub chain_reachable: IntGauge,
  /// Consecutive failed probes.
  pub probe_failures: IntGauge,
  /// Actionable pending trades for the connected wallet.
  pub pending_trades: IntGauge,
}

impl MetricsRegistry {
  pub fn new() -> anyhow::Result<Self> {
    let registry = Registry::new();

    let orders_settled = IntCounterVec::new(
      Opts::new("drift_signer_orders_settled_total", "Settled order attempts by outcome"),
      &["outcome"],
    )?;
    let wallet_errors = IntCounterVec::new(
      Opts::new("drift_signer_wallet_errors_total", "Wallet provider errors by kind"),
      &["name"],
    )?;
    let rpc_latency_ms = Gauge::new(
      "drift_signer_rpc_latency_ms",
      "Round-trip time of the last successful getVersion probe",
    )?;
    let chain_reachable = IntGauge::new(
      "drift_signer_chain_reachable",
      "Solana RPC reachability (1=reachable, 0=unreachable or unknown)",
    )?;
    let probe_failures = IntGauge::new(
      "drift_signer_probe_consecutive_failures",
      "Consecutive failed health probes",
    )?;
    let pending_trades = IntGauge::new(
      "drift_signer_pending_trades",
      "Pending trades awaiting approval",
    )?;

    registry.register(Box::new(orders_settled.clone()))?;
    registry.register(Box::new(wallet_errors.clone()))?;
    registry.register(Box::new(rpc_latency_ms.clone()))?;
    registry.register(Box::new(chain_reachable.clone()))?;
    registry.register(Box::new(probe_failures.clone()))?;
    registry.register(Box::new(pending_trades.clone()))?;

    Ok(Self {
      registry,
      orders_settled,
      wallet_errors,
      rpc_latency_ms,
      chain_reachable,
      probe_failures,
      pending_trades,
    })
  }

  pub fn observe_connection(&self, status: &ConnectionStatus) {
    self.chain_reachable.set(i64::from(status.is_reachable()));
    self
      .probe_failures
      .set(i64::from(status.consecutive_failures));
    if let Some(latency) = status.latency_ms {
      #[allow(clippy::cast_precision_loss)]
      self.rpc_latency_ms.set(latency as f64);
    }
  }

  pub fn observe_settled(&self, record: &OrderRecord) {
    let outcome = match record.status {
      OrderStatus::Executed
        if record
          .signature
          .as_deref()
          .is_some_and(|sig| sig.starts_with(MOCK_SIGNATURE_PREFIX)) =>
      {
        "mock"
      }
      OrderStatus::Executed => "executed",
      OrderStatus::Failed => "failed",
      OrderStatus::Pending => return,
    };
    self.orders_settled.with_label_values(&[outcome]).inc();
  }

  pub fn observe_wallet_error(&self, record: &WalletErrorRecord) {
    self.wallet_errors.with_label_values(&[record.name.as_str()]).inc();
  }

  pub fn observe_pending(&self, trades: &[PendingTrade]) {
    self
      .pending_trades
      .set(i64::try_from(trades.len()).unwrap_or(i64::MAX));
  }

  /// Text exposition of every registered metric.
  pub fn render(&self) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
      debug!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
  }

  /// Follow the use-case state channels until `cancel` fires.
  pub fn spawn_recorder(
    self: Arc<Self>,
    mut connection: watch::Receiver<ConnectionStatus>,
    mut pending: watch::Receiver<Vec<PendingTrade>>,
    mut wallet_errors: watch::Receiver<Option<WalletErrorRecord>>,
    mut settled: broadcast::Receiver<OrderRecord>,
    cancel: CancellationToken,
  ) -> JoinHandle<()> {
    tokio::spawn(async move {
      loop {
        tokio::select! {
          biased;
          () = cancel.cancelled() => break,
          changed = connection.changed() => {
            if changed.is_err() { break; }
            self.observe_connection(&connection.borrow_and_update());
          }
          changed = pending.changed() => {
            if changed.is_err() { break; }
            self.observe_pending(&pending.borrow_and_update());
          }
          changed = wallet_errors.changed() => {
            if changed.is_err() { break; }
            if let Some(record) = wallet_errors.borrow_and_update().as_ref() {
              self.observe_wallet_error(record);
            }
          }
          received = settled.recv() => match received {
            Ok(record) => self.observe_settled(&record),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
              debug!(skipped, "Metrics recorder lagged behind settled orders");
            }
            Err(broadcast::error::RecvError::Closed) => break,
          },
        }
      }
    })
  }
}
