//! Pending Trade Queue Synchronizer
//!
//! Mirrors the backend's pending trades for the connected wallet on a
//! fixed poll interval and drives approve/reject. Approval runs the
//! trade through the order pipeline and reports the signature to the
//! backend only once the transaction has executed.
//!
//! If the chain execution succeeds but the approve notification fails,
//! the notice is kept as unreconciled. Later approvals of that trade and
//! every poll that still lists it replay only the notification; the
//! trade is never signed twice.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::order_pipeline::TradingPipeline;
use crate::domain::error::PipelineError;
use crate::domain::order::OrderRecord;
use crate::domain::pending::{
  ApprovalNotice, PendingTrade, PendingTradeId, PendingTradeStatus, approval_already_recorded,
};
use crate::domain::wallet::WalletSession;
use crate::ports::backend::TradingBackend;
use crate::ports::chain::ChainRpc;
use crate::ports::wallet::WalletProvider;

/// How an approval ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
  /// Executed on chain and reported to the backend.
  Executed(OrderRecord),
  /// Executed on chain, but the backend has not acknowledged it yet.
  /// The notification is replayed on later polls.
  ExecutedUnreported { record: OrderRecord, error: String },
  /// An earlier execution was finally reported.
  Reconciled { signature: String },
}

/// Removes a trade id from the in-flight set on drop.
struct InFlight<'a> {
  set: &'a Mutex<HashSet<PendingTradeId>>,
  id: PendingTradeId,
}

impl<'a> InFlight<'a> {
  fn claim(set: &'a Mutex<HashSet<PendingTradeId>>, id: PendingTradeId) -> Result<Self, PipelineError> {
    let mut guard = set
      .lock()
      .map_err(|_| PipelineError::AlreadyProcessing(id))?;
    if !guard.insert(id) {
      return Err(PipelineError::AlreadyProcessing(id));
    }
    Ok(Self { set, id })
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    if let Ok(mut guard) = self.set.lock() {
      guard.remove(&self.id);
    }
  }
}

pub struct PendingTradeSync<B: TradingBackend, C: ChainRpc, W: WalletProvider> {
  backend: Arc<B>,
  pipeline: Arc<TradingPipeline<B, C, W>>,
  poll_interval: Duration,
  trades_tx: watch::Sender<Vec<PendingTrade>>,
  in_flight: Mutex<HashSet<PendingTradeId>>,
  /// Executed on chain, approve notification still owed.
  unreconciled: Mutex<HashMap<PendingTradeId, ApprovalNotice>>,
  /// Executed and acknowledged during this process lifetime.
  executed: Mutex<HashSet<PendingTradeId>>,
  /// Bumped on wallet change and teardown; late poll results carrying an
  /// older generation are dropped.
  generation: AtomicU64,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl<B: TradingBackend, C: ChainRpc, W: WalletProvider> PendingTradeSync<B, C, W> {
  pub fn new(
    backend: Arc<B>,
    pipeline: Arc<TradingPipeline<B, C, W>>,
    poll_interval: Duration,
  ) -> Self {
    let (trades_tx, _) = watch::channel(Vec::new());
    Self {
      backend,
      pipeline,
      poll_interval,
      trades_tx,
      in_flight: Mutex::new(HashSet::new()),
      unreconciled: Mutex::new(HashMap::new()),
      executed: Mutex::new(HashSet::new()),
      generation: AtomicU64::new(0),
      task: Mutex::new(None),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<Vec<PendingTrade>> {
    self.trades_tx.subscribe()
  }

  /// Current local list of actionable trades.
  pub fn trades(&self) -> Vec<PendingTrade> {
    self.trades_tx.borrow().clone()
  }

  pub fn find(&self, id: PendingTradeId) -> Option<PendingTrade> {
    self.trades_tx.borrow().iter().find(|t| t.id == id).cloned()
  }

  pub fn unreconciled_ids(&self) -> Vec<PendingTradeId> {
    self
      .unreconciled
      .lock()
      .map(|map| map.keys().copied().collect())
      .unwrap_or_default()
  }

  fn unreconciled_notice(&self, id: PendingTradeId) -> Option<ApprovalNotice> {
    self.unreconciled.lock().ok()?.get(&id).cloned()
  }

  fn is_executed(&self, id: PendingTradeId) -> bool {
    self
      .executed
      .lock()
      .map(|set| set.contains(&id))
      .unwrap_or(false)
  }

  fn mark_executed(&self, id: PendingTradeId) {
    if let Ok(mut map) = self.unreconciled.lock() {
      map.remove(&id);
    }
    if let Ok(mut set) = self.executed.lock() {
      set.insert(id);
    }
    self.remove_local(id);
  }

  fn remove_local(&self, id: PendingTradeId) {
    self.trades_tx.send_if_modified(|trades| {
      let before = trades.len();
      trades.retain(|t| t.id != id);
      trades.len() != before
    });
  }

  fn clear_local(&self) {
    self.trades_tx.send_if_modified(|trades| {
      let had = !trades.is_empty();
      trades.clear();
      had
    });
  }

  /// Fetch the wallet's pending trades and replace the local list.
  ///
  /// Results are dropped if the wallet changed or the synchronizer was
  /// torn down while the request was in flight.
  #[instrument(skip(self))]
  pub async fn refresh(&self) -> Result<Vec<PendingTrade>, PipelineError> {
    let Some(wallet) = self.pipeline.sessions().connected_key() else {
      self.clear_local();
      return Ok(Vec::new());
    };
    let generation = self.generation.load(Ordering::SeqCst);

    let fetched = self
      .backend
      .pending_trades(&wallet.to_string())
      .await
      .map_err(|e| PipelineError::Backend(format!("{e:#}")))?;

    if self.generation.load(Ordering::SeqCst) != generation
      || self.pipeline.sessions().connected_key() != Some(wallet)
    {
      debug!(wallet = %wallet, "Discarding stale pending trade poll");
      return Ok(self.trades());
    }

    let now = Utc::now();
    let owed: Vec<(PendingTradeId, ApprovalNotice)> = fetched
      .iter()
      .filter(|t| t.status == PendingTradeStatus::Pending)
      .filter_map(|t| self.unreconciled_notice(t.id).map(|n| (t.id, n)))
      .collect();

    let trades: Vec<PendingTrade> = fetched
      .into_iter()
      .filter(|t| t.is_actionable(now) && !self.is_executed(t.id))
      .collect();
    self.trades_tx.send_replace(trades.clone());

    for (id, notice) in owed {
      self.replay_notice(id, &notice).await;
    }

    Ok(self.trades())
  }

  /// Re-send an owed approval. A backend that already recorded it
  /// counts as delivered.
  async fn deliver_owed(&self, id: PendingTradeId, notice: &ApprovalNotice) -> anyhow::Result<()> {
    match self.backend.approve_pending_trade(id, notice).await {
      Err(e) if approval_already_recorded(&format!("{e:#}")) => {
        info!(trade_id = id, "Backend already holds the approval");
        Ok(())
      }
      result => result,
    }
  }

  async fn replay_notice(&self, id: PendingTradeId, notice: &ApprovalNotice) -> bool {
    match self.deliver_owed(id, notice).await {
      Ok(()) => {
        info!(trade_id = id, signature = %notice.tx_signature, "Reconciled pending trade approval");
        self.mark_executed(id);
        true
      }
      Err(e) => {
        warn!(trade_id = id, error = %e, "Approval replay failed");
        false
      }
    }
  }

  fn check_wallet(&self, trade: &PendingTrade) -> Result<Pubkey, PipelineError> {
    let wallet = self
      .pipeline
      .sessions()
      .connected_key()
      .ok_or(PipelineError::NotConnected)?;
    if wallet.to_string() != trade.wallet_address {
      return Err(PipelineError::WalletMismatch {
        expected: trade.wallet_address.clone(),
        actual: wallet.to_string(),
      });
    }
    Ok(wallet)
  }

  /// Sign and execute `trade`, then report it to the backend.
  ///
  /// A failed execution leaves the trade pending.
  #[instrument(skip(self, trade, cancel), fields(trade_id = trade.id))]
  pub async fn approve(
    &self,
    trade: &PendingTrade,
    cancel: &CancellationToken,
  ) -> Result<ApprovalOutcome, PipelineError> {
    let _claim = InFlight::claim(&self.in_flight, trade.id)?;

    if self.is_executed(trade.id) {
      return Err(PipelineError::AlreadyExecuted(trade.id));
    }
    self.check_wallet(trade)?;

    if let Some(notice) = self.unreconciled_notice(trade.id) {
      return self
        .deliver_owed(trade.id, &notice)
        .await
        .map(|()| {
          self.mark_executed(trade.id);
          ApprovalOutcome::Reconciled {
            signature: notice.tx_signature.clone(),
          }
        })
        .map_err(|e| PipelineError::Backend(format!("{e:#}")));
    }

    if trade.status != PendingTradeStatus::Pending || trade.is_expired(Utc::now()) {
      return Err(PipelineError::Expired(trade.id));
    }

    let record = self.pipeline.place_order(trade.to_intent(), cancel).await?;
    let Some(signature) = record.signature.clone() else {
      return Err(PipelineError::Submission(
        "executed order carries no signature".to_string(),
      ));
    };

    let notice = ApprovalNotice {
      tx_signature: signature,
      executed_price: None,
    };
    match self.backend.approve_pending_trade(trade.id, &notice).await {
      Ok(()) => {
        self.mark_executed(trade.id);
        Ok(ApprovalOutcome::Executed(record))
      }
      Err(e) => {
        let error = format!("{e:#}");
        warn!(
          trade_id = trade.id,
          signature = %notice.tx_signature,
          error = %error,
          "Trade executed but approval was not recorded"
        );
        if let Ok(mut map) = self.unreconciled.lock() {
          map.insert(trade.id, notice);
        }
        Ok(ApprovalOutcome::ExecutedUnreported { record, error })
      }
    }
  }

  /// Decline `trade`. Only the backend is told; nothing is signed.
  #[instrument(skip(self, trade), fields(trade_id = trade.id))]
  pub async fn reject(&self, trade: &PendingTrade) -> Result<(), PipelineError> {
    let _claim = InFlight::claim(&self.in_flight, trade.id)?;

    if self.is_executed(trade.id) || self.unreconciled_notice(trade.id).is_some() {
      return Err(PipelineError::AlreadyExecuted(trade.id));
    }
    self.check_wallet(trade)?;

    self
      .backend
      .reject_pending_trade(trade.id)
      .await
      .map_err(|e| PipelineError::Backend(format!("{e:#}")))?;
    self.remove_local(trade.id);
    Ok(())
  }

  /// Number of pending trades the backend holds for the wallet.
  pub async fn pending_count(&self) -> Result<u64, PipelineError> {
    let wallet = self
      .pipeline
      .sessions()
      .connected_key()
      .ok_or(PipelineError::NotConnected)?;
    self
      .backend
      .pending_trade_count(&wallet.to_string())
      .await
      .map_err(|e| PipelineError::Backend(format!("{e:#}")))
  }

  /// Poll while a wallet is connected. Restarts immediately on wallet
  /// change; clears the list on disconnect.
  pub fn start(self: &Arc<Self>) {
    let Ok(mut slot) = self.task.lock() else {
      return;
    };
    if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
      return;
    }

    let sync = Arc::clone(self);
    let mut sessions = self.pipeline.sessions().subscribe();
    *slot = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(sync.poll_interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      let mut last = current_key(&mut sessions);

      loop {
        tokio::select! {
          changed = sessions.changed() => {
            if changed.is_err() {
              break;
            }
            let key = current_key(&mut sessions);
            if key != last {
              last = key;
              sync.generation.fetch_add(1, Ordering::SeqCst);
              sync.clear_local();
              ticker.reset_immediately();
            }
          }
          _ = ticker.tick() => {
            if last.is_some() {
              if let Err(e) = sync.refresh().await {
                warn!(error = %e, "Pending trade poll failed");
              }
            }
          }
        }
      }
    }));
    info!(interval_secs = self.poll_interval.as_secs(), "Pending trade polling started");
  }

  /// Stop polling and invalidate in-flight polls.
  pub fn shutdown(&self) {
    self.generation.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut slot) = self.task.lock() {
      if let Some(handle) = slot.take() {
        handle.abort();
      }
    }
  }
}

fn current_key(sessions: &mut watch::Receiver<WalletSession>) -> Option<Pubkey> {
  sessions.borrow_and_update().connected_key()
}
