//! Account Readiness Cache - Trading Account Presence per Wallet
//!
//! Re-checks whether the connected wallet has a trading account every
//! time a wallet connects, including a reconnect of the same key. The
//! cache is bound to one connection; results for any other key, or from
//! a check started before the latest bind, are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::account::AccountReadiness;
use crate::domain::wallet::WalletSession;
use crate::ports::backend::TradingBackend;

pub struct AccountReadinessCache<B: TradingBackend> {
  backend: Arc<B>,
  /// Network assumed when the backend cannot answer.
  network: String,
  bound_key: Mutex<Option<Pubkey>>,
  /// Bumped on every bind; a check publishes only if it is unchanged.
  generation: AtomicU64,
  state_tx: watch::Sender<Option<AccountReadiness>>,
  watcher: Mutex<Option<JoinHandle<()>>>,
  check_task: Mutex<Option<JoinHandle<()>>>,
}

impl<B: TradingBackend> AccountReadinessCache<B> {
  pub fn new(backend: Arc<B>, network: impl Into<String>) -> Self {
    let (state_tx, _) = watch::channel(None);
    Self {
      backend,
      network: network.into(),
      bound_key: Mutex::new(None),
      generation: AtomicU64::new(0),
      state_tx,
      watcher: Mutex::new(None),
      check_task: Mutex::new(None),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<Option<AccountReadiness>> {
    self.state_tx.subscribe()
  }

  pub fn readiness(&self) -> Option<AccountReadiness> {
    self.state_tx.borrow().clone()
  }

  /// Known readiness for `key`; `None` while unchecked.
  pub fn has_account(&self, key: &Pubkey) -> Option<bool> {
    self
      .state_tx
      .borrow()
      .as_ref()
      .filter(|r| r.belongs_to(key))
      .map(|r| r.has_trading_account)
  }

  fn is_bound_to(&self, key: &Pubkey) -> bool {
    self
      .bound_key
      .lock()
      .map(|bound| bound.as_ref() == Some(key))
      .unwrap_or(false)
  }

  /// Bind the cache to a new connection of `key`. Always drops the
  /// published readiness and any check still in flight.
  pub fn bind(&self, key: Option<Pubkey>) {
    let Ok(mut bound) = self.bound_key.lock() else {
      return;
    };
    *bound = key;
    self.generation.fetch_add(1, Ordering::SeqCst);
    drop(bound);
    self.state_tx.send_replace(None);
  }

  /// Ask the backend whether `key` has a trading account. Backend
  /// failures are read as "missing". The result is only published while
  /// the cache is still bound to `key` and was not re-bound meanwhile.
  pub async fn check_account(&self, key: Pubkey) -> AccountReadiness {
    let generation = self.generation.load(Ordering::SeqCst);
    let readiness = match self.backend.check_account(&key.to_string()).await {
      Ok(check) => AccountReadiness::new(
        key,
        check.has_drift_account,
        check.drift_account_pubkey,
        check.network,
      ),
      Err(e) => {
        warn!(wallet = %key, error = %e, "Account check failed, assuming no trading account");
        AccountReadiness::assumed_missing(key, self.network.clone())
      }
    };

    if self.is_bound_to(&key) && self.generation.load(Ordering::SeqCst) == generation {
      info!(
        wallet = %key,
        has_account = readiness.has_trading_account,
        network = %readiness.network,
        "Account readiness updated"
      );
      self.state_tx.send_replace(Some(readiness.clone()));
    } else {
      debug!(wallet = %key, "Discarding stale account check");
    }
    readiness
  }

  /// The builder reported the account missing.
  pub fn mark_missing(&self, key: Pubkey) {
    if !self.is_bound_to(&key) {
      return;
    }
    let network = self
      .readiness()
      .map_or_else(|| self.network.clone(), |r| r.network);
    self
      .state_tx
      .send_replace(Some(AccountReadiness::assumed_missing(key, network)));
  }

  /// Follow wallet sessions: re-bind on every connect and disconnect,
  /// then check the new connection off the watch loop.
  pub fn start(self: &Arc<Self>, mut sessions: watch::Receiver<WalletSession>) {
    let Ok(mut slot) = self.watcher.lock() else {
      return;
    };
    if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
      return;
    }

    let cache = Arc::clone(self);
    *slot = Some(tokio::spawn(async move {
      let mut last: Option<(Pubkey, u64)> = None;
      loop {
        let connection = {
          let session = sessions.borrow_and_update();
          session.connected_key().map(|key| (key, session.connect_epoch))
        };
        if connection != last {
          last = connection;
          cache.bind(connection.map(|(key, _)| key));
          cache.spawn_check(connection.map(|(key, _)| key));
        }
        if sessions.changed().await.is_err() {
          break;
        }
      }
    }));
  }

  fn spawn_check(self: &Arc<Self>, key: Option<Pubkey>) {
    let Ok(mut slot) = self.check_task.lock() else {
      return;
    };
    if let Some(previous) = slot.take() {
      previous.abort();
    }
    if let Some(key) = key {
      let cache = Arc::clone(self);
      *slot = Some(tokio::spawn(async move {
        cache.check_account(key).await;
      }));
    }
  }

  pub fn shutdown(&self) {
    for task in [&self.watcher, &self.check_task] {
      if let Ok(mut slot) = task.lock() {
        if let Some(handle) = slot.take() {
          handle.abort();
        }
      }
    }
  }
}
