//! Wallet Session Manager - Connection Lifecycle and Error Surface
//!
//! Drives the wallet provider through Disconnected → Connecting →
//! Connected → Disconnecting and publishes each state as a snapshot.
//! Wallet errors are translated to user-facing records that clear
//! themselves after a TTL unless a newer error supersedes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::domain::wallet::{
  WalletError, WalletErrorRecord, WalletSession, WalletStatus, translate_error,
};
use crate::ports::wallet::WalletProvider;

/// Owns the wallet provider and the session snapshot.
pub struct WalletSessionManager<W: WalletProvider> {
  provider: Arc<W>,
  session_tx: watch::Sender<WalletSession>,
  error_tx: Arc<watch::Sender<Option<WalletErrorRecord>>>,
  /// Bumped on every recorded error; a clear timer only fires if the
  /// generation it was armed with is still current.
  error_generation: Arc<AtomicU64>,
  clear_task: Mutex<Option<JoinHandle<()>>>,
  error_ttl: Duration,
}

impl<W: WalletProvider> WalletSessionManager<W> {
  pub fn new(provider: Arc<W>, error_ttl: Duration) -> Self {
    let (session_tx, _) = watch::channel(WalletSession::disconnected());
    let (error_tx, _) = watch::channel(None);
    Self {
      provider,
      session_tx,
      error_tx: Arc::new(error_tx),
      error_generation: Arc::new(AtomicU64::new(0)),
      clear_task: Mutex::new(None),
      error_ttl,
    }
  }

  pub fn provider(&self) -> &Arc<W> {
    &self.provider
  }

  pub fn session(&self) -> WalletSession {
    self.session_tx.borrow().clone()
  }

  pub fn connected_key(&self) -> Option<Pubkey> {
    self.session_tx.borrow().connected_key()
  }

  pub fn subscribe(&self) -> watch::Receiver<WalletSession> {
    self.session_tx.subscribe()
  }

  pub fn subscribe_errors(&self) -> watch::Receiver<Option<WalletErrorRecord>> {
    self.error_tx.subscribe()
  }

  /// The latest unexpired wallet error.
  pub fn current_error(&self) -> Option<WalletErrorRecord> {
    self.error_tx.borrow().clone()
  }

  fn publish(&self, status: WalletStatus, public_key: Option<Pubkey>) {
    let provider_name = self.provider.name();
    self.session_tx.send_modify(|session| {
      if status == WalletStatus::Connected {
        session.connect_epoch += 1;
      }
      session.status = status;
      session.provider_name = Some(provider_name);
      session.public_key = public_key;
    });
  }

  /// Connect the provider. Returns the existing key if already connected.
  #[instrument(skip(self))]
  pub async fn connect(&self) -> Result<Pubkey, WalletError> {
    if let Some(key) = self.connected_key() {
      return Ok(key);
    }

    self.publish(WalletStatus::Connecting, None);
    match self.provider.connect().await {
      Ok(key) => {
        self.publish(WalletStatus::Connected, Some(key));
        info!(pubkey = %key, provider = %self.provider.name(), "Wallet connected");
        Ok(key)
      }
      Err(e) => {
        self.publish(WalletStatus::Disconnected, None);
        self.record_error(&e);
        Err(e)
      }
    }
  }

  /// Disconnect the provider. The session ends Disconnected even if the
  /// provider reports an error.
  #[instrument(skip(self))]
  pub async fn disconnect(&self) -> Result<(), WalletError> {
    if self.session().status == WalletStatus::Disconnected {
      return Ok(());
    }

    let key = self.session().public_key;
    self.publish(WalletStatus::Disconnecting, key);
    let result = self.provider.disconnect().await;
    self.publish(WalletStatus::Disconnected, None);

    match result {
      Ok(()) => {
        info!("Wallet disconnected");
        Ok(())
      }
      Err(e) => {
        self.record_error(&e);
        Err(e)
      }
    }
  }

  /// The provider dropped the connection on its own.
  pub fn mark_disconnected(&self) {
    if self.session().status != WalletStatus::Disconnected {
      warn!("Wallet provider reported disconnection");
      self.publish(WalletStatus::Disconnected, None);
    }
  }

  /// Translate and surface a wallet error. Replaces any earlier error
  /// and re-arms the clear timer.
  pub fn record_error(&self, error: &WalletError) -> WalletErrorRecord {
    let record = translate_error(error);
    warn!(
      name = %record.name,
      message = %record.message,
      "Wallet error"
    );

    let generation = self.error_generation.fetch_add(1, Ordering::SeqCst) + 1;
    self.error_tx.send_replace(Some(record.clone()));

    let error_tx = Arc::clone(&self.error_tx);
    let current = Arc::clone(&self.error_generation);
    let ttl = self.error_ttl;
    let timer = tokio::spawn(async move {
      tokio::time::sleep(ttl).await;
      if current.load(Ordering::SeqCst) == generation {
        error_tx.send_replace(None);
      }
    });

    if let Ok(mut slot) = self.clear_task.lock() {
      if let Some(previous) = slot.replace(timer) {
        previous.abort();
      }
    }
    record
  }

  /// Dismiss the current error immediately.
  pub fn clear_error(&self) {
    self.error_generation.fetch_add(1, Ordering::SeqCst);
    self.error_tx.send_replace(None);
    self.abort_clear_timer();
  }

  fn abort_clear_timer(&self) {
    if let Ok(mut slot) = self.clear_task.lock() {
      if let Some(timer) = slot.take() {
        timer.abort();
      }
    }
  }

  /// Stop the clear timer.
  pub fn shutdown(&self) {
    self.abort_clear_timer();
  }
}

impl<W: WalletProvider> Drop for WalletSessionManager<W> {
  fn drop(&mut self) {
    self.abort_clear_timer();
  }
}
