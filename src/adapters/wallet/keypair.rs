//! Keypair Wallet - Local File-backed `WalletProvider`
//!
//! Headless stand-in for a browser wallet. The key is read from the
//! Solana CLI JSON keypair file at `WALLET_KEYPAIR_PATH` and never
//! leaves this struct; callers only ever receive signed transactions.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, read_keypair_file};
use solana_sdk::signer::Signer;
use tracing::{debug, info};

use crate::domain::transaction::DecodedTransaction;
use crate::domain::wallet::{WalletError, WalletErrorKind};
use crate::ports::wallet::WalletProvider;

/// Environment variable holding the keypair file path.
pub const KEYPAIR_PATH_ENV: &str = "WALLET_KEYPAIR_PATH";

/// Wallet backed by an in-process keypair.
pub struct KeypairWallet {
  keypair: Keypair,
  connected: AtomicBool,
}

impl KeypairWallet {
  pub fn new(keypair: Keypair) -> Self {
    Self {
      keypair,
      connected: AtomicBool::new(false),
    }
  }

  /// Load the keypair from `WALLET_KEYPAIR_PATH`.
  ///
  /// # Errors
  /// Fails when the variable is unset or the file is not a keypair.
  pub fn from_env() -> Result<Self> {
    let path = std::env::var(KEYPAIR_PATH_ENV)
      .with_context(|| format!("{KEYPAIR_PATH_ENV} not set"))?;
    let keypair = read_keypair_file(&path)
      .map_err(|e| anyhow::anyhow!("{e}"))
      .with_context(|| format!("Failed to read keypair file {path}"))?;
    info!(pubkey = %keypair.pubkey(), "Wallet keypair loaded");
    Ok(Self::new(keypair))
  }

  pub fn pubkey(&self) -> Pubkey {
    self.keypair.pubkey()
  }
}

#[async_trait]
impl WalletProvider for KeypairWallet {
  fn name(&self) -> String {
    "Keypair".to_string()
  }

  async fn connect(&self) -> Result<Pubkey, WalletError> {
    self.connected.store(true, Ordering::SeqCst);
    Ok(self.keypair.pubkey())
  }

  async fn disconnect(&self) -> Result<(), WalletError> {
    self.connected.store(false, Ordering::SeqCst);
    Ok(())
  }

  async fn sign_transaction(
    &self,
    mut transaction: DecodedTransaction,
  ) -> Result<DecodedTransaction, WalletError> {
    if !self.connected.load(Ordering::SeqCst) {
      return Err(WalletError::new(
        WalletErrorKind::Disconnected,
        "wallet is not connected",
      ));
    }
    let key = self.keypair.pubkey();
    let signature = self.keypair.sign_message(&transaction.message_bytes());
    if !transaction.apply_signature(&key, signature) {
      return Err(WalletError::new(
        WalletErrorKind::SignError,
        format!("transaction does not require a signature from {key}"),
      ));
    }
    debug!(versioned = transaction.is_versioned(), "Transaction signed");
    Ok(transaction)
  }
}
