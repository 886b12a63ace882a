//! Wallet Provider Port - Signing-capable Key Holder
//!
//! The provider owns the key material. The core hands it a decoded
//! transaction and gets back the same transaction with the wallet's
//! signature slot filled, or a `WalletError`.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::domain::transaction::DecodedTransaction;
use crate::domain::wallet::WalletError;

#[async_trait]
pub trait WalletProvider: Send + Sync + 'static {
  /// Display name, e.g. `Phantom`.
  fn name(&self) -> String;

  /// Prompt for connection and return the wallet key.
  async fn connect(&self) -> Result<Pubkey, WalletError>;

  async fn disconnect(&self) -> Result<(), WalletError>;

  /// Sign `transaction` as the connected key.
  ///
  /// May wait on user interaction for an unbounded time; the provider's
  /// own timeout or window-closed outcomes end the wait.
  async fn sign_transaction(
    &self,
    transaction: DecodedTransaction,
  ) -> Result<DecodedTransaction, WalletError>;
}
