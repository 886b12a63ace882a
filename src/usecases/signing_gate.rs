//! Signing Gate - Hand-off to the Wallet Provider
//!
//! Passes a decoded transaction to the wallet and waits for the user.
//! The wait is bounded only by the provider's own timeout/window-closed
//! outcomes or by the caller's cancellation token. Every wallet error is
//! surfaced through the session manager and never retried here.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::wallet_session::WalletSessionManager;
use crate::domain::error::PipelineError;
use crate::domain::transaction::DecodedTransaction;
use crate::domain::wallet::{WalletError, WalletErrorKind};
use crate::ports::wallet::WalletProvider;

pub struct SigningGate<W: WalletProvider> {
  sessions: Arc<WalletSessionManager<W>>,
}

impl<W: WalletProvider> SigningGate<W> {
  pub fn new(sessions: Arc<WalletSessionManager<W>>) -> Self {
    Self { sessions }
  }

  fn fail(&self, error: WalletError) -> PipelineError {
    self.sessions.record_error(&error);
    if error.kind == WalletErrorKind::Disconnected {
      self.sessions.mark_disconnected();
    }
    PipelineError::Wallet(error)
  }

  /// Have the connected wallet sign `transaction`.
  ///
  /// # Errors
  /// `NotConnected` without a connected session, `WalletMismatch` when the
  /// transaction does not need this wallet, `Cancelled` when `cancel`
  /// fires first, `Wallet` for any provider failure.
  #[instrument(skip_all, fields(versioned = transaction.is_versioned()))]
  pub async fn sign(
    &self,
    transaction: DecodedTransaction,
    cancel: &CancellationToken,
  ) -> Result<DecodedTransaction, PipelineError> {
    let key = self
      .sessions
      .connected_key()
      .ok_or(PipelineError::NotConnected)?;

    if !transaction.requires_signer(&key) {
      return Err(PipelineError::WalletMismatch {
        expected: transaction
          .fee_payer()
          .map_or_else(|| "unknown".to_string(), |payer| payer.to_string()),
        actual: key.to_string(),
      });
    }

    let provider = Arc::clone(self.sessions.provider());
    let signed = tokio::select! {
      biased;
      () = cancel.cancelled() => {
        info!("Signing request cancelled");
        return Err(PipelineError::Cancelled);
      }
      result = provider.sign_transaction(transaction) => result,
    };

    match signed {
      Ok(tx) if tx.is_signed_by(&key) => Ok(tx),
      Ok(_) => Err(self.fail(WalletError::new(
        WalletErrorKind::SignError,
        "wallet returned a transaction without a valid signature",
      ))),
      Err(e) => Err(self.fail(e)),
    }
  }
}
