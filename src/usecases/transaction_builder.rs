//! Transaction Builder Client - Intent to Unsigned Transaction
//!
//! Validates the intent, asks the backend to build the transaction, and
//! classifies the answer: a payload to sign, a mock-mode success, a
//! missing trading account, or a refusal.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tracing::{info, instrument, warn};

use crate::domain::account::{indicates_missing_account, is_already_initialized};
use crate::domain::error::{BuildError, PipelineError};
use crate::domain::order::{IntentError, OrderIntent, market_index};
use crate::domain::transaction::BuiltTransaction;
use crate::ports::backend::{BuildOrderRequest, BuildResponse, TradingBackend};

/// Result of building an initialize-user transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum InitializeBuild {
  Transaction(BuiltTransaction),
  /// The backend says the account exists; nothing to sign.
  AlreadyInitialized,
}

pub struct TransactionBuilder<B: TradingBackend> {
  backend: Arc<B>,
}

impl<B: TradingBackend> TransactionBuilder<B> {
  pub fn new(backend: Arc<B>) -> Self {
    Self { backend }
  }

  /// Build a place-order transaction for `wallet`.
  ///
  /// # Errors
  /// `InvalidIntent` before any backend call; `Build` for backend
  /// refusals, missing accounts and transport failures.
  #[instrument(skip(self, intent), fields(intent = %intent))]
  pub async fn build_order(
    &self,
    wallet: &Pubkey,
    intent: &OrderIntent,
  ) -> Result<BuiltTransaction, PipelineError> {
    intent.validate()?;

    let request = BuildOrderRequest::new(wallet.to_string(), intent);
    let response = self
      .backend
      .build_order(&request)
      .await
      .map_err(|e| BuildError::Transport(format!("{e:#}")))?;

    let built = interpret_order(response)?;
    if built.mock_mode {
      warn!(message = %built.meta.message, "Backend built a mock transaction");
    }
    Ok(built)
  }

  /// Build a transaction closing the whole `market` position of `wallet`.
  /// Classified like a place-order answer.
  #[instrument(skip(self))]
  pub async fn build_close_position(
    &self,
    wallet: &Pubkey,
    market: &str,
  ) -> Result<BuiltTransaction, PipelineError> {
    if market_index(market).is_none() {
      return Err(IntentError::UnknownMarket(market.to_string()).into());
    }

    let response = self
      .backend
      .build_close_position(&wallet.to_string(), market)
      .await
      .map_err(|e| BuildError::Transport(format!("{e:#}")))?;

    let built = interpret_order(response)?;
    if built.mock_mode {
      warn!(message = %built.meta.message, "Backend built a mock close");
    }
    Ok(built)
  }

  /// Build the initialize-user transaction for `wallet`.
  #[instrument(skip(self))]
  pub async fn build_initialize(&self, wallet: &Pubkey) -> Result<InitializeBuild, BuildError> {
    let response = self
      .backend
      .build_initialize(&wallet.to_string())
      .await
      .map_err(|e| BuildError::Transport(format!("{e:#}")))?;
    interpret_initialize(response)
  }
}

fn built_from(response: &BuildResponse) -> Result<BuiltTransaction, BuildError> {
  let payload = response.transaction.clone().unwrap_or_default();
  if payload.trim().is_empty() && !response.mock_mode {
    return Err(BuildError::Rejected(
      "backend returned no transaction".to_string(),
    ));
  }
  Ok(BuiltTransaction {
    payload_base64: payload,
    requires_signature: response.requires_signature,
    mock_mode: response.mock_mode,
    meta: response.meta(),
  })
}

/// Classify a build-order response.
pub fn interpret_order(response: BuildResponse) -> Result<BuiltTransaction, BuildError> {
  if !response.success && !response.mock_mode {
    let reason = response.failure_text();
    if indicates_missing_account(&reason) {
      return Err(BuildError::AccountMissing);
    }
    return Err(BuildError::Rejected(reason));
  }
  built_from(&response)
}

/// Classify an initialize-user response. "Already exists" is success.
pub fn interpret_initialize(response: BuildResponse) -> Result<InitializeBuild, BuildError> {
  let reason = response.failure_text();
  let has_payload = response
    .transaction
    .as_deref()
    .is_some_and(|tx| !tx.trim().is_empty());

  if !has_payload && is_already_initialized(&reason) {
    info!("Trading account already initialized");
    return Ok(InitializeBuild::AlreadyInitialized);
  }
  if !response.success && !response.mock_mode {
    return Err(BuildError::Rejected(reason));
  }
  built_from(&response).map(InitializeBuild::Transaction)
}
