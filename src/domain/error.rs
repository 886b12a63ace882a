//! Error taxonomy for the order pipeline.
//!
//! Adapters speak `anyhow`; everything user-facing is classified into
//! `PipelineError` so callers can decide between "reconnect", "retry
//! later", "initialize your account" and "give up".

use thiserror::Error;

use super::order::IntentError;
use super::pending::PendingTradeId;
use super::transaction::DecodeError;
use super::wallet::WalletError;

/// Failures from the backend transaction builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The wallet has no trading account yet.
  #[error("trading account not found; initialize your account first")]
  AccountMissing,
  /// The backend answered but refused to build.
  #[error("backend refused to build the transaction: {0}")]
  Rejected(String),
  /// The backend could not be reached or answered garbage.
  #[error("transaction builder unavailable: {0}")]
  Transport(String),
}

/// Every way an order, initialization or pending-trade action can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
  #[error("Solana RPC unreachable: {0}")]
  Connectivity(String),

  #[error(transparent)]
  Wallet(#[from] WalletError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("failed to decode transaction: {0}")]
  Decode(#[from] DecodeError),

  #[error("transaction rejected by RPC: {0}")]
  Submission(String),

  #[error("transaction failed: {0}")]
  Confirmation(String),

  #[error("invalid order: {0}")]
  InvalidIntent(#[from] IntentError),

  #[error("wallet not connected")]
  NotConnected,

  #[error("wallet mismatch: trade belongs to {expected}, connected wallet is {actual}")]
  WalletMismatch { expected: String, actual: String },

  #[error("request cancelled")]
  Cancelled,

  #[error("pending trade {0} is already being processed")]
  AlreadyProcessing(PendingTradeId),

  #[error("pending trade {0} was already executed")]
  AlreadyExecuted(PendingTradeId),

  #[error("pending trade {0} has expired")]
  Expired(PendingTradeId),

  #[error("backend request failed: {0}")]
  Backend(String),

  #[error("{0}")]
  Unsupported(String),
}

impl PipelineError {
  /// Message stored on a failed order record.
  pub fn record_message(&self) -> String {
    match self {
      Self::Wallet(e) => e.record_reason(),
      other => other.to_string(),
    }
  }

  /// The user must initialize a trading account before retrying.
  pub const fn needs_account(&self) -> bool {
    matches!(self, Self::Build(BuildError::AccountMissing))
  }

  /// Metrics label for the failure category.
  pub const fn kind(&self) -> &'static str {
    match self {
      Self::Connectivity(_) => "connectivity",
      Self::Wallet(_) => "wallet",
      Self::Build(BuildError::AccountMissing) => "account_missing",
      Self::Build(_) => "build",
      Self::Decode(_) => "decode",
      Self::Submission(_) => "submission",
      Self::Confirmation(_) => "confirmation",
      Self::InvalidIntent(_) => "invalid_intent",
      Self::NotConnected => "not_connected",
      Self::WalletMismatch { .. } => "wallet_mismatch",
      Self::Cancelled => "cancelled",
      Self::AlreadyProcessing(_) => "already_processing",
      Self::AlreadyExecuted(_) => "already_executed",
      Self::Expired(_) => "expired",
      Self::Backend(_) => "backend",
      Self::Unsupported(_) => "unsupported",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::wallet::WalletErrorKind;

  #[test]
  fn test_wallet_rejection_record_message() {
    let err = PipelineError::from(WalletError::user_rejected());
    assert_eq!(err.record_message(), "User rejected the request");
    assert_eq!(err.kind(), "wallet");
  }

  #[test]
  fn test_wallet_timeout_record_message() {
    let err = PipelineError::from(WalletError::new(WalletErrorKind::Timeout, "timed out"));
    assert_eq!(err.record_message(), "wallet timed out");
  }

  #[test]
  fn test_account_missing_is_flagged() {
    let err = PipelineError::from(BuildError::AccountMissing);
    assert!(err.needs_account());
    assert_eq!(err.kind(), "account_missing");
    assert!(!PipelineError::NotConnected.needs_account());
  }

  #[test]
  fn test_confirmation_message_preserved() {
    let err = PipelineError::Confirmation(r#"{"InstructionError":[0,{"Custom":6010}]}"#.to_string());
    assert!(err.record_message().contains("Custom"));
  }
}
