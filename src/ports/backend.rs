//! Trading Backend Port - Transaction Builder and Pending Trade API
//!
//! The backend builds unsigned Drift transactions, answers account
//! readiness queries, and stores pending trades produced by the rule
//! engine. It never sees a signature request and never submits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderIntent, OrderType, TradeSide};
use crate::domain::pending::{ApprovalNotice, PendingTrade, PendingTradeId};
use crate::domain::transaction::TransactionMeta;

/// Body of `POST /api/transactions/build-order`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildOrderRequest {
  /// Wallet public key (base58) that will sign.
  pub user_pubkey: String,
  pub market: String,
  pub side: TradeSide,
  pub size: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub price: Option<f64>,
  pub order_type: OrderType,
}

impl BuildOrderRequest {
  pub fn new(user_pubkey: impl Into<String>, intent: &OrderIntent) -> Self {
    Self {
      user_pubkey: user_pubkey.into(),
      market: intent.market.clone(),
      side: intent.side,
      size: intent.size,
      price: intent.price,
      order_type: intent.order_type,
    }
  }
}

/// Response of the build-order and initialize-user endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildResponse {
  #[serde(default)]
  pub success: bool,
  /// Base64 wire transaction.
  #[serde(default)]
  pub transaction: Option<String>,
  #[serde(default)]
  pub transaction_type: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub details: serde_json::Value,
  #[serde(default)]
  pub simulation: Option<serde_json::Value>,
  #[serde(default = "default_requires_signature")]
  pub requires_signature: bool,
  #[serde(default)]
  pub signer: Option<String>,
  #[serde(default)]
  pub mock_mode: bool,
  #[serde(default)]
  pub error: Option<String>,
}

fn default_requires_signature() -> bool {
  true
}

impl BuildResponse {
  /// Text the backend gave for a failure, error field first.
  pub fn failure_text(&self) -> String {
    self
      .error
      .clone()
      .or_else(|| self.message.clone())
      .filter(|text| !text.trim().is_empty())
      .unwrap_or_else(|| "no reason given".to_string())
  }

  pub fn meta(&self) -> TransactionMeta {
    TransactionMeta {
      transaction_type: self.transaction_type.clone().unwrap_or_default(),
      message: self.message.clone().unwrap_or_default(),
      details: self.details.clone(),
      simulation: self.simulation.clone(),
      signer: self.signer.clone(),
    }
  }
}

/// Response of `GET /api/transactions/check-account/{pubkey}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountCheck {
  pub has_drift_account: bool,
  #[serde(default)]
  pub drift_account_pubkey: Option<String>,
  #[serde(default = "default_network")]
  pub network: String,
  #[serde(default)]
  pub message: Option<String>,
}

fn default_network() -> String {
  "devnet".to_string()
}

/// Perp position direction as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
  Long,
  Short,
}

impl PositionSide {
  /// Side of the order that flattens this position.
  pub const fn closing_side(self) -> TradeSide {
    match self {
      Self::Long => TradeSide::Sell,
      Self::Short => TradeSide::Buy,
    }
  }
}

/// An open perp position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
  pub market: String,
  pub market_index: u16,
  pub size: f64,
  pub side: PositionSide,
  pub entry_price: f64,
  pub unrealized_pnl: f64,
}

/// Backend operations the execution core depends on.
///
/// Reads (`check_account`, `positions`, `pending_trades`,
/// `pending_trade_count`) are retried by the adapter; writes are not.
#[async_trait]
pub trait TradingBackend: Send + Sync + 'static {
  /// Build an unsigned place-order transaction.
  async fn build_order(&self, request: &BuildOrderRequest) -> anyhow::Result<BuildResponse>;

  /// Build an unsigned transaction closing the whole position in `market`.
  async fn build_close_position(&self, user_pubkey: &str, market: &str)
    -> anyhow::Result<BuildResponse>;

  /// Build an unsigned initialize-user transaction.
  async fn build_initialize(&self, user_pubkey: &str) -> anyhow::Result<BuildResponse>;

  /// Whether the wallet has a trading account.
  async fn check_account(&self, user_pubkey: &str) -> anyhow::Result<AccountCheck>;

  /// Open positions for the wallet.
  async fn positions(&self, user_pubkey: &str) -> anyhow::Result<Vec<Position>>;

  /// Pending trades for the wallet with status `pending`.
  async fn pending_trades(&self, wallet_address: &str) -> anyhow::Result<Vec<PendingTrade>>;

  /// Number of pending trades for the wallet.
  async fn pending_trade_count(&self, wallet_address: &str) -> anyhow::Result<u64>;

  /// Report a signed and confirmed pending trade.
  async fn approve_pending_trade(
    &self,
    id: PendingTradeId,
    notice: &ApprovalNotice,
  ) -> anyhow::Result<()>;

  /// Decline a pending trade.
  async fn reject_pending_trade(&self, id: PendingTradeId) -> anyhow::Result<()>;
}
