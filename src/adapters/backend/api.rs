//! HTTP Trading Backend - `TradingBackend` over REST
//!
//! Maps each port operation to its backend endpoint. Builder endpoints
//! turn 4xx answers into unsuccessful `BuildResponse`s so the caller can
//! tell "backend refused" from "backend unreachable".

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument};

use super::client::{BackendClient, RawResponse};
use super::types::{ActionResponse, CountResponse, InitializeUserRequest};
use crate::domain::pending::{ApprovalNotice, PendingTrade, PendingTradeId};
use crate::ports::backend::{
  AccountCheck, BuildOrderRequest, BuildResponse, Position, TradingBackend,
};

/// REST implementation of the backend port.
pub struct HttpTradingBackend {
  client: Arc<BackendClient>,
}

impl HttpTradingBackend {
  pub fn new(client: Arc<BackendClient>) -> Self {
    Self { client }
  }

  // 2xx parses as a build response; 4xx becomes an unsuccessful one;
  // anything else is a transport failure.
  fn interpret_build(raw: RawResponse) -> Result<BuildResponse> {
    if raw.is_success() {
      return raw.json();
    }
    if raw.status.is_client_error() {
      return Ok(BuildResponse {
        success: false,
        error: Some(raw.error_detail()),
        requires_signature: false,
        ..BuildResponse::default()
      });
    }
    raw.error_for_status().map(|_| BuildResponse::default())
  }

  // The close endpoint answers without a `success` flag.
  fn interpret_close(raw: RawResponse) -> Result<BuildResponse> {
    let mut response = Self::interpret_build(raw)?;
    let has_payload = response
      .transaction
      .as_deref()
      .is_some_and(|tx| !tx.trim().is_empty());
    if response.error.is_none() && has_payload {
      response.success = true;
    }
    Ok(response)
  }

  fn expect_action(raw: RawResponse, what: &str) -> Result<()> {
    let raw = raw.error_for_status()?;
    let action: ActionResponse = raw.json()?;
    anyhow::ensure!(
      action.success,
      "{what} not acknowledged: {}",
      action.message.unwrap_or_default()
    );
    Ok(())
  }
}

#[async_trait]
impl TradingBackend for HttpTradingBackend {
  #[instrument(skip(self, request), fields(market = %request.market, side = %request.side))]
  async fn build_order(&self, request: &BuildOrderRequest) -> Result<BuildResponse> {
    let raw = self
      .client
      .post("/api/transactions/build-order", &[], Some(request))
      .await?;
    Self::interpret_build(raw)
  }

  #[instrument(skip(self))]
  async fn build_initialize(&self, user_pubkey: &str) -> Result<BuildResponse> {
    let body = InitializeUserRequest { user_pubkey };
    let raw = self
      .client
      .post("/api/transactions/initialize-user", &[], Some(&body))
      .await?;
    Self::interpret_build(raw)
  }

  #[instrument(skip(self))]
  async fn build_close_position(&self, user_pubkey: &str, market: &str) -> Result<BuildResponse> {
    let raw = self
      .client
      .post::<serde_json::Value>(
        "/api/transactions/close-position",
        &[("user_pubkey", user_pubkey), ("market", market)],
        None,
      )
      .await?;
    Self::interpret_close(raw)
  }

  async fn check_account(&self, user_pubkey: &str) -> Result<AccountCheck> {
    self
      .client
      .get_json(&format!("/api/transactions/check-account/{user_pubkey}"), &[])
      .await
      .context("Account check failed")
  }

  async fn positions(&self, user_pubkey: &str) -> Result<Vec<Position>> {
    self
      .client
      .get_json(&format!("/api/transactions/positions/{user_pubkey}"), &[])
      .await
      .context("Positions request failed")
  }

  async fn pending_trades(&self, wallet_address: &str) -> Result<Vec<PendingTrade>> {
    self
      .client
      .get_json(
        "/api/pending-trades",
        &[("wallet_address", wallet_address), ("status", "pending")],
      )
      .await
      .context("Pending trades request failed")
  }

  async fn pending_trade_count(&self, wallet_address: &str) -> Result<u64> {
    let response: CountResponse = self
      .client
      .get_json("/api/pending-trades/count", &[("wallet_address", wallet_address)])
      .await
      .context("Pending trade count request failed")?;
    Ok(response.count)
  }

  #[instrument(skip(self, notice), fields(signature = %notice.tx_signature))]
  async fn approve_pending_trade(&self, id: PendingTradeId, notice: &ApprovalNotice) -> Result<()> {
    let raw = self
      .client
      .post(&format!("/api/pending-trades/{id}/approve"), &[], Some(notice))
      .await?;
    Self::expect_action(raw, "approval")?;
    info!(trade_id = id, "Pending trade approval recorded");
    Ok(())
  }

  #[instrument(skip(self))]
  async fn reject_pending_trade(&self, id: PendingTradeId) -> Result<()> {
    let raw = self
      .client
      .post::<serde_json::Value>(&format!("/api/pending-trades/{id}/reject"), &[], None)
      .await?;
    Self::expect_action(raw, "rejection")?;
    info!(trade_id = id, "Pending trade rejected");
    Ok(())
  }
}
