//! Portfolio Queries - Balance, Airdrop, History and Positions
//!
//! Read-side helpers for the connected wallet. Balance and airdrop are
//! gated on chain reachability; history and positions go straight to
//! the adapters, which retry reads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{RwLock, watch};
use tracing::{info, instrument};

use crate::domain::connection::ConnectionStatus;
use crate::domain::error::PipelineError;
use crate::ports::backend::{Position, TradingBackend};
use crate::ports::chain::{ChainRpc, SignatureInfo};

pub const LAMPORTS_PER_SOL: Decimal = dec!(1_000_000_000);

/// Networks where `requestAirdrop` is available.
const AIRDROP_NETWORKS: [&str; 2] = ["devnet", "testnet"];

/// Wallet balance at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSnapshot {
  #[serde(serialize_with = "serialize_key")]
  pub wallet: Pubkey,
  pub lamports: u64,
  pub sol: Decimal,
  pub updated_at: DateTime<Utc>,
}

fn serialize_key<S: serde::Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
  s.collect_str(key)
}

pub fn lamports_to_sol(lamports: u64) -> Decimal {
  Decimal::from(lamports) / LAMPORTS_PER_SOL
}

/// SOL to lamports, truncating sub-lamport fractions. `None` when
/// negative or out of range.
pub fn sol_to_lamports(sol: Decimal) -> Option<u64> {
  if sol.is_sign_negative() {
    return None;
  }
  (sol * LAMPORTS_PER_SOL).trunc().to_u64()
}

pub struct PortfolioService<B: TradingBackend, C: ChainRpc> {
  backend: Arc<B>,
  chain: Arc<C>,
  health: watch::Receiver<ConnectionStatus>,
  network: String,
  last_balance: RwLock<Option<BalanceSnapshot>>,
}

impl<B: TradingBackend, C: ChainRpc> PortfolioService<B, C> {
  pub fn new(
    backend: Arc<B>,
    chain: Arc<C>,
    health: watch::Receiver<ConnectionStatus>,
    network: impl Into<String>,
  ) -> Self {
    Self {
      backend,
      chain,
      health,
      network: network.into(),
      last_balance: RwLock::new(None),
    }
  }

  fn ensure_reachable(&self) -> Result<(), PipelineError> {
    let status = self.health.borrow();
    if status.is_reachable() {
      Ok(())
    } else {
      Err(PipelineError::Connectivity(
        status
          .last_error
          .clone()
          .unwrap_or_else(|| "connection status unknown".to_string()),
      ))
    }
  }

  /// Last balance fetched for any wallet.
  pub async fn last_balance(&self) -> Option<BalanceSnapshot> {
    self.last_balance.read().await.clone()
  }

  #[instrument(skip(self))]
  pub async fn refresh_balance(&self, wallet: Pubkey) -> Result<BalanceSnapshot, PipelineError> {
    self.ensure_reachable()?;
    let lamports = self
      .chain
      .balance(&wallet.to_string())
      .await
      .map_err(|e| PipelineError::Connectivity(format!("{e:#}")))?;

    let snapshot = BalanceSnapshot {
      wallet,
      lamports,
      sol: lamports_to_sol(lamports),
      updated_at: Utc::now(),
    };
    *self.last_balance.write().await = Some(snapshot.clone());
    Ok(snapshot)
  }

  /// Request test SOL. Only available on devnet and testnet.
  #[instrument(skip(self))]
  pub async fn request_airdrop(&self, wallet: Pubkey, sol: Decimal) -> Result<String, PipelineError> {
    if !AIRDROP_NETWORKS.contains(&self.network.as_str()) {
      return Err(PipelineError::Unsupported(format!(
        "airdrop is not available on {}",
        self.network
      )));
    }
    let lamports = sol_to_lamports(sol)
      .filter(|l| *l > 0)
      .ok_or_else(|| PipelineError::Unsupported(format!("invalid airdrop amount: {sol}")))?;
    self.ensure_reachable()?;

    let signature = self
      .chain
      .request_airdrop(&wallet.to_string(), lamports)
      .await
      .map_err(|e| PipelineError::Submission(format!("{e:#}")))?;
    info!(wallet = %wallet, sol = %sol, signature = %signature, "Airdrop requested");
    Ok(signature)
  }

  pub async fn recent_signatures(
    &self,
    wallet: Pubkey,
    limit: usize,
  ) -> Result<Vec<SignatureInfo>, PipelineError> {
    self
      .chain
      .signatures_for_address(&wallet.to_string(), limit)
      .await
      .map_err(|e| PipelineError::Connectivity(format!("{e:#}")))
  }

  pub async fn transaction(&self, signature: &str) -> Result<Option<serde_json::Value>, PipelineError> {
    self
      .chain
      .transaction(signature)
      .await
      .map_err(|e| PipelineError::Connectivity(format!("{e:#}")))
  }

  pub async fn positions(&self, wallet: Pubkey) -> Result<Vec<Position>, PipelineError> {
    self
      .backend
      .positions(&wallet.to_string())
      .await
      .map_err(|e| PipelineError::Backend(format!("{e:#}")))
  }
}
