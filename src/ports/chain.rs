//! Chain RPC Port - Solana JSON-RPC Interface
//!
//! The subset of the Solana JSON-RPC 2.0 API the execution core uses:
//! health probing, balances, history, raw submission and confirmation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of one signature from `getSignatureStatuses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
  pub slot: u64,
  #[serde(default)]
  pub confirmations: Option<u64>,
  /// `processed`, `confirmed` or `finalized`.
  #[serde(default)]
  pub confirmation_status: Option<String>,
  /// On-chain error. Non-null means the transaction failed.
  #[serde(default)]
  pub err: Option<serde_json::Value>,
}

impl SignatureStatus {
  /// Reached `confirmed` or `finalized`.
  pub fn is_confirmed(&self) -> bool {
    matches!(
      self.confirmation_status.as_deref(),
      Some("confirmed" | "finalized")
    )
  }
}

/// One entry from `getSignaturesForAddress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
  pub signature: String,
  pub slot: u64,
  #[serde(default)]
  pub err: Option<serde_json::Value>,
  #[serde(default)]
  pub memo: Option<String>,
  #[serde(default)]
  pub block_time: Option<i64>,
  #[serde(default)]
  pub confirmation_status: Option<String>,
}

/// Node version from `getVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeVersion {
  #[serde(rename = "solana-core")]
  pub solana_core: String,
  #[serde(rename = "feature-set", default)]
  pub feature_set: Option<u64>,
}

/// `sendTransaction` answered with a JSON-RPC error: the node refused
/// the transaction. Any other send error leaves the outcome unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SendRejected(pub String);

/// Solana JSON-RPC operations.
#[async_trait]
pub trait ChainRpc: Send + Sync + 'static {
  /// `getVersion`, used as the liveness probe.
  async fn version(&self) -> anyhow::Result<NodeVersion>;

  /// `getBalance` in lamports.
  async fn balance(&self, address: &str) -> anyhow::Result<u64>;

  /// `getSignaturesForAddress`, newest first.
  async fn signatures_for_address(
    &self,
    address: &str,
    limit: usize,
  ) -> anyhow::Result<Vec<SignatureInfo>>;

  /// `getTransaction` as raw JSON; `None` if unknown to the node.
  async fn transaction(&self, signature: &str) -> anyhow::Result<Option<serde_json::Value>>;

  /// `sendTransaction` with base64 encoding. Returns the signature.
  /// A refusal by the node is reported as [`SendRejected`].
  async fn send_raw_transaction(&self, wire: &[u8]) -> anyhow::Result<String>;

  /// `getSignatureStatuses` for a single signature; `None` if not yet seen.
  async fn signature_status(&self, signature: &str) -> anyhow::Result<Option<SignatureStatus>>;

  /// `requestAirdrop`. Returns the airdrop transaction signature.
  async fn request_airdrop(&self, address: &str, lamports: u64) -> anyhow::Result<String>;
}
