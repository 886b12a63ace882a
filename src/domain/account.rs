//! Trading account readiness for the connected wallet.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;

/// Whether the connected wallet has an initialized Drift user account.
///
/// Only valid for `wallet_key`; recreated on every connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountReadiness {
  #[serde(serialize_with = "serialize_pubkey")]
  pub wallet_key: Pubkey,
  pub has_trading_account: bool,
  pub trading_account_key: Option<String>,
  pub network: String,
  pub checked_at: DateTime<Utc>,
}

impl AccountReadiness {
  pub fn new(
    wallet_key: Pubkey,
    has_trading_account: bool,
    trading_account_key: Option<String>,
    network: impl Into<String>,
  ) -> Self {
    Self {
      wallet_key,
      has_trading_account,
      trading_account_key,
      network: network.into(),
      checked_at: Utc::now(),
    }
  }

  /// Pessimistic readiness used when the backend cannot answer.
  pub fn assumed_missing(wallet_key: Pubkey, network: impl Into<String>) -> Self {
    Self::new(wallet_key, false, None, network)
  }

  pub fn belongs_to(&self, wallet_key: &Pubkey) -> bool {
    &self.wallet_key == wallet_key
  }
}

fn serialize_pubkey<S: serde::Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
  s.collect_str(key)
}

/// Backend wording for an init request on an account that already exists.
pub fn is_already_initialized(message: &str) -> bool {
  let lower = message.to_lowercase();
  lower.contains("already") && (lower.contains("exist") || lower.contains("initialized"))
}

/// Backend wording for a build refused because the account is missing.
pub fn indicates_missing_account(message: &str) -> bool {
  let lower = message.to_lowercase();
  lower.contains("drift_account_not_found")
    || lower.contains("account not found")
    || lower.contains("initialize your")
}
