//! Pending trades awaiting a wallet signature.
//!
//! Created by the backend rule engine when a rule fires; this core only
//! mirrors them and drives the approve/reject transitions.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::order::{OrderIntent, TradeSide};

/// Backend-assigned pending trade identifier.
pub type PendingTradeId = i64;

/// Server-side status of a pending trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingTradeStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Executed,
}

/// A trade computed by the rule engine, awaiting human authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTrade {
    pub id: PendingTradeId,
    #[serde(default)]
    pub rule_id: Option<i64>,
    pub wallet_address: String,
    pub market: String,
    pub side: TradeSide,
    pub size: f64,
    pub price_at_trigger: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub status: PendingTradeStatus,
    #[serde(deserialize_with = "backend_time")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "optional_backend_time")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingTrade {
    /// Whether the trade's approval window has passed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Still actionable: pending server-side and not past its expiry.
    pub fn is_actionable(&self, now: DateTime<Utc>) -> bool {
        self.status == PendingTradeStatus::Pending && !self.is_expired(now)
    }

    /// The market order this trade asks the wallet to sign.
    pub fn to_intent(&self) -> OrderIntent {
        OrderIntent::market(self.market.clone(), self.side, self.size)
    }
}

/// Body of the backend approve notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalNotice {
    pub tx_signature: String,
    pub executed_price: Option<f64>,
}

/// Backend wording for an approval it already holds, e.g. "Trade is
/// already executed". A replayed notice getting this answer was delivered.
pub fn approval_already_recorded(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("already executed") || lower.contains("already approved")
}

// The backend emits naive ISO-8601 timestamps (UTC, no offset); accept
// those as well as RFC 3339.
fn parse_backend_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {raw:?}: {e}"))
}

fn backend_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_backend_time(&raw).map_err(serde::de::Error::custom)
}

fn optional_backend_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|value| parse_backend_time(&value).map_err(serde::de::Error::custom))
        .transpose()
}
