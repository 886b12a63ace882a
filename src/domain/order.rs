//! Order intents and order records.
//!
//! An `OrderIntent` is what the user (or an approved pending trade) asks
//! for; an `OrderRecord` is the ledger entry tracking one attempt at
//! executing it. Intents are validated here, before anything touches
//! the network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────
// Market table
// ────────────────────────────────────────────

/// Perp markets the transaction builder knows how to route, with their
/// Drift market index.
pub const KNOWN_MARKETS: [(&str, u16); 10] = [
    ("SOL-PERP", 0),
    ("BTC-PERP", 1),
    ("ETH-PERP", 2),
    ("APT-PERP", 3),
    ("MATIC-PERP", 4),
    ("ARB-PERP", 5),
    ("DOGE-PERP", 6),
    ("BNB-PERP", 7),
    ("SUI-PERP", 8),
    ("1MPEPE-PERP", 9),
];

/// Look up the Drift market index for a market symbol (case-insensitive).
pub fn market_index(market: &str) -> Option<u16> {
    KNOWN_MARKETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(market))
        .map(|(_, index)| *index)
}

// ────────────────────────────────────────────
// Enums
// ────────────────────────────────────────────

/// Trade side. Serialized lowercase on the backend wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    #[serde(alias = "BUY", alias = "long")]
    Buy,
    #[serde(alias = "SELL", alias = "short")]
    Sell,
}

impl TradeSide {
    /// Wire representation expected by the backend.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type. Market orders fill at the oracle-derived price; limit
/// orders carry an explicit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
        }
    }
}

// ────────────────────────────────────────────
// Intent
// ────────────────────────────────────────────

/// Reasons an intent is refused before any network call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntentError {
    #[error("order size must be a positive number, got {0}")]
    NonPositiveSize(f64),
    #[error("limit orders require a price")]
    MissingLimitPrice,
    #[error("price must be a positive number, got {0}")]
    InvalidPrice(f64),
    #[error("unknown market: {0}")]
    UnknownMarket(String),
    #[error("no open position in {0}")]
    NoOpenPosition(String),
}

/// What the user asked to trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Market symbol, e.g. `SOL-PERP`.
    pub market: String,
    /// Buy or sell.
    pub side: TradeSide,
    /// Size in base units (1.0 = one SOL for SOL-PERP).
    pub size: f64,
    /// Limit price in USD. Ignored for market orders.
    pub price: Option<f64>,
    /// Market or limit.
    pub order_type: OrderType,
}

impl OrderIntent {
    /// A market order intent.
    pub fn market(market: impl Into<String>, side: TradeSide, size: f64) -> Self {
        Self {
            market: market.into(),
            side,
            size,
            price: None,
            order_type: OrderType::Market,
        }
    }

    /// A limit order intent.
    pub fn limit(market: impl Into<String>, side: TradeSide, size: f64, price: f64) -> Self {
        Self {
            market: market.into(),
            side,
            size,
            price: Some(price),
            order_type: OrderType::Limit,
        }
    }

    /// Check the intent can be sent to the builder at all.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), IntentError> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(IntentError::NonPositiveSize(self.size));
        }
        if market_index(&self.market).is_none() {
            return Err(IntentError::UnknownMarket(self.market.clone()));
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err(IntentError::MissingLimitPrice),
            (_, Some(price)) if !price.is_finite() || price <= 0.0 => {
                Err(IntentError::InvalidPrice(price))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.order_type, self.price) {
            (OrderType::Limit, Some(price)) => {
                write!(f, "{} {} {} @ ${price}", self.side, self.size, self.market)
            }
            _ => write!(f, "{} {} {} @ market", self.side, self.size, self.market),
        }
    }
}

// ────────────────────────────────────────────
// Order records
// ────────────────────────────────────────────

/// Lifecycle status of a recorded order attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Executed,
    Failed,
}

impl OrderStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Terminal outcome applied to a pending record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Executed {
        signature: String,
        explorer_url: String,
    },
    Failed {
        error: String,
    },
}

/// Ledger entry for a single order attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Uuid,
    /// The intent as it was when the attempt started.
    pub intent: OrderIntent,
    pub status: OrderStatus,
    pub signature: Option<String>,
    pub explorer_url: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OrderRecord {
    /// A fresh pending record for `intent`.
    pub fn pending(intent: OrderIntent) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent,
            status: OrderStatus::Pending,
            signature: None,
            explorer_url: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Apply a terminal outcome. Returns `false` (and leaves the record
    /// untouched) if the record already settled.
    pub fn settle(&mut self, outcome: RecordOutcome) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match outcome {
            RecordOutcome::Executed {
                signature,
                explorer_url,
            } => {
                self.status = OrderStatus::Executed;
                self.signature = Some(signature);
                self.explorer_url = Some(explorer_url);
            }
            RecordOutcome::Failed { error } => {
                self.status = OrderStatus::Failed;
                self.error = Some(error);
            }
        }
        self.timestamp = Utc::now();
        true
    }
}
