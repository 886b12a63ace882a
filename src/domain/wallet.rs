//! Wallet session state and the provider error taxonomy.
//!
//! Wallet providers fail in many heterogeneous ways. Every failure is
//! funnelled into a `WalletError` carrying one of seven kinds, and each
//! kind has a fixed user-facing message. Errors are never retried
//! automatically; the user re-initiates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Lifecycle of the signing-capable provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Snapshot of the wallet session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    pub status: WalletStatus,
    pub provider_name: Option<String>,
    pub public_key: Option<Pubkey>,
    /// Incremented on every successful connect.
    pub connect_epoch: u64,
}

impl WalletSession {
    pub const fn disconnected() -> Self {
        Self {
            status: WalletStatus::Disconnected,
            provider_name: None,
            public_key: None,
            connect_epoch: 0,
        }
    }

    /// The wallet key, only while fully connected.
    pub fn connected_key(&self) -> Option<Pubkey> {
        match self.status {
            WalletStatus::Connected => self.public_key,
            _ => None,
        }
    }
}

impl Default for WalletSession {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// Provider error categories, named after the wallet-adapter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WalletErrorKind {
    NotReady,
    ConnectionError,
    Disconnected,
    SignError,
    Timeout,
    WindowClosed,
    Unknown,
}

impl WalletErrorKind {
    /// Stable adapter error name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotReady => "WalletNotReadyError",
            Self::ConnectionError => "WalletConnectionError",
            Self::Disconnected => "WalletDisconnectedError",
            Self::SignError => "WalletSignTransactionError",
            Self::Timeout => "WalletTimeoutError",
            Self::WindowClosed => "WalletWindowClosedError",
            Self::Unknown => "WalletError",
        }
    }

    /// Map an adapter error name back to its kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "WalletNotReadyError" | "not-ready" => Self::NotReady,
            "WalletConnectionError" | "connection-error" => Self::ConnectionError,
            "WalletDisconnectedError" | "disconnected" => Self::Disconnected,
            "WalletSignTransactionError" | "sign-error" => Self::SignError,
            "WalletTimeoutError" | "timeout" => Self::Timeout,
            "WalletWindowClosedError" | "window-closed" => Self::WindowClosed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for WalletErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A failure reported by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct WalletError {
    pub kind: WalletErrorKind,
    pub message: String,
}

impl WalletError {
    pub fn new(kind: WalletErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The user declined the request in the wallet UI.
    pub fn user_rejected() -> Self {
        Self::new(WalletErrorKind::SignError, "User rejected the request.")
    }

    /// Whether the raw message carries rejection wording.
    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self.kind,
            WalletErrorKind::ConnectionError | WalletErrorKind::SignError
        ) && has_rejection_wording(&self.message)
    }

    /// Short reason stored on failed order records.
    pub fn record_reason(&self) -> String {
        if self.is_user_rejection() {
            return "User rejected the request".to_string();
        }
        match self.kind {
            WalletErrorKind::Timeout => "wallet timed out".to_string(),
            WalletErrorKind::WindowClosed => "wallet window closed".to_string(),
            _ => self.to_string(),
        }
    }
}

fn has_rejection_wording(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["reject", "denied", "declined", "cancel"]
        .iter()
        .any(|word| lower.contains(word))
}

/// User-facing rendition of a wallet error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletErrorRecord {
    pub name: String,
    pub message: String,
    pub user_message: String,
    pub timestamp: DateTime<Utc>,
}

/// Translate a provider error into the record shown to the user.
pub fn translate_error(error: &WalletError) -> WalletErrorRecord {
    let user_message = match error.kind {
        WalletErrorKind::NotReady => {
            "Wallet not found. Please install Phantom or Solflare and refresh."
        }
        WalletErrorKind::ConnectionError if error.is_user_rejection() => {
            "Connection cancelled by user."
        }
        WalletErrorKind::ConnectionError => "Failed to connect to wallet. Please try again.",
        WalletErrorKind::Disconnected => "Wallet disconnected. Please reconnect.",
        WalletErrorKind::SignError if error.is_user_rejection() => {
            "Transaction cancelled by user."
        }
        WalletErrorKind::SignError => "Failed to sign transaction. Please try again.",
        WalletErrorKind::Timeout => "Wallet request timed out. Please try again.",
        WalletErrorKind::WindowClosed => {
            "Wallet window was closed before the request completed."
        }
        WalletErrorKind::Unknown => "An unexpected wallet error occurred.",
    };

    WalletErrorRecord {
        name: error.kind.name().to_string(),
        message: error.message.clone(),
        user_message: user_message.to_string(),
        timestamp: Utc::now(),
    }
}
