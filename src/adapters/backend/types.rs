//! Backend API Request/Response Types
//!
//! Small wire types that never leave the adapter. Types shared with the
//! use-case layer live in `crate::ports::backend`.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/transactions/initialize-user`.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeUserRequest<'a> {
  pub user_pubkey: &'a str,
}

/// Response of `GET /api/pending-trades/count`.
#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
  pub count: u64,
}

/// Response of the approve and reject endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
  #[serde(default)]
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
}

/// Error shapes the backend produces: FastAPI `{"detail": ...}` or the
/// builder's `{"error": ..., "message": ...}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
  #[serde(default)]
  pub detail: Option<serde_json::Value>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

impl ErrorBody {
  pub fn into_text(self) -> Option<String> {
    let detail = self.detail.map(|value| match value {
      serde_json::Value::String(text) => text,
      other => other.to_string(),
    });
    detail.or(self.error).or(self.message)
  }
}
