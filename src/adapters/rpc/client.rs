//! Solana JSON-RPC Client - Rate-limited `ChainRpc` Adapter
//!
//! Speaks JSON-RPC 2.0 over reqwest. Every request waits on a GCRA rate
//! limiter sized for public RPC quotas. Reads are retried with backoff;
//! `sendTransaction`, `requestAirdrop` and the probes used by polling
//! loops are sent once.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::adapters::retry::{Permanent, RetryPolicy};
use crate::ports::chain::{ChainRpc, NodeVersion, SendRejected, SignatureInfo, SignatureStatus};

/// Configuration for the JSON-RPC client.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
  pub url: String,
  pub timeout: Duration,
  pub requests_per_second: u32,
  /// Commitment for reads and preflight, e.g. `confirmed`.
  pub commitment: String,
  pub retry: RetryPolicy,
}

impl Default for RpcClientConfig {
  fn default() -> Self {
    Self {
      url: "https://api.devnet.solana.com".to_string(),
      timeout: Duration::from_secs(30),
      requests_per_second: 10,
      commitment: "confirmed".to_string(),
      retry: RetryPolicy::default(),
    }
  }
}

/// A JSON-RPC `error` object.
#[derive(Debug, Clone, PartialEq, Error, Deserialize)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
  pub code: i64,
  pub message: String,
  #[serde(default)]
  pub data: Option<Value>,
}

impl RpcError {
  /// Message with the simulation error appended when the node sent one.
  pub fn detailed(&self) -> String {
    match self.data.as_ref().and_then(|data| data.get("err")) {
      Some(err) if !err.is_null() => format!("{} ({err})", self.message),
      _ => self.message.clone(),
    }
  }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
  #[serde(default)]
  result: Option<Value>,
  #[serde(default)]
  error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
  value: T,
}

/// Extract `result` from a JSON-RPC response body.
pub fn parse_rpc_body<T: DeserializeOwned>(body: &str) -> Result<T> {
  let envelope: RpcEnvelope = serde_json::from_str(body)
    .map_err(|e| anyhow::Error::new(Permanent(format!("invalid JSON-RPC body: {e}"))))?;
  if let Some(error) = envelope.error {
    return Err(error.into());
  }
  let result = envelope.result.unwrap_or(Value::Null);
  serde_json::from_value(result).context("Unexpected JSON-RPC result shape")
}

/// Signature from a `sendTransaction` body. An `error` object becomes
/// [`SendRejected`]; a garbled body stays an ambiguous error.
pub fn parse_send_body(body: &str) -> Result<String> {
  parse_rpc_body::<String>(body).map_err(|e| match e.downcast::<RpcError>() {
    Ok(rpc) => SendRejected(rpc.detailed()).into(),
    Err(e) => e,
  })
}

/// First entry of a `getSignatureStatuses` result; `None` while unseen.
pub fn parse_signature_status(body: &str) -> Result<Option<SignatureStatus>> {
  let statuses: WithContext<Vec<Option<SignatureStatus>>> = parse_rpc_body(body)?;
  Ok(statuses.value.into_iter().next().flatten())
}

/// Rate-limited Solana JSON-RPC client.
pub struct SolanaRpcClient {
  http: Client,
  config: RpcClientConfig,
  limiter: DefaultDirectRateLimiter,
}

impl SolanaRpcClient {
  pub fn new(config: RpcClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .build()
      .context("Failed to build RPC HTTP client")?;
    let rate = NonZeroU32::new(config.requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(rate));

    Ok(Self {
      http,
      config,
      limiter,
    })
  }

  /// Send one JSON-RPC request and return the raw response body.
  async fn send(&self, method: &str, params: &Value) -> Result<String> {
    self.limiter.until_ready().await;

    let payload = json!({
      "jsonrpc": "2.0",
      "id": 1,
      "method": method,
      "params": params,
    });
    let response = self
      .http
      .post(&self.config.url)
      .json(&payload)
      .send()
      .await
      .with_context(|| format!("{method} request failed"))?;
    let status = response.status();
    let body = response
      .text()
      .await
      .with_context(|| format!("{method} response unreadable"))?;
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
      anyhow::bail!("{method} returned HTTP {status}");
    }
    Ok(body)
  }

  async fn call_once<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
    let body = self.send(method, &params).await?;
    parse_rpc_body(&body)
  }

  async fn call_with_retry<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
    self
      .config
      .retry
      .run(method, || self.call_once(method, params.clone()))
      .await
  }
}

#[async_trait]
impl ChainRpc for SolanaRpcClient {
  async fn version(&self) -> Result<NodeVersion> {
    self.call_once("getVersion", json!([])).await
  }

  #[instrument(skip(self))]
  async fn balance(&self, address: &str) -> Result<u64> {
    let balance: WithContext<u64> = self
      .call_with_retry(
        "getBalance",
        json!([address, { "commitment": self.config.commitment }]),
      )
      .await?;
    Ok(balance.value)
  }

  #[instrument(skip(self))]
  async fn signatures_for_address(&self, address: &str, limit: usize) -> Result<Vec<SignatureInfo>> {
    self
      .call_with_retry(
        "getSignaturesForAddress",
        json!([address, { "limit": limit, "commitment": self.config.commitment }]),
      )
      .await
  }

  #[instrument(skip(self))]
  async fn transaction(&self, signature: &str) -> Result<Option<Value>> {
    let result: Value = self
      .call_with_retry(
        "getTransaction",
        json!([signature, {
          "encoding": "json",
          "commitment": self.config.commitment,
          "maxSupportedTransactionVersion": 0,
        }]),
      )
      .await?;
    Ok((!result.is_null()).then_some(result))
  }

  #[instrument(skip(self, wire), fields(bytes = wire.len()))]
  async fn send_raw_transaction(&self, wire: &[u8]) -> Result<String> {
    let encoded = BASE64.encode(wire);
    let body = self
      .send(
        "sendTransaction",
        &json!([encoded, {
          "encoding": "base64",
          "skipPreflight": false,
          "preflightCommitment": self.config.commitment,
        }]),
      )
      .await?;
    match parse_send_body(&body) {
      Ok(signature) => {
        debug!(signature = %signature, "Transaction accepted by RPC");
        Ok(signature)
      }
      Err(e) => {
        warn!(error = %e, "sendTransaction failed");
        Err(e)
      }
    }
  }

  async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>> {
    let body = self
      .send(
        "getSignatureStatuses",
        &json!([[signature], { "searchTransactionHistory": true }]),
      )
      .await?;
    parse_signature_status(&body)
  }

  #[instrument(skip(self))]
  async fn request_airdrop(&self, address: &str, lamports: u64) -> Result<String> {
    self
      .call_once(
        "requestAirdrop",
        json!([address, lamports, { "commitment": self.config.commitment }]),
      )
      .await
  }
}
