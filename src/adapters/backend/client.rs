//! Backend HTTP Client - Retrying REST Client
//!
//! Wraps reqwest with a request timeout and read retries for the
//! trading backend's REST API. GETs are retried with exponential
//! backoff; POSTs are sent exactly once.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::types::ErrorBody;
use crate::adapters::retry::{Permanent, RetryPolicy};

/// Configuration for the backend HTTP client.
#[derive(Debug, Clone)]
pub struct BackendClientConfig {
  /// Base URL, e.g. `http://localhost:8000`.
  pub base_url: String,
  /// Per-request timeout.
  pub timeout: Duration,
  /// Backoff for read requests.
  pub retry: RetryPolicy,
}

impl Default for BackendClientConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8000".to_string(),
      timeout: Duration::from_secs(30),
      retry: RetryPolicy::default(),
    }
  }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
  pub status: StatusCode,
  pub body: String,
}

impl RawResponse {
  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  /// Parse the body as JSON.
  pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
    serde_json::from_str(&self.body)
      .map_err(|e| anyhow::Error::new(Permanent(format!("malformed response body: {e}"))))
  }

  /// Best-effort error text: FastAPI `detail`, then `error`, then `message`,
  /// then the raw body.
  pub fn error_detail(&self) -> String {
    serde_json::from_str::<ErrorBody>(&self.body)
      .ok()
      .and_then(ErrorBody::into_text)
      .unwrap_or_else(|| self.body.trim().to_string())
  }

  /// Turn a non-2xx response into an error. 4xx other than 429 is permanent.
  pub fn error_for_status(self) -> Result<Self> {
    if self.is_success() {
      return Ok(self);
    }
    let message = format!("API error {}: {}", self.status, self.error_detail());
    if self.status.is_client_error() && self.status != StatusCode::TOO_MANY_REQUESTS {
      Err(Permanent(message).into())
    } else {
      Err(anyhow::anyhow!(message))
    }
  }
}

/// HTTP client for the trading backend.
pub struct BackendClient {
  http: Client,
  config: BackendClientConfig,
}

impl BackendClient {
  pub fn new(config: BackendClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self { http, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// GET with retries. Non-2xx responses are errors.
  #[instrument(skip(self, query))]
  pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<RawResponse> {
    let url = self.url(path);
    self
      .config
      .retry
      .run(path, || {
        let request = self.http.get(&url).query(query);
        async move {
          let response = request
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
          let raw = read(response).await?;
          debug!(status = %raw.status, "GET completed");
          raw.error_for_status()
        }
      })
      .await
  }

  /// GET and parse JSON.
  pub async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, &str)],
  ) -> Result<T> {
    self.get(path, query).await?.json()
  }

  /// POST once. Returns the response whatever its status; only transport
  /// failures are errors.
  #[instrument(skip(self, body))]
  pub async fn post<B: Serialize + Sync>(
    &self,
    path: &str,
    query: &[(&str, &str)],
    body: Option<&B>,
  ) -> Result<RawResponse> {
    let mut request = self.http.post(self.url(path));
    if !query.is_empty() {
      request = request.query(query);
    }
    if let Some(body) = body {
      request = request.json(body);
    }
    let response = request
      .send()
      .await
      .with_context(|| format!("POST {path} failed"))?;
    let raw = read(response).await?;
    if !raw.is_success() {
      warn!(status = %raw.status, detail = %raw.error_detail(), "POST returned error status");
    }
    Ok(raw)
  }
}

async fn read(response: reqwest::Response) -> Result<RawResponse> {
  let status = response.status();
  let body = response
    .text()
    .await
    .context("Failed to read response body")?;
  Ok(RawResponse { status, body })
}
