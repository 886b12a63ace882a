//! Health Check Server - Liveness, Readiness and Metrics
//!
//! Exposes `/live`, `/ready` and `/metrics` via axum 0.7. Readiness
//! follows the chain connectivity snapshot: ready only while the last
//! RPC probe succeeded.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::prometheus::MetricsRegistry;
use crate::domain::connection::ConnectionStatus;

/// State shared with the probe handlers.
#[derive(Clone)]
pub struct HealthState {
  pub connection: watch::Receiver<ConnectionStatus>,
  pub metrics: Arc<MetricsRegistry>,
}

impl HealthState {
  pub fn is_ready(&self) -> bool {
    self.connection.borrow().is_reachable()
  }
}

/// Axum-based health and metrics HTTP server.
pub struct HealthServer {
  state: HealthState,
  port: u16,
}

impl HealthServer {
  pub fn new(state: HealthState, port: u16) -> Self {
    Self { state, port }
  }

  pub fn router(state: HealthState) -> Router {
    Router::new()
      .route("/live", get(Self::liveness))
      .route("/ready", get(Self::readiness))
      .route("/metrics", get(Self::metrics))
      .with_state(state)
  }

  /// Serve until `cancel` fires.
  #[instrument(skip(self, cancel))]
  pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
    let app = Self::router(self.state);
    let addr = format!("0.0.0.0:{}", self.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(address = %addr, "Health server started");

    axum::serve(listener, app)
      .with_graceful_shutdown(async move { cancel.cancelled().await })
      .await?;

    Ok(())
  }

  async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
  }

  async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
    if state.is_ready() {
      (StatusCode::OK, "READY")
    } else {
      (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
  }

  async fn metrics(State(state): State<HealthState>) -> impl IntoResponse {
    state.metrics.render()
  }
}
