//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics fed from the use-case state channels, served with
//! the liveness and readiness probes by one axum server.

pub mod health;
pub mod prometheus;

pub use health::{HealthServer, HealthState};
pub use prometheus::MetricsRegistry;
