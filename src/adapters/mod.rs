//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies. Each sub-module groups adapters by
//! infrastructure concern.
//!
//! Adapter categories:
//! - `backend`: trading backend REST client
//! - `rpc`: Solana JSON-RPC client
//! - `wallet`: keypair-backed wallet provider
//! - `metrics`: Prometheus metrics export and health checks
//! - `retry`: shared read backoff

pub mod backend;
pub mod metrics;
pub mod retry;
pub mod rpc;
pub mod wallet;
