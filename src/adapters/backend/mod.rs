//! Trading Backend Adapter
//!
//! REST client for the backend that builds unsigned transactions and
//! stores pending trades.
//!
//! Sub-modules:
//! - `client`: HTTP client with timeout and read retries
//! - `api`: `TradingBackend` port implementation
//! - `types`: adapter-private wire types

pub mod api;
pub mod client;
pub mod types;

pub use api::HttpTradingBackend;
pub use client::{BackendClient, BackendClientConfig};
