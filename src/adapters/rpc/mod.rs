//! Solana RPC Adapter
//!
//! JSON-RPC 2.0 client implementing the `ChainRpc` port.

pub mod client;

pub use client::{RpcClientConfig, SolanaRpcClient};
