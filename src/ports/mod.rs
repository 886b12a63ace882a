//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use-case layer requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `TradingBackend`: transaction builder, account checks, pending trades
//! - `ChainRpc`: Solana JSON-RPC
//! - `WalletProvider`: the signing-capable key holder

pub mod backend;
pub mod chain;
pub mod wallet;

pub use backend::TradingBackend;
pub use chain::ChainRpc;
pub use wallet::WalletProvider;
