//! Drift Signer - Library Root
//!
//! Wallet-authorized trade execution core: builds Drift perp orders
//! through the trading backend, has the wallet sign them and settles
//! them on Solana. Re-exports all modules for integration tests and
//! benchmarks.

pub mod adapters;
pub mod config;
pub mod console;
pub mod domain;
pub mod ports;
pub mod usecases;
