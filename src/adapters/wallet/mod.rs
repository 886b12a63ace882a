//! Wallet Provider Adapters

pub mod keypair;

pub use keypair::KeypairWallet;
