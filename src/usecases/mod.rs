//! Use Cases Layer - Wallet-Authorized Execution Workflows
//!
//! Each use case is generic over the ports it needs and publishes its
//! state as `watch` snapshots.
//!
//! Use cases:
//! - `HealthMonitor`: periodic chain liveness probe
//! - `WalletSessionManager`: connect/disconnect and translated wallet errors
//! - `AccountReadinessCache`: whether the wallet has a trading account
//! - `TransactionBuilder`: unsigned transactions from the backend
//! - `SigningGate`: hand-off to the wallet provider
//! - `SubmissionEngine`: send, confirm and the busy lock
//! - `OrderHistory`: bounded ledger of attempts
//! - `TradingPipeline`: intent to settled record
//! - `PendingTradeSync`: backend-proposed trades awaiting approval
//! - `PortfolioService`: balance, airdrop, history and positions

pub mod account_readiness;
pub mod health_monitor;
pub mod order_history;
pub mod order_pipeline;
pub mod pending_trades;
pub mod portfolio;
pub mod signing_gate;
pub mod submission;
pub mod transaction_builder;
pub mod wallet_session;
