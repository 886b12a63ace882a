//! Domain layer - Core models for wallet-authorized trade execution.
//!
//! Pure types and rules: order intents and records, pending trades, the
//! wallet error taxonomy, chain connectivity snapshots and the dual
//! transaction wire format. No I/O lives here.

pub mod account;
pub mod connection;
pub mod error;
pub mod order;
pub mod pending;
pub mod transaction;
pub mod wallet;

pub use account::AccountReadiness;
pub use connection::ConnectionStatus;
pub use error::{BuildError, PipelineError};
pub use order::{OrderIntent, OrderRecord, OrderStatus, OrderType, RecordOutcome, TradeSide};
pub use pending::{ApprovalNotice, PendingTrade, PendingTradeId, PendingTradeStatus};
pub use transaction::{BuiltTransaction, DecodeError, DecodedTransaction, SignedSubmission};
pub use wallet::{WalletError, WalletErrorKind, WalletErrorRecord, WalletSession, WalletStatus};
