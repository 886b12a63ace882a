//! Order Pipeline - Intent to Settled Order Record
//!
//! Composes the builder, codec, signing gate, submission engine and
//! ledger:
//!
//! 1. validate the intent (or derive it from the open position when
//!    closing), require a connected wallet and a reachable chain
//! 2. record a Pending entry and take the busy lock
//! 3. build → (mock short-circuit) → decode → sign → submit → confirm
//! 4. settle the record exactly once
//!
//! Precondition failures in step 1 leave no record behind.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::account_readiness::AccountReadinessCache;
use super::order_history::OrderHistory;
use super::signing_gate::SigningGate;
use super::submission::{SubmissionEngine, SubmissionPermit};
use super::transaction_builder::{InitializeBuild, TransactionBuilder};
use super::wallet_session::WalletSessionManager;
use crate::domain::account::AccountReadiness;
use crate::domain::error::PipelineError;
use crate::domain::order::{IntentError, OrderIntent, OrderRecord, RecordOutcome, market_index};
use crate::domain::transaction::{BuiltTransaction, DecodedTransaction, SignedSubmission, mock_signature};
use crate::ports::backend::TradingBackend;
use crate::ports::chain::ChainRpc;
use crate::ports::wallet::WalletProvider;

/// Result of `initialize_account`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitializeOutcome {
  /// Signature of the init transaction; `None` if nothing was signed.
  pub signature: Option<String>,
  pub readiness: AccountReadiness,
}

/// Which backend endpoint builds a recorded attempt.
#[derive(Debug, Clone, Copy)]
enum BuildKind {
  Order,
  ClosePosition,
}

/// End-to-end order execution for one wallet session.
pub struct TradingPipeline<B: TradingBackend, C: ChainRpc, W: WalletProvider> {
  backend: Arc<B>,
  builder: TransactionBuilder<B>,
  readiness: Arc<AccountReadinessCache<B>>,
  sessions: Arc<WalletSessionManager<W>>,
  gate: SigningGate<W>,
  submission: Arc<SubmissionEngine<C>>,
  history: Arc<OrderHistory>,
}

impl<B: TradingBackend, C: ChainRpc, W: WalletProvider> TradingPipeline<B, C, W> {
  pub fn new(
    backend: Arc<B>,
    readiness: Arc<AccountReadinessCache<B>>,
    sessions: Arc<WalletSessionManager<W>>,
    submission: Arc<SubmissionEngine<C>>,
    history: Arc<OrderHistory>,
  ) -> Self {
    Self {
      builder: TransactionBuilder::new(Arc::clone(&backend)),
      backend,
      readiness,
      gate: SigningGate::new(Arc::clone(&sessions)),
      sessions,
      submission,
      history,
    }
  }

  pub fn sessions(&self) -> &Arc<WalletSessionManager<W>> {
    &self.sessions
  }

  pub fn readiness(&self) -> &Arc<AccountReadinessCache<B>> {
    &self.readiness
  }

  pub fn submission(&self) -> &Arc<SubmissionEngine<C>> {
    &self.submission
  }

  pub fn history(&self) -> &Arc<OrderHistory> {
    &self.history
  }

  pub fn is_busy(&self) -> bool {
    self.submission.is_busy()
  }

  fn require_wallet(&self) -> Result<Pubkey, PipelineError> {
    self
      .sessions
      .connected_key()
      .ok_or(PipelineError::NotConnected)
  }

  async fn acquire(&self, cancel: &CancellationToken) -> Result<SubmissionPermit, PipelineError> {
    tokio::select! {
      biased;
      () = cancel.cancelled() => Err(PipelineError::Cancelled),
      permit = self.submission.acquire() => Ok(permit),
    }
  }

  /// Execute `intent` with the connected wallet.
  ///
  /// Returns the settled record on success. On failure after the record
  /// was created, the record is settled Failed before the error returns.
  #[instrument(skip(self, cancel), fields(intent = %intent))]
  pub async fn place_order(
    &self,
    intent: OrderIntent,
    cancel: &CancellationToken,
  ) -> Result<OrderRecord, PipelineError> {
    intent.validate()?;
    let wallet = self.require_wallet()?;
    self.submission.ensure_reachable()?;

    self.run_recorded(wallet, intent, BuildKind::Order, cancel).await
  }

  /// Flatten the connected wallet's whole position in `market`.
  ///
  /// The ledger entry carries the offsetting market order derived from
  /// the open position; the transaction itself is built by the backend's
  /// close-position endpoint.
  #[instrument(skip(self, cancel))]
  pub async fn close_position(
    &self,
    market: &str,
    cancel: &CancellationToken,
  ) -> Result<OrderRecord, PipelineError> {
    if market_index(market).is_none() {
      return Err(IntentError::UnknownMarket(market.to_string()).into());
    }
    let wallet = self.require_wallet()?;
    self.submission.ensure_reachable()?;

    let positions = self
      .backend
      .positions(&wallet.to_string())
      .await
      .map_err(|e| PipelineError::Backend(format!("{e:#}")))?;
    let position = positions
      .into_iter()
      .find(|p| p.market.eq_ignore_ascii_case(market) && p.size.abs() > 0.0)
      .ok_or_else(|| IntentError::NoOpenPosition(market.to_string()))?;

    let intent = OrderIntent::market(
      position.market,
      position.side.closing_side(),
      position.size.abs(),
    );
    self.run_recorded(wallet, intent, BuildKind::ClosePosition, cancel).await
  }

  /// Record a Pending entry, execute under the busy lock, settle once.
  ///
  /// The returned record is settled locally: the ledger may already have
  /// evicted the entry while the attempt waited for the lock.
  async fn run_recorded(
    &self,
    wallet: Pubkey,
    intent: OrderIntent,
    kind: BuildKind,
    cancel: &CancellationToken,
  ) -> Result<OrderRecord, PipelineError> {
    let mut record = OrderRecord::pending(intent);
    let record_id = record.id;
    self.history.push(record.clone()).await;

    let result = match self.acquire(cancel).await {
      Ok(permit) => {
        let result = self
          .execute(&wallet, &record.intent, kind, record_id, &permit, cancel)
          .await;
        drop(permit);
        result
      }
      Err(e) => Err(e),
    };

    match result {
      Ok(submission) => {
        info!(signature = %submission.signature, "Order executed");
        let outcome = RecordOutcome::Executed {
          signature: submission.signature,
          explorer_url: submission.explorer_url,
        };
        if !self.history.update(record_id, outcome.clone()).await {
          debug!(id = %record_id, "Executed record no longer in the ledger");
        }
        record.settle(outcome);
        Ok(record)
      }
      Err(e) => {
        warn!(error = %e, kind = e.kind(), "Order failed");
        if e.needs_account() {
          self.readiness.mark_missing(wallet);
        }
        self
          .history
          .update(record_id, RecordOutcome::Failed { error: e.record_message() })
          .await;
        Err(e)
      }
    }
  }

  async fn execute(
    &self,
    wallet: &Pubkey,
    intent: &OrderIntent,
    kind: BuildKind,
    record_id: Uuid,
    permit: &SubmissionPermit,
    cancel: &CancellationToken,
  ) -> Result<SignedSubmission, PipelineError> {
    let built = match kind {
      BuildKind::Order => self.builder.build_order(wallet, intent).await?,
      BuildKind::ClosePosition => self.builder.build_close_position(wallet, &intent.market).await?,
    };
    if built.mock_mode {
      return Ok(SignedSubmission {
        signature: mock_signature(record_id),
        explorer_url: String::new(),
      });
    }
    self.sign_and_submit(&built, permit, cancel).await
  }

  async fn sign_and_submit(
    &self,
    built: &BuiltTransaction,
    permit: &SubmissionPermit,
    cancel: &CancellationToken,
  ) -> Result<SignedSubmission, PipelineError> {
    let decoded = DecodedTransaction::decode(&built.payload_base64)?;
    let signed = self.gate.sign(decoded, cancel).await?;
    self.submission.submit(permit, &signed).await
  }

  /// Create the trading account for the connected wallet, then re-check
  /// readiness. An account that already exists counts as success.
  #[instrument(skip(self, cancel))]
  pub async fn initialize_account(
    &self,
    cancel: &CancellationToken,
  ) -> Result<InitializeOutcome, PipelineError> {
    let wallet = self.require_wallet()?;
    self.submission.ensure_reachable()?;
    let permit = self.acquire(cancel).await?;

    let signature = match self.builder.build_initialize(&wallet).await? {
      InitializeBuild::AlreadyInitialized => None,
      InitializeBuild::Transaction(built) if built.mock_mode => {
        Some(mock_signature(Uuid::new_v4()))
      }
      InitializeBuild::Transaction(built) => {
        let submission = self.sign_and_submit(&built, &permit, cancel).await?;
        info!(signature = %submission.signature, "Trading account initialized");
        Some(submission.signature)
      }
    };
    drop(permit);

    let readiness = self.readiness.check_account(wallet).await;
    Ok(InitializeOutcome {
      signature,
      readiness,
    })
  }
}
