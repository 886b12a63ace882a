//! Submission & Confirmation Engine - Send and Await Settlement
//!
//! State machine `Idle → Submitting → Confirming → Settled`. A signed
//! transaction is sent once with `sendTransaction`, then its status is
//! polled until it is confirmed, fails on chain, or the confirmation
//! window closes. Success requires an explicitly null `err`.
//!
//! The busy lock serializes signing and submission for the wallet
//! session: a `SubmissionPermit` is taken before signing and held until
//! the attempt settles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tracing::{debug, info, instrument, warn};

use crate::domain::connection::ConnectionStatus;
use crate::domain::error::PipelineError;
use crate::domain::transaction::{DecodedTransaction, SignedSubmission};
use crate::ports::chain::{ChainRpc, SendRejected};

/// Observable phase of the current (or last) submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionPhase {
  Idle,
  Submitting,
  Confirming { signature: String },
  Executed(SignedSubmission),
  Failed(String),
}

impl SubmissionPhase {
  pub const fn is_settled(&self) -> bool {
    matches!(self, Self::Executed(_) | Self::Failed(_))
  }
}

/// Timing for the confirmation poll.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationTiming {
  pub poll_interval: Duration,
  pub timeout: Duration,
}

impl Default for ConfirmationTiming {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_millis(500),
      timeout: Duration::from_secs(60),
    }
  }
}

/// Exclusive right to sign and submit. Released on drop.
pub struct SubmissionPermit {
  _guard: OwnedMutexGuard<()>,
  busy: Arc<AtomicBool>,
}

impl Drop for SubmissionPermit {
  fn drop(&mut self) {
    self.busy.store(false, Ordering::SeqCst);
  }
}

pub struct SubmissionEngine<C: ChainRpc> {
  chain: Arc<C>,
  health: watch::Receiver<ConnectionStatus>,
  network: String,
  timing: ConfirmationTiming,
  lock: Arc<Mutex<()>>,
  busy: Arc<AtomicBool>,
  phase_tx: watch::Sender<SubmissionPhase>,
}

impl<C: ChainRpc> SubmissionEngine<C> {
  pub fn new(
    chain: Arc<C>,
    health: watch::Receiver<ConnectionStatus>,
    network: impl Into<String>,
    timing: ConfirmationTiming,
  ) -> Self {
    let (phase_tx, _) = watch::channel(SubmissionPhase::Idle);
    Self {
      chain,
      health,
      network: network.into(),
      timing,
      lock: Arc::new(Mutex::new(())),
      busy: Arc::new(AtomicBool::new(false)),
      phase_tx,
    }
  }

  pub fn network(&self) -> &str {
    &self.network
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::SeqCst)
  }

  pub fn phase(&self) -> SubmissionPhase {
    self.phase_tx.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<SubmissionPhase> {
    self.phase_tx.subscribe()
  }

  /// Wait for the busy lock.
  pub async fn acquire(&self) -> SubmissionPermit {
    let guard = Arc::clone(&self.lock).lock_owned().await;
    self.busy.store(true, Ordering::SeqCst);
    self.phase_tx.send_replace(SubmissionPhase::Idle);
    SubmissionPermit {
      _guard: guard,
      busy: Arc::clone(&self.busy),
    }
  }

  /// Take the busy lock only if it is free.
  pub fn try_acquire(&self) -> Option<SubmissionPermit> {
    let guard = Arc::clone(&self.lock).try_lock_owned().ok()?;
    self.busy.store(true, Ordering::SeqCst);
    self.phase_tx.send_replace(SubmissionPhase::Idle);
    Some(SubmissionPermit {
      _guard: guard,
      busy: Arc::clone(&self.busy),
    })
  }

  /// Fails with `Connectivity` unless the last probe succeeded.
  pub fn ensure_reachable(&self) -> Result<(), PipelineError> {
    let status = self.health.borrow();
    if status.is_reachable() {
      return Ok(());
    }
    let reason = status
      .last_error
      .clone()
      .unwrap_or_else(|| "connection status unknown".to_string());
    Err(PipelineError::Connectivity(reason))
  }

  fn settle(&self, result: Result<SignedSubmission, PipelineError>) -> Result<SignedSubmission, PipelineError> {
    let phase = match &result {
      Ok(submission) => SubmissionPhase::Executed(submission.clone()),
      Err(e) => SubmissionPhase::Failed(e.to_string()),
    };
    self.phase_tx.send_replace(phase);
    result
  }

  /// Send `transaction` and wait for it to settle.
  ///
  /// The permit proves the caller holds the busy lock.
  #[instrument(skip_all)]
  pub async fn submit(
    &self,
    _permit: &SubmissionPermit,
    transaction: &DecodedTransaction,
  ) -> Result<SignedSubmission, PipelineError> {
    if let Err(e) = self.ensure_reachable() {
      return self.settle(Err(e));
    }

    self.phase_tx.send_replace(SubmissionPhase::Submitting);
    let wire = match transaction.serialize() {
      Ok(wire) => wire,
      Err(e) => return self.settle(Err(PipelineError::Submission(e.to_string()))),
    };

    let signature = match self.chain.send_raw_transaction(&wire).await {
      Ok(signature) => {
        if let Some(local) = transaction.first_signature() {
          if local.to_string() != signature {
            warn!(rpc = %signature, local = %local, "RPC returned an unexpected signature");
          }
        }
        signature
      }
      Err(e) if e.is::<SendRejected>() => {
        warn!(error = %e, "Transaction rejected at submission");
        return self.settle(Err(PipelineError::Submission(e.to_string())));
      }
      // The node may have accepted the bytes before the response was lost.
      Err(e) => match transaction.first_signature() {
        Some(local) => {
          warn!(error = %e, signature = %local, "Submission outcome unknown, confirming by signature");
          local.to_string()
        }
        None => {
          warn!(error = %e, "Submission failed");
          return self.settle(Err(PipelineError::Submission(format!("{e:#}"))));
        }
      },
    };

    info!(signature = %signature, "Transaction submitted, awaiting confirmation");
    self.phase_tx.send_replace(SubmissionPhase::Confirming {
      signature: signature.clone(),
    });

    let outcome = match tokio::time::timeout(self.timing.timeout, self.confirm(&signature)).await {
      Ok(outcome) => outcome,
      Err(_) => Err(PipelineError::Confirmation("confirmation timed out".to_string())),
    };
    self.settle(outcome)
  }

  /// Poll `getSignatureStatuses` until the signature settles.
  async fn confirm(&self, signature: &str) -> Result<SignedSubmission, PipelineError> {
    loop {
      match self.chain.signature_status(signature).await {
        Ok(Some(status)) => {
          if let Some(err) = status.err {
            warn!(signature = %signature, error = %err, "Transaction failed on chain");
            return Err(PipelineError::Confirmation(err.to_string()));
          }
          if status.is_confirmed() {
            info!(signature = %signature, slot = status.slot, "Transaction confirmed");
            return Ok(SignedSubmission::new(signature, &self.network));
          }
          debug!(signature = %signature, status = ?status.confirmation_status, "Not yet confirmed");
        }
        Ok(None) => debug!(signature = %signature, "Signature not yet visible"),
        Err(e) => debug!(signature = %signature, error = %e, "Status poll failed"),
      }
      tokio::time::sleep(self.timing.poll_interval).await;
    }
  }
}
