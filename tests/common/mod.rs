//! Shared fixtures for the integration tests: mockall port mocks, hand
//! fakes for timing-sensitive ports, and unsigned wire transactions.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mockall::mock;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::{Message, VersionedMessage, v0};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use tokio::sync::watch;

use drift_signer::domain::connection::ConnectionStatus;
use drift_signer::domain::pending::{ApprovalNotice, PendingTrade, PendingTradeId};
use drift_signer::domain::transaction::DecodedTransaction;
use drift_signer::domain::wallet::{WalletError, WalletErrorKind};
use drift_signer::ports::backend::{
  AccountCheck, BuildOrderRequest, BuildResponse, Position, TradingBackend,
};
use drift_signer::ports::chain::{ChainRpc, NodeVersion, SignatureInfo, SignatureStatus};
use drift_signer::ports::wallet::WalletProvider;

// ---- Mock Definitions ----

mock! {
  pub Backend {}

  #[async_trait]
  impl TradingBackend for Backend {
    async fn build_order(&self, request: &BuildOrderRequest) -> anyhow::Result<BuildResponse>;
    async fn build_close_position(&self, user_pubkey: &str, market: &str)
      -> anyhow::Result<BuildResponse>;
    async fn build_initialize(&self, user_pubkey: &str) -> anyhow::Result<BuildResponse>;
    async fn check_account(&self, user_pubkey: &str) -> anyhow::Result<AccountCheck>;
    async fn positions(&self, user_pubkey: &str) -> anyhow::Result<Vec<Position>>;
    async fn pending_trades(&self, wallet_address: &str) -> anyhow::Result<Vec<PendingTrade>>;
    async fn pending_trade_count(&self, wallet_address: &str) -> anyhow::Result<u64>;
    async fn approve_pending_trade(
      &self,
      id: PendingTradeId,
      notice: &ApprovalNotice,
    ) -> anyhow::Result<()>;
    async fn reject_pending_trade(&self, id: PendingTradeId) -> anyhow::Result<()>;
  }
}

mock! {
  pub Chain {}

  #[async_trait]
  impl ChainRpc for Chain {
    async fn version(&self) -> anyhow::Result<NodeVersion>;
    async fn balance(&self, address: &str) -> anyhow::Result<u64>;
    async fn signatures_for_address(
      &self,
      address: &str,
      limit: usize,
    ) -> anyhow::Result<Vec<SignatureInfo>>;
    async fn transaction(&self, signature: &str) -> anyhow::Result<Option<serde_json::Value>>;
    async fn send_raw_transaction(&self, wire: &[u8]) -> anyhow::Result<String>;
    async fn signature_status(&self, signature: &str) -> anyhow::Result<Option<SignatureStatus>>;
    async fn request_airdrop(&self, address: &str, lamports: u64) -> anyhow::Result<String>;
  }
}

mock! {
  pub Wallet {}

  #[async_trait]
  impl WalletProvider for Wallet {
    fn name(&self) -> String;
    async fn connect(&self) -> Result<Pubkey, WalletError>;
    async fn disconnect(&self) -> Result<(), WalletError>;
    async fn sign_transaction(
      &self,
      transaction: DecodedTransaction,
    ) -> Result<DecodedTransaction, WalletError>;
  }
}

// ---- Wire fixtures ----

fn order_instruction(payer: &Pubkey) -> Instruction {
  Instruction::new_with_bytes(
    Pubkey::new_unique(),
    &[0x17, 0x01],
    vec![
      AccountMeta::new(*payer, true),
      AccountMeta::new(Pubkey::new_unique(), false),
    ],
  )
}

/// Unsigned legacy transaction paid by `payer`, base64.
pub fn unsigned_legacy(payer: &Pubkey) -> String {
  let message = Message::new_with_blockhash(&[order_instruction(payer)], Some(payer), &Hash::new_unique());
  let tx = Transaction::new_unsigned(message);
  STANDARD.encode(bincode::serialize(&tx).unwrap())
}

/// Unsigned v0 transaction paid by `payer`, base64.
pub fn unsigned_v0(payer: &Pubkey) -> String {
  let message = v0::Message::try_compile(payer, &[order_instruction(payer)], &[], Hash::new_unique()).unwrap();
  let message = VersionedMessage::V0(message);
  let slots = usize::from(message.header().num_required_signatures);
  let tx = VersionedTransaction {
    signatures: vec![solana_sdk::signature::Signature::default(); slots],
    message,
  };
  STANDARD.encode(bincode::serialize(&tx).unwrap())
}

pub fn built(payload: String) -> BuildResponse {
  BuildResponse {
    success: true,
    transaction: Some(payload),
    transaction_type: Some("place_perp_order".to_string()),
    message: Some("order built".to_string()),
    requires_signature: true,
    ..BuildResponse::default()
  }
}

pub fn mock_built() -> BuildResponse {
  BuildResponse {
    success: true,
    transaction: None,
    message: Some("Mock transaction (Drift SDK not available)".to_string()),
    requires_signature: true,
    mock_mode: true,
    ..BuildResponse::default()
  }
}

pub fn confirmed(slot: u64) -> SignatureStatus {
  SignatureStatus {
    slot,
    confirmations: None,
    confirmation_status: Some("confirmed".to_string()),
    err: None,
  }
}

pub fn pending_trade(id: PendingTradeId, wallet: &Pubkey) -> PendingTrade {
  serde_json::from_value(serde_json::json!({
    "id": id,
    "rule_id": 3,
    "wallet_address": wallet.to_string(),
    "market": "SOL-PERP",
    "side": "buy",
    "size": 0.5,
    "price_at_trigger": 142.5,
    "title": "SOL dip",
    "message": "SOL dropped below 145",
    "status": "pending",
    "created_at": "2026-10-16T10:00:00",
    "expires_at": null,
  }))
  .unwrap()
}

// ---- Health ----

pub fn reachable() -> watch::Receiver<ConnectionStatus> {
  // A receiver keeps the last value after the sender is gone.
  watch::channel(ConnectionStatus::unknown().succeeded(12, Some("2.0.14".to_string()))).1
}

pub fn health_channel(status: ConnectionStatus) -> (watch::Sender<ConnectionStatus>, watch::Receiver<ConnectionStatus>) {
  watch::channel(status)
}

// ---- Hand fakes ----

/// Event log shared between fakes to assert ordering.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
  Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
  log.lock().unwrap().clone()
}

/// Keypair wallet whose signing takes `delay` and logs start/end.
pub struct SlowWallet {
  pub keypair: Keypair,
  pub delay: Duration,
  pub log: EventLog,
}

impl SlowWallet {
  pub fn new(delay: Duration, log: EventLog) -> Self {
    Self {
      keypair: Keypair::new(),
      delay,
      log,
    }
  }

  pub fn pubkey(&self) -> Pubkey {
    self.keypair.pubkey()
  }
}

#[async_trait]
impl WalletProvider for SlowWallet {
  fn name(&self) -> String {
    "Slow".to_string()
  }

  async fn connect(&self) -> Result<Pubkey, WalletError> {
    Ok(self.keypair.pubkey())
  }

  async fn disconnect(&self) -> Result<(), WalletError> {
    Ok(())
  }

  async fn sign_transaction(
    &self,
    mut transaction: DecodedTransaction,
  ) -> Result<DecodedTransaction, WalletError> {
    self.log.lock().unwrap().push("sign:start".to_string());
    tokio::time::sleep(self.delay).await;
    let signature = self.keypair.sign_message(&transaction.message_bytes());
    if !transaction.apply_signature(&self.keypair.pubkey(), signature) {
      return Err(WalletError::new(WalletErrorKind::SignError, "not a signer"));
    }
    self.log.lock().unwrap().push("sign:end".to_string());
    Ok(transaction)
  }
}

/// Chain fake: sending takes `delay`, every signature confirms at once.
pub struct SlowChain {
  pub delay: Duration,
  pub log: EventLog,
}

#[async_trait]
impl ChainRpc for SlowChain {
  async fn version(&self) -> anyhow::Result<NodeVersion> {
    Ok(NodeVersion {
      solana_core: "2.0.14".to_string(),
      feature_set: None,
    })
  }

  async fn balance(&self, _address: &str) -> anyhow::Result<u64> {
    Ok(0)
  }

  async fn signatures_for_address(&self, _address: &str, _limit: usize) -> anyhow::Result<Vec<SignatureInfo>> {
    Ok(Vec::new())
  }

  async fn transaction(&self, _signature: &str) -> anyhow::Result<Option<serde_json::Value>> {
    Ok(None)
  }

  async fn send_raw_transaction(&self, wire: &[u8]) -> anyhow::Result<String> {
    self.log.lock().unwrap().push("send:start".to_string());
    tokio::time::sleep(self.delay).await;
    let tx = DecodedTransaction::from_wire(wire)?;
    self.log.lock().unwrap().push("send:end".to_string());
    Ok(tx.first_signature().unwrap_or_default().to_string())
  }

  async fn signature_status(&self, _signature: &str) -> anyhow::Result<Option<SignatureStatus>> {
    Ok(Some(confirmed(1)))
  }

  async fn request_airdrop(&self, _address: &str, _lamports: u64) -> anyhow::Result<String> {
    anyhow::bail!("not supported")
  }
}

/// Backend that forwards to a `MockBackend` but holds every
/// `reject_pending_trade` call open for `delay`.
pub struct SlowRejectBackend {
  pub inner: MockBackend,
  pub delay: Duration,
}

#[async_trait]
impl TradingBackend for SlowRejectBackend {
  async fn build_order(&self, request: &BuildOrderRequest) -> anyhow::Result<BuildResponse> {
    self.inner.build_order(request).await
  }

  async fn build_close_position(&self, user_pubkey: &str, market: &str) -> anyhow::Result<BuildResponse> {
    self.inner.build_close_position(user_pubkey, market).await
  }

  async fn build_initialize(&self, user_pubkey: &str) -> anyhow::Result<BuildResponse> {
    self.inner.build_initialize(user_pubkey).await
  }

  async fn check_account(&self, user_pubkey: &str) -> anyhow::Result<AccountCheck> {
    self.inner.check_account(user_pubkey).await
  }

  async fn positions(&self, user_pubkey: &str) -> anyhow::Result<Vec<Position>> {
    self.inner.positions(user_pubkey).await
  }

  async fn pending_trades(&self, wallet_address: &str) -> anyhow::Result<Vec<PendingTrade>> {
    self.inner.pending_trades(wallet_address).await
  }

  async fn pending_trade_count(&self, wallet_address: &str) -> anyhow::Result<u64> {
    self.inner.pending_trade_count(wallet_address).await
  }

  async fn approve_pending_trade(
    &self,
    id: PendingTradeId,
    notice: &ApprovalNotice,
  ) -> anyhow::Result<()> {
    self.inner.approve_pending_trade(id, notice).await
  }

  async fn reject_pending_trade(&self, id: PendingTradeId) -> anyhow::Result<()> {
    tokio::time::sleep(self.delay).await;
    self.inner.reject_pending_trade(id).await
  }
}
