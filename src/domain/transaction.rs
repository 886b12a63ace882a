//! Transaction Codec - Dual Wire Format Handling
//!
//! The backend returns unsigned transactions as base64 bincode. Two wire
//! formats exist: versioned (v0) messages, which carry a leading
//! `0x80` version prefix, and legacy messages, which do not. Decoding is
//! attempted in a fixed order, versioned first, then legacy.
//!
//! The decoded transaction is handed to the wallet as-is; this module
//! never alters instructions, only signature slots.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bincode::Options;
use serde::{Deserialize, Serialize};
use solana_sdk::message::VersionedMessage;
use solana_sdk::packet::PACKET_DATA_SIZE;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use thiserror::Error;

/// Prefix for signatures synthesized in backend mock mode.
pub const MOCK_SIGNATURE_PREFIX: &str = "MOCK_";

/// Why a payload could not be turned into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
  #[error("transaction payload is not valid base64: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("transaction payload is empty")]
  Empty,
  #[error("unrecognized transaction format (versioned: {versioned}; legacy: {legacy})")]
  Unrecognized { versioned: String, legacy: String },
}

/// A transaction in either wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedTransaction {
  Versioned(VersionedTransaction),
  Legacy(Transaction),
}

fn wire_options() -> impl Options {
  bincode::DefaultOptions::new()
    .with_limit(PACKET_DATA_SIZE as u64)
    .with_fixint_encoding()
    .reject_trailing_bytes()
}

// Signature slots must line up with the message's required signers or
// the wallet could be asked to sign something it cannot place.
fn check_shape(signatures: usize, required: u8, keys: usize) -> Result<(), String> {
  let required = usize::from(required);
  if required == 0 {
    return Err("message requires no signers".to_string());
  }
  if required > keys {
    return Err(format!("{required} signers required but only {keys} account keys"));
  }
  if signatures != required {
    return Err(format!("{signatures} signature slots for {required} required signers"));
  }
  Ok(())
}

fn decode_versioned(bytes: &[u8]) -> Result<VersionedTransaction, String> {
  let tx: VersionedTransaction = wire_options()
    .deserialize(bytes)
    .map_err(|e| e.to_string())?;
  if matches!(tx.message, VersionedMessage::Legacy(_)) {
    return Err("message has no version prefix".to_string());
  }
  check_shape(
    tx.signatures.len(),
    tx.message.header().num_required_signatures,
    tx.message.static_account_keys().len(),
  )?;
  Ok(tx)
}

fn decode_legacy(bytes: &[u8]) -> Result<Transaction, String> {
  let tx: Transaction = wire_options()
    .deserialize(bytes)
    .map_err(|e| e.to_string())?;
  check_shape(
    tx.signatures.len(),
    tx.message.header.num_required_signatures,
    tx.message.account_keys.len(),
  )?;
  Ok(tx)
}

impl DecodedTransaction {
  /// Decode a base64 wire payload, versioned first, then legacy.
  ///
  /// # Errors
  /// `DecodeError::Unrecognized` carries both parser failures.
  pub fn decode(payload_base64: &str) -> Result<Self, DecodeError> {
    let trimmed = payload_base64.trim();
    if trimmed.is_empty() {
      return Err(DecodeError::Empty);
    }
    let bytes = BASE64.decode(trimmed)?;
    Self::from_wire(&bytes)
  }

  /// Decode raw wire bytes.
  pub fn from_wire(bytes: &[u8]) -> Result<Self, DecodeError> {
    if bytes.is_empty() {
      return Err(DecodeError::Empty);
    }
    let versioned = match decode_versioned(bytes) {
      Ok(tx) => return Ok(Self::Versioned(tx)),
      Err(e) => e,
    };
    match decode_legacy(bytes) {
      Ok(tx) => Ok(Self::Legacy(tx)),
      Err(legacy) => Err(DecodeError::Unrecognized { versioned, legacy }),
    }
  }

  pub const fn is_versioned(&self) -> bool {
    matches!(self, Self::Versioned(_))
  }

  /// Bytes the wallet signs over.
  pub fn message_bytes(&self) -> Vec<u8> {
    match self {
      Self::Versioned(tx) => tx.message.serialize(),
      Self::Legacy(tx) => tx.message_data(),
    }
  }

  /// Keys that must sign, in signature slot order.
  pub fn signer_keys(&self) -> &[Pubkey] {
    let (keys, required) = match self {
      Self::Versioned(tx) => (
        tx.message.static_account_keys(),
        tx.message.header().num_required_signatures,
      ),
      Self::Legacy(tx) => (
        tx.message.account_keys.as_slice(),
        tx.message.header.num_required_signatures,
      ),
    };
    &keys[..usize::from(required).min(keys.len())]
  }

  /// Fee payer, always the first signer.
  pub fn fee_payer(&self) -> Option<Pubkey> {
    self.signer_keys().first().copied()
  }

  pub fn requires_signer(&self, key: &Pubkey) -> bool {
    self.signer_keys().contains(key)
  }

  fn signatures(&self) -> &[Signature] {
    match self {
      Self::Versioned(tx) => &tx.signatures,
      Self::Legacy(tx) => &tx.signatures,
    }
  }

  fn signatures_mut(&mut self) -> &mut Vec<Signature> {
    match self {
      Self::Versioned(tx) => &mut tx.signatures,
      Self::Legacy(tx) => &mut tx.signatures,
    }
  }

  /// Place `signature` in `key`'s slot. Returns `false` if `key` is not
  /// a required signer.
  pub fn apply_signature(&mut self, key: &Pubkey, signature: Signature) -> bool {
    let Some(slot) = self.signer_keys().iter().position(|k| k == key) else {
      return false;
    };
    match self.signatures_mut().get_mut(slot) {
      Some(existing) => {
        *existing = signature;
        true
      }
      None => false,
    }
  }

  /// Whether `key`'s slot holds a valid signature over the message.
  pub fn is_signed_by(&self, key: &Pubkey) -> bool {
    let Some(slot) = self.signer_keys().iter().position(|k| k == key) else {
      return false;
    };
    let message = self.message_bytes();
    self
      .signatures()
      .get(slot)
      .is_some_and(|sig| *sig != Signature::default() && sig.verify(key.as_ref(), &message))
  }

  /// Every required slot carries a valid signature.
  pub fn is_fully_signed(&self) -> bool {
    self.signer_keys().iter().all(|key| self.is_signed_by(key))
  }

  /// The transaction id once signed by the fee payer.
  pub fn first_signature(&self) -> Option<Signature> {
    self
      .signatures()
      .first()
      .copied()
      .filter(|sig| *sig != Signature::default())
  }

  /// Wire bytes for `sendTransaction`.
  pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
    match self {
      Self::Versioned(tx) => bincode::serialize(tx),
      Self::Legacy(tx) => bincode::serialize(tx),
    }
  }

  pub fn to_base64(&self) -> Result<String, bincode::Error> {
    self.serialize().map(|bytes| BASE64.encode(bytes))
  }
}

/// Metadata the builder returns alongside the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
  pub transaction_type: String,
  pub message: String,
  #[serde(default)]
  pub details: serde_json::Value,
  #[serde(default)]
  pub simulation: Option<serde_json::Value>,
  #[serde(default)]
  pub signer: Option<String>,
}

/// A backend-built transaction awaiting signature.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTransaction {
  /// Base64 wire payload. Empty in mock mode.
  pub payload_base64: String,
  pub requires_signature: bool,
  /// The backend simulated the order instead of building a real one.
  pub mock_mode: bool,
  pub meta: TransactionMeta,
}

/// A transaction accepted and confirmed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedSubmission {
  pub signature: String,
  pub explorer_url: String,
}

impl SignedSubmission {
  pub fn new(signature: impl Into<String>, network: &str) -> Self {
    let signature = signature.into();
    let explorer_url = explorer_url(&signature, network);
    Self {
      signature,
      explorer_url,
    }
  }
}

/// Solana Explorer link for a signature. Mainnet links carry no cluster.
pub fn explorer_url(signature: &str, network: &str) -> String {
  match network {
    "mainnet" | "mainnet-beta" | "" => format!("https://explorer.solana.com/tx/{signature}"),
    cluster => format!("https://explorer.solana.com/tx/{signature}?cluster={cluster}"),
  }
}

/// Deterministic signature for a mock-mode order record.
pub fn mock_signature(record_id: impl std::fmt::Display) -> String {
  format!("{MOCK_SIGNATURE_PREFIX}{record_id}")
}
