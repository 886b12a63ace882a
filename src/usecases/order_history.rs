//! Order History Ledger - Bounded In-memory Record of Attempts
//!
//! Newest first, capped at `HISTORY_CAPACITY`. Each record moves from
//! Pending to a terminal status exactly once. Settled records are also
//! broadcast for observers.

use std::collections::VecDeque;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::domain::order::{OrderRecord, RecordOutcome};

/// Maximum number of records kept.
pub const HISTORY_CAPACITY: usize = 20;

pub struct OrderHistory {
  records: RwLock<VecDeque<OrderRecord>>,
  capacity: usize,
  settled_tx: broadcast::Sender<OrderRecord>,
}

impl OrderHistory {
  pub fn new() -> Self {
    Self::with_capacity(HISTORY_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    let (settled_tx, _) = broadcast::channel(64);
    Self {
      records: RwLock::new(VecDeque::with_capacity(capacity)),
      capacity: capacity.max(1),
      settled_tx,
    }
  }

  /// Prepend `record`, evicting the oldest beyond capacity.
  pub async fn push(&self, record: OrderRecord) {
    let mut records = self.records.write().await;
    records.push_front(record);
    records.truncate(self.capacity);
  }

  /// Settle record `id`. Returns `false` if it is unknown, evicted, or
  /// already terminal.
  pub async fn update(&self, id: Uuid, outcome: RecordOutcome) -> bool {
    let settled = {
      let mut records = self.records.write().await;
      let Some(record) = records.iter_mut().find(|r| r.id == id) else {
        return false;
      };
      if !record.settle(outcome) {
        return false;
      }
      record.clone()
    };
    let _ = self.settled_tx.send(settled);
    true
  }

  pub async fn get(&self, id: Uuid) -> Option<OrderRecord> {
    self.records.read().await.iter().find(|r| r.id == id).cloned()
  }

  /// Cloned records, newest first.
  pub async fn snapshot(&self) -> Vec<OrderRecord> {
    self.records.read().await.iter().cloned().collect()
  }

  pub async fn len(&self) -> usize {
    self.records.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.records.read().await.is_empty()
  }

  pub fn subscribe_settled(&self) -> broadcast::Receiver<OrderRecord> {
    self.settled_tx.subscribe()
  }
}

impl Default for OrderHistory {
  fn default() -> Self {
    Self::new()
  }
}
