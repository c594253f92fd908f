//! # Bridge Transaction Ledger
//!
//! An in-memory, append-only audit log of every transaction the bridge observed on chain or
//! submitted to it. Entries are never edited after they are appended.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::amount::TokenAmount;

/// A transaction ledger shared between the ingestion and submission tasks.
pub type SharedTransactionLedger = Arc<Mutex<BridgeTransactionLedger>>;

/// Which way a bridge transaction flowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Submitted by the bridge to the chain.
    ToChain,
    /// Observed on chain and synced into the mesh ledger.
    FromChain,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToChain => f.write_str("to_chain"),
            Direction::FromChain => f.write_str("from_chain"),
        }
    }
}

/// Lifecycle of a bridge transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Submitted, outcome unknown.
    Pending,
    /// Mined successfully or observed on chain.
    Confirmed,
    /// Reverted or abandoned.
    Failed,
}

/// One entry of the [`BridgeTransactionLedger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeTransaction {
    /// Short identifier, `<event type>_<first 8 hex chars of the tx hash>`.
    pub tx_id: String,
    /// Which way the transaction flowed.
    pub direction: Direction,
    /// Originating party, as a checksummed address or a role name.
    pub from_address: String,
    /// Receiving party, empty when the event has none.
    pub to_address: String,
    /// Amount moved, if any.
    pub amount: TokenAmount,
    /// Event or call name.
    pub event_type: String,
    /// When the bridge recorded the entry.
    pub timestamp: DateTime<Utc>,
    /// Block the transaction was mined in.
    pub block_number: Option<u64>,
    /// Full transaction hash.
    pub tx_hash: Option<B256>,
    /// Current status.
    pub status: TxStatus,
}

/// Builds the short `tx_id` used in ledger entries.
pub fn short_tx_id(event_type: &str, tx_hash: &B256) -> String {
    let hex = hex::encode(tx_hash.as_slice());
    format!("{}_{}", event_type, &hex[..8])
}

/// Append-only log of bridge transactions, oldest first.
#[derive(Debug, Default)]
pub struct BridgeTransactionLedger {
    entries: Vec<BridgeTransaction>,
}

impl BridgeTransactionLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the ledger for sharing between tasks.
    pub fn shared(self) -> SharedTransactionLedger {
        Arc::new(Mutex::new(self))
    }

    /// Appends an entry.
    pub fn append(&mut self, entry: BridgeTransaction) {
        self.entries.push(entry);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<BridgeTransaction> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// All entries still pending, oldest first.
    pub fn pending(&self) -> Vec<BridgeTransaction> {
        self.entries
            .iter()
            .filter(|entry| entry.status == TxStatus::Pending)
            .cloned()
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
