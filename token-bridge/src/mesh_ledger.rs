//! # Mesh Ledger
//!
//! The off-chain token store the bridge keeps in line with the contract. The bridge only
//! needs the narrow [`MeshLedger`] contract; [`InMemoryMeshLedger`] is the process-local
//! implementation used by the service binary and the tests.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use snafu::Snafu;
use tokio::sync::Mutex;

use crate::amount::TokenAmount;

/// Reason recorded when a `Staked` event needs more local balance than the node holds.
pub const REASON_BRIDGE_SYNC: &str = "bridge_sync";

/// Reason recorded when tokens arrive from an address with no mesh node.
pub const REASON_BRIDGE_DEPOSIT: &str = "bridge_deposit";

/// Reason recorded when a balance is reconciled against the chain.
pub const REASON_CHAIN_SYNC: &str = "chain_sync";

/// A ledger shared between the ingestion and submission tasks.
///
/// Whoever holds the lock applies one complete event or reconciliation before releasing it.
pub type SharedLedger<L> = Arc<Mutex<L>>;

/// Errors raised by a mesh ledger mutation.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    /// The node does not hold enough balance for the requested operation.
    #[snafu(display("{node_id} holds {available} but {requested} was requested"))]
    InsufficientBalance {
        /// The node being debited.
        node_id: String,
        /// Balance the node holds.
        available: TokenAmount,
        /// Amount the operation needed.
        requested: TokenAmount,
    },

    /// Crediting the node would overflow its balance.
    #[snafu(display("Balance overflow crediting {node_id}"))]
    BalanceOverflow {
        /// The node being credited.
        node_id: String,
    },
}

/// The operations the bridge performs on the mesh ledger.
pub trait MeshLedger: Send + 'static {
    /// Current liquid balance of `node_id` (zero for unknown nodes).
    fn balance_of(&self, node_id: &str) -> TokenAmount;

    /// Credits newly created tokens to `node_id`.
    fn mint(&mut self, node_id: &str, amount: TokenAmount, reason: &str) -> Result<(), LedgerError>;

    /// Destroys tokens held by `node_id`.
    fn burn(&mut self, node_id: &str, amount: TokenAmount, reason: &str) -> Result<(), LedgerError>;

    /// Records `amount` as the node's total stake, replacing any previous value.
    fn stake(&mut self, node_id: &str, amount: TokenAmount) -> Result<(), LedgerError>;

    /// Current stake entry for `node_id`, if any.
    fn staked_of(&self, node_id: &str) -> Option<TokenAmount>;

    /// Removes the node's stake entry and returns what it held.
    fn clear_stake(&mut self, node_id: &str) -> Option<TokenAmount>;

    /// Moves `amount` from one node to another.
    fn transfer(&mut self, from: &str, to: &str, amount: TokenAmount) -> Result<(), LedgerError>;
}

/// One mint or burn applied to an [`InMemoryMeshLedger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupplyChange {
    /// The node affected.
    pub node_id: String,
    /// Amount minted (positive) or burned.
    pub amount: TokenAmount,
    /// `true` for a mint, `false` for a burn.
    pub minted: bool,
    /// Reason string supplied by the caller.
    pub reason: String,
}

/// A process-local mesh ledger.
#[derive(Debug, Default)]
pub struct InMemoryMeshLedger {
    balances: HashMap<String, TokenAmount>,
    stakes: HashMap<String, TokenAmount>,
    journal: Vec<SupplyChange>,
}

impl InMemoryMeshLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the ledger for sharing between tasks.
    pub fn shared(self) -> SharedLedger<Self> {
        Arc::new(Mutex::new(self))
    }

    /// All mints and burns applied so far, oldest first.
    pub fn journal(&self) -> &[SupplyChange] {
        &self.journal
    }

    /// Sum of all liquid balances.
    pub fn total_supply(&self) -> TokenAmount {
        self.balances.values().sum()
    }

    fn credit(&mut self, node_id: &str, amount: TokenAmount) -> Result<(), LedgerError> {
        let balance = self.balance_of(node_id);
        let updated = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow {
                node_id: node_id.to_string(),
            })?;
        self.balances.insert(node_id.to_string(), updated);
        Ok(())
    }

    fn debit(&mut self, node_id: &str, amount: TokenAmount) -> Result<(), LedgerError> {
        let balance = self.balance_of(node_id);
        let updated =
            balance
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::InsufficientBalance {
                    node_id: node_id.to_string(),
                    available: balance,
                    requested: amount,
                })?;
        self.balances.insert(node_id.to_string(), updated);
        Ok(())
    }
}

impl MeshLedger for InMemoryMeshLedger {
    fn balance_of(&self, node_id: &str) -> TokenAmount {
        self.balances.get(node_id).copied().unwrap_or_default()
    }

    fn mint(&mut self, node_id: &str, amount: TokenAmount, reason: &str) -> Result<(), LedgerError> {
        self.credit(node_id, amount)?;
        self.journal.push(SupplyChange {
            node_id: node_id.to_string(),
            amount,
            minted: true,
            reason: reason.to_string(),
        });
        debug!("Minted {} to {} ({})", amount, node_id, reason);
        Ok(())
    }

    fn burn(&mut self, node_id: &str, amount: TokenAmount, reason: &str) -> Result<(), LedgerError> {
        self.debit(node_id, amount)?;
        self.journal.push(SupplyChange {
            node_id: node_id.to_string(),
            amount,
            minted: false,
            reason: reason.to_string(),
        });
        debug!("Burned {} from {} ({})", amount, node_id, reason);
        Ok(())
    }

    fn stake(&mut self, node_id: &str, amount: TokenAmount) -> Result<(), LedgerError> {
        let available = self.balance_of(node_id);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                node_id: node_id.to_string(),
                available,
                requested: amount,
            });
        }
        self.stakes.insert(node_id.to_string(), amount);
        Ok(())
    }

    fn staked_of(&self, node_id: &str) -> Option<TokenAmount> {
        self.stakes.get(node_id).copied()
    }

    fn clear_stake(&mut self, node_id: &str) -> Option<TokenAmount> {
        self.stakes.remove(node_id)
    }

    fn transfer(&mut self, from: &str, to: &str, amount: TokenAmount) -> Result<(), LedgerError> {
        if from == to {
            let available = self.balance_of(from);
            if available < amount {
                return InsufficientBalanceSnafu {
                    node_id: from,
                    available,
                    requested: amount,
                }
                .fail();
            }
            return Ok(());
        }

        // check the credit side first so a rejected transfer leaves both sides untouched
        self.balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow {
                node_id: to.to_string(),
            })?;
        self.debit(from, amount)?;
        self.credit(to, amount)
    }
}
