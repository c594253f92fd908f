//! # Event Sync Dispatcher
//!
//! Applies decoded chain events to the mesh ledger.
//!
//! Every event goes through three steps:
//! 1. the built-in sync handler for its kind mutates the mesh ledger,
//! 2. observers subscribed to its kind are notified,
//! 3. a `FromChain` entry is appended to the bridge transaction ledger.
//!
//! A block range is redelivered whenever a poll cycle fails part way, so delivery is
//! at-least-once. Stake handlers overwrite rather than accumulate, and the dispatcher also
//! remembers the `(tx_hash, log_index)` of every event it has fully applied so transfers and
//! deposits are not applied twice. An event whose handler fails is not remembered and is
//! applied again on the next delivery. Once the ingestion cursor has passed a block its events
//! can no longer be redelivered, and [`EventSyncDispatcher::forget_through`] drops them.
//!
//! A transfer out of a node whose local balance is short is trusted to the chain: the
//! shortfall is minted with reason `bridge_sync` first, the same way a stake is backed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use snafu::ResultExt;

use crate::address_registry::SharedRegistry;
use crate::error::{ApplyEventSnafu, Result};
use crate::events::{BridgeEvent, ChainEvent, EventKind};
use crate::mesh_ledger::{
    LedgerError, MeshLedger, SharedLedger, REASON_BRIDGE_DEPOSIT, REASON_BRIDGE_SYNC,
};
use crate::transaction_ledger::{
    short_tx_id, BridgeTransaction, Direction, SharedTransactionLedger, TxStatus,
};

/// Error type observers may return; it is logged and otherwise ignored.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Receives chain events after the built-in sync has applied them.
#[async_trait]
pub trait EventObserver: Send + Sync {
    /// Called once per dispatched event of a subscribed kind.
    async fn on_event(&self, event: &ChainEvent) -> Result<(), ObserverError>;
}

/// Routes chain events to the sync handlers, observers and the transaction ledger.
pub struct EventSyncDispatcher<L: MeshLedger> {
    registry: SharedRegistry,
    ledger: SharedLedger<L>,
    transactions: SharedTransactionLedger,
    observers: HashMap<EventKind, Vec<Arc<dyn EventObserver>>>,
    /// block number → events of that block already applied
    applied: BTreeMap<u64, HashSet<(B256, u64)>>,
}

impl<L: MeshLedger> EventSyncDispatcher<L> {
    /// Creates a dispatcher with no observers.
    pub fn new(
        registry: SharedRegistry,
        ledger: SharedLedger<L>,
        transactions: SharedTransactionLedger,
    ) -> Self {
        Self {
            registry,
            ledger,
            transactions,
            observers: HashMap::new(),
            applied: BTreeMap::new(),
        }
    }

    /// Registers `observer` for events of `kind`. Observers run in subscription order.
    pub fn subscribe(&mut self, kind: EventKind, observer: Arc<dyn EventObserver>) {
        self.observers.entry(kind).or_default().push(observer);
    }

    /// Number of applied events still remembered for replay protection.
    pub fn applied_count(&self) -> usize {
        self.applied.values().map(HashSet::len).sum()
    }

    /// Forgets the applied events of every block up to and including `block`.
    ///
    /// Called once the cursor has moved to `block`, after which those blocks are never
    /// fetched again.
    pub fn forget_through(&mut self, block: u64) {
        self.applied = match block.checked_add(1) {
            Some(next) => self.applied.split_off(&next),
            None => BTreeMap::new(),
        };
    }

    fn is_applied(&self, event: &ChainEvent) -> bool {
        self.applied
            .get(&event.block_number)
            .is_some_and(|keys| keys.contains(&event.key()))
    }

    /// Applies one event.
    ///
    /// Returns an error only when the mesh ledger rejects the built-in sync; observers and the
    /// ledger entry are then skipped and the event is left to be redelivered.
    pub async fn dispatch(&mut self, event: &ChainEvent) -> Result<()> {
        if self.is_applied(event) {
            debug!(
                "Skipping redelivered {} from tx {} (log {})",
                event.kind(),
                event.tx_hash,
                event.log_index
            );
            return Ok(());
        }

        self.apply(event).await.context(ApplyEventSnafu {
            kind: event.kind(),
            tx_hash: event.tx_hash,
        })?;

        if let Some(observers) = self.observers.get(&event.kind()) {
            for observer in observers {
                if let Err(e) = observer.on_event(event).await {
                    warn!("⚠️ {} observer failed: {}", event.kind(), e);
                }
            }
        }

        self.record(event).await;
        self.applied
            .entry(event.block_number)
            .or_default()
            .insert(event.key());
        Ok(())
    }

    /// Runs the built-in sync handler while holding the ledger lock for the whole event.
    async fn apply(&self, event: &ChainEvent) -> Result<(), LedgerError> {
        let registry = self.registry.read().await;
        let mut ledger = self.ledger.lock().await;

        match &event.event {
            BridgeEvent::Staked { user, amount, .. } => {
                let Some(node_id) = registry.resolve_node(user) else {
                    return Ok(());
                };
                let balance = ledger.balance_of(node_id);
                if balance < *amount {
                    ledger.mint(node_id, amount.saturating_sub(balance), REASON_BRIDGE_SYNC)?;
                }
                ledger.stake(node_id, *amount)?;
                info!("Synced stake: {} = {}", node_id, amount);
            }
            BridgeEvent::Unstaked { user, .. } => {
                let Some(node_id) = registry.resolve_node(user) else {
                    return Ok(());
                };
                if ledger.clear_stake(node_id).is_some() {
                    info!("Synced unstake: {}", node_id);
                }
            }
            BridgeEvent::Transfer { from, to, value } => {
                match (registry.resolve_node(from), registry.resolve_node(to)) {
                    (Some(from_node), Some(to_node)) => {
                        let balance = ledger.balance_of(from_node);
                        if balance < *value {
                            warn!(
                                "⚠️ {} holds {} locally but sent {} on chain, syncing",
                                from_node, balance, value
                            );
                            ledger.mint(
                                from_node,
                                value.saturating_sub(balance),
                                REASON_BRIDGE_SYNC,
                            )?;
                        }
                        ledger.transfer(from_node, to_node, *value)?;
                        info!("Synced transfer: {} → {}: {}", from_node, to_node, value);
                    }
                    (None, Some(to_node)) => {
                        ledger.mint(to_node, *value, REASON_BRIDGE_DEPOSIT)?;
                        info!("Bridge deposit: {} received {}", to_node, value);
                    }
                    // outgoing transfers to unmapped addresses are not mirrored locally
                    _ => {}
                }
            }
            BridgeEvent::RelayPaid {
                payer,
                relayer,
                amount,
                ..
            } => {
                if let (Some(payer_node), Some(relayer_node)) =
                    (registry.resolve_node(payer), registry.resolve_node(relayer))
                {
                    debug!(
                        "Relay payment on chain: {} → {}: {}",
                        payer_node, relayer_node, amount
                    );
                }
            }
            BridgeEvent::EpochRewardsDistributed { .. } => {}
        }

        Ok(())
    }

    async fn record(&self, event: &ChainEvent) {
        let kind = event.kind();
        let entry = BridgeTransaction {
            tx_id: short_tx_id(kind.name(), &event.tx_hash),
            direction: Direction::FromChain,
            from_address: address_string(event.event.from_address()),
            to_address: address_string(event.event.to_address()),
            amount: event.event.amount(),
            event_type: kind.name().to_string(),
            timestamp: Utc::now(),
            block_number: Some(event.block_number),
            tx_hash: Some(event.tx_hash),
            status: TxStatus::Confirmed,
        };
        self.transactions.lock().await.append(entry);
    }
}

fn address_string(address: Option<Address>) -> String {
    address
        .map(|address| address.to_checksum(None))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy::primitives::{address, Address};

    use super::*;
    use crate::address_registry::AddressRegistry;
    use crate::amount::TokenAmount;
    use crate::mesh_ledger::InMemoryMeshLedger;
    use crate::test_utils::{chain_event, tokens};
    use crate::transaction_ledger::BridgeTransactionLedger;

    const NODE_A: Address = address!("00000000000000000000000000000000000000aa");
    const NODE_B: Address = address!("00000000000000000000000000000000000000bb");
    const EXCHANGE: Address = address!("00000000000000000000000000000000000000ee");

    struct Fixture {
        dispatcher: EventSyncDispatcher<InMemoryMeshLedger>,
        ledger: SharedLedger<InMemoryMeshLedger>,
        transactions: SharedTransactionLedger,
    }

    fn fixture(mappings: &[(&str, Address)]) -> Fixture {
        let mut registry = AddressRegistry::new();
        for (node_id, address) in mappings {
            registry.register_address(*node_id, *address);
        }
        let ledger = InMemoryMeshLedger::new().shared();
        let transactions = BridgeTransactionLedger::new().shared();
        Fixture {
            dispatcher: EventSyncDispatcher::new(
                registry.shared(),
                ledger.clone(),
                transactions.clone(),
            ),
            ledger,
            transactions,
        }
    }

    fn staked(user: Address, amount: u64) -> BridgeEvent {
        BridgeEvent::Staked {
            user,
            amount: tokens(amount),
            total_staked: tokens(amount),
        }
    }

    fn transfer(from: Address, to: Address, value: u64) -> BridgeEvent {
        BridgeEvent::Transfer {
            from,
            to,
            value: tokens(value),
        }
    }

    #[tokio::test]
    async fn stake_then_unstake_clears_the_stake() {
        let mut f = fixture(&[("n1", NODE_A)]);

        f.dispatcher
            .dispatch(&chain_event(staked(NODE_A, 500), 10, 1, 0))
            .await
            .unwrap();
        assert_eq!(f.ledger.lock().await.staked_of("n1"), Some(tokens(500)));
        assert_eq!(f.ledger.lock().await.balance_of("n1"), tokens(500));

        f.dispatcher
            .dispatch(&chain_event(
                BridgeEvent::Unstaked {
                    user: NODE_A,
                    amount: tokens(500),
                    total_staked: TokenAmount::ZERO,
                },
                11,
                2,
                0,
            ))
            .await
            .unwrap();
        assert_eq!(f.ledger.lock().await.staked_of("n1"), None);
    }

    #[tokio::test]
    async fn repeated_stake_events_overwrite_instead_of_accumulating() {
        let mut f = fixture(&[("n1", NODE_A)]);

        // distinct logs reporting the same total, which bypass the replay guard
        f.dispatcher
            .dispatch(&chain_event(staked(NODE_A, 500), 10, 1, 0))
            .await
            .unwrap();
        f.dispatcher
            .dispatch(&chain_event(staked(NODE_A, 500), 10, 1, 1))
            .await
            .unwrap();

        let ledger = f.ledger.lock().await;
        assert_eq!(ledger.staked_of("n1"), Some(tokens(500)));
        assert_eq!(ledger.balance_of("n1"), tokens(500));
        assert_eq!(ledger.journal().len(), 1);
    }

    #[tokio::test]
    async fn deposit_then_internal_transfer() {
        let mut f = fixture(&[("alice", NODE_A), ("bob", NODE_B)]);

        f.dispatcher
            .dispatch(&chain_event(transfer(Address::ZERO, NODE_A, 10000), 5, 1, 0))
            .await
            .unwrap();
        assert_eq!(f.ledger.lock().await.balance_of("alice"), tokens(10000));

        f.dispatcher
            .dispatch(&chain_event(transfer(NODE_A, NODE_B, 1000), 6, 2, 0))
            .await
            .unwrap();

        let ledger = f.ledger.lock().await;
        assert_eq!(ledger.balance_of("alice"), tokens(9000));
        assert_eq!(ledger.balance_of("bob"), tokens(1000));
        assert_eq!(ledger.total_supply(), tokens(10000));
        assert_eq!(ledger.balance_of("alice").to_string(), "9000.0");
    }

    #[tokio::test]
    async fn deposit_from_exchange_mints_exactly_the_value() {
        let mut f = fixture(&[("bob", NODE_B)]);

        f.dispatcher
            .dispatch(&chain_event(transfer(EXCHANGE, NODE_B, 250), 5, 1, 0))
            .await
            .unwrap();

        let ledger = f.ledger.lock().await;
        assert_eq!(ledger.balance_of("bob"), tokens(250));
        assert_eq!(ledger.journal()[0].reason, REASON_BRIDGE_DEPOSIT);
    }

    #[tokio::test]
    async fn unmapped_events_mutate_nothing_but_are_recorded() {
        let mut f = fixture(&[("alice", NODE_A)]);
        let events = [
            chain_event(staked(EXCHANGE, 10), 5, 1, 0),
            chain_event(transfer(EXCHANGE, NODE_B, 10), 5, 2, 0),
            chain_event(transfer(NODE_A, EXCHANGE, 10), 5, 3, 0),
            chain_event(
                BridgeEvent::RelayPaid {
                    payer: NODE_A,
                    relayer: EXCHANGE,
                    amount: tokens(1),
                    fee_burned: TokenAmount::ZERO,
                },
                5,
                4,
                0,
            ),
        ];

        for event in &events {
            f.dispatcher.dispatch(event).await.unwrap();
        }

        let ledger = f.ledger.lock().await;
        assert!(ledger.journal().is_empty());
        assert_eq!(ledger.total_supply(), TokenAmount::ZERO);
        assert_eq!(ledger.staked_of("alice"), None);

        let recorded = f.transactions.lock().await.recent(10);
        assert_eq!(recorded.len(), 4);
        assert!(recorded
            .iter()
            .all(|entry| entry.direction == Direction::FromChain
                && entry.status == TxStatus::Confirmed));
        assert_eq!(recorded[0].event_type, "RelayPaid");
        assert_eq!(recorded[0].tx_id, "RelayPaid_04040404");
    }

    #[tokio::test]
    async fn redelivered_deposit_is_applied_once() {
        let mut f = fixture(&[("bob", NODE_B)]);
        let deposit = chain_event(transfer(EXCHANGE, NODE_B, 100), 5, 1, 0);

        f.dispatcher.dispatch(&deposit).await.unwrap();
        f.dispatcher.dispatch(&deposit).await.unwrap();

        assert_eq!(f.ledger.lock().await.balance_of("bob"), tokens(100));
        assert_eq!(f.transactions.lock().await.len(), 1);
        assert_eq!(f.dispatcher.applied_count(), 1);
    }

    #[tokio::test]
    async fn overdrawn_transfer_backs_the_sender_with_a_sync_mint() {
        let mut f = fixture(&[("alice", NODE_A), ("bob", NODE_B)]);
        f.ledger
            .lock()
            .await
            .mint("alice", tokens(2), "test")
            .unwrap();

        f.dispatcher
            .dispatch(&chain_event(transfer(NODE_A, NODE_B, 5), 5, 1, 0))
            .await
            .unwrap();

        let ledger = f.ledger.lock().await;
        assert_eq!(ledger.balance_of("alice"), TokenAmount::ZERO);
        assert_eq!(ledger.balance_of("bob"), tokens(5));
        assert_eq!(ledger.journal()[1].reason, REASON_BRIDGE_SYNC);
        assert_eq!(ledger.journal()[1].amount, tokens(3));
        assert_eq!(f.transactions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn forgetting_blocks_only_drops_those_blocks() {
        let mut f = fixture(&[("bob", NODE_B)]);
        for block in [5, 6, 7] {
            f.dispatcher
                .dispatch(&chain_event(transfer(EXCHANGE, NODE_B, 1), block, block as u8, 0))
                .await
                .unwrap();
        }
        assert_eq!(f.dispatcher.applied_count(), 3);

        f.dispatcher.forget_through(6);
        assert_eq!(f.dispatcher.applied_count(), 1);

        // block 7 is still guarded
        f.dispatcher
            .dispatch(&chain_event(transfer(EXCHANGE, NODE_B, 1), 7, 7, 0))
            .await
            .unwrap();
        assert_eq!(f.ledger.lock().await.balance_of("bob"), tokens(3));

        f.dispatcher.forget_through(u64::MAX);
        assert_eq!(f.dispatcher.applied_count(), 0);
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl EventObserver for Counting {
        async fn on_event(&self, _event: &ChainEvent) -> Result<(), ObserverError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventObserver for Failing {
        async fn on_event(&self, _event: &ChainEvent) -> Result<(), ObserverError> {
            Err("observer down".into())
        }
    }

    #[tokio::test]
    async fn failing_observer_does_not_block_others_or_the_sync() {
        let mut f = fixture(&[("bob", NODE_B)]);
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        f.dispatcher.subscribe(EventKind::Transfer, Arc::new(Failing));
        f.dispatcher.subscribe(EventKind::Transfer, counter.clone());
        f.dispatcher.subscribe(EventKind::Staked, counter.clone());

        f.dispatcher
            .dispatch(&chain_event(transfer(EXCHANGE, NODE_B, 1), 5, 1, 0))
            .await
            .unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(f.ledger.lock().await.balance_of("bob"), tokens(1));
        assert_eq!(f.transactions.lock().await.len(), 1);
    }
}
