//! # Token Bridge
//!
//! [`TokenBridge`] owns one address registry and one transaction ledger, shares the mesh ledger
//! with the rest of the process, and hands out the components that work on them: the ingestion
//! loop, the outbound submitter and the epoch reward scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use log::info;

use crate::address_registry::{parse_address, AddressRegistry, SharedRegistry};
use crate::chain_client::ChainClient;
use crate::dispatcher::EventSyncDispatcher;
use crate::error::Result;
use crate::ingestion::ChainEventIngestionLoop;
use crate::mesh_ledger::{MeshLedger, SharedLedger};
use crate::scheduler::EpochRewardScheduler;
use crate::submitter::{OutboundTransactionSubmitter, SubmitterSettings};
use crate::transaction_ledger::{
    BridgeTransaction, BridgeTransactionLedger, SharedTransactionLedger,
};
use crate::uptime::UptimeProvider;

/// The bridge between the mesh ledger and the token contract.
pub struct TokenBridge<C: ChainClient, L: MeshLedger> {
    client: Arc<C>,
    registry: SharedRegistry,
    ledger: SharedLedger<L>,
    transactions: SharedTransactionLedger,
    settings: SubmitterSettings,
}

impl<C: ChainClient, L: MeshLedger> TokenBridge<C, L> {
    /// Creates a bridge with an empty registry and transaction ledger.
    pub fn new(client: Arc<C>, ledger: SharedLedger<L>, settings: SubmitterSettings) -> Self {
        Self {
            client,
            registry: AddressRegistry::new().shared(),
            ledger,
            transactions: BridgeTransactionLedger::new().shared(),
            settings,
        }
    }

    /// Maps `node_id` to a chain address.
    pub async fn register_node(&self, node_id: &str, address: &str) -> Result<Address> {
        self.registry.write().await.register(node_id, address)
    }

    /// Registers every entry of a node id → address map. If any address is invalid nothing is
    /// registered.
    pub async fn register_all(&self, mappings: &HashMap<String, String>) -> Result<usize> {
        let parsed = mappings
            .iter()
            .map(|(node_id, address)| {
                parse_address(address).map(|parsed| (node_id.as_str(), parsed))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut registry = self.registry.write().await;
        for (node_id, address) in parsed {
            registry.register_address(node_id, address);
        }
        info!("Loaded {} address mappings", mappings.len());
        Ok(mappings.len())
    }

    /// The address registered for `node_id`.
    pub async fn resolve_address(&self, node_id: &str) -> Option<Address> {
        self.registry.read().await.resolve_address(node_id)
    }

    /// The node registered for `address`.
    pub async fn resolve_node(&self, address: &Address) -> Option<String> {
        self.registry
            .read()
            .await
            .resolve_node(address)
            .map(str::to_string)
    }

    /// The shared mesh ledger.
    pub fn ledger(&self) -> &SharedLedger<L> {
        &self.ledger
    }

    /// A dispatcher over this bridge's state, with no observers yet.
    pub fn dispatcher(&self) -> EventSyncDispatcher<L> {
        EventSyncDispatcher::new(
            self.registry.clone(),
            self.ledger.clone(),
            self.transactions.clone(),
        )
    }

    /// An ingestion loop driving a fresh dispatcher.
    pub fn ingestion_loop(&self, poll_interval: Duration) -> ChainEventIngestionLoop<C, L> {
        ChainEventIngestionLoop::new(self.client.clone(), self.dispatcher(), poll_interval)
    }

    /// A submitter over this bridge's state.
    pub fn submitter(&self) -> OutboundTransactionSubmitter<C, L> {
        OutboundTransactionSubmitter::new(
            self.client.clone(),
            self.registry.clone(),
            self.ledger.clone(),
            self.transactions.clone(),
            self.settings,
        )
    }

    /// A reward scheduler pushing through this bridge's submitter.
    pub fn scheduler<U: UptimeProvider>(
        &self,
        uptime: U,
        interval: Duration,
    ) -> EpochRewardScheduler<OutboundTransactionSubmitter<C, L>, U> {
        EpochRewardScheduler::new(Arc::new(self.submitter()), uptime, interval)
    }

    /// Up to `limit` bridge transactions, newest first.
    pub async fn recent_transactions(&self, limit: usize) -> Vec<BridgeTransaction> {
        self.transactions.lock().await.recent(limit)
    }

    /// Bridge transactions still pending.
    pub async fn pending_transactions(&self) -> Vec<BridgeTransaction> {
        self.transactions.lock().await.pending()
    }
}
