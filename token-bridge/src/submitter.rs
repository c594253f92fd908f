//! # Outbound Transaction Submitter
//!
//! Pushes local state to the chain: epoch reward distribution and relayer authorisation, plus
//! one-way balance reconciliation that treats the chain as ground truth.
//!
//! The public operations return `Option`: `None` means nothing was done, either because a
//! precondition did not hold or because the chain call failed. Failures are logged here and
//! never leave a partial ledger entry behind. Nothing is retried within a call.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use snafu::ResultExt;

use crate::address_registry::SharedRegistry;
use crate::amount::TokenAmount;
use crate::chain_client::{ChainClient, ContractCall, TxOptions, TxReceipt};
use crate::error::{ChainSnafu, LedgerSnafu, Result, TransactionRevertedSnafu};
use crate::events::EventKind;
use crate::mesh_ledger::{MeshLedger, SharedLedger, REASON_CHAIN_SYNC};
use crate::scheduler::RewardPusher;
use crate::transaction_ledger::{
    short_tx_id, BridgeTransaction, Direction, SharedTransactionLedger, TxStatus,
};

/// Gas limit for `setRelayerAuthorized`.
pub const RELAYER_GAS_LIMIT: u64 = 100_000;

/// How long to wait for a reward distribution receipt.
pub const REWARD_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long to wait for a relayer authorisation receipt.
pub const RELAYER_RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Event type recorded for relayer authorisation.
pub const RELAYER_AUTHORIZED: &str = "RelayerAuthorized";

/// Uptime assumed for a recipient the uptime map says nothing about.
const DEFAULT_UPTIME_PERCENT: u8 = 100;

/// Gas settings for outbound transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitterSettings {
    /// Gas limit for reward distribution.
    pub gas_limit: u64,
    /// Gas price in wei for every submission.
    pub gas_price: u128,
}

impl Default for SubmitterSettings {
    fn default() -> Self {
        Self {
            gas_limit: 200_000,
            gas_price: 50_000_000_000,
        }
    }
}

/// A snapshot of the contract's reward state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainStats {
    /// Total tokens staked in the contract.
    pub total_staked: TokenAmount,
    /// Current reward epoch.
    pub current_epoch: U256,
    /// Whether the current epoch's rewards can be distributed.
    pub can_distribute: bool,
    /// Chain the contract lives on.
    pub chain_id: u64,
    /// The contract address.
    pub contract: Address,
}

/// Builds, submits and records bridge-initiated transactions.
pub struct OutboundTransactionSubmitter<C: ChainClient, L: MeshLedger> {
    client: Arc<C>,
    registry: SharedRegistry,
    ledger: SharedLedger<L>,
    transactions: SharedTransactionLedger,
    settings: SubmitterSettings,
}

impl<C: ChainClient, L: MeshLedger> OutboundTransactionSubmitter<C, L> {
    /// Creates a submitter over the bridge's shared state.
    pub fn new(
        client: Arc<C>,
        registry: SharedRegistry,
        ledger: SharedLedger<L>,
        transactions: SharedTransactionLedger,
        settings: SubmitterSettings,
    ) -> Self {
        Self {
            client,
            registry,
            ledger,
            transactions,
            settings,
        }
    }

    /// Distributes the current epoch's rewards.
    ///
    /// Recipients are every node named in `rewards` or `uptimes` that has a registered
    /// address, ordered by node id. Each gets its uptime percentage, or 100 if `uptimes` has
    /// none for it. Returns the transaction hash once the distribution is mined successfully.
    pub async fn push_rewards(
        &self,
        rewards: &HashMap<String, TokenAmount>,
        uptimes: &HashMap<String, u8>,
    ) -> Option<B256> {
        match self.try_push_rewards(rewards, uptimes).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                error!("❌ Reward distribution failed: {}", e);
                None
            }
        }
    }

    async fn try_push_rewards(
        &self,
        rewards: &HashMap<String, TokenAmount>,
        uptimes: &HashMap<String, u8>,
    ) -> Result<Option<B256>> {
        if self.client.signer_address().is_none() {
            warn!("⚠️ No signing account configured, not distributing rewards");
            return Ok(None);
        }

        if !self
            .client
            .can_distribute_rewards()
            .await
            .context(ChainSnafu)?
        {
            info!("Epoch not ready for distribution");
            return Ok(None);
        }

        let node_ids: BTreeSet<&String> = rewards.keys().chain(uptimes.keys()).collect();
        let (recipients, recipient_uptimes): (Vec<Address>, Vec<u8>) = {
            let registry = self.registry.read().await;
            node_ids
                .into_iter()
                .filter_map(|node_id| {
                    let address = registry.resolve_address(node_id)?;
                    let uptime = uptimes
                        .get(node_id)
                        .copied()
                        .unwrap_or(DEFAULT_UPTIME_PERCENT)
                        .min(100);
                    Some((address, uptime))
                })
                .unzip()
        };

        if recipients.is_empty() {
            warn!("⚠️ No valid recipients for reward distribution");
            return Ok(None);
        }

        let count = recipients.len();
        let receipt = self
            .submit(
                ContractCall::DistributeEpochRewards {
                    recipients,
                    uptimes: recipient_uptimes,
                },
                self.settings.gas_limit,
                REWARD_RECEIPT_TIMEOUT,
            )
            .await?;

        let total: TokenAmount = rewards.values().sum();
        self.record(
            EventKind::EpochRewardsDistributed.name(),
            "contract".to_string(),
            total,
            &receipt,
        )
        .await;

        info!(
            "✅ Rewards distributed to {} recipients: {}",
            count, receipt.tx_hash
        );
        Ok(Some(receipt.tx_hash))
    }

    /// Sets the on-chain relayer flag for `node_id`'s address.
    pub async fn authorize_relayer(&self, node_id: &str, authorized: bool) -> Option<B256> {
        match self.try_authorize_relayer(node_id, authorized).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                error!("❌ Relayer authorization for {} failed: {}", node_id, e);
                None
            }
        }
    }

    async fn try_authorize_relayer(&self, node_id: &str, authorized: bool) -> Result<Option<B256>> {
        if self.client.signer_address().is_none() {
            warn!("⚠️ No signing account configured, not authorizing relayer");
            return Ok(None);
        }

        let Some(relayer) = self.registry.read().await.resolve_address(node_id) else {
            warn!("⚠️ No address registered for {}", node_id);
            return Ok(None);
        };

        let receipt = self
            .submit(
                ContractCall::SetRelayerAuthorized {
                    relayer,
                    authorized,
                },
                RELAYER_GAS_LIMIT,
                RELAYER_RECEIPT_TIMEOUT,
            )
            .await?;

        self.record(
            RELAYER_AUTHORIZED,
            relayer.to_checksum(None),
            TokenAmount::ZERO,
            &receipt,
        )
        .await;

        info!(
            "✅ Relayer {} authorized={}: {}",
            node_id, authorized, receipt.tx_hash
        );
        Ok(Some(receipt.tx_hash))
    }

    /// Reconciles `node_id`'s local balance to its on-chain balance and returns the latter.
    ///
    /// The shortfall is minted or the excess burned, never both.
    pub async fn sync_balance(&self, node_id: &str) -> Option<TokenAmount> {
        let address = self.registry.read().await.resolve_address(node_id)?;
        match self.try_sync_balance(node_id, address).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("⚠️ Balance sync for {} failed: {}", node_id, e);
                None
            }
        }
    }

    async fn try_sync_balance(&self, node_id: &str, address: Address) -> Result<TokenAmount> {
        let on_chain = self.client.balance_of(address).await.context(ChainSnafu)?;

        let mut ledger = self.ledger.lock().await;
        let local = ledger.balance_of(node_id);
        if on_chain > local {
            ledger
                .mint(node_id, on_chain.saturating_sub(local), REASON_CHAIN_SYNC)
                .context(LedgerSnafu)?;
        } else if on_chain < local {
            ledger
                .burn(node_id, local.saturating_sub(on_chain), REASON_CHAIN_SYNC)
                .context(LedgerSnafu)?;
        }

        debug!("Balance of {} synced to {}", node_id, on_chain);
        Ok(on_chain)
    }

    /// Reconciles every registered node and returns how many succeeded.
    pub async fn sync_all_balances(&self) -> usize {
        let node_ids = self.registry.read().await.node_ids();
        let mut synced = 0;
        for node_id in &node_ids {
            if self.sync_balance(node_id).await.is_some() {
                synced += 1;
            }
        }
        info!("Synced {}/{} balances from chain", synced, node_ids.len());
        synced
    }

    /// Reads the contract's reward state.
    pub async fn chain_stats(&self) -> Option<ChainStats> {
        let stats = async {
            Ok::<_, crate::error::Error>(ChainStats {
                total_staked: self.client.total_staked().await.context(ChainSnafu)?,
                current_epoch: self.client.current_epoch().await.context(ChainSnafu)?,
                can_distribute: self
                    .client
                    .can_distribute_rewards()
                    .await
                    .context(ChainSnafu)?,
                chain_id: self.client.chain_id(),
                contract: self.client.contract_address(),
            })
        };

        match stats.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("⚠️ Failed to read chain stats: {}", e);
                None
            }
        }
    }

    async fn submit(
        &self,
        call: ContractCall,
        gas_limit: u64,
        timeout: Duration,
    ) -> Result<TxReceipt> {
        let receipt = self
            .client
            .submit(
                call,
                TxOptions {
                    gas_limit,
                    gas_price: self.settings.gas_price,
                    timeout,
                },
            )
            .await
            .context(ChainSnafu)?;

        if !receipt.success {
            return TransactionRevertedSnafu {
                tx_hash: receipt.tx_hash,
            }
            .fail();
        }
        Ok(receipt)
    }

    async fn record(
        &self,
        event_type: &str,
        to_address: String,
        amount: TokenAmount,
        receipt: &TxReceipt,
    ) {
        let entry = BridgeTransaction {
            tx_id: short_tx_id(event_type, &receipt.tx_hash),
            direction: Direction::ToChain,
            from_address: "bridge".to_string(),
            to_address,
            amount,
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            block_number: receipt.block_number,
            tx_hash: Some(receipt.tx_hash),
            status: TxStatus::Confirmed,
        };
        self.transactions.lock().await.append(entry);
    }
}

#[async_trait]
impl<C: ChainClient, L: MeshLedger> RewardPusher for OutboundTransactionSubmitter<C, L> {
    async fn chain_stats(&self) -> Option<ChainStats> {
        OutboundTransactionSubmitter::chain_stats(self).await
    }

    async fn push_rewards(
        &self,
        rewards: &HashMap<String, TokenAmount>,
        uptimes: &HashMap<String, u8>,
    ) -> Option<B256> {
        OutboundTransactionSubmitter::push_rewards(self, rewards, uptimes).await
    }
}
