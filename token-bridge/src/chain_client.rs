//! # Chain Client
//!
//! [`ChainClient`] is everything the bridge needs from the chain: the block height, the token
//! contract's logs and view functions, and signed submission with receipt waiting.
//! [`EvmChainClient`] implements it over an `alloy` HTTP provider with a local signing wallet.
//!
//! The client is injected into the bridge at construction, so a bridge never runs without one.

use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse as _, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use log::{debug, info};
use snafu::{ResultExt, Snafu};
use url::Url;

use crate::amount::TokenAmount;
use crate::events::{ChainEvent, EventKind};
use crate::mesh_token_contract::MeshToken;

/// Provider instance type for Ethereum transactions.
/// This handles gas estimation, nonce management, and wallet signing.
pub type ProviderInstance = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::fillers::JoinFill<
            alloy::providers::Identity,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::GasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::BlobGasFiller,
                    alloy::providers::fillers::JoinFill<
                        alloy::providers::fillers::NonceFiller,
                        alloy::providers::fillers::ChainIdFiller,
                    >,
                >,
            >,
        >,
        alloy::providers::fillers::WalletFiller<EthereumWallet>,
    >,
    alloy::providers::RootProvider,
    alloy::network::Ethereum,
>;

/// Errors raised by a [`ChainClient`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ChainError {
    /// The RPC endpoint could not be reached or returned an error.
    #[snafu(display("RPC request failed: {source}"))]
    Rpc {
        /// The underlying transport error.
        source: alloy::transports::TransportError,
    },

    /// A view call on the token contract failed.
    #[snafu(display("Contract call {call} failed: {source}"))]
    ContractCall {
        /// Name of the contract function.
        call: &'static str,
        /// The underlying contract error.
        source: alloy::contract::Error,
    },

    /// Submitting a signed transaction failed.
    #[snafu(display("Failed to send {call} transaction: {source}"))]
    SendTransaction {
        /// Name of the contract function.
        call: &'static str,
        /// The underlying transport error.
        source: alloy::transports::TransportError,
    },

    /// Waiting for a receipt failed.
    #[snafu(display("Failed waiting for receipt of {tx_hash}: {source}"))]
    Confirmation {
        /// Hash of the submitted transaction.
        tx_hash: B256,
        /// The underlying watcher error.
        source: alloy::providers::PendingTransactionError,
    },

    /// No receipt arrived before the deadline.
    #[snafu(display("No receipt for {tx_hash} within {timeout:?}"))]
    ReceiptTimeout {
        /// Hash of the submitted transaction.
        tx_hash: B256,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// A log did not decode as the expected event.
    #[snafu(display("Failed to decode {kind} log: {source}"))]
    DecodeLog {
        /// The expected event kind.
        kind: EventKind,
        /// The underlying ABI error.
        source: alloy::sol_types::Error,
    },

    /// A log lacked positional information, which only happens for pending logs.
    #[snafu(display("{kind} log is missing {field}"))]
    MissingLogField {
        /// The event kind being decoded.
        kind: EventKind,
        /// The missing field.
        field: &'static str,
    },
}

/// A state-changing contract call the bridge submits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractCall {
    /// `distributeEpochRewards(recipients, uptimes)`
    DistributeEpochRewards {
        /// Reward recipients.
        recipients: Vec<Address>,
        /// Uptime percentage (0–100) per recipient, index-aligned with `recipients`.
        uptimes: Vec<u8>,
    },
    /// `setRelayerAuthorized(relayer, authorized)`
    SetRelayerAuthorized {
        /// The relayer address.
        relayer: Address,
        /// New authorisation flag.
        authorized: bool,
    },
}

impl ContractCall {
    /// The contract function name.
    pub fn name(&self) -> &'static str {
        match self {
            ContractCall::DistributeEpochRewards { .. } => "distributeEpochRewards",
            ContractCall::SetRelayerAuthorized { .. } => "setRelayerAuthorized",
        }
    }

    /// ABI-encoded calldata.
    pub fn calldata(&self) -> Bytes {
        match self {
            ContractCall::DistributeEpochRewards {
                recipients,
                uptimes,
            } => MeshToken::distributeEpochRewardsCall {
                recipients: recipients.clone(),
                uptimes: uptimes.iter().map(|uptime| U256::from(*uptime)).collect(),
            }
            .abi_encode()
            .into(),
            ContractCall::SetRelayerAuthorized {
                relayer,
                authorized,
            } => MeshToken::setRelayerAuthorizedCall {
                relayer: *relayer,
                authorized: *authorized,
            }
            .abi_encode()
            .into(),
        }
    }
}

/// Gas and confirmation settings for one submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxOptions {
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// How long to wait for the receipt.
    pub timeout: Duration,
}

/// The outcome of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Block the transaction was mined in.
    pub block_number: Option<u64>,
    /// `true` if the transaction executed successfully.
    pub success: bool,
}

/// Access to the chain and the token contract.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Chain id transactions are signed for.
    fn chain_id(&self) -> u64;

    /// Address of the token contract.
    fn contract_address(&self) -> Address;

    /// Address of the signing account, if the client can sign.
    fn signer_address(&self) -> Option<Address>;

    /// Current chain height.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Logs of `kind` emitted by the contract in `from..=to`, in the order the node returns them.
    async fn fetch_events(
        &self,
        kind: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<ChainEvent>, ChainError>;

    /// `canDistributeRewards()`
    async fn can_distribute_rewards(&self) -> Result<bool, ChainError>;

    /// `balanceOf(account)`
    async fn balance_of(&self, account: Address) -> Result<TokenAmount, ChainError>;

    /// `totalStaked()`
    async fn total_staked(&self) -> Result<TokenAmount, ChainError>;

    /// `currentEpoch()`
    async fn current_epoch(&self) -> Result<U256, ChainError>;

    /// Builds, signs and submits `call`, then waits for its receipt.
    async fn submit(&self, call: ContractCall, options: TxOptions) -> Result<TxReceipt, ChainError>;
}

/// [`ChainClient`] backed by an `alloy` HTTP provider and a local private key.
pub struct EvmChainClient {
    provider: ProviderInstance,
    contract_address: Address,
    signer_address: Address,
    chain_id: u64,
    confirmations: u64,
}

impl EvmChainClient {
    /// Connects a wallet-filling provider to `rpc_url`.
    pub fn new(
        rpc_url: Url,
        contract_address: Address,
        signer: PrivateKeySigner,
        chain_id: u64,
        confirmations: u64,
    ) -> Self {
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider: ProviderInstance = ProviderBuilder::new().wallet(wallet).on_http(rpc_url);

        info!("Bridge account: {}", signer_address);
        info!("Contract loaded: {}", contract_address);

        Self {
            provider,
            contract_address,
            signer_address,
            chain_id,
            confirmations,
        }
    }

    fn contract(&self) -> MeshToken::MeshTokenInstance<(), &ProviderInstance> {
        MeshToken::new(self.contract_address, &self.provider)
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn contract_address(&self) -> Address {
        self.contract_address
    }

    fn signer_address(&self) -> Option<Address> {
        Some(self.signer_address)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider.get_block_number().await.context(RpcSnafu)
    }

    async fn fetch_events(
        &self,
        kind: EventKind,
        from: u64,
        to: u64,
    ) -> Result<Vec<ChainEvent>, ChainError> {
        let filter = Filter::new()
            .address(self.contract_address)
            .event_signature(kind.signature_hash())
            .from_block(from)
            .to_block(to);

        let logs = self.provider.get_logs(&filter).await.context(RpcSnafu)?;
        debug!("Fetched {} {} log(s) in {}..={}", logs.len(), kind, from, to);

        logs.iter()
            .map(|log| ChainEvent::from_log(kind, log))
            .collect()
    }

    async fn can_distribute_rewards(&self) -> Result<bool, ChainError> {
        Ok(self
            .contract()
            .canDistributeRewards()
            .call()
            .await
            .context(ContractCallSnafu {
                call: "canDistributeRewards",
            })?
            ._0)
    }

    async fn balance_of(&self, account: Address) -> Result<TokenAmount, ChainError> {
        let balance = self
            .contract()
            .balanceOf(account)
            .call()
            .await
            .context(ContractCallSnafu { call: "balanceOf" })?
            ._0;
        Ok(TokenAmount::from_wei(balance))
    }

    async fn total_staked(&self) -> Result<TokenAmount, ChainError> {
        let total = self
            .contract()
            .totalStaked()
            .call()
            .await
            .context(ContractCallSnafu {
                call: "totalStaked",
            })?
            ._0;
        Ok(TokenAmount::from_wei(total))
    }

    async fn current_epoch(&self) -> Result<U256, ChainError> {
        Ok(self
            .contract()
            .currentEpoch()
            .call()
            .await
            .context(ContractCallSnafu {
                call: "currentEpoch",
            })?
            ._0)
    }

    async fn submit(&self, call: ContractCall, options: TxOptions) -> Result<TxReceipt, ChainError> {
        let name = call.name();
        let request = TransactionRequest::default()
            .with_from(self.signer_address)
            .with_to(self.contract_address)
            .with_input(call.calldata())
            .with_gas_limit(options.gas_limit)
            .with_gas_price(options.gas_price)
            .with_chain_id(self.chain_id);

        // nonce is filled and the request signed by the provider's fillers
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .context(SendTransactionSnafu { call: name })?;
        let tx_hash = *pending.tx_hash();
        info!("{} tx sent: {}", name, tx_hash);

        let receipt = tokio::time::timeout(
            options.timeout,
            pending
                .with_required_confirmations(self.confirmations)
                .get_receipt(),
        )
        .await
        .map_err(|_| ChainError::ReceiptTimeout {
            tx_hash,
            timeout: options.timeout,
        })?
        .context(ConfirmationSnafu { tx_hash })?;

        Ok(TxReceipt {
            tx_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    #[test]
    fn reward_calldata_carries_recipients_and_uptimes() {
        let call = ContractCall::DistributeEpochRewards {
            recipients: vec![address!("000000000000000000000000000000000000000a")],
            uptimes: vec![87],
        };

        let calldata = call.calldata();
        let decoded = MeshToken::distributeEpochRewardsCall::abi_decode(&calldata, true).unwrap();

        assert_eq!(&calldata[..4], &MeshToken::distributeEpochRewardsCall::SELECTOR);
        assert_eq!(decoded.recipients, vec![address!("000000000000000000000000000000000000000a")]);
        assert_eq!(decoded.uptimes, vec![U256::from(87u64)]);
    }

    #[test]
    fn relayer_calldata_uses_set_relayer_selector() {
        let call = ContractCall::SetRelayerAuthorized {
            relayer: address!("000000000000000000000000000000000000000b"),
            authorized: false,
        };

        let decoded = MeshToken::setRelayerAuthorizedCall::abi_decode(&call.calldata(), true).unwrap();

        assert_eq!(call.name(), "setRelayerAuthorized");
        assert!(!decoded.authorized);
    }
}
