//! # Chain Events
//!
//! Typed views of the token contract's logs. Logs are fetched per [`EventKind`] and decoded into
//! a [`ChainEvent`], which carries the payload alongside the block and transaction it came from.

use std::fmt;

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use snafu::{OptionExt, ResultExt};

use crate::amount::TokenAmount;
use crate::chain_client::{ChainError, DecodeLogSnafu, MissingLogFieldSnafu};
use crate::mesh_token_contract::MeshToken;

/// The contract events the bridge understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A user locked tokens in the contract.
    Staked,
    /// A user released staked tokens.
    Unstaked,
    /// An ERC-20 transfer, including mints (from zero) and burns (to zero).
    Transfer,
    /// A payer settled a relay fee with a relayer.
    RelayPaid,
    /// The contract paid out an epoch's rewards.
    EpochRewardsDistributed,
}

impl EventKind {
    /// The event types fetched by each poll cycle, in dispatch order.
    pub const INBOUND: [EventKind; 4] = [
        EventKind::Staked,
        EventKind::Unstaked,
        EventKind::Transfer,
        EventKind::RelayPaid,
    ];

    /// The Solidity event name.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Staked => "Staked",
            EventKind::Unstaked => "Unstaked",
            EventKind::Transfer => "Transfer",
            EventKind::RelayPaid => "RelayPaid",
            EventKind::EpochRewardsDistributed => "EpochRewardsDistributed",
        }
    }

    /// topic0 of logs of this kind.
    pub fn signature_hash(&self) -> B256 {
        match self {
            EventKind::Staked => MeshToken::Staked::SIGNATURE_HASH,
            EventKind::Unstaked => MeshToken::Unstaked::SIGNATURE_HASH,
            EventKind::Transfer => MeshToken::Transfer::SIGNATURE_HASH,
            EventKind::RelayPaid => MeshToken::RelayPaid::SIGNATURE_HASH,
            EventKind::EpochRewardsDistributed => {
                MeshToken::EpochRewardsDistributed::SIGNATURE_HASH
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded payload of a contract event. Amounts are in 18-decimal base units.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    /// `Staked(user, amount, totalStaked)`
    Staked {
        /// The staker.
        user: Address,
        /// The user's stake as reported by the contract.
        amount: TokenAmount,
        /// Contract-wide total stake after the event.
        total_staked: TokenAmount,
    },
    /// `Unstaked(user, amount, totalStaked)`
    Unstaked {
        /// The staker.
        user: Address,
        /// Amount released.
        amount: TokenAmount,
        /// Contract-wide total stake after the event.
        total_staked: TokenAmount,
    },
    /// `Transfer(from, to, value)`
    Transfer {
        /// Sender, zero for mints.
        from: Address,
        /// Recipient, zero for burns.
        to: Address,
        /// Amount moved.
        value: TokenAmount,
    },
    /// `RelayPaid(payer, relayer, amount, feeBurned)`
    RelayPaid {
        /// The paying node.
        payer: Address,
        /// The relaying node.
        relayer: Address,
        /// Amount paid to the relayer.
        amount: TokenAmount,
        /// Protocol fee burned by the contract.
        fee_burned: TokenAmount,
    },
    /// `EpochRewardsDistributed(epoch, totalRewards, recipientCount)`
    EpochRewardsDistributed {
        /// Epoch number.
        epoch: U256,
        /// Total paid out.
        total_rewards: TokenAmount,
        /// Number of recipients paid.
        recipient_count: U256,
    },
}

impl BridgeEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::Staked { .. } => EventKind::Staked,
            BridgeEvent::Unstaked { .. } => EventKind::Unstaked,
            BridgeEvent::Transfer { .. } => EventKind::Transfer,
            BridgeEvent::RelayPaid { .. } => EventKind::RelayPaid,
            BridgeEvent::EpochRewardsDistributed { .. } => EventKind::EpochRewardsDistributed,
        }
    }

    /// The originating party: sender, staker or payer.
    pub fn from_address(&self) -> Option<Address> {
        match self {
            BridgeEvent::Staked { user, .. } | BridgeEvent::Unstaked { user, .. } => Some(*user),
            BridgeEvent::Transfer { from, .. } => Some(*from),
            BridgeEvent::RelayPaid { payer, .. } => Some(*payer),
            BridgeEvent::EpochRewardsDistributed { .. } => None,
        }
    }

    /// The receiving party: recipient or relayer.
    pub fn to_address(&self) -> Option<Address> {
        match self {
            BridgeEvent::Transfer { to, .. } => Some(*to),
            BridgeEvent::RelayPaid { relayer, .. } => Some(*relayer),
            _ => None,
        }
    }

    /// The headline amount of the event.
    pub fn amount(&self) -> TokenAmount {
        match self {
            BridgeEvent::Staked { amount, .. }
            | BridgeEvent::Unstaked { amount, .. }
            | BridgeEvent::RelayPaid { amount, .. } => *amount,
            BridgeEvent::Transfer { value, .. } => *value,
            BridgeEvent::EpochRewardsDistributed { total_rewards, .. } => *total_rewards,
        }
    }
}

/// A decoded log together with its position on chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainEvent {
    /// The decoded payload.
    pub event: BridgeEvent,
    /// Block the log was emitted in.
    pub block_number: u64,
    /// Transaction that emitted the log.
    pub tx_hash: B256,
    /// Position of the log within its block.
    pub log_index: u64,
}

impl ChainEvent {
    /// The kind of the wrapped event.
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Identity of this log on chain; redeliveries of the same log share it.
    pub fn key(&self) -> (B256, u64) {
        (self.tx_hash, self.log_index)
    }

    /// Decodes an RPC log known to be of `kind`.
    pub fn from_log(kind: EventKind, log: &Log) -> Result<Self, ChainError> {
        let event = match kind {
            EventKind::Staked => {
                let data = decode::<MeshToken::Staked>(kind, log)?;
                BridgeEvent::Staked {
                    user: data.user,
                    amount: data.amount.into(),
                    total_staked: data.totalStaked.into(),
                }
            }
            EventKind::Unstaked => {
                let data = decode::<MeshToken::Unstaked>(kind, log)?;
                BridgeEvent::Unstaked {
                    user: data.user,
                    amount: data.amount.into(),
                    total_staked: data.totalStaked.into(),
                }
            }
            EventKind::Transfer => {
                let data = decode::<MeshToken::Transfer>(kind, log)?;
                BridgeEvent::Transfer {
                    from: data.from,
                    to: data.to,
                    value: data.value.into(),
                }
            }
            EventKind::RelayPaid => {
                let data = decode::<MeshToken::RelayPaid>(kind, log)?;
                BridgeEvent::RelayPaid {
                    payer: data.payer,
                    relayer: data.relayer,
                    amount: data.amount.into(),
                    fee_burned: data.feeBurned.into(),
                }
            }
            EventKind::EpochRewardsDistributed => {
                let data = decode::<MeshToken::EpochRewardsDistributed>(kind, log)?;
                BridgeEvent::EpochRewardsDistributed {
                    epoch: data.epoch,
                    total_rewards: data.totalRewards.into(),
                    recipient_count: data.recipientCount,
                }
            }
        };

        Ok(Self {
            event,
            block_number: log.block_number.context(MissingLogFieldSnafu {
                kind,
                field: "block_number",
            })?,
            tx_hash: log.transaction_hash.context(MissingLogFieldSnafu {
                kind,
                field: "transaction_hash",
            })?,
            log_index: log.log_index.context(MissingLogFieldSnafu {
                kind,
                field: "log_index",
            })?,
        })
    }
}

fn decode<E: SolEvent>(kind: EventKind, log: &Log) -> Result<E, ChainError> {
    Ok(log.log_decode::<E>().context(DecodeLogSnafu { kind })?.inner.data)
}
