//! # Token Bridge Library
//!
//! Keeps the off-chain mesh ledger consistent with the on-chain mesh token contract, and
//! periodically triggers epoch reward distribution back on chain.
//!
//! ## Modules
//! - [`ingestion`]: Polls the chain for new blocks and fetches the contract's events.
//! - [`dispatcher`]: Applies each event to the mesh ledger idempotently and notifies observers.
//! - [`submitter`]: Builds, signs and confirms reward and relayer transactions.
//! - [`scheduler`]: Checks every interval whether an epoch is ready and distributes rewards.
//! - [`bridge`]: Owns the shared state and wires the components together.

/// Fixed-point token amounts in the contract's 18-decimal base unit.
pub mod amount;

/// Bidirectional node id ↔ chain address mapping.
pub mod address_registry;

/// The `bridge` module owns one registry, one transaction ledger and the chain client, and
/// builds the ingestion loop, submitter and scheduler over them.
pub mod bridge;

/// The chain capability the bridge consumes, and its alloy implementation.
pub mod chain_client;

/// Command-line configuration and signing key loading.
pub mod config;

/// The `dispatcher` module routes decoded events to the built-in sync handlers and to
/// subscribed observers, and records every applied event in the transaction ledger.
pub mod dispatcher;

/// Error handling module.
///
/// Defines a custom error type using the `snafu` crate to provide detailed and structured
/// error messages for configuration, event sync and transaction submission failures.
pub mod error;

/// Typed contract events.
pub mod events;

/// The `ingestion` module drives the poll loop and owns the processed-block cursor.
pub mod ingestion;

/// The mesh ledger contract and an in-memory implementation.
pub mod mesh_ledger;

/// The mesh token contract built with sol apis.
pub mod mesh_token_contract;

/// Epoch reward scheduling.
pub mod scheduler;

/// Cooperative stop signal for the long-running loops.
pub mod stop;

/// The `submitter` module pushes local state to the chain: reward distribution, relayer
/// authorisation and balance reconciliation.
pub mod submitter;

/// Append-only log of bridge transactions.
pub mod transaction_ledger;

/// Node uptime sources.
pub mod uptime;

#[cfg(test)]
mod test_utils;
