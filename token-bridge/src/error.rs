use snafu::Snafu;

use crate::chain_client::ChainError;
use crate::events::EventKind;
use crate::mesh_ledger::LedgerError;

/// Represents errors that can occur while configuring the bridge, syncing chain events into the
/// mesh ledger, and submitting transactions back to the chain.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Error when reading the signing key from a file.
    #[snafu(display("Failed to read signing key from file '{}': {}", path, source))]
    KeyFileRead {
        /// The path of the key file that could not be read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Error when parsing the signing key from a hexadecimal string.
    #[snafu(display("Failed to parse signing key as hex: {}", source))]
    KeyParse {
        /// The underlying hex parsing error.
        source: hex::FromHexError,
    },

    /// Ethereum private keys must be exactly 32 bytes long.
    #[snafu(display("Invalid key length: expected 32 bytes, got {}", length))]
    InvalidKeyLength {
        /// The actual length of the provided key.
        length: usize,
    },

    /// The key bytes are not a valid secp256k1 scalar.
    #[snafu(display("Failed to create signer from secret key: {}", source))]
    SignerCreation {
        /// The underlying ECDSA error.
        source: k256::ecdsa::Error,
    },

    /// Neither an inline key nor a key file was configured.
    #[snafu(display("No signing key configured: set PRIVATE_KEY or PRIVATE_KEY_PATH"))]
    MissingSigningKey,

    /// A configured chain address could not be parsed.
    #[snafu(display("Invalid address '{}': {}", address, source))]
    AddressParse {
        /// The offending address string.
        address: String,
        /// The underlying hex error.
        source: alloy::hex::FromHexError,
    },

    /// A configured URL could not be parsed.
    #[snafu(display("Failed to parse URL '{}': {}", url, source))]
    UrlParse {
        /// The offending URL string.
        url: String,
        /// The underlying parse error.
        source: url::ParseError,
    },

    /// The address map file could not be read.
    #[snafu(display("Failed to read address map '{}': {}", path, source))]
    AddressMapRead {
        /// Path of the address map file.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The address map file is not a JSON object of node ids to addresses.
    #[snafu(display("Failed to parse address map '{}': {}", path, source))]
    AddressMapParse {
        /// Path of the address map file.
        path: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A chain call failed.
    #[snafu(display("Chain error: {source}"))]
    Chain {
        /// The underlying chain client error.
        source: ChainError,
    },

    /// Fetching one event type for a block range failed.
    #[snafu(display("Failed to fetch {kind} events for blocks {from}..={to}: {source}"))]
    FetchEvents {
        /// The event type being fetched.
        kind: EventKind,
        /// First block of the range.
        from: u64,
        /// Last block of the range.
        to: u64,
        /// The underlying chain client error.
        source: ChainError,
    },

    /// The mesh ledger rejected a mutation while applying a chain event.
    #[snafu(display("Failed to apply {kind} event from tx {tx_hash}: {source}"))]
    ApplyEvent {
        /// The event type being applied.
        kind: EventKind,
        /// Hash of the transaction that emitted the event.
        tx_hash: alloy::primitives::B256,
        /// The underlying ledger error.
        source: LedgerError,
    },

    /// The mesh ledger rejected a reconciliation mutation.
    #[snafu(display("Ledger error: {source}"))]
    Ledger {
        /// The underlying ledger error.
        source: LedgerError,
    },

    /// A transaction was mined but reverted.
    #[snafu(display("Transaction {tx_hash} reverted"))]
    TransactionReverted {
        /// Hash of the reverted transaction.
        tx_hash: alloy::primitives::B256,
    },
}

/// Type alias for results that return a `Result<T, Error>`, simplifying error handling.
pub type Result<T, E = Error> = std::result::Result<T, E>;
