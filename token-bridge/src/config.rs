//! # Configuration
//!
//! Command-line and environment configuration, resolved once at startup into an immutable
//! [`BridgeConfig`]. Anything malformed (URL, address, key) is a startup error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use hex::FromHex;
use k256::ecdsa::SigningKey;
use snafu::ResultExt;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use url::Url;

use crate::error::*;
use crate::submitter::SubmitterSettings;

/// Wei per gwei.
const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Token bridge CLI
#[derive(Parser, Debug, Clone)]
#[command(
    name = "token-bridge",
    about = "Mesh ledger ↔️ token contract bridge and epoch reward scheduler"
)]
pub struct Cli {
    /// URL of the EVM JSON-RPC endpoint
    #[arg(long, env = "RPC_URL", default_value = "https://sepolia.base.org")]
    pub rpc_url: String,

    /// Address of the mesh token contract
    #[arg(long, env = "CONTRACT_ADDRESS")]
    pub contract_address: String,

    /// Hex encoded private key of the bridge account
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Path to a file holding the hex encoded private key, used when no inline key is given
    #[arg(long, env = "PRIVATE_KEY_PATH")]
    pub private_key_path: Option<String>,

    /// Chain id transactions are signed for
    #[arg(long, env = "CHAIN_ID", default_value_t = 84532)]
    pub chain_id: u64,

    /// Seconds between event polls
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 12)]
    pub poll_interval: u64,

    /// Confirmations to wait for before a receipt counts
    #[arg(long, env = "CONFIRMATIONS", default_value_t = 2)]
    pub confirmations: u64,

    /// Gas limit for reward distribution
    #[arg(long, env = "GAS_LIMIT", default_value_t = 200_000)]
    pub gas_limit: u64,

    /// Gas price for outbound transactions, in gwei
    #[arg(long, env = "MAX_GAS_PRICE_GWEI", default_value_t = 50)]
    pub max_gas_price_gwei: u64,

    /// Node registry endpoint returning `{ "node_id": uptime_fraction }`
    #[arg(long, env = "UPTIME_URL")]
    pub uptime_url: Option<String>,

    /// JSON file mapping node ids to chain addresses, registered at startup
    #[arg(long, env = "ADDRESS_MAP")]
    pub address_map: Option<PathBuf>,

    /// Seconds between epoch reward checks
    #[arg(long, env = "SCHEDULER_INTERVAL", default_value_t = 300)]
    pub scheduler_interval: u64,
}

/// Immutable bridge configuration.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Token contract.
    pub contract_address: Address,
    /// Bridge signing account.
    pub signer: PrivateKeySigner,
    /// Chain id transactions are signed for.
    pub chain_id: u64,
    /// Pause between event polls.
    pub poll_interval: Duration,
    /// Confirmations to wait for.
    pub confirmations: u64,
    /// Gas limit for reward distribution.
    pub gas_limit: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Node registry endpoint.
    pub uptime_url: Option<Url>,
    /// Startup address map file.
    pub address_map: Option<PathBuf>,
    /// Pause between epoch reward checks.
    pub scheduler_interval: Duration,
}

impl BridgeConfig {
    /// Validates the CLI arguments and loads the signing key.
    pub async fn from_cli(cli: Cli) -> Result<Self> {
        let signer = match (&cli.private_key, &cli.private_key_path) {
            (Some(key), _) => signer_from_hex(key)?,
            (None, Some(path)) => load_signer(path).await?,
            (None, None) => return MissingSigningKeySnafu.fail(),
        };

        Ok(Self {
            rpc_url: parse_url(&cli.rpc_url)?,
            contract_address: Address::from_str(cli.contract_address.trim()).context(
                AddressParseSnafu {
                    address: cli.contract_address.clone(),
                },
            )?,
            signer,
            chain_id: cli.chain_id,
            poll_interval: Duration::from_secs(cli.poll_interval),
            confirmations: cli.confirmations,
            gas_limit: cli.gas_limit,
            gas_price: u128::from(cli.max_gas_price_gwei) * WEI_PER_GWEI,
            uptime_url: cli.uptime_url.as_deref().map(parse_url).transpose()?,
            address_map: cli.address_map,
            scheduler_interval: Duration::from_secs(cli.scheduler_interval),
        })
    }

    /// Gas settings for the outbound submitter.
    pub fn submitter_settings(&self) -> SubmitterSettings {
        SubmitterSettings {
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
        }
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).context(UrlParseSnafu { url })
}

/// Builds a signer from a hex encoded 32-byte secret key, with or without `0x`.
pub fn signer_from_hex(key: &str) -> Result<PrivateKeySigner> {
    let trimmed = key.trim();
    let hex_key = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let key_bytes = Vec::from_hex(hex_key).context(KeyParseSnafu)?;

    if key_bytes.len() != 32 {
        return Err(Error::InvalidKeyLength {
            length: key_bytes.len(),
        });
    }

    let signing_key = SigningKey::from_slice(&key_bytes).context(SignerCreationSnafu)?;
    Ok(PrivateKeySigner::from_signing_key(signing_key))
}

/// load a hex encoded secp256k1 key from a file
pub async fn load_signer(file_path: &str) -> Result<PrivateKeySigner> {
    let mut file = File::open(file_path).await.context(KeyFileReadSnafu {
        path: file_path.to_string(),
    })?;

    let mut hex_string = String::new();
    file.read_to_string(&mut hex_string)
        .await
        .context(KeyFileReadSnafu {
            path: file_path.to_string(),
        })?;

    signer_from_hex(&hex_string)
}

/// Reads a JSON object of node id → address.
pub async fn load_address_map(path: &Path) -> Result<HashMap<String, String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .context(AddressMapReadSnafu {
            path: path.display().to_string(),
        })?;

    serde_json::from_str(&contents).context(AddressMapParseSnafu {
        path: path.display().to_string(),
    })
}
