//! # Address Registry
//!
//! Bidirectional mapping between mesh node identifiers and chain addresses.
//!
//! Addresses are held as 20-byte [`Address`] values, so lookups compare bytes and are
//! insensitive to the hex casing used by whoever registered or emitted them. Mappings are
//! never removed: a stale mapping only affects lookups, and "not found" is an expected answer
//! for addresses such as exchange hot wallets that have no mesh node.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use log::info;
use snafu::ResultExt;
use tokio::sync::RwLock;

use crate::error::{AddressParseSnafu, Result};

/// A registry shared between the bridge's components. The bridge is its only writer.
pub type SharedRegistry = Arc<RwLock<AddressRegistry>>;

/// Owned node id ↔ address mapping, one per bridge instance.
#[derive(Clone, Debug, Default)]
pub struct AddressRegistry {
    /// node id → address
    by_node: HashMap<String, Address>,
    /// address → node id, most recent registrant wins
    by_address: HashMap<Address, String>,
}

impl AddressRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the registry for sharing between tasks.
    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Parses `address` (any casing, `0x` prefix optional) and registers it for `node_id`,
    /// replacing any address the node had before.
    pub fn register(&mut self, node_id: impl Into<String>, address: &str) -> Result<Address> {
        let parsed = parse_address(address)?;
        self.register_address(node_id, parsed);
        Ok(parsed)
    }

    /// Registers an already parsed address for `node_id`.
    pub fn register_address(&mut self, node_id: impl Into<String>, address: Address) {
        let node_id = node_id.into();

        if let Some(previous) = self.by_node.insert(node_id.clone(), address) {
            if previous != address && self.by_address.get(&previous) == Some(&node_id) {
                self.by_address.remove(&previous);
            }
        }
        self.by_address.insert(address, node_id.clone());

        info!("Registered: {} → {}", node_id, address.to_checksum(None));
    }

    /// The address registered for `node_id`, if any.
    pub fn resolve_address(&self, node_id: &str) -> Option<Address> {
        self.by_node.get(node_id).copied()
    }

    /// The node registered for `address`, if any.
    pub fn resolve_node(&self, address: &Address) -> Option<&str> {
        self.by_address.get(address).map(String::as_str)
    }

    /// All registered node ids, sorted.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_node.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

/// Parses a hex address in any casing, with or without the `0x` prefix.
pub fn parse_address(address: &str) -> Result<Address> {
    let trimmed = address.trim();
    let prefixed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        format!("0x{}", &trimmed[2..])
    } else {
        format!("0x{trimmed}")
    };
    Address::from_str(&prefixed).context(AddressParseSnafu {
        address: address.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    #[test]
    fn lookups_ignore_address_casing() {
        let mut registry = AddressRegistry::new();
        registry
            .register("alice", "0xd8da6bf26964af9d7eed9e03e53415d37aa96045")
            .unwrap();

        let checksummed = Address::from_str("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045").unwrap();
        assert_eq!(registry.resolve_node(&checksummed), Some("alice"));
        assert_eq!(
            registry.resolve_address("alice").unwrap().to_checksum(None),
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"
        );
    }

    #[test]
    fn missing_prefix_is_accepted() {
        let mut registry = AddressRegistry::new();
        let parsed = registry
            .register("bob", "000000000000000000000000000000000000000b")
            .unwrap();

        assert_eq!(parsed, address!("000000000000000000000000000000000000000b"));
        assert_eq!(registry.resolve_node(&parsed), Some("bob"));
    }

    #[test]
    fn invalid_address_is_rejected_without_mutation() {
        let mut registry = AddressRegistry::new();

        assert!(registry.register("carol", "0xnot-an-address").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn re_registration_drops_the_old_reverse_entry() {
        let mut registry = AddressRegistry::new();
        let old = address!("00000000000000000000000000000000000000aa");
        let new = address!("00000000000000000000000000000000000000bb");

        registry.register_address("n1", old);
        registry.register_address("n1", new);

        assert_eq!(registry.resolve_address("n1"), Some(new));
        assert_eq!(registry.resolve_node(&new), Some("n1"));
        assert_eq!(registry.resolve_node(&old), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_lookups_are_not_errors() {
        let registry = AddressRegistry::new();

        assert_eq!(registry.resolve_address("ghost"), None);
        assert_eq!(registry.resolve_node(&Address::ZERO), None);
    }

    #[test]
    fn shared_address_resolves_to_latest_registrant() {
        let mut registry = AddressRegistry::new();
        let shared = address!("00000000000000000000000000000000000000cc");

        registry.register_address("first", shared);
        registry.register_address("second", shared);

        assert_eq!(registry.resolve_node(&shared), Some("second"));
        assert_eq!(registry.resolve_address("first"), Some(shared));
        assert_eq!(registry.node_ids(), vec!["first".to_string(), "second".to_string()]);
    }
}
