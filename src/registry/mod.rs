//! Chain and factory configuration.
//!
//! The [`FactoryRegistry`] maps chain ids to chain metadata (name, average
//! block time) and to the DEX factory contracts worth watching on that chain.
//! It is built once at startup ([`FactoryRegistry::builtin`] covers the major
//! AMM deployments), optionally extended with custom chains or factories,
//! and then shared read-only for the life of the process.
//!
//! # Example
//!
//! ```
//! use pairwatch::registry::FactoryRegistry;
//!
//! let registry = FactoryRegistry::builtin();
//! for chain in registry.supported_chains() {
//!     println!(
//!         "{} ({chain}): {} factories",
//!         registry.chain_name(chain).unwrap(),
//!         registry.factories(chain).len(),
//!     );
//! }
//! ```

use std::collections::HashMap;

use alloy::{
    primitives::{Address, B256, address},
    sol_types::SolEvent,
};
use serde::{Deserialize, Serialize};

use crate::chain::contracts::{IUniswapV2Factory, IUniswapV3Factory};

/// Network identifier (1 = Ethereum, 137 = Polygon, …).
pub type ChainId = u64;

/// Which creation event a factory emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum ProtocolVariant {
    /// Uniswap V2 style: `PairCreated(token0, token1, pair, allPairsLength)`.
    V2,
    /// Uniswap V3 style: `PoolCreated(token0, token1, fee, tickSpacing, pool)`.
    V3,
}

impl ProtocolVariant {
    /// topic0 of the creation event for this variant.
    #[must_use]
    pub fn creation_event_signature(&self) -> B256 {
        match self {
            Self::V2 => IUniswapV2Factory::PairCreated::SIGNATURE_HASH,
            Self::V3 => IUniswapV3Factory::PoolCreated::SIGNATURE_HASH,
        }
    }
}

/// A watched factory contract on a specific chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryDescriptor {
    /// Chain the factory is deployed on.
    pub chain_id: ChainId,
    /// Factory contract address.
    pub address: Address,
    /// Creation event flavour.
    pub variant: ProtocolVariant,
    /// Human-readable DEX name, e.g. `"uniswap_v2"`.
    pub name: String,
}

impl FactoryDescriptor {
    /// topic0 of this factory's creation event.
    #[must_use]
    #[inline]
    pub fn event_signature(&self) -> B256 {
        self.variant.creation_event_signature()
    }
}

/// Static metadata for a supported chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    /// Display name.
    pub name: String,
    /// Average block time in milliseconds, used to convert time windows into
    /// block counts. An estimate; block times drift.
    pub block_time_ms: u64,
}

/// Immutable chain → factory configuration.
pub struct FactoryRegistry {
    chains: HashMap<ChainId, ChainInfo>,
    factories: HashMap<ChainId, Vec<FactoryDescriptor>>,
}

impl FactoryRegistry {
    /// Empty registry; combine with [`with_chain`](Self::with_chain) and
    /// [`with_factory`](Self::with_factory).
    #[must_use]
    pub fn new() -> Self {
        Self {
            chains: HashMap::new(),
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with the major AMM deployments.
    #[must_use]
    pub fn builtin() -> Self {
        use ProtocolVariant::{V2, V3};

        const UNISWAP_V3: Address = address!("0x1F98431c8aD98523631AE4a59f267346ea31F984");
        const SUSHISWAP: Address = address!("0xc35DADB65012eC5796536bD9864eD8773aBc74C4");

        Self::new()
            .with_chain(1, "Ethereum", 12_000)
            .with_factory(1, "uniswap_v2", address!("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"), V2)
            .with_factory(1, "uniswap_v3", UNISWAP_V3, V3)
            .with_factory(1, "sushiswap", address!("0xC0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac"), V2)
            .with_chain(137, "Polygon", 2_000)
            .with_factory(137, "uniswap_v3", UNISWAP_V3, V3)
            .with_factory(137, "sushiswap", SUSHISWAP, V2)
            .with_factory(137, "quickswap", address!("0x5757371414417b8C6CAad45bAeF941aBc7d3Ab32"), V2)
            .with_chain(42161, "Arbitrum", 250)
            .with_factory(42161, "uniswap_v3", UNISWAP_V3, V3)
            .with_factory(42161, "sushiswap", SUSHISWAP, V2)
            .with_chain(10, "Optimism", 2_000)
            .with_factory(10, "uniswap_v3", UNISWAP_V3, V3)
            .with_chain(8453, "Base", 2_000)
            .with_factory(8453, "uniswap_v3", address!("0x33128a8fC17869897dcE68Ed026d694621f6FDfD"), V3)
            .with_chain(56, "BNB Chain", 3_000)
            .with_factory(56, "pancakeswap", address!("0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73"), V2)
            .with_factory(56, "sushiswap", SUSHISWAP, V2)
            .with_chain(43114, "Avalanche", 2_000)
            .with_factory(43114, "traderjoe", address!("0x9Ad6C38BE94206cA50bb0d90783181662f0Cfa10"), V2)
            .with_factory(43114, "sushiswap", SUSHISWAP, V2)
    }

    /// Adds or replaces a chain.
    #[must_use]
    pub fn with_chain(mut self, chain: ChainId, name: &str, block_time_ms: u64) -> Self {
        self.chains.insert(
            chain,
            ChainInfo {
                name: name.to_string(),
                block_time_ms,
            },
        );
        self
    }

    /// Adds a factory to a chain. The chain must have been added first.
    #[must_use]
    pub fn with_factory(
        mut self,
        chain: ChainId,
        name: &str,
        address: Address,
        variant: ProtocolVariant,
    ) -> Self {
        debug_assert!(self.chains.contains_key(&chain), "unknown chain {chain}");
        self.factories
            .entry(chain)
            .or_default()
            .push(FactoryDescriptor {
                chain_id: chain,
                address,
                variant,
                name: name.to_string(),
            });
        self
    }

    /// Whether the chain is configured.
    #[must_use]
    pub fn is_supported(&self, chain: ChainId) -> bool {
        self.chains.contains_key(&chain)
    }

    /// Metadata for a chain.
    #[must_use]
    pub fn chain(&self, chain: ChainId) -> Option<&ChainInfo> {
        self.chains.get(&chain)
    }

    /// Display name for a chain.
    #[must_use]
    pub fn chain_name(&self, chain: ChainId) -> Option<&str> {
        self.chains.get(&chain).map(|info| info.name.as_str())
    }

    /// Average block time in milliseconds for a chain.
    #[must_use]
    pub fn block_time_ms(&self, chain: ChainId) -> Option<u64> {
        self.chains.get(&chain).map(|info| info.block_time_ms)
    }

    /// All configured factories for a chain, in registration order.
    #[must_use]
    pub fn factories(&self, chain: ChainId) -> &[FactoryDescriptor] {
        self.factories.get(&chain).map_or(&[], Vec::as_slice)
    }

    /// Resolves a factory address on a chain to its descriptor.
    #[must_use]
    pub fn descriptor(&self, chain: ChainId, address: Address) -> Option<&FactoryDescriptor> {
        self.factories(chain)
            .iter()
            .find(|desc| desc.address == address)
    }

    /// Configured chain ids, ascending.
    #[must_use]
    pub fn supported_chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.chains.keys().copied().collect();
        chains.sort_unstable();
        chains
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookups() {
        let registry = FactoryRegistry::builtin();

        assert!(registry.is_supported(1));
        assert!(!registry.is_supported(31337));
        assert_eq!(registry.chain_name(137), Some("Polygon"));
        assert_eq!(registry.block_time_ms(42161), Some(250));
        assert_eq!(
            registry.supported_chains(),
            vec![1, 10, 56, 137, 8453, 42161, 43114]
        );

        let uni_v2 = registry
            .descriptor(1, address!("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"))
            .unwrap();
        assert_eq!(uni_v2.variant, ProtocolVariant::V2);
        assert_eq!(uni_v2.name, "uniswap_v2");

        // Same deployment address on several chains resolves per chain.
        let uni_v3 = address!("0x1F98431c8aD98523631AE4a59f267346ea31F984");
        assert!(registry.descriptor(1, uni_v3).is_some());
        assert!(registry.descriptor(10, uni_v3).is_some());
        assert!(registry.descriptor(56, uni_v3).is_none());
    }

    #[test]
    fn test_variant_signatures_differ() {
        assert_ne!(
            ProtocolVariant::V2.creation_event_signature(),
            ProtocolVariant::V3.creation_event_signature(),
        );
    }
}
