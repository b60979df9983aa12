//! # pairwatch
//!
//! Detect newly created AMM pairs/pools on factory contracts across multiple
//! EVM chains, then enrich each detection with its initial USD liquidity and
//! a ranked top-holder list.
//!
//! ## Quick Navigation
//!
//! | Module | Description | Common Use Cases |
//! |--------|-------------|------------------|
//! | [`discovery`] | Orchestration & wire contract | Serve a discovery request end to end |
//! | [`monitor`] | Factory scanning | Window → block range → pair candidates |
//! | [`liquidity`] | USD valuation | Reserves, token metadata, pool value |
//! | [`holders`] | Holder ranking | Transfer replay, top-N holders |
//! | [`chain`] | Chain access | Log queries, `eth_call`, block metadata |
//! | [`price`] | USD prices | CoinGecko lookups with a TTL cache |
//! | [`registry`] | Configuration | Chains, factories, block times |
//!
//! ## Getting Started
//!
//! ```no_run
//! use std::sync::Arc;
//! use pairwatch::{
//!     chain::RpcPool,
//!     discovery::{Discovery, DiscoveryRequest},
//!     price::CoinGecko,
//!     registry::FactoryRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(FactoryRegistry::builtin());
//!     let chain = Arc::new(
//!         RpcPool::connect([(1, "https://eth.llamarpc.com".parse()?)]).await?,
//!     );
//!     let discovery = Discovery::new(chain, registry.clone(), Arc::new(CoinGecko::new()));
//!
//!     let response = discovery
//!         .discover(&DiscoveryRequest {
//!             chain_id: 1,
//!             factory_addresses: registry.factories(1).iter().map(|f| f.address).collect(),
//!             window_minutes: 5,
//!         })
//!         .await?;
//!
//!     for pair in &response.pairs {
//!         let value = pair
//!             .liquidity
//!             .as_ref()
//!             .map_or("unknown".into(), |s| format!("${}", s.liquidity_usd));
//!         println!("{} created at block {}: {value}", pair.candidate.pair, pair.candidate.creation_block);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Discovery                           │
//! │  (bounded fan-out, deadline, partial-failure merge)    │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │ PairMonitor  │ LiquidityTracker │ HolderAnalyzer       │
//! │ scan + dedup │ reserves × price │ transfer replay      │
//! ├──────────────┴────────┬─────────┴──────────────────────┤
//! │ ChainClient (RpcPool) │ PriceFeed (CoinGecko)          │
//! └───────────────────────┴────────────────────────────────┘
//! ```
//!
//! ## Architecture Decisions
//!
//! ### Capability traits, not direct calls
//!
//! Chain and price access go through the [`chain::ChainClient`] and
//! [`price::PriceFeed`] traits. The pipeline is generic over both, so every
//! property of the system (ordering, dedup, valuation, degradation) is
//! testable against deterministic in-memory fakes without a node.
//!
//! ### Why `impl Future` instead of `async fn` in traits?
//!
//! Capability methods are declared as `fn … -> impl Future<Output = …> +
//! Send`, which keeps the returned futures spawnable even behind generic
//! parameters; `async fn` in traits cannot promise `Send` to generic
//! callers.
//!
//! ### High-Precision Decimals
//!
//! USD math uses [`rust_decimal::Decimal`] end to end, rounded to cents with
//! banker's rounding. Valuations are deterministic and free of float drift.
//!
//! ### Partial failure is the normal case
//!
//! Fresh pairs routinely have unpriceable tokens or broken metadata. The
//! response therefore reports, per pair, which enrichments succeeded, and
//! only malformed input or a fully failed scan fails a request.
//!
//! ## Detection latency
//!
//! The ≤60s detection target is met by *polling*: the scan converts a time
//! window into a block range with per-chain average block times, and the
//! caller re-polls at its own cadence. There is no subscription mechanism;
//! see [`monitor`] for the dedup contract across overlapping polls.

pub mod chain;
pub mod discovery;
pub mod error;
pub mod holders;
pub mod liquidity;
pub mod monitor;
pub mod price;
pub mod registry;

/// Re-exported Ethereum primitives from Alloy.
///
/// Used throughout the crate for addresses, hashes and raw amounts.
pub use alloy::primitives::{Address, B256, U256, address};
/// Re-exported decimal type from rust_decimal.
///
/// Used for all USD-denominated values.
pub use rust_decimal::{Decimal, dec};

pub use crate::{
    discovery::{Discovery, DiscoveryRequest, DiscoveryResponse, EnrichedPair},
    error::{DiscoverError, EnrichError},
    registry::{ChainId, FactoryRegistry},
};
