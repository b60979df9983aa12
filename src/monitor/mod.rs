//! Factory scanning: time window → block range → creation events →
//! canonical pair candidates.
//!
//! [`PairMonitor::scan`] converts the requested window into a block range
//! using the chain's average block time, queries every requested factory for
//! its creation event concurrently, decodes the logs and deduplicates the
//! results into ordered [`PairCandidate`]s.
//!
//! # Detection latency
//!
//! The window-to-blocks conversion is a heuristic built on an average
//! block-time constant; actual block production drifts. Detecting a pair
//! within 60 seconds of creation therefore depends on the *caller's polling
//! cadence*, not on this conversion: a caller polling every 30 seconds with
//! a 2-minute window will not miss a pair, it will just see it twice (and
//! dedup on `(chainId, pairAddress)` across polls).

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    chain::{
        ChainClient, LogQuery, RpcError,
        contracts::{IUniswapV2Factory, IUniswapV3Factory},
    },
    error::DiscoverError,
    registry::{ChainId, FactoryDescriptor, FactoryRegistry, ProtocolVariant},
};

/// Smallest accepted scan window.
pub const MIN_WINDOW_MINUTES: u32 = 1;
/// Largest accepted scan window.
pub const MAX_WINDOW_MINUTES: u32 = 60;

/// A validated scan window in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    minutes: u32,
}

impl TimeWindow {
    /// Validates a window length.
    ///
    /// # Errors
    ///
    /// [`DiscoverError::InvalidWindow`] outside
    /// [`MIN_WINDOW_MINUTES`]..=[`MAX_WINDOW_MINUTES`].
    pub fn from_minutes(minutes: u32) -> Result<Self, DiscoverError> {
        if !(MIN_WINDOW_MINUTES..=MAX_WINDOW_MINUTES).contains(&minutes) {
            return Err(DiscoverError::InvalidWindow(minutes));
        }
        Ok(Self { minutes })
    }

    /// Window length in minutes.
    #[must_use]
    #[inline]
    pub fn minutes(&self) -> u32 {
        self.minutes
    }
}

/// An inclusive block range on one chain. Derived per request and never
/// cached, since block-time estimates drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRange {
    /// First block, inclusive.
    pub from: u64,
    /// Last block, inclusive.
    pub to: u64,
}

impl BlockRange {
    /// Number of blocks covered.
    #[must_use]
    pub fn span(&self) -> u64 {
        self.to.saturating_sub(self.from)
    }
}

/// Estimated number of blocks a window covers on a chain with the given
/// average block time.
pub(crate) fn estimated_blocks(window: TimeWindow, block_time_ms: u64) -> u64 {
    (u64::from(window.minutes()) * 60_000) / block_time_ms.max(1)
}

/// A newly created pair, decoded from a factory creation event.
///
/// Identity is `(chain_id, pair)`; candidates are deduplicated on it before
/// enrichment and across overlapping polls by the caller.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairCandidate {
    /// Pair (V2) or pool (V3) contract address.
    #[serde_as(as = "DisplayFromStr")]
    pub pair: Address,
    /// Factory that emitted the creation event.
    #[serde_as(as = "DisplayFromStr")]
    pub factory: Address,
    /// Chain the pair lives on.
    pub chain_id: ChainId,
    /// Creation event flavour of the emitting factory.
    pub variant: ProtocolVariant,
    /// First token of the pair.
    #[serde_as(as = "DisplayFromStr")]
    pub token0: Address,
    /// Second token of the pair.
    #[serde_as(as = "DisplayFromStr")]
    pub token1: Address,
    /// Block the creation event landed in.
    pub creation_block: u64,
    /// Transaction that created the pair.
    #[serde_as(as = "DisplayFromStr")]
    pub creation_tx: B256,
    /// Timestamp of the creation block, when the lookup succeeded.
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of one factory scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Deduplicated candidates, ascending by `(creation_block, pair)`.
    pub candidates: Vec<PairCandidate>,
    /// The block range that was scanned.
    pub range: BlockRange,
    /// Factories whose log query failed; the scan continued without them.
    pub factory_errors: Vec<(Address, RpcError)>,
    /// Logs that matched the creation topic but failed to decode.
    pub dropped_logs: usize,
}

/// Scans factory contracts for pair/pool creation events.
pub struct PairMonitor<C> {
    chain: Arc<C>,
    registry: Arc<FactoryRegistry>,
}

impl<C> PairMonitor<C>
where
    C: ChainClient,
{
    /// Creates a monitor over the given chain client and registry.
    pub fn new(chain: Arc<C>, registry: Arc<FactoryRegistry>) -> Self {
        Self { chain, registry }
    }

    /// Scans the given factories on `chain_id` for pairs created within
    /// `window`.
    ///
    /// Factories are queried concurrently. A factory whose query fails is
    /// recorded in [`ScanOutcome::factory_errors`] and skipped; the scan only
    /// fails as a whole when the chain head cannot be read or every factory
    /// query fails.
    ///
    /// # Errors
    ///
    /// [`DiscoverError::InvalidChain`] / [`DiscoverError::UnknownFactory`] /
    /// [`DiscoverError::EmptyFactorySet`] on malformed input,
    /// [`DiscoverError::ScanFailed`] when no factory could be scanned.
    pub async fn scan(
        &self,
        chain_id: ChainId,
        factories: &[Address],
        window: TimeWindow,
    ) -> Result<ScanOutcome, DiscoverError> {
        let info = self
            .registry
            .chain(chain_id)
            .ok_or(DiscoverError::InvalidChain(chain_id))?;
        if factories.is_empty() {
            return Err(DiscoverError::EmptyFactorySet);
        }
        let descriptors: Vec<&FactoryDescriptor> = factories
            .iter()
            .map(|&address| {
                self.registry
                    .descriptor(chain_id, address)
                    .ok_or(DiscoverError::UnknownFactory { chain: chain_id, address })
            })
            .collect::<Result<_, _>>()?;

        let head = self
            .chain
            .block_number(chain_id)
            .await
            .map_err(DiscoverError::ScanFailed)?;
        let range = BlockRange {
            from: head.saturating_sub(estimated_blocks(window, info.block_time_ms)),
            to: head,
        };
        info!(
            "scanning {} factories on {} over blocks {}..={}",
            descriptors.len(),
            info.name,
            range.from,
            range.to,
        );

        let scans = join_all(
            descriptors
                .iter()
                .map(|desc| self.scan_factory(chain_id, desc, range)),
        )
        .await;

        let mut seen: HashSet<Address> = HashSet::new();
        let mut candidates: Vec<PairCandidate> = Vec::new();
        let mut factory_errors = Vec::new();
        let mut dropped_logs = 0;

        // Input order decides which factory wins a duplicate pair.
        for (desc, scan) in descriptors.iter().zip(scans) {
            match scan {
                Ok((found, dropped)) => {
                    dropped_logs += dropped;
                    for candidate in found {
                        if seen.insert(candidate.pair) {
                            candidates.push(candidate);
                        } else {
                            debug!("pair {} already seen, skipping", candidate.pair);
                        }
                    }
                }
                Err(err) => {
                    warn!("factory {} scan failed: {err}", desc.address);
                    factory_errors.push((desc.address, err));
                }
            }
        }

        if factory_errors.len() == descriptors.len() {
            let (_, first) = factory_errors.swap_remove(0);
            return Err(DiscoverError::ScanFailed(first));
        }

        self.attach_timestamps(chain_id, &mut candidates).await;

        candidates.sort_by(|a, b| {
            a.creation_block
                .cmp(&b.creation_block)
                .then(a.pair.cmp(&b.pair))
        });
        info!("found {} unique new pairs", candidates.len());

        Ok(ScanOutcome {
            candidates,
            range,
            factory_errors,
            dropped_logs,
        })
    }

    async fn scan_factory(
        &self,
        chain_id: ChainId,
        desc: &FactoryDescriptor,
        range: BlockRange,
    ) -> Result<(Vec<PairCandidate>, usize), RpcError> {
        let logs = self
            .chain
            .logs(
                chain_id,
                LogQuery {
                    address: desc.address,
                    topic0: desc.event_signature(),
                    from_block: range.from,
                    to_block: range.to,
                },
            )
            .await?;

        let total = logs.len();
        let candidates: Vec<PairCandidate> = logs
            .iter()
            .filter_map(|log| decode_creation(desc, log))
            .collect();
        let dropped = total - candidates.len();
        if dropped > 0 {
            warn!("dropped {dropped} undecodable logs from factory {}", desc.address);
        }
        debug!(
            "factory {} ({}): {} creation events",
            desc.address,
            desc.name,
            candidates.len(),
        );
        Ok((candidates, dropped))
    }

    /// Best-effort creation timestamps; a failed block lookup leaves the
    /// field unset rather than degrading the scan.
    async fn attach_timestamps(&self, chain_id: ChainId, candidates: &mut [PairCandidate]) {
        let blocks: HashSet<u64> = candidates.iter().map(|c| c.creation_block).collect();
        let lookups = join_all(blocks.iter().map(|&number| async move {
            (number, self.chain.block_timestamp(chain_id, number).await)
        }))
        .await;

        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();
        for (number, result) in lookups {
            match result {
                Ok(ts) => {
                    if let Some(at) = DateTime::<Utc>::from_timestamp(ts as i64, 0) {
                        timestamps.insert(number, at);
                    }
                }
                Err(err) => debug!("timestamp lookup for block {number} failed: {err}"),
            }
        }
        for candidate in candidates {
            candidate.created_at = timestamps.get(&candidate.creation_block).copied();
        }
    }
}

/// Decodes one creation log into a candidate. Malformed logs (or logs
/// missing block/tx metadata) yield `None` and are counted by the caller.
fn decode_creation(desc: &FactoryDescriptor, log: &Log) -> Option<PairCandidate> {
    let creation_block = log.block_number?;
    let creation_tx = log.transaction_hash?;

    let (pair, token0, token1) = match desc.variant {
        ProtocolVariant::V2 => {
            let event = IUniswapV2Factory::PairCreated::decode_log(&log.inner).ok()?;
            (event.pair, event.token0, event.token1)
        }
        ProtocolVariant::V3 => {
            let event = IUniswapV3Factory::PoolCreated::decode_log(&log.inner).ok()?;
            (event.pool, event.token0, event.token1)
        }
    };

    Some(PairCandidate {
        pair,
        factory: desc.address,
        chain_id: desc.chain_id,
        variant: desc.variant,
        token0,
        token1,
        creation_block,
        creation_tx,
        created_at: None,
    })
}
