//! Discovery orchestration.
//!
//! [`Discovery::discover`] is the composition root for one request: it runs
//! the factory scan, fans enrichment out across candidates under a bounded
//! concurrency limit and an overall deadline, and merges whatever survived
//! into a [`DiscoveryResponse`].
//!
//! The propagation policy is asymmetric. Malformed input and a scan that
//! reaches no factory fail the request; everything downstream degrades per
//! pair. An enrichment failure costs that pair its snapshot or report
//! (recorded in `partial_errors`), never the response.
//!
//! # Example
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
//! # async fn example() -> anyhow::Result<()> {
//! let chain = Arc::new(RpcPool::connect([(1, "https://eth.llamarpc.com".parse()?)]).await?);
//! let registry = Arc::new(FactoryRegistry::builtin());
//! let discovery = Discovery::new(chain, registry.clone(), Arc::new(CoinGecko::new()));
//!
//! let request = DiscoveryRequest {
//!     chain_id: 1,
//!     factory_addresses: registry.factories(1).iter().map(|f| f.address).collect(),
//!     window_minutes: 5,
//! };
//! let response = discovery.discover(&request).await?;
//! println!("{} new pairs", response.total_found);
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use tokio::time::{Instant, timeout_at};

use crate::{
    chain::{ChainClient, RpcError},
    error::{DiscoverError, EnrichError},
    holders::{HolderAnalyzer, HolderConfig, HolderReport},
    liquidity::{LiquiditySnapshot, LiquidityTracker},
    monitor::{BlockRange, PairCandidate, PairMonitor, TimeWindow},
    price::PriceFeed,
    registry::{ChainId, FactoryRegistry},
};

/// What to do with candidates that lack positive liquidity evidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ZeroLiquidityPolicy {
    /// Keep the pair, with [`EnrichedPair::flagged`] set.
    #[default]
    Flag,
    /// Drop the pair from the response.
    Omit,
}

/// Orchestration tuning.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum candidates enriched concurrently. Doubles as the RPC rate
    /// bound: excess candidates queue rather than fail.
    pub max_concurrency: usize,
    /// Overall deadline for one request. Enrichments still in flight when it
    /// expires are cancelled and their results omitted.
    pub request_deadline: Duration,
    /// False-positive handling for unverified pairs.
    pub zero_liquidity: ZeroLiquidityPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            request_deadline: Duration::from_secs(25),
            zero_liquidity: ZeroLiquidityPolicy::Flag,
        }
    }
}

/// A discovery request, as received from the API layer.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    /// Target chain.
    pub chain_id: ChainId,
    /// Factory contracts to scan; all must be registered for the chain.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub factory_addresses: Vec<Address>,
    /// Scan window in minutes, 1..=60.
    pub window_minutes: u32,
}

/// Classified cause of a partial failure, serialized for the caller.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A chain endpoint could not be reached.
    RpcUnavailable,
    /// A chain call timed out.
    RpcTimeout,
    /// No USD price could be resolved for a token.
    PriceUnavailable,
    /// Holder analysis exceeded its transfer-log cap.
    BudgetExceeded,
    /// The request deadline expired mid-enrichment.
    DeadlineExceeded,
    /// A token amount did not fit the valuation arithmetic.
    AmountOutOfRange,
}

impl From<&RpcError> for ErrorKind {
    fn from(err: &RpcError) -> Self {
        match err {
            RpcError::Timeout { .. } => Self::RpcTimeout,
            RpcError::Unavailable { .. } | RpcError::UnsupportedChain(_) => Self::RpcUnavailable,
        }
    }
}

impl From<&EnrichError> for ErrorKind {
    fn from(err: &EnrichError) -> Self {
        match err {
            EnrichError::Rpc(rpc) => rpc.into(),
            EnrichError::Price(_) => Self::PriceUnavailable,
            EnrichError::BudgetExceeded { .. } => Self::BudgetExceeded,
            EnrichError::AmountOutOfRange { .. } => Self::AmountOutOfRange,
        }
    }
}

/// One degraded sub-task: which factory or pair, and why.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialError {
    /// Factory address (scan failures) or pair address (enrichment
    /// failures).
    #[serde_as(as = "DisplayFromStr")]
    pub subject: Address,
    /// What went wrong.
    pub kind: ErrorKind,
}

/// A detected pair with whatever enrichment succeeded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPair {
    /// The canonical pair record.
    #[serde(flatten)]
    pub candidate: PairCandidate,
    /// USD valuation; `None` when that enrichment failed.
    pub liquidity: Option<LiquiditySnapshot>,
    /// Holder ranking; `None` when that enrichment failed or was capped.
    pub holders: Option<HolderReport>,
    /// `true` when the pair lacks positive liquidity evidence, the
    /// false-positive signal. Distinguish "no liquidity" (snapshot present,
    /// zero value) from "liquidity unknown" (snapshot absent) via
    /// [`liquidity`](Self::liquidity).
    pub flagged: bool,
}

/// The discovery result returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    /// Enriched pairs, ascending by `(creation_block, pair)`.
    pub pairs: Vec<EnrichedPair>,
    /// Number of pairs in `pairs`.
    pub total_found: usize,
    /// The block range that was scanned.
    pub scanned_block_range: BlockRange,
    /// Creation logs that matched but failed to decode (diagnostic).
    pub dropped_logs: usize,
    /// When the response was assembled.
    pub timestamp: DateTime<Utc>,
    /// Sub-tasks that degraded, per factory or pair.
    pub partial_errors: Vec<PartialError>,
}

/// Composition root for discovery requests.
pub struct Discovery<C, F> {
    chain: Arc<C>,
    monitor: PairMonitor<C>,
    liquidity: LiquidityTracker<C, F>,
    holders: HolderAnalyzer<C>,
    config: DiscoveryConfig,
}

impl<C, F> Discovery<C, F>
where
    C: ChainClient,
    F: PriceFeed,
{
    /// Wires the pipeline with default configuration.
    pub fn new(chain: Arc<C>, registry: Arc<FactoryRegistry>, prices: Arc<F>) -> Self {
        Self {
            monitor: PairMonitor::new(chain.clone(), registry),
            liquidity: LiquidityTracker::new(chain.clone(), prices),
            holders: HolderAnalyzer::new(chain.clone()),
            chain,
            config: DiscoveryConfig::default(),
        }
    }

    /// Overrides orchestration tuning.
    #[must_use]
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides holder-analysis tuning.
    #[must_use]
    pub fn with_holder_config(mut self, config: HolderConfig) -> Self {
        self.holders = HolderAnalyzer::with_config(self.chain.clone(), config);
        self
    }

    /// Serves one discovery request.
    ///
    /// # Errors
    ///
    /// Request-level failures only; see [`DiscoverError`]. Per-pair
    /// enrichment failures degrade into `partial_errors` instead.
    pub async fn discover(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryResponse, DiscoverError> {
        let window = TimeWindow::from_minutes(request.window_minutes)?;
        let deadline = Instant::now() + self.config.request_deadline;

        let outcome = timeout_at(
            deadline,
            self.monitor
                .scan(request.chain_id, &request.factory_addresses, window),
        )
        .await
        .map_err(|_| DiscoverError::RequestTimeout)??;

        let mut partial_errors: Vec<PartialError> = outcome
            .factory_errors
            .iter()
            .map(|(address, err)| PartialError {
                subject: *address,
                kind: err.into(),
            })
            .collect();

        let candidate_count = outcome.candidates.len();
        let results: Vec<(EnrichedPair, Vec<PartialError>)> =
            futures::stream::iter(outcome.candidates)
                .map(|candidate| self.enrich_candidate(candidate, deadline))
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

        let mut pairs = Vec::with_capacity(candidate_count);
        for (pair, errors) in results {
            partial_errors.extend(errors);
            if pair.flagged && self.config.zero_liquidity == ZeroLiquidityPolicy::Omit {
                info!("omitting unverified pair {}", pair.candidate.pair);
                continue;
            }
            pairs.push(pair);
        }
        // buffer_unordered scrambles completion order; restore the scan's.
        pairs.sort_by(|a, b| {
            a.candidate
                .creation_block
                .cmp(&b.candidate.creation_block)
                .then(a.candidate.pair.cmp(&b.candidate.pair))
        });

        info!(
            "discovery on chain {} done: {} pairs, {} partial errors",
            request.chain_id,
            pairs.len(),
            partial_errors.len(),
        );

        Ok(DiscoveryResponse {
            total_found: pairs.len(),
            pairs,
            scanned_block_range: outcome.range,
            dropped_logs: outcome.dropped_logs,
            timestamp: Utc::now(),
            partial_errors,
        })
    }

    /// Runs both enrichments for one candidate under the request deadline.
    /// Liquidity and holder analysis are independent and unordered relative
    /// to each other.
    async fn enrich_candidate(
        &self,
        candidate: PairCandidate,
        deadline: Instant,
    ) -> (EnrichedPair, Vec<PartialError>) {
        let mut errors = Vec::new();
        // Independent deadlines per sub-task: a finished report survives its
        // sibling hanging.
        let (liquidity, holders) = tokio::join!(
            timeout_at(deadline, self.liquidity.enrich(&candidate)),
            timeout_at(deadline, self.holders.analyze(&candidate)),
        );

        let liquidity = settle("liquidity enrichment", candidate.pair, liquidity, &mut errors);
        let holders = settle("holder analysis", candidate.pair, holders, &mut errors);

        let flagged = !liquidity
            .as_ref()
            .is_some_and(|snapshot| snapshot.liquidity_usd > Decimal::ZERO);
        (
            EnrichedPair {
                candidate,
                liquidity,
                holders,
                flagged,
            },
            errors,
        )
    }
}

/// Resolves one timed enrichment result, recording the degradation when it
/// failed or ran out of deadline.
fn settle<T>(
    name: &str,
    pair: Address,
    result: Result<Result<T, EnrichError>, tokio::time::error::Elapsed>,
    errors: &mut Vec<PartialError>,
) -> Option<T> {
    match result {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!("{name} failed for {pair}: {err}");
            errors.push(PartialError {
                subject: pair,
                kind: (&err).into(),
            });
            None
        }
        Err(_) => {
            warn!("deadline expired during {name} for {pair}");
            errors.push(PartialError {
                subject: pair,
                kind: ErrorKind::DeadlineExceeded,
            });
            None
        }
    }
}
