//! Chain access layer.
//!
//! Everything the pipeline needs from a blockchain node goes through the
//! [`ChainClient`] capability: log queries bounded by block range, raw
//! `eth_call`s, and block metadata. The live implementation is [`RpcPool`],
//! which holds one Alloy provider per configured chain; tests substitute a
//! deterministic in-memory client.
//!
//! # Overview
//!
//! ```no_run
//! use pairwatch::chain::{ChainClient, RpcPool};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = RpcPool::connect([(1, "https://eth.llamarpc.com".parse()?)]).await?;
//! let head = pool.block_number(1).await?;
//! println!("mainnet head: {head}");
//! # Ok(())
//! # }
//! ```
//!
//! Trait methods return `impl Future<Output = …> + Send` rather than using
//! `async fn`, so futures can be spawned directly even when the client is
//! behind a generic parameter.

pub mod contracts;

use std::{collections::HashMap, future::Future, time::Duration};

use alloy::{
    network::Ethereum,
    primitives::{Address, B256, Bytes, TxKind},
    providers::ProviderBuilder,
    rpc::types::{Filter, Log, TransactionInput, TransactionRequest},
    transports::TransportError,
};
use url::Url;

use crate::registry::ChainId;

/// Provider trait bound used by the live client.
///
/// Implemented by all Alloy providers.
pub trait Provider: alloy::providers::Provider<Ethereum> + Send + Clone + 'static {}

impl<T> Provider for T where T: alloy::providers::Provider<Ethereum> + Send + Clone + 'static {}

/// Type-erased provider, one per configured chain.
pub type DynProvider = alloy::providers::DynProvider<Ethereum>;

/// Default per-call RPC timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A log query bounded by block range, contract address and topic0.
///
/// Mirrors the parameters of `eth_getLogs` that the pipeline actually uses;
/// the live client translates it into an Alloy [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    /// Emitting contract.
    pub address: Address,
    /// Event signature hash (topic0).
    pub topic0: B256,
    /// First block, inclusive.
    pub from_block: u64,
    /// Last block, inclusive.
    pub to_block: u64,
}

/// Errors surfaced by a [`ChainClient`].
///
/// `Timeout` is kept distinct from `Unavailable` so callers can tell a slow
/// endpoint from a dead one.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum RpcError {
    /// The endpoint could not be reached or returned a transport error.
    #[display("chain {chain} endpoint unavailable: {reason}")]
    Unavailable {
        /// Chain the call was issued against.
        chain: ChainId,
        /// Underlying transport error, stringified.
        reason: String,
    },
    /// The call did not complete within the per-call timeout.
    #[display("rpc call on chain {chain} timed out after {timeout:?}")]
    Timeout {
        /// Chain the call was issued against.
        chain: ChainId,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// No endpoint is configured for the requested chain.
    #[display("no rpc endpoint configured for chain {_0}")]
    UnsupportedChain(ChainId),
}

impl std::error::Error for RpcError {}

/// Capability over a blockchain node endpoint.
///
/// All implementations must be cheap to share (`&self` methods only) and
/// read-only against the node; the pipeline never sends transactions.
pub trait ChainClient: Send + Sync {
    /// Returns the current head block number.
    fn block_number(&self, chain: ChainId) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Returns the unix timestamp of the given block.
    fn block_timestamp(
        &self,
        chain: ChainId,
        number: u64,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Returns logs matching the query, in node order.
    fn logs(
        &self,
        chain: ChainId,
        query: LogQuery,
    ) -> impl Future<Output = Result<Vec<Log>, RpcError>> + Send;

    /// Executes a read-only `eth_call` against `to` with the given calldata.
    fn call(
        &self,
        chain: ChainId,
        to: Address,
        calldata: Bytes,
    ) -> impl Future<Output = Result<Bytes, RpcError>> + Send;
}

/// Live [`ChainClient`] backed by one Alloy provider per chain.
///
/// Every call is wrapped in [`DEFAULT_CALL_TIMEOUT`] (configurable via
/// [`RpcPool::with_call_timeout`]); an elapsed timeout surfaces as
/// [`RpcError::Timeout`], transport failures as [`RpcError::Unavailable`].
pub struct RpcPool {
    providers: HashMap<ChainId, DynProvider>,
    call_timeout: Duration,
}

impl RpcPool {
    /// Connects a provider for every `(chain id, url)` pair.
    pub async fn connect(
        endpoints: impl IntoIterator<Item = (ChainId, Url)>,
    ) -> Result<Self, TransportError> {
        let mut providers = HashMap::new();
        for (chain, url) in endpoints {
            let provider = ProviderBuilder::new().connect(url.as_str()).await?;
            providers.insert(chain, DynProvider::new(provider));
        }
        Ok(Self {
            providers,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Chains this pool has a provider for.
    pub fn chains(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.providers.keys().copied()
    }

    fn provider(&self, chain: ChainId) -> Result<&DynProvider, RpcError> {
        self.providers
            .get(&chain)
            .ok_or(RpcError::UnsupportedChain(chain))
    }

    async fn bounded<T>(
        &self,
        chain: ChainId,
        fut: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, RpcError> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(RpcError::Unavailable {
                chain,
                reason: err.to_string(),
            }),
            Err(_) => Err(RpcError::Timeout {
                chain,
                timeout: self.call_timeout,
            }),
        }
    }
}

impl ChainClient for RpcPool {
    fn block_number(&self, chain: ChainId) -> impl Future<Output = Result<u64, RpcError>> + Send {
        async move {
            let provider = self.provider(chain)?;
            self.bounded(chain, provider.get_block_number()).await
        }
    }

    fn block_timestamp(
        &self,
        chain: ChainId,
        number: u64,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send {
        async move {
            let provider = self.provider(chain)?;
            let block = self
                .bounded(chain, provider.get_block_by_number(number.into()))
                .await?;
            let block = block.ok_or_else(|| RpcError::Unavailable {
                chain,
                reason: format!("block {number} not found"),
            })?;
            Ok(block.header.timestamp)
        }
    }

    fn logs(
        &self,
        chain: ChainId,
        query: LogQuery,
    ) -> impl Future<Output = Result<Vec<Log>, RpcError>> + Send {
        async move {
            let provider = self.provider(chain)?;
            let filter = Filter::new()
                .address(query.address)
                .event_signature(query.topic0)
                .from_block(query.from_block)
                .to_block(query.to_block);
            self.bounded(chain, provider.get_logs(&filter)).await
        }
    }

    fn call(
        &self,
        chain: ChainId,
        to: Address,
        calldata: Bytes,
    ) -> impl Future<Output = Result<Bytes, RpcError>> + Send {
        async move {
            let provider = self.provider(chain)?;
            let tx = TransactionRequest {
                to: Some(TxKind::Call(to)),
                input: TransactionInput::new(calldata),
                ..Default::default()
            };
            self.bounded(chain, provider.call(tx)).await
        }
    }
}
