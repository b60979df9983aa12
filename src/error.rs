//! Error taxonomy for the discovery pipeline.
//!
//! Two tiers, mirroring the propagation policy:
//!
//! - [`DiscoverError`]: request-level failures. Malformed input or a scan
//!   that cannot reach any factory fails the whole request.
//! - [`EnrichError`]: per-pair enrichment failures. These never fail a
//!   request; the orchestrator converts them into omitted snapshot/report
//!   fields plus entries in the response's partial-error list.
//!
//! Undecodable logs form a third, silent tier: dropped at the event level
//! and surfaced only as counters.

use alloy::primitives::Address;

use crate::{
    chain::RpcError,
    monitor::{MAX_WINDOW_MINUTES, MIN_WINDOW_MINUTES},
    price::PriceError,
    registry::ChainId,
};

/// Request-level failure: the discovery request itself cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum DiscoverError {
    /// The chain id is not configured in the registry.
    #[display("chain {_0} is not supported")]
    InvalidChain(ChainId),
    /// A requested factory address is not registered for the chain.
    #[display("factory {address} is not registered for chain {chain}")]
    UnknownFactory {
        /// The requested chain.
        chain: ChainId,
        /// The unrecognized factory address.
        address: Address,
    },
    /// The time window is outside the accepted range.
    #[display("window must be {MIN_WINDOW_MINUTES}..={MAX_WINDOW_MINUTES} minutes, got {_0}")]
    InvalidWindow(u32),
    /// The request named no factories at all.
    #[display("factory list is empty")]
    EmptyFactorySet,
    /// Every factory scan failed; no partial data exists.
    #[display("scan failed on every factory: {_0}")]
    ScanFailed(RpcError),
    /// The request deadline expired before the scan produced candidates.
    #[display("request deadline expired before the scan completed")]
    RequestTimeout,
}

impl std::error::Error for DiscoverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ScanFailed(err) => Some(err),
            _ => None,
        }
    }
}

/// Per-pair enrichment failure. Recoverable by design: the pair stays in the
/// response with the affected field omitted.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum EnrichError {
    /// A chain RPC call failed.
    #[display("{_0}")]
    Rpc(RpcError),
    /// A USD price lookup failed.
    #[display("{_0}")]
    Price(PriceError),
    /// Holder analysis would exceed the configured transfer-log cap.
    #[display("transfer volume for {pair} ({logs} logs) exceeds cap of {cap}")]
    BudgetExceeded {
        /// The pair whose analysis was aborted.
        pair: Address,
        /// Observed log count.
        logs: usize,
        /// Configured cap.
        cap: usize,
    },
    /// A token amount did not fit the valuation arithmetic.
    #[display("amount of token {token} out of range for valuation")]
    AmountOutOfRange {
        /// The offending token.
        token: Address,
    },
}

impl std::error::Error for EnrichError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(err) => Some(err),
            Self::Price(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RpcError> for EnrichError {
    fn from(err: RpcError) -> Self {
        Self::Rpc(err)
    }
}

impl From<PriceError> for EnrichError {
    fn from(err: PriceError) -> Self {
        Self::Price(err)
    }
}
