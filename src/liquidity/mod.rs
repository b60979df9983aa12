//! Liquidity valuation.
//!
//! [`LiquidityTracker::enrich`] reads a pair's on-chain reserves, resolves
//! both tokens' metadata and USD prices, and values the pool in USD:
//!
//! ```text
//! liquidity_usd = amount0 · price0 + amount1 · price1
//! ```
//!
//! computed in [`Decimal`] and rounded to 2 decimal places with banker's
//! rounding so identical inputs always value identically. A snapshot with
//! `liquidity_usd > 0` is the positive evidence the false-positive policy
//! keys on; any failure here is per-pair and recoverable.

use std::sync::Arc;

use alloy::{
    primitives::{Address, U256},
    sol_types::SolCall,
};
use log::{debug, warn};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    chain::{
        ChainClient, RpcError,
        contracts::{ERC20, IUniswapV2Pair},
    },
    error::EnrichError,
    monitor::PairCandidate,
    price::PriceFeed,
    registry::{ChainId, ProtocolVariant},
};

/// Token metadata resolved during valuation.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMeta {
    /// Token contract address.
    #[serde_as(as = "DisplayFromStr")]
    pub address: Address,
    /// ERC-20 symbol; `None` when the contract does not answer.
    pub symbol: Option<String>,
    /// ERC-20 decimals.
    pub decimals: u8,
}

/// USD-valued reserves of a pair as of a specific block.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquiditySnapshot {
    /// The valued pair.
    #[serde_as(as = "DisplayFromStr")]
    pub pair: Address,
    /// Raw reserve of token0.
    #[serde_as(as = "DisplayFromStr")]
    pub reserve0: U256,
    /// Raw reserve of token1.
    #[serde_as(as = "DisplayFromStr")]
    pub reserve1: U256,
    /// token0 metadata.
    pub token0: TokenMeta,
    /// token1 metadata.
    pub token1: TokenMeta,
    /// USD unit price of token0.
    #[serde(with = "rust_decimal::serde::str")]
    pub token0_price_usd: Decimal,
    /// USD unit price of token1.
    #[serde(with = "rust_decimal::serde::str")]
    pub token1_price_usd: Decimal,
    /// Total pool value in USD, 2 decimal places.
    #[serde(with = "rust_decimal::serde::str")]
    pub liquidity_usd: Decimal,
    /// Block the reserves were read at.
    pub as_of_block: u64,
}

/// Converts a raw token amount into whole units.
///
/// `None` when the amount or the decimals exceed what [`Decimal`] can carry
/// (mantissa is i128, scale caps at 28).
pub(crate) fn token_amount(raw: U256, decimals: u8) -> Option<Decimal> {
    // Decimal carries at most 28 fractional digits.
    if decimals > 28 {
        return None;
    }
    let mantissa: i128 = raw.try_into().ok()?;
    Some(Decimal::from_i128_with_scale(mantissa, u32::from(decimals)))
}

/// Closed-form pool valuation, rounded to cents with banker's rounding.
#[must_use]
pub fn liquidity_usd(
    amount0: Decimal,
    amount1: Decimal,
    price0: Decimal,
    price1: Decimal,
) -> Decimal {
    let mut usd = (amount0 * price0 + amount1 * price1)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    // Serialize whole-dollar values as "x.00" too.
    usd.rescale(2);
    usd
}

/// Values newly detected pairs in USD.
pub struct LiquidityTracker<C, F> {
    chain: Arc<C>,
    prices: Arc<F>,
}

impl<C, F> LiquidityTracker<C, F>
where
    C: ChainClient,
    F: PriceFeed,
{
    /// Creates a tracker over the given chain client and price feed.
    pub fn new(chain: Arc<C>, prices: Arc<F>) -> Self {
        Self { chain, prices }
    }

    /// Values the candidate's reserves as of the current head.
    ///
    /// # Errors
    ///
    /// All failures are per-pair and recoverable: RPC errors, unknown or
    /// unavailable prices, amounts outside valuation range. The caller omits
    /// the snapshot and keeps the pair.
    pub async fn enrich(&self, candidate: &PairCandidate) -> Result<LiquiditySnapshot, EnrichError> {
        let chain = candidate.chain_id;
        let as_of_block = self.chain.block_number(chain).await?;
        let (reserve0, reserve1) = self.reserves(candidate).await?;

        let (token0, token1) = tokio::try_join!(
            self.token_meta(chain, candidate.token0),
            self.token_meta(chain, candidate.token1),
        )?;
        let (price0, price1) = tokio::try_join!(
            self.prices.usd_price(chain, candidate.token0),
            self.prices.usd_price(chain, candidate.token1),
        )?;

        let amount0 = token_amount(reserve0, token0.decimals).ok_or(
            EnrichError::AmountOutOfRange {
                token: candidate.token0,
            },
        )?;
        let amount1 = token_amount(reserve1, token1.decimals).ok_or(
            EnrichError::AmountOutOfRange {
                token: candidate.token1,
            },
        )?;

        let liquidity = liquidity_usd(amount0, amount1, price0, price1);
        if liquidity <= Decimal::ZERO {
            warn!("pair {} has no valued liquidity", candidate.pair);
        } else {
            debug!("pair {} liquidity ${liquidity}", candidate.pair);
        }

        Ok(LiquiditySnapshot {
            pair: candidate.pair,
            reserve0,
            reserve1,
            token0,
            token1,
            token0_price_usd: price0,
            token1_price_usd: price1,
            liquidity_usd: liquidity,
            as_of_block,
        })
    }

    /// Reads reserves: V2 pairs expose `getReserves`, V3 pools are valued by
    /// their token balances.
    async fn reserves(&self, candidate: &PairCandidate) -> Result<(U256, U256), EnrichError> {
        let chain = candidate.chain_id;
        match candidate.variant {
            ProtocolVariant::V2 => {
                let reserves = self
                    .call(chain, candidate.pair, IUniswapV2Pair::getReservesCall {})
                    .await?;
                Ok((
                    U256::from(reserves.reserve0),
                    U256::from(reserves.reserve1),
                ))
            }
            ProtocolVariant::V3 => {
                let (balance0, balance1) = tokio::try_join!(
                    self.call(chain, candidate.token0, ERC20::balanceOfCall { owner: candidate.pair }),
                    self.call(chain, candidate.token1, ERC20::balanceOfCall { owner: candidate.pair }),
                )?;
                Ok((balance0, balance1))
            }
        }
    }

    async fn token_meta(&self, chain: ChainId, token: Address) -> Result<TokenMeta, EnrichError> {
        let decimals = self.call(chain, token, ERC20::decimalsCall {}).await?;
        // Symbol is cosmetic; plenty of tokens answer nothing useful.
        let symbol = self.call(chain, token, ERC20::symbolCall {}).await.ok();
        Ok(TokenMeta {
            address: token,
            symbol,
            decimals,
        })
    }

    async fn call<T: SolCall>(
        &self,
        chain: ChainId,
        to: Address,
        call: T,
    ) -> Result<T::Return, EnrichError> {
        let returned = self
            .chain
            .call(chain, to, call.abi_encode().into())
            .await?;
        T::abi_decode_returns(&returned).map_err(|err| {
            EnrichError::Rpc(RpcError::Unavailable {
                chain,
                reason: format!("undecodable return data from {to}: {err}"),
            })
        })
    }
}
