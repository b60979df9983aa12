//! USD price lookups.
//!
//! The [`PriceFeed`] capability resolves a token address to a USD unit
//! price. The live implementation, [`CoinGecko`], queries the CoinGecko
//! simple-price API for a static set of well-known tokens per chain and
//! caches results for a configurable TTL; anything outside that set fails
//! with [`PriceError::UnknownToken`] and the affected pair simply loses its
//! liquidity valuation.

use std::{
    collections::HashMap,
    future::Future,
    time::{Duration, Instant},
};

use alloy::primitives::{Address, address};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use crate::registry::ChainId;

/// Default CoinGecko API base.
pub const DEFAULT_API_URL: &str = "https://api.coingecko.com/api/v3";

/// How long a cached quote stays fresh by default.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Price lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum PriceError {
    /// No USD price source is known for this token.
    #[display("no usd price source for token {_0}")]
    UnknownToken(Address),
    /// The price source could not be reached or answered malformed data.
    #[display("price source unavailable: {_0}")]
    Unavailable(String),
}

impl std::error::Error for PriceError {}

/// Capability resolving a token address to a USD unit price.
///
/// Implementations may serve cached values up to their configured staleness
/// tolerance.
pub trait PriceFeed: Send + Sync {
    /// USD price of one whole unit of `token` on `chain`.
    fn usd_price(
        &self,
        chain: ChainId,
        token: Address,
    ) -> impl Future<Output = Result<Decimal, PriceError>> + Send;
}

/// TTL-bounded quote cache.
///
/// Concurrent readers share the lock; writers insert after fetching. Two
/// tasks racing on a cold key may both fetch; the second insert simply
/// overwrites with an equally fresh quote.
pub(crate) struct PriceCache {
    quotes: RwLock<HashMap<Address, Quote>>,
    ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Quote {
    price: Decimal,
    fetched_at: Instant,
}

impl PriceCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached price if it is still fresh.
    pub(crate) async fn get(&self, token: Address) -> Option<Decimal> {
        let quotes = self.quotes.read().await;
        let quote = quotes.get(&token)?;
        (quote.fetched_at.elapsed() <= self.ttl).then_some(quote.price)
    }

    pub(crate) async fn insert(&self, token: Address, price: Decimal) {
        self.quotes.write().await.insert(
            token,
            Quote {
                price,
                fetched_at: Instant::now(),
            },
        );
    }
}

/// CoinGecko-backed [`PriceFeed`] with a TTL cache.
///
/// # Example
///
/// ```no_run
/// use pairwatch::price::{CoinGecko, PriceFeed};
/// use alloy::primitives::address;
///
/// # async fn example() -> anyhow::Result<()> {
/// let feed = CoinGecko::new();
/// let weth = address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
/// let price = feed.usd_price(1, weth).await?;
/// println!("WETH: ${price}");
/// # Ok(())
/// # }
/// ```
pub struct CoinGecko {
    http: reqwest::Client,
    base_url: Url,
    cache: PriceCache,
}

impl CoinGecko {
    /// Client against the public CoinGecko API with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_API_URL.parse().expect("static url"))
    }

    /// Client against a custom API base (e.g. a proxy).
    #[must_use]
    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            cache: PriceCache::new(DEFAULT_CACHE_TTL),
        }
    }

    /// Overrides the cache TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache = PriceCache::new(ttl);
        self
    }

    async fn fetch(&self, id: &str) -> Result<Decimal, PriceError> {
        #[derive(Deserialize)]
        struct PricePoint {
            usd: Decimal,
        }

        let url = format!("{}/simple/price", self.base_url.as_str().trim_end_matches('/'));
        let response = self
            .http
            .get(url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| PriceError::Unavailable(err.to_string()))?;

        let mut body: HashMap<String, PricePoint> = response
            .json()
            .await
            .map_err(|err| PriceError::Unavailable(err.to_string()))?;

        body.remove(id)
            .map(|point| point.usd)
            .ok_or_else(|| PriceError::Unavailable(format!("no usd quote for {id}")))
    }
}

impl Default for CoinGecko {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceFeed for CoinGecko {
    async fn usd_price(&self, chain: ChainId, token: Address) -> Result<Decimal, PriceError> {
        let id = gecko_id(chain, token).ok_or(PriceError::UnknownToken(token))?;

        if let Some(price) = self.cache.get(token).await {
            debug!("price cache hit for {token} ({id}): {price}");
            return Ok(price);
        }

        let price = self.fetch(id).await.inspect_err(|err| {
            warn!("price fetch failed for {token} ({id}): {err}");
        })?;
        self.cache.insert(token, price).await;
        debug!("fetched {id} = ${price}");
        Ok(price)
    }
}

/// CoinGecko id for a well-known token address, per chain.
///
/// The set is deliberately small: the tokens that anchor the USD side of
/// freshly created pairs. Long-tail tokens have no reliable unit price at
/// creation time anyway.
#[must_use]
pub fn gecko_id(chain: ChainId, token: Address) -> Option<&'static str> {
    let table: &[(Address, &str)] = match chain {
        // Ethereum
        1 => &[
            (address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), "ethereum"),      // WETH
            (address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), "usd-coin"),      // USDC
            (address!("0xdAC17F958D2ee523a2206206994597C13D831ec7"), "tether"),        // USDT
            (address!("0x6B175474E89094C44Da98b954EedeAC495271d0F"), "dai"),           // DAI
            (address!("0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"), "wrapped-bitcoin"), // WBTC
        ],
        // Polygon
        137 => &[
            (address!("0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270"), "matic-network"), // WMATIC
            (address!("0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"), "ethereum"),      // WETH
            (address!("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174"), "usd-coin"),      // USDC.e
        ],
        // Arbitrum
        42161 => &[
            (address!("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"), "ethereum"),      // WETH
            (address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"), "usd-coin"),      // USDC
            (address!("0x912CE59144191C1204E64559FE8253a0e49E6548"), "arbitrum"),      // ARB
        ],
        // Optimism
        10 => &[
            (address!("0x4200000000000000000000000000000000000006"), "ethereum"),      // WETH
            (address!("0x4200000000000000000000000000000000000042"), "optimism"),      // OP
            (address!("0x7F5c764cBc14f9669B88837ca1490cCa17c31607"), "usd-coin"),      // USDC.e
        ],
        // Base
        8453 => &[
            (address!("0x4200000000000000000000000000000000000006"), "ethereum"),      // WETH
            (address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"), "usd-coin"),      // USDC
        ],
        // BNB Chain
        56 => &[
            (address!("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"), "binancecoin"),   // WBNB
            (address!("0x55d398326f99059fF775485246999027B3197955"), "tether"),        // USDT
        ],
        // Avalanche
        43114 => &[
            (address!("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"), "avalanche-2"),   // WAVAX
            (address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"), "usd-coin"),      // USDC
        ],
        _ => &[],
    };

    table
        .iter()
        .find_map(|(addr, id)| (*addr == token).then_some(*id))
}

#[cfg(test)]
mod tests {
    use rust_decimal::dec;

    use super::*;

    const WETH: Address = address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

    #[test]
    fn test_gecko_id_mapping() {
        assert_eq!(gecko_id(1, WETH), Some("ethereum"));
        // Same address is not assumed to exist on other chains.
        assert_eq!(gecko_id(137, WETH), None);
        assert_eq!(gecko_id(31337, WETH), None);
    }

    #[tokio::test]
    async fn test_cache_serves_fresh_quotes() {
        let cache = PriceCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(WETH).await, None);

        cache.insert(WETH, dec!(3000)).await;
        assert_eq!(cache.get(WETH).await, Some(dec!(3000)));
    }

    #[tokio::test]
    async fn test_cache_expires_quotes() {
        let cache = PriceCache::new(Duration::ZERO);
        cache.insert(WETH, dec!(3000)).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get(WETH).await, None);
    }
}
