//! Deterministic in-memory fakes for the chain and price capabilities, plus
//! log builders for creation and transfer events.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use alloy::{
    primitives::{Address, B256, Bytes, U256, aliases::U112},
    rpc::types::Log,
    sol_types::{SolCall, SolEvent, SolValue},
};
use pairwatch::{
    chain::{
        ChainClient, LogQuery, RpcError,
        contracts::{ERC20, IUniswapV2Factory, IUniswapV3Factory, IUniswapV2Pair},
    },
    price::{PriceError, PriceFeed},
    registry::ChainId,
};
use rust_decimal::Decimal;

/// In-memory [`ChainClient`] serving canned logs and call results.
#[derive(Debug, Default)]
pub struct MockChain {
    pub head: u64,
    pub timestamps: HashMap<u64, u64>,
    pub logs: Vec<Log>,
    /// V2 reserves per pair address.
    pub reserves: HashMap<Address, (u128, u128)>,
    pub decimals: HashMap<Address, u8>,
    pub symbols: HashMap<Address, String>,
    /// token → holder → balance, for V3 `balanceOf` reserve reads.
    pub balances: HashMap<(Address, Address), u128>,
    /// Addresses whose log queries fail with `Unavailable`.
    pub failing: HashSet<Address>,
    /// Artificial latency on `eth_call`s (enrichment path).
    pub call_delay: Option<Duration>,
    /// Artificial latency on log queries (scan path).
    pub logs_delay: Option<Duration>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: Log) -> Self {
        self.logs.push(log);
        self
    }

    pub fn with_timestamp(mut self, block: u64, unix: u64) -> Self {
        self.timestamps.insert(block, unix);
        self
    }

    pub fn with_reserves(mut self, pair: Address, reserve0: u128, reserve1: u128) -> Self {
        self.reserves.insert(pair, (reserve0, reserve1));
        self
    }

    pub fn with_decimals(mut self, token: Address, decimals: u8) -> Self {
        self.decimals.insert(token, decimals);
        self
    }

    pub fn with_symbol(mut self, token: Address, symbol: &str) -> Self {
        self.symbols.insert(token, symbol.to_string());
        self
    }

    pub fn with_balance(mut self, token: Address, holder: Address, balance: u128) -> Self {
        self.balances.insert((token, holder), balance);
        self
    }

    pub fn with_failing_address(mut self, address: Address) -> Self {
        self.failing.insert(address);
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn with_logs_delay(mut self, delay: Duration) -> Self {
        self.logs_delay = Some(delay);
        self
    }

    fn unavailable(&self, chain: ChainId, reason: &str) -> RpcError {
        RpcError::Unavailable {
            chain,
            reason: reason.to_string(),
        }
    }
}

impl ChainClient for MockChain {
    async fn block_number(&self, _chain: ChainId) -> Result<u64, RpcError> {
        Ok(self.head)
    }

    async fn block_timestamp(&self, chain: ChainId, number: u64) -> Result<u64, RpcError> {
        self.timestamps
            .get(&number)
            .copied()
            .ok_or_else(|| self.unavailable(chain, "no timestamp"))
    }

    async fn logs(&self, chain: ChainId, query: LogQuery) -> Result<Vec<Log>, RpcError> {
        if let Some(delay) = self.logs_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&query.address) {
            return Err(self.unavailable(chain, "mock outage"));
        }
        Ok(self
            .logs
            .iter()
            .filter(|log| {
                log.inner.address == query.address
                    && log.inner.topics().first() == Some(&query.topic0)
                    && log
                        .block_number
                        .is_some_and(|b| (query.from_block..=query.to_block).contains(&b))
            })
            .cloned()
            .collect())
    }

    async fn call(&self, chain: ChainId, to: Address, calldata: Bytes) -> Result<Bytes, RpcError> {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        let selector: [u8; 4] = calldata
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| self.unavailable(chain, "short calldata"))?;

        let encoded = match selector {
            IUniswapV2Pair::getReservesCall::SELECTOR => {
                let (reserve0, reserve1) = self
                    .reserves
                    .get(&to)
                    .copied()
                    .ok_or_else(|| self.unavailable(chain, "no reserves"))?;
                (U112::from(reserve0), U112::from(reserve1), 0u32).abi_encode()
            }
            ERC20::decimalsCall::SELECTOR => self
                .decimals
                .get(&to)
                .copied()
                .ok_or_else(|| self.unavailable(chain, "no decimals"))?
                .abi_encode(),
            ERC20::symbolCall::SELECTOR => self
                .symbols
                .get(&to)
                .cloned()
                .ok_or_else(|| self.unavailable(chain, "no symbol"))?
                .abi_encode(),
            ERC20::balanceOfCall::SELECTOR => {
                let call = ERC20::balanceOfCall::abi_decode(&calldata)
                    .map_err(|_| self.unavailable(chain, "bad balanceOf calldata"))?;
                let balance = self.balances.get(&(to, call.owner)).copied().unwrap_or(0);
                U256::from(balance).abi_encode()
            }
            _ => return Err(self.unavailable(chain, "unexpected call")),
        };
        Ok(encoded.into())
    }
}

/// [`PriceFeed`] backed by a static table.
#[derive(Debug, Default)]
pub struct StaticPrices {
    prices: HashMap<Address, Decimal>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: Address, price: Decimal) -> Self {
        self.prices.insert(token, price);
        self
    }
}

impl PriceFeed for StaticPrices {
    async fn usd_price(&self, _chain: ChainId, token: Address) -> Result<Decimal, PriceError> {
        self.prices
            .get(&token)
            .copied()
            .ok_or(PriceError::UnknownToken(token))
    }
}

fn log_at(address: Address, data: alloy::primitives::LogData, block: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data },
        block_hash: None,
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(B256::with_last_byte(0x42)),
        transaction_index: None,
        log_index: Some(log_index),
        removed: false,
    }
}

pub fn pair_created_log(
    factory: Address,
    token0: Address,
    token1: Address,
    pair: Address,
    block: u64,
    log_index: u64,
) -> Log {
    let event = IUniswapV2Factory::PairCreated {
        token0,
        token1,
        pair,
        allPairsLength: U256::from(1),
    };
    log_at(factory, event.encode_log_data(), block, log_index)
}

pub fn pool_created_log(
    factory: Address,
    token0: Address,
    token1: Address,
    pool: Address,
    block: u64,
    log_index: u64,
) -> Log {
    let event = IUniswapV3Factory::PoolCreated {
        token0,
        token1,
        fee: alloy::primitives::aliases::U24::from(3000),
        tickSpacing: alloy::primitives::aliases::I24::try_from(60).unwrap(),
        pool,
    };
    log_at(factory, event.encode_log_data(), block, log_index)
}

pub fn transfer_log(
    token: Address,
    from: Address,
    to: Address,
    value: u128,
    block: u64,
    log_index: u64,
) -> Log {
    let event = ERC20::Transfer {
        from,
        to,
        value: U256::from(value),
    };
    log_at(token, event.encode_log_data(), block, log_index)
}
