//! Top-holder analysis via transfer replay.
//!
//! [`HolderAnalyzer::analyze`] replays every ERC-20 `Transfer` on the pair
//! contract from its creation block to the current head, accumulates net
//! balances in block-and-log order, and ranks the survivors. Burn/dead
//! addresses never accumulate; balances that end non-positive (including
//! senders whose inbound leg predates the scan) are filtered before ranking.
//!
//! Replay cost is bounded: a pair whose transfer volume exceeds
//! [`HolderConfig::max_transfer_logs`] gets no report at all rather than an
//! unbounded scan. Holder data for old or hyper-active pairs is out of
//! scope.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use alloy::{
    primitives::{Address, I256, U256, address},
    rpc::types::Log,
    sol_types::SolEvent,
};
use log::{debug, warn};
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    chain::{ChainClient, LogQuery, contracts::ERC20},
    error::EnrichError,
    monitor::PairCandidate,
};

/// Zero address; mint/burn counterparty.
pub const ZERO_ADDRESS: Address = Address::ZERO;
/// Conventional dead address.
pub const DEAD_ADDRESS: Address = address!("0x000000000000000000000000000000000000dEaD");

/// Tuning knobs for holder analysis.
#[derive(Debug, Clone)]
pub struct HolderConfig {
    /// Number of holders to report.
    pub top_n: usize,
    /// Hard cap on transfer logs to replay; beyond it the report is omitted.
    pub max_transfer_logs: usize,
    /// Addresses that never count as holders.
    pub burn_addresses: Vec<Address>,
}

impl Default for HolderConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            max_transfer_logs: 5_000,
            burn_addresses: vec![ZERO_ADDRESS, DEAD_ADDRESS],
        }
    }
}

/// One ranked holder.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderEntry {
    /// Holder address.
    #[serde_as(as = "DisplayFromStr")]
    pub address: Address,
    /// Net balance from replay.
    #[serde_as(as = "DisplayFromStr")]
    pub balance: U256,
}

/// Ranked holders of a pair's token, descending by balance with ties broken
/// by ascending address for determinism.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderReport {
    /// The analyzed pair.
    #[serde_as(as = "DisplayFromStr")]
    pub pair: Address,
    /// Up to `top_n` holders.
    pub holders: Vec<HolderEntry>,
    /// Block the replay ran up to.
    pub as_of_block: u64,
}

/// A decoded transfer, keyed for deterministic replay order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Transfer {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block: u64,
    pub log_index: u64,
}

/// Derives top holders for newly detected pairs.
pub struct HolderAnalyzer<C> {
    chain: Arc<C>,
    config: HolderConfig,
    burns: HashSet<Address>,
}

impl<C> HolderAnalyzer<C>
where
    C: ChainClient,
{
    /// Analyzer with the default configuration.
    pub fn new(chain: Arc<C>) -> Self {
        Self::with_config(chain, HolderConfig::default())
    }

    /// Analyzer with a custom configuration.
    pub fn with_config(chain: Arc<C>, config: HolderConfig) -> Self {
        let burns = config.burn_addresses.iter().copied().collect();
        Self {
            chain,
            config,
            burns,
        }
    }

    /// Ranks holders of the candidate's LP token from creation to head.
    ///
    /// A V2 pair is its own LP token, so transfers are replayed on the pair
    /// address; V3 pools emit no LP transfers and naturally yield an empty
    /// report.
    ///
    /// # Errors
    ///
    /// [`EnrichError::Rpc`] when the log query fails,
    /// [`EnrichError::BudgetExceeded`] when the transfer volume is over the
    /// configured cap. Both are per-pair and recoverable.
    pub async fn analyze(&self, candidate: &PairCandidate) -> Result<HolderReport, EnrichError> {
        let chain = candidate.chain_id;
        let head = self.chain.block_number(chain).await?;
        let logs = self
            .chain
            .logs(
                chain,
                LogQuery {
                    address: candidate.pair,
                    topic0: ERC20::Transfer::SIGNATURE_HASH,
                    from_block: candidate.creation_block,
                    to_block: head,
                },
            )
            .await?;

        if logs.len() > self.config.max_transfer_logs {
            return Err(EnrichError::BudgetExceeded {
                pair: candidate.pair,
                logs: logs.len(),
                cap: self.config.max_transfer_logs,
            });
        }

        let total = logs.len();
        let mut transfers: Vec<Transfer> = logs.iter().filter_map(decode_transfer).collect();
        if transfers.len() < total {
            warn!(
                "dropped {} undecodable transfers from {}",
                total - transfers.len(),
                candidate.pair,
            );
        }
        transfers.sort_by_key(|t| (t.block, t.log_index));

        let balances = aggregate_balances(&transfers, &self.burns);
        let holders = rank_holders(balances, self.config.top_n);
        debug!(
            "pair {}: {} transfers, {} ranked holders",
            candidate.pair,
            transfers.len(),
            holders.len(),
        );

        Ok(HolderReport {
            pair: candidate.pair,
            holders,
            as_of_block: head,
        })
    }
}

fn decode_transfer(log: &Log) -> Option<Transfer> {
    let event = ERC20::Transfer::decode_log(&log.inner).ok()?;
    Some(Transfer {
        from: event.from,
        to: event.to,
        value: event.value,
        block: log.block_number?,
        log_index: log.log_index?,
    })
}

/// Net balance per address after replaying `transfers` in order. Burn
/// addresses never accumulate; everything else may transiently go negative
/// (a sender whose inbound leg predates the scan) and is filtered by
/// [`rank_holders`].
pub(crate) fn aggregate_balances(
    transfers: &[Transfer],
    burns: &HashSet<Address>,
) -> HashMap<Address, I256> {
    let mut balances: HashMap<Address, I256> = HashMap::new();
    for transfer in transfers {
        let value = I256::try_from(transfer.value).unwrap_or(I256::MAX);
        if !burns.contains(&transfer.from) {
            let entry = balances.entry(transfer.from).or_default();
            *entry = entry.saturating_sub(value);
        }
        if !burns.contains(&transfer.to) {
            let entry = balances.entry(transfer.to).or_default();
            *entry = entry.saturating_add(value);
        }
    }
    balances
}

/// Filters non-positive balances and ranks the rest: descending balance,
/// ascending address on ties, truncated to `top_n`.
pub(crate) fn rank_holders(balances: HashMap<Address, I256>, top_n: usize) -> Vec<HolderEntry> {
    let mut holders: Vec<HolderEntry> = balances
        .into_iter()
        .filter(|(_, balance)| balance.is_positive())
        .map(|(address, balance)| HolderEntry {
            address,
            balance: balance.unsigned_abs(),
        })
        .collect();
    holders.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.address.cmp(&b.address)));
    holders.truncate(top_n);
    holders
}
