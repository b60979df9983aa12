//! End-to-end discovery scenarios against deterministic fakes.

mod common;

use std::{collections::HashSet, sync::Arc, time::Duration};

use alloy::primitives::{Address, address};
use common::{MockChain, StaticPrices, pair_created_log, pool_created_log, transfer_log};
use pairwatch::{
    dec,
    discovery::{
        Discovery, DiscoveryConfig, DiscoveryRequest, ErrorKind, ZeroLiquidityPolicy,
    },
    error::DiscoverError,
    holders::HolderConfig,
    monitor::{PairMonitor, TimeWindow},
    registry::FactoryRegistry,
};

// Builtin mainnet factories.
const UNI_V2: Address = address!("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
const UNI_V3: Address = address!("0x1F98431c8aD98523631AE4a59f267346ea31F984");
const SUSHI: Address = address!("0xC0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac");

const TOKEN0: Address = address!("0x00000000000000000000000000000000000000a0");
const TOKEN1: Address = address!("0x00000000000000000000000000000000000000b0");
const PAIR: Address = address!("0x00000000000000000000000000000000000000c0");
const PAIR2: Address = address!("0x00000000000000000000000000000000000000c1");
const CREATOR: Address = address!("0x00000000000000000000000000000000000000e0");

fn discovery_over(
    chain: MockChain,
    prices: StaticPrices,
) -> Discovery<MockChain, StaticPrices> {
    Discovery::new(
        Arc::new(chain),
        Arc::new(FactoryRegistry::builtin()),
        Arc::new(prices),
    )
}

fn request(factories: &[Address]) -> DiscoveryRequest {
    DiscoveryRequest {
        chain_id: 1,
        factory_addresses: factories.to_vec(),
        window_minutes: 5,
    }
}

/// One V2 pair created inside the window, fully enrichable.
fn healthy_chain() -> MockChain {
    MockChain::new(1_000)
        .with_log(pair_created_log(UNI_V2, TOKEN0, TOKEN1, PAIR, 995, 0))
        .with_log(transfer_log(PAIR, Address::ZERO, CREATOR, 1_000, 995, 1))
        .with_timestamp(995, 1_700_000_000)
        .with_reserves(PAIR, 500_000, 250)
        .with_decimals(TOKEN0, 0)
        .with_decimals(TOKEN1, 0)
        .with_symbol(TOKEN0, "USDX")
        .with_symbol(TOKEN1, "WETH")
}

fn healthy_prices() -> StaticPrices {
    StaticPrices::new()
        .with(TOKEN0, dec!(1))
        .with(TOKEN1, dec!(2000))
}

#[tokio::test]
async fn test_end_to_end_v2_discovery() {
    let discovery = discovery_over(healthy_chain(), healthy_prices());
    let response = discovery.discover(&request(&[UNI_V2])).await.unwrap();

    assert_eq!(response.total_found, 1);
    assert!(response.partial_errors.is_empty());
    // 5 minutes on mainnet at 12s blocks is 25 blocks back from head.
    assert_eq!(response.scanned_block_range.from, 975);
    assert_eq!(response.scanned_block_range.to, 1_000);

    let pair = &response.pairs[0];
    assert_eq!(pair.candidate.pair, PAIR);
    assert_eq!(pair.candidate.factory, UNI_V2);
    assert_eq!(pair.candidate.creation_block, 995);
    assert!(pair.candidate.created_at.is_some());
    assert!(!pair.flagged);

    let liquidity = pair.liquidity.as_ref().unwrap();
    // 500_000 × $1 + 250 × $2000
    assert_eq!(liquidity.liquidity_usd, dec!(1000000.00));
    assert!(liquidity.liquidity_usd > dec!(0));
    assert_eq!(liquidity.token0.symbol.as_deref(), Some("USDX"));
    assert_eq!(liquidity.as_of_block, 1_000);

    let holders = pair.holders.as_ref().unwrap();
    assert_eq!(holders.holders.len(), 1);
    assert_eq!(holders.holders[0].address, CREATOR);
}

#[tokio::test]
async fn test_response_wire_format() {
    let discovery = discovery_over(healthy_chain(), healthy_prices());
    let response = discovery.discover(&request(&[UNI_V2])).await.unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["totalFound"], 1);
    assert_eq!(json["scannedBlockRange"]["from"], 975);

    // Addresses and decimals travel as strings.
    let pair = &json["pairs"][0];
    assert_eq!(pair["pair"], format!("{PAIR}"));
    assert_eq!(pair["liquidity"]["liquidityUsd"], "1000000.00");
    assert_eq!(pair["liquidity"]["reserve0"], "500000");
    assert_eq!(pair["holders"]["holders"][0]["balance"], "1000");
    // ISO-8601 timestamp.
    assert!(json["timestamp"].as_str().unwrap().contains('T'));

    // The request side of the contract parses from the same conventions.
    let request: DiscoveryRequest = serde_json::from_str(
        r#"{"chainId":1,"factoryAddresses":["0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"],"windowMinutes":5}"#,
    )
    .unwrap();
    assert_eq!(request.chain_id, 1);
    assert_eq!(request.factory_addresses, vec![UNI_V2]);
    assert_eq!(request.window_minutes, 5);
}

#[tokio::test]
async fn test_price_failure_keeps_pair() {
    // No price for TOKEN1: the snapshot is omitted, the pair is not.
    let prices = StaticPrices::new().with(TOKEN0, dec!(1));
    let discovery = discovery_over(healthy_chain(), prices);
    let response = discovery.discover(&request(&[UNI_V2])).await.unwrap();

    assert_eq!(response.total_found, 1);
    let pair = &response.pairs[0];
    assert_eq!(pair.candidate.pair, PAIR);
    assert!(pair.liquidity.is_none());
    assert!(pair.holders.is_some());
    assert!(pair.flagged);
    assert!(
        response
            .partial_errors
            .iter()
            .any(|e| e.subject == PAIR && e.kind == ErrorKind::PriceUnavailable)
    );
}

#[tokio::test]
async fn test_budget_cap_omits_holder_report() {
    let mut chain = healthy_chain();
    for i in 0..10 {
        chain = chain.with_log(transfer_log(PAIR, CREATOR, TOKEN0, 10, 996, 2 + i));
    }
    let discovery = discovery_over(chain, healthy_prices()).with_holder_config(HolderConfig {
        max_transfer_logs: 5,
        ..HolderConfig::default()
    });
    let response = discovery.discover(&request(&[UNI_V2])).await.unwrap();

    let pair = &response.pairs[0];
    assert!(pair.liquidity.is_some());
    assert!(pair.holders.is_none());
    assert!(
        response
            .partial_errors
            .iter()
            .any(|e| e.subject == PAIR && e.kind == ErrorKind::BudgetExceeded)
    );
}

#[tokio::test]
async fn test_partial_factory_failure_degrades() {
    let chain = healthy_chain().with_failing_address(SUSHI);
    let discovery = discovery_over(chain, healthy_prices());
    let response = discovery.discover(&request(&[UNI_V2, SUSHI])).await.unwrap();

    // The healthy factory still produced its pair.
    assert_eq!(response.total_found, 1);
    assert!(
        response
            .partial_errors
            .iter()
            .any(|e| e.subject == SUSHI && e.kind == ErrorKind::RpcUnavailable)
    );
}

#[tokio::test]
async fn test_all_factories_failing_fails_request() {
    let chain = healthy_chain()
        .with_failing_address(UNI_V2)
        .with_failing_address(SUSHI);
    let discovery = discovery_over(chain, healthy_prices());

    let err = discovery
        .discover(&request(&[UNI_V2, SUSHI]))
        .await
        .unwrap_err();
    assert!(err.is_scan_failed());
}

#[tokio::test]
async fn test_invalid_inputs_fail_request() {
    let discovery = discovery_over(healthy_chain(), healthy_prices());

    let unknown = address!("0x00000000000000000000000000000000000000ff");
    assert_eq!(
        discovery.discover(&request(&[unknown])).await.unwrap_err(),
        DiscoverError::UnknownFactory {
            chain: 1,
            address: unknown,
        },
    );

    assert_eq!(
        discovery.discover(&request(&[])).await.unwrap_err(),
        DiscoverError::EmptyFactorySet,
    );

    let mut bad_chain = request(&[UNI_V2]);
    bad_chain.chain_id = 31_337;
    assert_eq!(
        discovery.discover(&bad_chain).await.unwrap_err(),
        DiscoverError::InvalidChain(31_337),
    );

    for minutes in [0, 61] {
        let mut bad_window = request(&[UNI_V2]);
        bad_window.window_minutes = minutes;
        assert_eq!(
            discovery.discover(&bad_window).await.unwrap_err(),
            DiscoverError::InvalidWindow(minutes),
        );
    }
}

#[tokio::test]
async fn test_dedup_first_seen_factory_wins_and_ordering_is_stable() {
    // PAIR is (mis)reported by both factories; PAIR2 only by sushi, earlier.
    let chain = healthy_chain()
        .with_log(pair_created_log(SUSHI, TOKEN0, TOKEN1, PAIR, 995, 0))
        .with_log(pair_created_log(SUSHI, TOKEN0, TOKEN1, PAIR2, 990, 0));
    let discovery = discovery_over(chain, healthy_prices());

    let first = discovery.discover(&request(&[UNI_V2, SUSHI])).await.unwrap();
    assert_eq!(first.total_found, 2);
    // Ascending creation block; duplicate kept once, first-seen factory wins.
    assert_eq!(first.pairs[0].candidate.pair, PAIR2);
    assert_eq!(first.pairs[1].candidate.pair, PAIR);
    assert_eq!(first.pairs[1].candidate.factory, UNI_V2);

    // Identical inputs reproduce the identical candidate sequence.
    let second = discovery.discover(&request(&[UNI_V2, SUSHI])).await.unwrap();
    let keys = |response: &pairwatch::DiscoveryResponse| {
        response
            .pairs
            .iter()
            .map(|p| (p.candidate.pair, p.candidate.factory, p.candidate.creation_block))
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(&first), keys(&second));
}

#[tokio::test]
async fn test_overlapping_windows_never_duplicate_pairs() {
    let chain = Arc::new(
        MockChain::new(1_000)
            .with_log(pair_created_log(UNI_V2, TOKEN0, TOKEN1, PAIR, 995, 0))
            .with_log(pair_created_log(UNI_V2, TOKEN0, TOKEN1, PAIR2, 960, 0)),
    );
    let monitor = PairMonitor::new(chain, Arc::new(FactoryRegistry::builtin()));

    let narrow = monitor
        .scan(1, &[UNI_V2], TimeWindow::from_minutes(5).unwrap())
        .await
        .unwrap();
    let wide = monitor
        .scan(1, &[UNI_V2], TimeWindow::from_minutes(10).unwrap())
        .await
        .unwrap();

    // 5 minutes reaches block 975: only PAIR. 10 minutes reaches both.
    assert_eq!(narrow.candidates.len(), 1);
    assert_eq!(wide.candidates.len(), 2);
    assert!(wide.range.span() > narrow.range.span());

    let mut combined: HashSet<(u64, Address)> = HashSet::new();
    for candidate in narrow.candidates.iter().chain(wide.candidates.iter()) {
        combined.insert((candidate.chain_id, candidate.pair));
    }
    // The union over both polls is still keyed by (chainId, pairAddress).
    assert_eq!(combined.len(), 2);
}

#[tokio::test]
async fn test_v3_pool_valued_by_token_balances() {
    let pool = PAIR;
    let chain = MockChain::new(1_000)
        .with_log(pool_created_log(UNI_V3, TOKEN0, TOKEN1, pool, 990, 0))
        .with_balance(TOKEN0, pool, 500)
        .with_balance(TOKEN1, pool, 100)
        .with_decimals(TOKEN0, 0)
        .with_decimals(TOKEN1, 0);
    let discovery = discovery_over(chain, healthy_prices());
    let response = discovery.discover(&request(&[UNI_V3])).await.unwrap();

    assert_eq!(response.total_found, 1);
    let pair = &response.pairs[0];
    let liquidity = pair.liquidity.as_ref().unwrap();
    // 500 × $1 + 100 × $2000
    assert_eq!(liquidity.liquidity_usd, dec!(200500.00));
    // V3 pools emit no LP transfers: empty report, not a failure.
    assert!(pair.holders.as_ref().unwrap().holders.is_empty());
    assert!(!pair.flagged);
}

#[tokio::test]
async fn test_zero_liquidity_policy() {
    let zeroed = |policy| {
        let chain = healthy_chain().with_reserves(PAIR, 0, 0);
        discovery_over(chain, healthy_prices()).with_config(DiscoveryConfig {
            zero_liquidity: policy,
            ..DiscoveryConfig::default()
        })
    };

    let flagged = zeroed(ZeroLiquidityPolicy::Flag)
        .discover(&request(&[UNI_V2]))
        .await
        .unwrap();
    assert_eq!(flagged.total_found, 1);
    assert!(flagged.pairs[0].flagged);
    assert_eq!(
        flagged.pairs[0].liquidity.as_ref().unwrap().liquidity_usd,
        dec!(0.00)
    );

    let omitted = zeroed(ZeroLiquidityPolicy::Omit)
        .discover(&request(&[UNI_V2]))
        .await
        .unwrap();
    assert_eq!(omitted.total_found, 0);
}

#[tokio::test(start_paused = true)]
async fn test_enrichment_deadline_degrades_gracefully() {
    // Scans are fast, but every eth_call hangs past the deadline.
    let chain = healthy_chain().with_call_delay(Duration::from_secs(5));
    let discovery = discovery_over(chain, healthy_prices()).with_config(DiscoveryConfig {
        request_deadline: Duration::from_secs(1),
        ..DiscoveryConfig::default()
    });
    let response = discovery.discover(&request(&[UNI_V2])).await.unwrap();

    // The pair is still reported. Liquidity (eth_call based) ran out of
    // deadline; holder analysis only needs logs and still completed.
    assert_eq!(response.total_found, 1);
    let pair = &response.pairs[0];
    assert!(pair.liquidity.is_none());
    assert!(pair.holders.is_some());
    assert!(pair.flagged);
    assert!(
        response
            .partial_errors
            .iter()
            .any(|e| e.subject == PAIR && e.kind == ErrorKind::DeadlineExceeded)
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_before_scan_fails_request() {
    let chain = healthy_chain().with_logs_delay(Duration::from_secs(5));
    let discovery = discovery_over(chain, healthy_prices()).with_config(DiscoveryConfig {
        request_deadline: Duration::from_secs(1),
        ..DiscoveryConfig::default()
    });

    let err = discovery.discover(&request(&[UNI_V2])).await.unwrap_err();
    assert_eq!(err, DiscoverError::RequestTimeout);
}
