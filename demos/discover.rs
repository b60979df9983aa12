use std::sync::Arc;

use clap::Parser;
use pairwatch::{
    Address,
    chain::RpcPool,
    discovery::{Discovery, DiscoveryRequest},
    price::CoinGecko,
    registry::FactoryRegistry,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Chain id to scan.
    #[arg(short, long, default_value_t = 1)]
    chain: u64,
    /// Factory addresses, comma separated. Defaults to every builtin factory
    /// for the chain.
    #[arg(short, long, value_delimiter = ',')]
    factories: Vec<Address>,
    /// Scan window in minutes.
    #[arg(short, long, default_value_t = 5)]
    window: u32,
    /// RPC url.
    #[arg(short, long, default_value = "https://eth.llamarpc.com")]
    rpc_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _ = simple_logger::init_with_level(log::Level::Info);
    let args = Cli::parse();

    let registry = Arc::new(FactoryRegistry::builtin());
    let factories = if args.factories.is_empty() {
        registry
            .factories(args.chain)
            .iter()
            .map(|factory| factory.address)
            .collect()
    } else {
        args.factories
    };

    let chain = Arc::new(RpcPool::connect([(args.chain, args.rpc_url.parse()?)]).await?);
    let discovery = Discovery::new(chain, registry, Arc::new(CoinGecko::new()));

    let response = discovery
        .discover(&DiscoveryRequest {
            chain_id: args.chain,
            factory_addresses: factories,
            window_minutes: args.window,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
