//! AMM and token contract bindings.
//!
//! Inline `sol!` definitions for the contracts the pipeline touches: the two
//! factory flavours (V2 `PairCreated`, V3 `PoolCreated`), the V2 pair itself
//! and the ERC-20 surface used for reserve and holder queries.
//!
//! Event signature hashes are always taken from these types
//! ([`alloy::sol_types::SolEvent::SIGNATURE_HASH`]), never hand-written hex.

use alloy::sol;

sol! {
    /// Uniswap V2 style factory. Forks (SushiSwap, QuickSwap, PancakeSwap,
    /// Trader Joe) emit the identical event.
    #[derive(Debug)]
    interface IUniswapV2Factory {
        event PairCreated(address indexed token0, address indexed token1, address pair, uint256 allPairsLength);
    }

    /// Uniswap V3 style factory.
    #[derive(Debug)]
    interface IUniswapV3Factory {
        event PoolCreated(address indexed token0, address indexed token1, uint24 indexed fee, int24 tickSpacing, address pool);
    }

    /// The V2 pair contract. `getReserves` is the authoritative reserve
    /// source for V2; V3 pools do not expose it.
    #[derive(Debug)]
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        function token0() external view returns (address);
        function token1() external view returns (address);
    }

    /// Minimal ERC-20 surface: metadata for valuation, `balanceOf` for V3
    /// reserve reads, `Transfer` for holder replay. The V2 pair is itself an
    /// ERC-20 (the LP token), so `Transfer` applies to pair addresses too.
    #[derive(Debug)]
    interface ERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
    }
}
