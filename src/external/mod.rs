pub mod coingecko;
pub mod cryptopanic;
pub mod market_data;
pub mod starknet;
