pub mod dexscreener;

pub use dexscreener::{DexScreenerClient, PairSnapshot};
