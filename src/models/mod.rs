use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Canonical instrument identity: a Solana mint address
///
/// Parsed once at the boundary; everything inside the core uses this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mint(String);

impl Mint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl FromStr for Mint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !(32..=44).contains(&s.len()) {
            return Err(ConfigError::InvalidMint(format!(
                "{} (length {}, expected 32-44)",
                s,
                s.len()
            )));
        }
        if let Some(bad) = s.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
            return Err(ConfigError::InvalidMint(format!(
                "{} (invalid character '{}')",
                s, bad
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Mint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mint> for String {
    fn from(mint: Mint) -> Self {
        mint.0
    }
}

impl fmt::Display for Mint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a price sample came from, freshest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Tracker,
    Rpc,
    ExternalApi,
}

/// Price observation in SOL per token. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub source: PriceSource,
}

impl PriceSample {
    pub fn new(price: f64, source: PriceSource) -> Self {
        Self {
            price,
            timestamp: Utc::now(),
            source,
        }
    }
}

/// Trading venue for an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    /// Continuous-issuance venue used before migration
    BondingCurve,
    /// Liquidity-pool venue used after migration
    Amm,
}

impl Venue {
    pub fn for_migration(migrated: bool) -> Self {
        if migrated {
            Venue::Amm
        } else {
            Venue::BondingCurve
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::BondingCurve => f.write_str("bonding-curve"),
            Venue::Amm => f.write_str("amm"),
        }
    }
}

/// Migration status and market data of an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueStatus {
    pub migrated: bool,
    pub venue: Venue,
    pub liquidity_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
}

impl VenueStatus {
    pub fn bonding_curve() -> Self {
        Self {
            migrated: false,
            venue: Venue::BondingCurve,
            liquidity_usd: None,
            market_cap_usd: None,
        }
    }

    pub fn migrated() -> Self {
        Self {
            migrated: true,
            venue: Venue::Amm,
            liquidity_usd: None,
            market_cap_usd: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => f.write_str("BUY"),
            TradeSide::Sell => f.write_str("SELL"),
        }
    }
}

/// Normalized result of a submitted trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub signature: String,
    pub venue: Venue,
    pub side: TradeSide,
    /// SOL spent (buy) or expected SOL received (sell)
    pub sol_amount: f64,
    pub token_amount: f64,
    pub price: f64,
    pub min_out: f64,
    pub executed_at: DateTime<Utc>,
}

/// Output notification emitted once per executed buy/sell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub kind: TradeSide,
    pub mint: Mint,
    pub amount_sol: f64,
    pub price: f64,
    pub reason: String,
    /// Realized profit percent for sells
    pub profit_pct: Option<f64>,
    pub receipt: TradeReceipt,
}
