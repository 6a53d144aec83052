use crate::error::VenueError;
use crate::models::{Mint, Venue, VenueStatus};
use crate::venue::{checked_price, PriceOracle};
use crate::Result;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com/latest/dex";
const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
const BONDING_CURVE_DEX_ID: &str = "pumpfun";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // Start with 2 seconds
const RATE_LIMIT_RPM: u32 = 300;

type DexScreenerRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for DexScreener API
///
/// Used as the external aggregator: SOL-denominated price and migration
/// status (a token is migrated once it trades anywhere but the bonding curve).
#[derive(Clone)]
pub struct DexScreenerClient {
    client: Client,
    base_url: String,
    initial_backoff_ms: u64,
    rate_limiter: Arc<DexScreenerRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    #[serde(default)]
    pairs: Option<Vec<PairData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairData {
    chain_id: String,
    dex_id: String,
    quote_token: TokenInfo,
    price_native: String,
    #[serde(default)]
    liquidity: Option<LiquidityData>,
    #[serde(default)]
    market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    address: String,
}

#[derive(Debug, Deserialize)]
struct LiquidityData {
    #[serde(default)]
    usd: Option<f64>,
}

/// Pair-level snapshot for a token, the most liquid SOL pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairSnapshot {
    pub price_sol: f64,
    pub dex_id: String,
    pub migrated: bool,
    pub liquidity_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
}

impl DexScreenerClient {
    pub fn new() -> Self {
        Self::with_base_url(DEXSCREENER_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Override the first retry delay (doubles on each attempt)
    pub fn with_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Get current pair snapshot for a token by its mint address
    /// Includes retry logic with exponential backoff for transient failures
    pub async fn get_pair(&self, token_address: &str) -> Result<PairSnapshot> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.fetch_pair_once(token_address).await {
                Ok(snapshot) => {
                    if attempt > 1 {
                        tracing::info!(
                            "✓ Successfully fetched {} after {} attempts",
                            token_address,
                            attempt
                        );
                    }
                    return Ok(snapshot);
                }
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let backoff_ms = self.initial_backoff_ms * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {}. Retrying in {}ms...",
                            attempt,
                            MAX_RETRIES,
                            token_address,
                            e,
                            backoff_ms
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        // All retries exhausted
        Err(last_error.unwrap_or_else(|| "All retry attempts failed".into()))
    }

    /// Current price in SOL
    pub async fn get_price(&self, token_address: &str) -> Result<f64> {
        Ok(self.get_pair(token_address).await?.price_sol)
    }

    /// Migration status derived from the DEX the most liquid pair trades on
    pub async fn get_venue_status(&self, token_address: &str) -> Result<VenueStatus> {
        let pair = self.get_pair(token_address).await?;
        Ok(VenueStatus {
            migrated: pair.migrated,
            venue: Venue::for_migration(pair.migrated),
            liquidity_usd: pair.liquidity_usd,
            market_cap_usd: pair.market_cap_usd,
        })
    }

    /// Internal method to fetch once (without retry logic)
    async fn fetch_pair_once(&self, token_address: &str) -> Result<PairSnapshot> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/tokens/{}", self.base_url, token_address);

        let response_raw = self.client.get(&url).send().await?.error_for_status()?;
        let response: DexScreenerResponse = response_raw.json().await?;

        let pairs: Vec<PairData> = response
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.chain_id == "solana" && p.quote_token.address == WRAPPED_SOL_MINT)
            .collect();

        // Any listing off the bonding curve means the token has migrated
        let migrated = pairs.iter().any(|p| p.dex_id != BONDING_CURVE_DEX_ID);

        let liquidity = |p: &PairData| p.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
        let pair = pairs
            .iter()
            .max_by(|a, b| liquidity(a).total_cmp(&liquidity(b)))
            .ok_or("No Solana/SOL pair found for token")?;

        Ok(PairSnapshot {
            price_sol: pair.price_native.parse()?,
            dex_id: pair.dex_id.clone(),
            migrated,
            liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd),
            market_cap_usd: pair.market_cap,
        })
    }
}

impl Default for DexScreenerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for DexScreenerClient {
    async fn price(&self, mint: &Mint) -> std::result::Result<f64, VenueError> {
        let price = self
            .get_price(mint.as_str())
            .await
            .map_err(|e| VenueError::Network(e.to_string()))?;
        checked_price(price)
    }

    async fn venue_status(&self, mint: &Mint) -> std::result::Result<VenueStatus, VenueError> {
        self.get_venue_status(mint.as_str())
            .await
            .map_err(|e| VenueError::Network(e.to_string()))
    }
}
