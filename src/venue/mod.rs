// External collaborator seams: wallet/venue execution and market data
pub mod paper;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::VenueError;
use crate::models::{Mint, Venue, VenueStatus};

pub use paper::{PaperConfig, PaperVenue};

/// Order handed to a venue after the router's safety checks
#[derive(Debug, Clone, PartialEq)]
pub struct VenueOrder {
    pub venue: Venue,
    pub mint: Mint,
    /// SOL for buys, tokens for sells
    pub amount: f64,
    /// Minimum acceptable output (tokens for buys, SOL for sells)
    pub min_out: f64,
    pub slippage: f64,
}

/// Wallet and venue operations the core consumes
///
/// Implementations guarantee at-most-once submission per call and own their
/// own timeout/retry policy.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Migration status, re-read on every call
    async fn venue_status(&self, mint: &Mint) -> Result<VenueStatus, VenueError>;

    /// Fresh price in SOL from the given venue
    async fn quote_price(&self, mint: &Mint, venue: Venue) -> Result<f64, VenueError>;

    /// Wallet SOL balance in lamports
    async fn sol_balance(&self) -> Result<u64, VenueError>;

    /// Wallet token balance for a mint
    async fn token_balance(&self, mint: &Mint) -> Result<f64, VenueError>;

    /// Submit a buy, returning the transaction signature
    async fn buy(&self, order: &VenueOrder) -> Result<String, VenueError>;

    /// Submit a sell, returning the transaction signature
    async fn sell(&self, order: &VenueOrder) -> Result<String, VenueError>;

    /// Low-latency push channel of prices, when the venue offers one
    fn subscribe_prices(&self, _mint: &Mint) -> Option<mpsc::Receiver<f64>> {
        None
    }
}

/// External market-data aggregator, the last resort of the price feed
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price(&self, mint: &Mint) -> Result<f64, VenueError>;

    async fn venue_status(&self, mint: &Mint) -> Result<VenueStatus, VenueError>;
}

/// Reject zero, negative and non-finite quotes
pub(crate) fn checked_price(price: f64) -> Result<f64, VenueError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(VenueError::InvalidPrice(price))
    }
}
