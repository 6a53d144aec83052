use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{checked_price, PriceOracle, VenueClient, VenueOrder};
use crate::error::VenueError;
use crate::models::{Mint, Venue, VenueStatus, LAMPORTS_PER_SOL};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Starting wallet balance in SOL
    pub initial_sol: f64,
    /// Network fee charged per transaction, in lamports
    pub fee_lamports: u64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_sol: 1.0,
            fee_lamports: 5_000,
        }
    }
}

#[derive(Debug, Default)]
struct PaperWallet {
    lamports: u64,
    tokens: HashMap<Mint, f64>,
    trades: u64,
}

/// Simulated wallet that fills at the oracle's current price
///
/// Enforces the order's minimum output, so slippage protection behaves as it
/// would against a live venue.
pub struct PaperVenue {
    market: Arc<dyn PriceOracle>,
    wallet: Mutex<PaperWallet>,
    fee_lamports: u64,
}

impl PaperVenue {
    pub fn new(market: Arc<dyn PriceOracle>, config: &PaperConfig) -> Self {
        Self {
            market,
            wallet: Mutex::new(PaperWallet {
                lamports: (config.initial_sol * LAMPORTS_PER_SOL) as u64,
                ..Default::default()
            }),
            fee_lamports: config.fee_lamports,
        }
    }

    /// Number of fills executed so far
    pub fn trade_count(&self) -> u64 {
        self.lock_wallet().map(|w| w.trades).unwrap_or(0)
    }

    fn lock_wallet(&self) -> Result<std::sync::MutexGuard<'_, PaperWallet>, VenueError> {
        self.wallet
            .lock()
            .map_err(|e| VenueError::Rejected(format!("paper wallet poisoned: {}", e)))
    }

    fn signature(side: &str) -> String {
        format!("paper-{}-{}", side, uuid::Uuid::new_v4().simple())
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    async fn venue_status(&self, mint: &Mint) -> Result<VenueStatus, VenueError> {
        self.market.venue_status(mint).await
    }

    async fn quote_price(&self, mint: &Mint, _venue: Venue) -> Result<f64, VenueError> {
        checked_price(self.market.price(mint).await?)
    }

    async fn sol_balance(&self) -> Result<u64, VenueError> {
        Ok(self.lock_wallet()?.lamports)
    }

    async fn token_balance(&self, mint: &Mint) -> Result<f64, VenueError> {
        Ok(self.lock_wallet()?.tokens.get(mint).copied().unwrap_or(0.0))
    }

    async fn buy(&self, order: &VenueOrder) -> Result<String, VenueError> {
        let price = checked_price(self.market.price(&order.mint).await?)?;
        let tokens_out = order.amount / price;
        if tokens_out < order.min_out {
            return Err(VenueError::SlippageExceeded {
                min_out: order.min_out,
                actual: tokens_out,
            });
        }

        let cost = (order.amount * LAMPORTS_PER_SOL) as u64 + self.fee_lamports;
        let mut wallet = self.lock_wallet()?;
        if cost > wallet.lamports {
            return Err(VenueError::InsufficientFunds {
                needed: cost as f64 / LAMPORTS_PER_SOL,
                available: wallet.lamports as f64 / LAMPORTS_PER_SOL,
            });
        }

        wallet.lamports -= cost;
        *wallet.tokens.entry(order.mint.clone()).or_insert(0.0) += tokens_out;
        wallet.trades += 1;

        tracing::debug!(
            mint = %order.mint.short(),
            venue = %order.venue,
            sol = order.amount,
            tokens = tokens_out,
            "Paper buy filled"
        );

        Ok(Self::signature("buy"))
    }

    async fn sell(&self, order: &VenueOrder) -> Result<String, VenueError> {
        let price = checked_price(self.market.price(&order.mint).await?)?;
        let sol_out = order.amount * price;
        if sol_out < order.min_out {
            return Err(VenueError::SlippageExceeded {
                min_out: order.min_out,
                actual: sol_out,
            });
        }

        let mut wallet = self.lock_wallet()?;
        let held = wallet.tokens.get(&order.mint).copied().unwrap_or(0.0);
        if order.amount > held * (1.0 + 1e-9) {
            return Err(VenueError::InsufficientFunds {
                needed: order.amount,
                available: held,
            });
        }

        let proceeds = ((sol_out * LAMPORTS_PER_SOL) as u64).saturating_sub(self.fee_lamports);
        wallet.lamports += proceeds;
        let remaining = (held - order.amount).max(0.0);
        if remaining > 0.0 {
            wallet.tokens.insert(order.mint.clone(), remaining);
        } else {
            wallet.tokens.remove(&order.mint);
        }
        wallet.trades += 1;

        tracing::debug!(
            mint = %order.mint.short(),
            venue = %order.venue,
            tokens = order.amount,
            sol = sol_out,
            "Paper sell filled"
        );

        Ok(Self::signature("sell"))
    }
}
