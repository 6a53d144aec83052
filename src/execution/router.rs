use chrono::Utc;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

use crate::error::ExecutionError;
use crate::models::{Mint, TradeReceipt, TradeSide, LAMPORTS_PER_SOL};
use crate::venue::{VenueClient, VenueOrder};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// SOL kept back for fees and rent
    pub gas_reserve_sol: f64,
    /// Trades smaller than this are dust and skipped
    pub min_trade_sol: f64,
    /// Minimum spacing between successful trades (0 disables)
    pub min_trade_interval_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            gas_reserve_sol: 0.01,
            min_trade_sol: 0.001,
            min_trade_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuySize {
    /// Fraction of available balance
    Fraction(f64),
    /// Fixed SOL amount
    Sol(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SellAmount {
    All,
    /// Fraction of the held tokens
    Fraction(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuyRequest {
    pub size: BuySize,
    /// Decision price, used for the minimum-output guard
    pub price: f64,
    /// SOL already committed to the position
    pub held_sol: f64,
    pub max_position_fraction: f64,
    pub slippage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellRequest {
    pub amount: SellAmount,
    pub price: f64,
    pub slippage: f64,
    /// Tokens attributed to the caller, capping the sale when several
    /// engines share the wallet; `None` sells from the whole balance
    pub held_tokens: Option<f64>,
    /// Forced exits ignore the trade-interval limit
    pub force: bool,
}

/// Why a request was deliberately not submitted
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientFunds { requested: f64, available: f64 },
    BelowMinimum { amount: f64, minimum: f64 },
    PositionCapReached { held: f64, cap: f64 },
    NothingToSell,
    TooSoon { remaining_ms: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientFunds {
                requested,
                available,
            } => write!(
                f,
                "insufficient funds: requested {:.4} SOL, available {:.4} SOL",
                requested, available
            ),
            SkipReason::BelowMinimum { amount, minimum } => write!(
                f,
                "below minimum trade: {:.6} SOL < {:.6} SOL",
                amount, minimum
            ),
            SkipReason::PositionCapReached { held, cap } => write!(
                f,
                "position cap reached: holding {:.4} SOL of {:.4} SOL",
                held, cap
            ),
            SkipReason::NothingToSell => write!(f, "nothing to sell"),
            SkipReason::TooSoon { remaining_ms } => {
                write!(f, "trade too soon: {}ms remaining", remaining_ms)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Filled(TradeReceipt),
    Skipped(SkipReason),
}

/// Turns strategy decisions into safety-checked venue orders
///
/// Balance and migration status are re-read on every call. Submission
/// failures are returned as-is; the router never retries.
pub struct ExecutionRouter {
    venue: Arc<dyn VenueClient>,
    config: RouterConfig,
    last_trade: Option<Instant>,
}

impl ExecutionRouter {
    pub fn new(venue: Arc<dyn VenueClient>, config: RouterConfig) -> Self {
        Self {
            venue,
            config,
            last_trade: None,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Spendable SOL after the gas reserve
    pub async fn available_balance(&self) -> Result<f64, ExecutionError> {
        let lamports = self
            .venue
            .sol_balance()
            .await
            .map_err(ExecutionError::Balance)?;
        Ok((lamports as f64 / LAMPORTS_PER_SOL - self.config.gas_reserve_sol).max(0.0))
    }

    pub async fn buy(
        &mut self,
        mint: &Mint,
        request: &BuyRequest,
    ) -> Result<RouteOutcome, ExecutionError> {
        if let Some(skip) = self.cooldown() {
            return Ok(RouteOutcome::Skipped(skip));
        }

        let available = self.available_balance().await?;
        let requested = match request.size {
            BuySize::Fraction(fraction) => available * fraction.clamp(0.0, 1.0),
            BuySize::Sol(sol) => sol,
        };

        if requested > available || available < self.config.min_trade_sol {
            return Ok(RouteOutcome::Skipped(SkipReason::InsufficientFunds {
                requested,
                available,
            }));
        }

        // Total exposure is capped at a fraction of (free balance + position)
        let cap = request.max_position_fraction * (available + request.held_sol);
        let headroom = (cap - request.held_sol).max(0.0);
        if headroom < self.config.min_trade_sol {
            return Ok(RouteOutcome::Skipped(SkipReason::PositionCapReached {
                held: request.held_sol,
                cap,
            }));
        }

        let amount = requested.min(headroom);
        if amount < self.config.min_trade_sol {
            return Ok(RouteOutcome::Skipped(SkipReason::BelowMinimum {
                amount,
                minimum: self.config.min_trade_sol,
            }));
        }

        let status = self
            .venue
            .venue_status(mint)
            .await
            .map_err(ExecutionError::Status)?;

        let expected_tokens = amount / request.price;
        let order = VenueOrder {
            venue: status.venue,
            mint: mint.clone(),
            amount,
            min_out: expected_tokens * (1.0 - request.slippage),
            slippage: request.slippage,
        };

        let signature = self
            .venue
            .buy(&order)
            .await
            .map_err(ExecutionError::Submission)?;
        self.last_trade = Some(Instant::now());

        tracing::info!(
            mint = %mint.short(),
            venue = %status.venue,
            sol = amount,
            price = request.price,
            %signature,
            "Buy submitted"
        );

        Ok(RouteOutcome::Filled(TradeReceipt {
            signature,
            venue: status.venue,
            side: TradeSide::Buy,
            sol_amount: amount,
            token_amount: expected_tokens,
            price: request.price,
            min_out: order.min_out,
            executed_at: Utc::now(),
        }))
    }

    pub async fn sell(
        &mut self,
        mint: &Mint,
        request: &SellRequest,
    ) -> Result<RouteOutcome, ExecutionError> {
        if !request.force {
            if let Some(skip) = self.cooldown() {
                return Ok(RouteOutcome::Skipped(skip));
            }
        }

        let wallet = self
            .venue
            .token_balance(mint)
            .await
            .map_err(ExecutionError::Balance)?;
        let held = request.held_tokens.map_or(wallet, |own| own.min(wallet));

        let amount = match request.amount {
            SellAmount::All => held,
            SellAmount::Fraction(fraction) => held * fraction.clamp(0.0, 1.0),
        };
        if amount <= 0.0 {
            return Ok(RouteOutcome::Skipped(SkipReason::NothingToSell));
        }

        let expected_sol = amount * request.price;
        // A full exit always goes through, however small
        if request.amount != SellAmount::All && expected_sol < self.config.min_trade_sol {
            return Ok(RouteOutcome::Skipped(SkipReason::BelowMinimum {
                amount: expected_sol,
                minimum: self.config.min_trade_sol,
            }));
        }

        let status = self
            .venue
            .venue_status(mint)
            .await
            .map_err(ExecutionError::Status)?;

        let order = VenueOrder {
            venue: status.venue,
            mint: mint.clone(),
            amount,
            min_out: expected_sol * (1.0 - request.slippage),
            slippage: request.slippage,
        };

        let signature = self
            .venue
            .sell(&order)
            .await
            .map_err(ExecutionError::Submission)?;
        self.last_trade = Some(Instant::now());

        tracing::info!(
            mint = %mint.short(),
            venue = %status.venue,
            tokens = amount,
            price = request.price,
            %signature,
            "Sell submitted"
        );

        Ok(RouteOutcome::Filled(TradeReceipt {
            signature,
            venue: status.venue,
            side: TradeSide::Sell,
            sol_amount: expected_sol,
            token_amount: amount,
            price: request.price,
            min_out: order.min_out,
            executed_at: Utc::now(),
        }))
    }

    fn cooldown(&self) -> Option<SkipReason> {
        let interval = Duration::from_millis(self.config.min_trade_interval_ms);
        let elapsed = self.last_trade?.elapsed();
        (elapsed < interval).then(|| SkipReason::TooSoon {
            remaining_ms: (interval - elapsed).as_millis() as u64,
        })
    }
}
