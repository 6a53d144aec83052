use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use super::{Action, Fill, Strategy, StrategyDetail, TickContext};
use crate::config::{require_positive, EngineOverrides};
use crate::error::ConfigError;
use crate::execution::{BuySize, SellAmount};
use crate::indicators::reached;
use crate::models::TradeSide;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccumulateConfig {
    /// Fixed SOL amount per accumulation buy
    pub buy_amount_sol: f64,
    pub buy_cooldown_ms: u64,
    /// Profit that switches to distribution
    pub sell_trigger_pct: f64,
    /// Share of the holdings sold per distribution tick
    pub distribute_fraction: f64,
    /// Profit at which distribution closes the whole position
    pub profit_target_pct: f64,
    pub stop_loss_pct: f64,
    pub engine: EngineOverrides,
}

impl Default for AccumulateConfig {
    fn default() -> Self {
        Self {
            buy_amount_sol: 0.05,
            buy_cooldown_ms: 60_000,
            sell_trigger_pct: 30.0,
            distribute_fraction: 0.25,
            profit_target_pct: 100.0,
            stop_loss_pct: 30.0,
            engine: EngineOverrides::default(),
        }
    }
}

impl AccumulateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("buy_amount_sol", self.buy_amount_sol)?;
        require_positive("sell_trigger_pct", self.sell_trigger_pct)?;
        require_positive("profit_target_pct", self.profit_target_pct)?;
        require_positive("stop_loss_pct", self.stop_loss_pct)?;

        if !(self.distribute_fraction > 0.0 && self.distribute_fraction <= 1.0) {
            return Err(ConfigError::invalid(
                "distribute_fraction",
                "must be in (0, 1]",
            ));
        }
        if self.profit_target_pct < self.sell_trigger_pct {
            return Err(ConfigError::invalid(
                "profit_target_pct",
                "must not be below sell_trigger_pct",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Accumulate,
    Distribute,
}

/// Two-phase accumulate / distribute policy
///
/// Accumulates while unrealized profit is below half the sell trigger and
/// distributes once it reaches the trigger; the band in between keeps the
/// current phase. A stop-loss closes everything and restarts accumulation.
#[derive(Debug, Clone)]
pub struct AccumulateStrategy {
    config: AccumulateConfig,
    phase: Phase,
}

impl AccumulateStrategy {
    pub fn new(config: AccumulateConfig) -> Self {
        Self {
            config,
            phase: Phase::Accumulate,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn cooldown_elapsed(&self, since_last_trade: Option<Duration>) -> bool {
        since_last_trade.map_or(true, |elapsed| {
            elapsed >= Duration::from_millis(self.config.buy_cooldown_ms)
        })
    }

    fn set_phase(&mut self, phase: Phase, profit: f64) {
        if self.phase != phase {
            tracing::info!(from = ?self.phase, to = ?phase, profit, "Phase change");
            self.phase = phase;
        }
    }
}

impl Strategy for AccumulateStrategy {
    fn name(&self) -> &'static str {
        "accumulate"
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Action {
        let profit = ctx.position.map(|p| p.profit_pct(ctx.price));

        if let Some(profit) = profit {
            if reached(-profit, self.config.stop_loss_pct) {
                return Action::sell_all(format!("stop-loss at {:.1}%", profit));
            }

            if reached(profit, self.config.sell_trigger_pct) {
                self.set_phase(Phase::Distribute, profit);
            } else if profit < self.config.sell_trigger_pct / 2.0 {
                self.set_phase(Phase::Accumulate, profit);
            }
        } else {
            self.phase = Phase::Accumulate;
        }

        match self.phase {
            Phase::Distribute => {
                let profit = profit.unwrap_or_default();
                if reached(profit, self.config.profit_target_pct) {
                    Action::sell_all(format!("profit target {:+.1}%", profit))
                } else {
                    Action::sell(
                        SellAmount::Fraction(self.config.distribute_fraction),
                        format!("distributing at {:+.1}%", profit),
                    )
                }
            }
            Phase::Accumulate => {
                let in_band = profit.map_or(true, |p| p < self.config.sell_trigger_pct / 2.0);
                if in_band && self.cooldown_elapsed(ctx.since_last_trade) {
                    Action::buy(
                        BuySize::Sol(self.config.buy_amount_sol),
                        "accumulating",
                    )
                } else {
                    Action::Hold
                }
            }
        }
    }

    fn on_fill(&mut self, fill: &Fill) {
        if fill.side == TradeSide::Sell && fill.closed_position {
            self.phase = Phase::Accumulate;
        }
    }

    fn detail(&self) -> StrategyDetail {
        StrategyDetail::Accumulate { phase: self.phase }
    }
}
