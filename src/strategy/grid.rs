use serde::{Deserialize, Serialize};

use super::{Action, Fill, Strategy, StrategyDetail, TickContext};
use crate::config::{require_positive, EngineOverrides};
use crate::error::ConfigError;
use crate::execution::{BuySize, SellAmount};
use crate::indicators::{pct_change, reached};
use crate::models::TradeSide;

/// Level share of the position above which a level sell closes everything
const FULL_EXIT_SHARE: f64 = 0.999;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub levels: usize,
    /// Distance between consecutive levels, percent of the base price
    pub spacing_pct: f64,
    /// Per-level profit that sells and re-arms the level
    pub take_profit_pct: f64,
    /// Drop below base that liquidates everything and halts
    pub emergency_stop_pct: f64,
    pub engine: EngineOverrides,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            levels: 5,
            spacing_pct: 5.0,
            take_profit_pct: 8.0,
            emergency_stop_pct: 35.0,
            engine: EngineOverrides::default(),
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels == 0 {
            return Err(ConfigError::invalid("levels", "must be at least 1"));
        }
        require_positive("spacing_pct", self.spacing_pct)?;
        require_positive("take_profit_pct", self.take_profit_pct)?;
        require_positive("emergency_stop_pct", self.emergency_stop_pct)?;

        let deepest = self.spacing_pct * self.levels as f64;
        if deepest >= 100.0 {
            return Err(ConfigError::invalid(
                "spacing_pct",
                format!("{} levels at {}% reach zero", self.levels, self.spacing_pct),
            ));
        }
        if self.emergency_stop_pct <= deepest {
            return Err(ConfigError::invalid(
                "emergency_stop_pct",
                format!("must be below the deepest level ({}%)", deepest),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLevel {
    pub index: usize,
    pub trigger_price: f64,
    pub filled: bool,
    pub fill_price: Option<f64>,
    /// Tokens bought by this level
    pub fill_amount: Option<f64>,
}

impl GridLevel {
    fn reset(&mut self) {
        self.filled = false;
        self.fill_price = None;
        self.fill_amount = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PendingOrder {
    Buy(usize),
    Sell(usize),
}

/// Staged entries at fixed levels below a base price
///
/// Each level buys on a downward crossing of its trigger (edge-triggered)
/// and sells on its own take-profit, after which it re-arms. A gap through
/// several triggers queues every crossed level; they buy one per tick while
/// the price stays at or below their triggers.
#[derive(Debug, Clone)]
pub struct GridStrategy {
    config: GridConfig,
    trade_fraction: f64,
    base_price: Option<f64>,
    levels: Vec<GridLevel>,
    /// Crossed levels not bought yet, shallowest first
    crossed: Vec<usize>,
    pending: Option<PendingOrder>,
}

impl GridStrategy {
    pub fn new(config: GridConfig, trade_fraction: f64) -> Self {
        Self {
            config,
            trade_fraction,
            base_price: None,
            levels: Vec::new(),
            crossed: Vec::new(),
            pending: None,
        }
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn filled_levels(&self) -> usize {
        self.levels.iter().filter(|l| l.filled).count()
    }

    /// Queue levels whose trigger lies in the (previous, price] drop
    fn track_crossings(&mut self, previous: f64, price: f64) {
        for level in &self.levels {
            let crossed = previous > level.trigger_price && reached(level.trigger_price, price);
            if crossed && !level.filled && !self.crossed.contains(&level.index) {
                self.crossed.push(level.index);
            }
        }

        // A crossing lapses once its level fills or the price is back above it
        let levels = &self.levels;
        self.crossed.retain(|&index| {
            levels
                .get(index)
                .is_some_and(|l| !l.filled && reached(l.trigger_price, price))
        });
        self.crossed.sort_unstable();
    }

    fn level_sell(&self, ctx: &TickContext<'_>) -> Option<(usize, SellAmount, f64)> {
        let position_tokens = ctx.position.map(|p| p.tokens()).unwrap_or_default();

        self.levels.iter().find_map(|level| {
            let fill_price = level.fill_price.filter(|_| level.filled)?;
            let profit = pct_change(fill_price, ctx.price);
            if !reached(profit, self.config.take_profit_pct) {
                return None;
            }

            let level_tokens = level.fill_amount.unwrap_or_default();
            let share = if position_tokens > 0.0 {
                level_tokens / position_tokens
            } else {
                1.0
            };
            let amount = if share >= FULL_EXIT_SHARE {
                SellAmount::All
            } else {
                SellAmount::Fraction(share)
            };
            Some((level.index, amount, profit))
        })
    }
}

impl Strategy for GridStrategy {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn on_start(&mut self, base_price: f64) {
        self.base_price = Some(base_price);
        self.crossed.clear();
        self.levels = (1..=self.config.levels)
            .map(|i| GridLevel {
                index: i - 1,
                trigger_price: base_price * (1.0 - self.config.spacing_pct * i as f64 / 100.0),
                filled: false,
                fill_price: None,
                fill_amount: None,
            })
            .collect();

        tracing::info!(
            base_price,
            levels = self.levels.len(),
            lowest = self.levels.last().map(|l| l.trigger_price),
            "Grid levels initialized"
        );
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Action {
        let price = ctx.price;
        let Some(base) = self.base_price else {
            return Action::Hold;
        };
        let previous = ctx.window.previous().map_or(base, |s| s.price);

        let emergency_price = base * (1.0 - self.config.emergency_stop_pct / 100.0);
        if price <= emergency_price {
            return Action::Halt {
                reason: format!(
                    "emergency stop: {:.10} is {:.1}% below base {:.10}",
                    price,
                    -pct_change(base, price),
                    base
                ),
            };
        }

        self.track_crossings(previous, price);

        if let Some((index, amount, profit)) = self.level_sell(ctx) {
            self.pending = Some(PendingOrder::Sell(index));
            return Action::sell(
                amount,
                format!("grid level {} take-profit {:+.1}%", index + 1, profit),
            );
        }

        if self.crossed.is_empty() {
            return Action::Hold;
        }
        let index = self.crossed.remove(0);
        let Some(trigger) = self.levels.get(index).map(|l| l.trigger_price) else {
            return Action::Hold;
        };

        self.pending = Some(PendingOrder::Buy(index));
        Action::buy(
            BuySize::Fraction(self.trade_fraction),
            format!("grid level {} crossed at {:.10}", index + 1, trigger),
        )
    }

    fn on_fill(&mut self, fill: &Fill) {
        if fill.side == TradeSide::Sell && fill.closed_position {
            // Full exit (take-profit of the last level, halt or stop) empties the grid
            self.pending = None;
            self.crossed.clear();
            for level in &mut self.levels {
                level.reset();
            }
            return;
        }

        match self.pending.take() {
            Some(PendingOrder::Buy(index)) => {
                if let Some(level) = self.levels.get_mut(index) {
                    level.filled = true;
                    level.fill_price = Some(fill.price);
                    level.fill_amount = Some(fill.token_amount);
                }
            }
            Some(PendingOrder::Sell(index)) => {
                if let Some(level) = self.levels.get_mut(index) {
                    level.reset();
                }
            }
            None => {}
        }
    }

    fn on_reject(&mut self) {
        self.pending = None;
    }

    fn detail(&self) -> StrategyDetail {
        StrategyDetail::Grid {
            base_price: self.base_price,
            filled_levels: self.filled_levels(),
            levels: self.levels.clone(),
        }
    }
}
