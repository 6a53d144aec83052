use serde::{Deserialize, Serialize};

use super::{Action, Fill, Strategy, StrategyDetail, TickContext};
use crate::config::{require_positive, EngineOverrides};
use crate::error::ConfigError;
use crate::execution::BuySize;
use crate::indicators::reached;
use crate::models::TradeSide;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Minimum (fast - slow) / slow, in percent, to call a trend
    pub min_cross_strength_pct: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    /// Profit above which a winning position is added to once
    pub scale_in_trigger_pct: f64,
    /// Scale-in size relative to the regular trade fraction
    pub scale_in_fraction: f64,
    pub engine: EngineOverrides,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            fast_period: 3,
            slow_period: 8,
            min_cross_strength_pct: 2.0,
            take_profit_pct: 30.0,
            stop_loss_pct: 12.0,
            scale_in_trigger_pct: 10.0,
            scale_in_fraction: 0.5,
            engine: EngineOverrides::default(),
        }
    }
}

impl TrendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fast_period == 0 {
            return Err(ConfigError::invalid("fast_period", "must be at least 1"));
        }
        if self.fast_period >= self.slow_period {
            return Err(ConfigError::invalid(
                "slow_period",
                format!("must exceed fast_period ({})", self.fast_period),
            ));
        }
        require_positive("min_cross_strength_pct", self.min_cross_strength_pct)?;
        require_positive("take_profit_pct", self.take_profit_pct)?;
        require_positive("stop_loss_pct", self.stop_loss_pct)?;
        require_positive("scale_in_trigger_pct", self.scale_in_trigger_pct)?;
        if !(self.scale_in_fraction > 0.0 && self.scale_in_fraction <= 1.0) {
            return Err(ConfigError::invalid("scale_in_fraction", "must be in (0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

/// Moving-average crossover trend follower
///
/// The trend only changes when the fast/slow spread clears the cross
/// strength in either direction; in between it keeps its previous value.
/// Entries happen on a transition into `Up`, never while merely staying up.
#[derive(Debug, Clone)]
pub struct TrendStrategy {
    config: TrendConfig,
    trade_fraction: f64,
    trend: Trend,
    entry_armed: bool,
    scaled_in: bool,
    fast_ma: Option<f64>,
    slow_ma: Option<f64>,
}

impl TrendStrategy {
    pub fn new(config: TrendConfig, trade_fraction: f64) -> Self {
        Self {
            config,
            trade_fraction,
            trend: Trend::Neutral,
            entry_armed: false,
            scaled_in: false,
            fast_ma: None,
            slow_ma: None,
        }
    }

    pub fn trend(&self) -> Trend {
        self.trend
    }

    fn classify(&self, fast: f64, slow: f64) -> Trend {
        let strength = (fast - slow) / slow * 100.0;
        if reached(strength, self.config.min_cross_strength_pct) {
            Trend::Up
        } else if reached(-strength, self.config.min_cross_strength_pct) {
            Trend::Down
        } else {
            self.trend
        }
    }
}

impl Strategy for TrendStrategy {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn warmup(&self) -> usize {
        self.config.slow_period
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Action {
        let (Ok(fast), Ok(slow)) = (
            ctx.window.moving_average(self.config.fast_period),
            ctx.window.moving_average(self.config.slow_period),
        ) else {
            return Action::Hold;
        };
        self.fast_ma = Some(fast);
        self.slow_ma = Some(slow);

        let previous = self.trend;
        self.trend = self.classify(fast, slow);

        if self.trend != previous {
            tracing::debug!(from = ?previous, to = ?self.trend, fast, slow, "Trend change");
        }
        if self.trend == Trend::Up && previous != Trend::Up {
            self.entry_armed = true;
        } else if self.trend != Trend::Up {
            self.entry_armed = false;
        }
        // A position held into an uptrend uses up its entry
        if ctx.position.is_some() {
            self.entry_armed = false;
        }

        let Some(position) = ctx.position else {
            if self.entry_armed {
                return Action::buy(
                    BuySize::Fraction(self.trade_fraction),
                    format!("uptrend: fast {:.10} over slow {:.10}", fast, slow),
                );
            }
            return Action::Hold;
        };

        let profit = position.profit_pct(ctx.price);

        if reached(-profit, self.config.stop_loss_pct) {
            return Action::sell_all(format!("stop-loss at {:.1}%", profit));
        }
        if reached(profit, self.config.take_profit_pct) {
            return Action::sell_all(format!("take-profit at {:+.1}%", profit));
        }
        // Every downtrend tick exits, not only the crossing one
        if self.trend == Trend::Down {
            return Action::sell_all(format!("trend reversal at {:+.1}%", profit));
        }

        if !self.scaled_in
            && self.trend == Trend::Up
            && reached(profit, self.config.scale_in_trigger_pct)
        {
            return Action::buy(
                BuySize::Fraction(self.trade_fraction * self.config.scale_in_fraction),
                format!("scale-in at {:+.1}%", profit),
            );
        }

        Action::Hold
    }

    fn on_fill(&mut self, fill: &Fill) {
        match fill.side {
            // Entries are armed only while flat; an unarmed buy is a scale-in
            TradeSide::Buy if self.entry_armed => self.entry_armed = false,
            TradeSide::Buy => self.scaled_in = true,
            TradeSide::Sell if fill.closed_position => self.scaled_in = false,
            TradeSide::Sell => {}
        }
    }

    fn detail(&self) -> StrategyDetail {
        StrategyDetail::Trend {
            trend: self.trend,
            fast_ma: self.fast_ma,
            slow_ma: self.slow_ma,
            scaled_in: self.scaled_in,
        }
    }
}
