use serde::{Deserialize, Serialize};

use super::{Action, StrategyDetail, Strategy, TickContext};
use crate::config::{require_positive, EngineOverrides};
use crate::error::ConfigError;
use crate::execution::BuySize;
use crate::indicators::{pct_change, reached};

/// Exit on a rise this many times the pump threshold from the window low
const MOMENTUM_MULTIPLIER: f64 = 1.5;

/// Dip / pump / stop-loss percentages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Drop from the window high that triggers entry
    pub buy_dip_pct: f64,
    /// Profit that triggers exit
    pub sell_pump_pct: f64,
    /// Loss that forces exit
    pub stop_loss_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            buy_dip_pct: 15.0,
            sell_pump_pct: 20.0,
            stop_loss_pct: 25.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("buy_dip_pct", self.buy_dip_pct)?;
        require_positive("sell_pump_pct", self.sell_pump_pct)?;
        require_positive("stop_loss_pct", self.stop_loss_pct)?;
        if self.buy_dip_pct >= 100.0 {
            return Err(ConfigError::invalid("buy_dip_pct", "must be below 100"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    pub buy_dip_pct: f64,
    pub sell_pump_pct: f64,
    pub stop_loss_pct: f64,
    pub engine: EngineOverrides,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            buy_dip_pct: thresholds.buy_dip_pct,
            sell_pump_pct: thresholds.sell_pump_pct,
            stop_loss_pct: thresholds.stop_loss_pct,
            engine: EngineOverrides::default(),
        }
    }
}

impl ReactiveConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            buy_dip_pct: self.buy_dip_pct,
            sell_pump_pct: self.sell_pump_pct,
            stop_loss_pct: self.stop_loss_pct,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds().validate()
    }
}

/// Dip-buy / pump-sell decision shared by the reactive and hunter policies
///
/// Flat: buy once the price is `buy_dip_pct` below the window high.
/// Holding: exit on stop-loss, then take-profit, then momentum (a rise of
/// 1.5x the pump threshold off the window low while in profit).
pub(crate) fn reactive_action(
    thresholds: &Thresholds,
    take_profit_pct: f64,
    trade_fraction: f64,
    ctx: &TickContext<'_>,
) -> Action {
    let price = ctx.price;

    let Some(position) = ctx.position else {
        let Some(high) = ctx.window.high() else {
            return Action::Hold;
        };
        let drop = -pct_change(high, price);
        if reached(drop, thresholds.buy_dip_pct) {
            return Action::buy(
                BuySize::Fraction(trade_fraction),
                format!("dip {:.1}% from high {:.10}", drop, high),
            );
        }
        return Action::Hold;
    };

    let profit = position.profit_pct(price);

    if reached(-profit, thresholds.stop_loss_pct) {
        return Action::sell_all(format!("stop-loss at {:.1}%", profit));
    }

    if reached(profit, take_profit_pct) {
        return Action::sell_all(format!("take-profit at {:+.1}%", profit));
    }

    if profit > 0.0 {
        if let Some(low) = ctx.window.low() {
            let rise = pct_change(low, price);
            if reached(rise, thresholds.sell_pump_pct * MOMENTUM_MULTIPLIER) {
                return Action::sell_all(format!(
                    "momentum {:+.1}% from low, profit {:+.1}%",
                    rise, profit
                ));
            }
        }
    }

    Action::Hold
}

/// Dip-buyer / pump-seller
#[derive(Debug, Clone)]
pub struct ReactiveStrategy {
    thresholds: Thresholds,
    trade_fraction: f64,
}

impl ReactiveStrategy {
    pub fn new(thresholds: Thresholds, trade_fraction: f64) -> Self {
        Self {
            thresholds,
            trade_fraction,
        }
    }
}

impl Strategy for ReactiveStrategy {
    fn name(&self) -> &'static str {
        "reactive"
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Action {
        reactive_action(
            &self.thresholds,
            self.thresholds.sell_pump_pct,
            self.trade_fraction,
            ctx,
        )
    }

    fn detail(&self) -> StrategyDetail {
        StrategyDetail::Reactive {
            thresholds: self.thresholds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::SellAmount;
    use crate::strategy::test_support::{ctx, position_at, window_of};

    fn strategy() -> ReactiveStrategy {
        ReactiveStrategy::new(Thresholds::default(), 0.2)
    }

    fn is_sell_all(action: &Action, reason: &str) -> bool {
        matches!(action, Action::Sell { amount: SellAmount::All, reason: r } if r.starts_with(reason))
    }

    #[test]
    fn test_buys_on_dip_from_window_high() {
        let mut strategy = strategy();

        let window = window_of(12, &[100.0, 100.0, 100.0, 86.0]);
        assert_eq!(strategy.evaluate(&ctx(&window, None)), Action::Hold);

        let window = window_of(12, &[100.0, 100.0, 100.0, 85.0]);
        let action = strategy.evaluate(&ctx(&window, None));
        assert!(matches!(
            action,
            Action::Buy {
                size: BuySize::Fraction(f),
                ..
            } if f == 0.2
        ));
    }

    #[test]
    fn test_take_profit() {
        let mut strategy = strategy();
        let position = position_at(85.0);

        let window = window_of(12, &[100.0, 85.0, 101.0]);
        assert_eq!(strategy.evaluate(&ctx(&window, Some(&position))), Action::Hold);

        let window = window_of(12, &[100.0, 85.0, 102.0]);
        let action = strategy.evaluate(&ctx(&window, Some(&position)));
        assert!(is_sell_all(&action, "take-profit"));
    }

    #[test]
    fn test_stop_loss() {
        let mut strategy = strategy();
        let position = position_at(100.0);

        let window = window_of(12, &[100.0, 75.0]);
        let action = strategy.evaluate(&ctx(&window, Some(&position)));
        assert!(is_sell_all(&action, "stop-loss"));
    }

    #[test]
    fn test_stop_loss_preempts_take_profit() {
        // Pathological thresholds: both exits fire at +20%
        let thresholds = Thresholds {
            buy_dip_pct: 15.0,
            sell_pump_pct: 20.0,
            stop_loss_pct: -30.0,
        };
        let mut strategy = ReactiveStrategy::new(thresholds, 0.2);
        let position = position_at(85.0);

        let window = window_of(12, &[85.0, 102.0]);
        let action = strategy.evaluate(&ctx(&window, Some(&position)));
        assert!(is_sell_all(&action, "stop-loss"));
    }

    #[test]
    fn test_momentum_exit_from_window_low() {
        let mut strategy = strategy();
        // In profit by 10%, but 30% off the window low
        let position = position_at(100.0);

        let window = window_of(12, &[100.0, 84.0, 110.0]);
        let action = strategy.evaluate(&ctx(&window, Some(&position)));
        assert!(is_sell_all(&action, "momentum"));
    }

    #[test]
    fn test_no_momentum_exit_at_a_loss() {
        let mut strategy = strategy();
        let position = position_at(120.0);

        let window = window_of(12, &[120.0, 70.0, 100.0]);
        assert_eq!(strategy.evaluate(&ctx(&window, Some(&position))), Action::Hold);
    }

    #[test]
    fn test_validate() {
        assert!(ReactiveConfig::default().validate().is_ok());

        assert!(ReactiveConfig {
            stop_loss_pct: 0.0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
