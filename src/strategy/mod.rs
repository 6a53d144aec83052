// Decision policies driven by the generic strategy engine
pub mod accumulate;
pub mod grid;
pub mod hunter;
pub mod reactive;
pub mod trend;
pub mod volume;

use serde::Serialize;
use tokio::time::Duration;

use crate::execution::{BuySize, Position, RollingWindow, SellAmount};
use crate::models::{TradeSide, Venue, VenueStatus};

pub use accumulate::{AccumulateConfig, AccumulateStrategy, Phase};
pub use grid::{GridConfig, GridLevel, GridStrategy};
pub use hunter::{HunterConfig, HunterStrategy};
pub use reactive::{ReactiveConfig, ReactiveStrategy, Thresholds};
pub use trend::{Trend, TrendConfig, TrendStrategy};
pub use volume::{VolumeConfig, VolumeStrategy};

/// Everything a policy may look at on one tick
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    /// Latest price, already pushed into `window`
    pub price: f64,
    pub window: &'a RollingWindow,
    pub position: Option<&'a Position>,
    /// Time since the last successful trade, `None` before the first
    pub since_last_trade: Option<Duration>,
    /// Present only for policies that ask for it
    pub venue: Option<&'a VenueStatus>,
}

/// At most one of these is executed per tick
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Hold,
    Buy { size: BuySize, reason: String },
    Sell { amount: SellAmount, reason: String },
    /// Liquidate everything and stop the engine
    Halt { reason: String },
}

impl Action {
    pub fn buy(size: BuySize, reason: impl Into<String>) -> Self {
        Action::Buy {
            size,
            reason: reason.into(),
        }
    }

    pub fn sell(amount: SellAmount, reason: impl Into<String>) -> Self {
        Action::Sell {
            amount,
            reason: reason.into(),
        }
    }

    pub fn sell_all(reason: impl Into<String>) -> Self {
        Self::sell(SellAmount::All, reason)
    }
}

/// Confirmed execution reported back to the policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub side: TradeSide,
    pub price: f64,
    pub sol_amount: f64,
    pub token_amount: f64,
    /// The fill left the engine flat
    pub closed_position: bool,
}

/// Strategy-specific fields reported in engine status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyDetail {
    Reactive {
        thresholds: Thresholds,
    },
    Grid {
        base_price: Option<f64>,
        filled_levels: usize,
        levels: Vec<GridLevel>,
    },
    Accumulate {
        phase: Phase,
    },
    Trend {
        trend: Trend,
        fast_ma: Option<f64>,
        slow_ma: Option<f64>,
        scaled_in: bool,
    },
    Hunter {
        venue: Option<Venue>,
        migration_boost: bool,
        thresholds: Thresholds,
    },
    Volume {
        cycles: u32,
        next_delay_ms: u64,
    },
}

/// Decision policy evaluated once per engine tick
///
/// Policies never touch the venue. They see a read-only tick context, return
/// an [`Action`], and learn the outcome through `on_fill` / `on_reject`.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    /// Samples required in the window before `evaluate` is called
    fn warmup(&self) -> usize {
        1
    }

    /// Called once with the base price fetched at engine start
    fn on_start(&mut self, _base_price: f64) {}

    /// Whether the engine should re-read venue status every tick
    fn needs_venue_status(&self) -> bool {
        false
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Action;

    fn on_fill(&mut self, _fill: &Fill) {}

    /// The last action was skipped or failed; position is unchanged
    fn on_reject(&mut self) {}

    fn detail(&self) -> StrategyDetail;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{PriceSample, PriceSource};
    use crate::testing::test_mint;

    /// Window pre-filled with `prices`, oldest first
    pub fn window_of(capacity: usize, prices: &[f64]) -> RollingWindow {
        let mut window = RollingWindow::new(capacity);
        for &price in prices {
            window.push(PriceSample::new(price, PriceSource::Rpc));
        }
        window
    }

    pub fn position_at(entry_price: f64) -> Position {
        Position::open(test_mint(), 1.0, entry_price)
    }

    pub fn ctx<'a>(
        window: &'a RollingWindow,
        position: Option<&'a Position>,
    ) -> TickContext<'a> {
        TickContext {
            price: window.latest().map(|s| s.price).unwrap_or_default(),
            window,
            position,
            since_last_trade: None,
            venue: None,
        }
    }

    pub fn buy_fill(price: f64, sol_amount: f64) -> Fill {
        Fill {
            side: TradeSide::Buy,
            price,
            sol_amount,
            token_amount: sol_amount / price,
            closed_position: false,
        }
    }

    pub fn sell_fill(price: f64, token_amount: f64, closed_position: bool) -> Fill {
        Fill {
            side: TradeSide::Sell,
            price,
            sol_amount: token_amount * price,
            token_amount,
            closed_position,
        }
    }
}
