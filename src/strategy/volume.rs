use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tokio::time::Duration;

use super::{Action, Fill, Strategy, StrategyDetail, TickContext};
use crate::config::EngineOverrides;
use crate::error::ConfigError;
use crate::execution::BuySize;
use crate::models::TradeSide;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub engine: EngineOverrides,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 15_000,
            max_delay_ms: 60_000,
            engine: EngineOverrides::default(),
        }
    }
}

impl VolumeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::invalid(
                "min_delay_ms",
                format!("must not exceed max_delay_ms ({})", self.max_delay_ms),
            ));
        }
        Ok(())
    }
}

/// Alternating buy / full-sell cycles with randomized spacing
#[derive(Debug, Clone)]
pub struct VolumeStrategy {
    config: VolumeConfig,
    trade_fraction: f64,
    rng: StdRng,
    next_delay: Duration,
    cycles: u32,
}

impl VolumeStrategy {
    pub fn new(config: VolumeConfig, trade_fraction: f64) -> Self {
        Self::with_rng(config, trade_fraction, StdRng::from_entropy())
    }

    /// Deterministic delays for tests and replays
    pub fn with_seed(config: VolumeConfig, trade_fraction: f64, seed: u64) -> Self {
        Self::with_rng(config, trade_fraction, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: VolumeConfig, trade_fraction: f64, rng: StdRng) -> Self {
        let mut strategy = Self {
            config,
            trade_fraction,
            rng,
            next_delay: Duration::ZERO,
            cycles: 0,
        };
        strategy.next_delay = strategy.draw_delay();
        strategy
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    fn draw_delay(&mut self) -> Duration {
        let ms = self
            .rng
            .gen_range(self.config.min_delay_ms..=self.config.max_delay_ms);
        Duration::from_millis(ms)
    }
}

impl Strategy for VolumeStrategy {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Action {
        if let Some(elapsed) = ctx.since_last_trade {
            if elapsed < self.next_delay {
                return Action::Hold;
            }
        }

        match ctx.position {
            None => Action::buy(
                BuySize::Fraction(self.trade_fraction),
                format!("volume cycle {} buy", self.cycles + 1),
            ),
            Some(_) => Action::sell_all(format!("volume cycle {} sell", self.cycles + 1)),
        }
    }

    fn on_fill(&mut self, fill: &Fill) {
        if fill.side == TradeSide::Sell && fill.closed_position {
            self.cycles += 1;
        }
        self.next_delay = self.draw_delay();
    }

    fn detail(&self) -> StrategyDetail {
        StrategyDetail::Volume {
            cycles: self.cycles,
            next_delay_ms: self.next_delay.as_millis() as u64,
        }
    }
}
