use serde::Deserialize;

use super::reactive::{reactive_action, Thresholds};
use super::{Action, Fill, Strategy, StrategyDetail, TickContext};
use crate::config::EngineOverrides;
use crate::error::ConfigError;
use crate::models::{TradeSide, Venue};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HunterConfig {
    /// Conservative thresholds while on the bonding curve
    pub pre_migration: Thresholds,
    /// Aggressive thresholds once trading on the AMM
    pub post_migration: Thresholds,
    /// Take-profit multiplier for a position that lived through a migration
    pub migration_tp_factor: f64,
    pub engine: EngineOverrides,
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            pre_migration: Thresholds {
                buy_dip_pct: 20.0,
                sell_pump_pct: 40.0,
                stop_loss_pct: 30.0,
            },
            post_migration: Thresholds {
                buy_dip_pct: 10.0,
                sell_pump_pct: 25.0,
                stop_loss_pct: 20.0,
            },
            migration_tp_factor: 0.5,
            engine: EngineOverrides::default(),
        }
    }
}

impl HunterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pre_migration.validate()?;
        self.post_migration.validate()?;
        if !(self.migration_tp_factor > 0.0 && self.migration_tp_factor <= 1.0) {
            return Err(ConfigError::invalid(
                "migration_tp_factor",
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Venue-aware dip/pump hunter
///
/// Picks its threshold set from the venue reported each tick. When the venue
/// changes under an open position, that position's take-profit is lowered by
/// `migration_tp_factor` until it is closed.
#[derive(Debug, Clone)]
pub struct HunterStrategy {
    config: HunterConfig,
    trade_fraction: f64,
    venue: Option<Venue>,
    migration_boost: bool,
}

impl HunterStrategy {
    pub fn new(config: HunterConfig, trade_fraction: f64) -> Self {
        Self {
            config,
            trade_fraction,
            venue: None,
            migration_boost: false,
        }
    }

    pub fn venue(&self) -> Option<Venue> {
        self.venue
    }

    pub fn migration_boost(&self) -> bool {
        self.migration_boost
    }

    fn thresholds(&self) -> Thresholds {
        match self.venue {
            Some(Venue::Amm) => self.config.post_migration,
            _ => self.config.pre_migration,
        }
    }

    fn take_profit_pct(&self) -> f64 {
        let base = self.thresholds().sell_pump_pct;
        if self.migration_boost {
            base * self.config.migration_tp_factor
        } else {
            base
        }
    }
}

impl Strategy for HunterStrategy {
    fn name(&self) -> &'static str {
        "hunter"
    }

    fn needs_venue_status(&self) -> bool {
        true
    }

    fn evaluate(&mut self, ctx: &TickContext<'_>) -> Action {
        if let Some(status) = ctx.venue {
            let previous = self.venue.replace(status.venue);
            if let Some(previous) = previous.filter(|v| *v != status.venue) {
                tracing::info!(
                    from = %previous,
                    to = %status.venue,
                    holding = ctx.position.is_some(),
                    "Venue change detected"
                );
                if ctx.position.is_some() {
                    self.migration_boost = true;
                }
            }
        }

        if ctx.position.is_none() {
            self.migration_boost = false;
        }

        reactive_action(
            &self.thresholds(),
            self.take_profit_pct(),
            self.trade_fraction,
            ctx,
        )
    }

    fn on_fill(&mut self, fill: &Fill) {
        if fill.side == TradeSide::Sell && fill.closed_position {
            self.migration_boost = false;
        }
    }

    fn detail(&self) -> StrategyDetail {
        StrategyDetail::Hunter {
            venue: self.venue,
            migration_boost: self.migration_boost,
            thresholds: self.thresholds(),
        }
    }
}
