use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::EngineSettings;
use crate::error::ConfigError;
use crate::strategy::{
    AccumulateConfig, AccumulateStrategy, GridConfig, GridStrategy, HunterConfig, HunterStrategy,
    ReactiveConfig, ReactiveStrategy, Strategy, TrendConfig, TrendStrategy, VolumeConfig,
    VolumeStrategy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Reactive,
    Grid,
    Accumulate,
    Trend,
    Hunter,
    Volume,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Reactive,
        StrategyKind::Grid,
        StrategyKind::Accumulate,
        StrategyKind::Trend,
        StrategyKind::Hunter,
        StrategyKind::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Reactive => "reactive",
            StrategyKind::Grid => "grid",
            StrategyKind::Accumulate => "accumulate",
            StrategyKind::Trend => "trend",
            StrategyKind::Hunter => "hunter",
            StrategyKind::Volume => "volume",
        }
    }

    /// Loop and sizing defaults for this kind of strategy
    pub fn engine_defaults(&self) -> EngineSettings {
        let base = EngineSettings::default();
        match self {
            StrategyKind::Reactive => base,
            StrategyKind::Grid => EngineSettings {
                check_interval_ms: 3_000,
                trade_fraction: 0.1,
                max_position_fraction: 0.6,
                ..base
            },
            StrategyKind::Accumulate => EngineSettings {
                check_interval_ms: 10_000,
                ..base
            },
            StrategyKind::Trend => EngineSettings {
                price_window_size: 20,
                ..base
            },
            StrategyKind::Hunter => EngineSettings {
                price_window_size: 15,
                slippage: 0.30,
                ..base
            },
            StrategyKind::Volume => EngineSettings {
                trade_fraction: 0.05,
                ..base
            },
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "reactive" | "dip_pump" => Ok(StrategyKind::Reactive),
            "grid" => Ok(StrategyKind::Grid),
            "accumulate" | "accumulate_distribute" => Ok(StrategyKind::Accumulate),
            "trend" | "trend_follower" => Ok(StrategyKind::Trend),
            "hunter" | "venue_hunter" => Ok(StrategyKind::Hunter),
            "volume" | "volume_generator" => Ok(StrategyKind::Volume),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-strategy `engine` table; unset fields fall back to the kind's defaults
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineOverrides {
    pub check_interval_ms: Option<u64>,
    pub price_window_size: Option<usize>,
    pub trade_fraction: Option<f64>,
    pub max_position_fraction: Option<f64>,
    pub slippage: Option<f64>,
    pub track_prices: Option<bool>,
}

impl EngineOverrides {
    pub fn resolve(&self, defaults: EngineSettings) -> EngineSettings {
        EngineSettings {
            check_interval_ms: self.check_interval_ms.unwrap_or(defaults.check_interval_ms),
            price_window_size: self.price_window_size.unwrap_or(defaults.price_window_size),
            trade_fraction: self.trade_fraction.unwrap_or(defaults.trade_fraction),
            max_position_fraction: self
                .max_position_fraction
                .unwrap_or(defaults.max_position_fraction),
            slippage: self.slippage.unwrap_or(defaults.slippage),
            track_prices: self.track_prices.unwrap_or(defaults.track_prices),
        }
    }
}

/// One configured strategy instance, tagged by `kind`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Reactive(ReactiveConfig),
    Grid(GridConfig),
    Accumulate(AccumulateConfig),
    Trend(TrendConfig),
    Hunter(HunterConfig),
    Volume(VolumeConfig),
}

impl StrategyConfig {
    /// Default configuration for `kind`
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Reactive => StrategyConfig::Reactive(ReactiveConfig::default()),
            StrategyKind::Grid => StrategyConfig::Grid(GridConfig::default()),
            StrategyKind::Accumulate => StrategyConfig::Accumulate(AccumulateConfig::default()),
            StrategyKind::Trend => StrategyConfig::Trend(TrendConfig::default()),
            StrategyKind::Hunter => StrategyConfig::Hunter(HunterConfig::default()),
            StrategyKind::Volume => StrategyConfig::Volume(VolumeConfig::default()),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::Reactive(_) => StrategyKind::Reactive,
            StrategyConfig::Grid(_) => StrategyKind::Grid,
            StrategyConfig::Accumulate(_) => StrategyKind::Accumulate,
            StrategyConfig::Trend(_) => StrategyKind::Trend,
            StrategyConfig::Hunter(_) => StrategyKind::Hunter,
            StrategyConfig::Volume(_) => StrategyKind::Volume,
        }
    }

    fn overrides(&self) -> &EngineOverrides {
        match self {
            StrategyConfig::Reactive(c) => &c.engine,
            StrategyConfig::Grid(c) => &c.engine,
            StrategyConfig::Accumulate(c) => &c.engine,
            StrategyConfig::Trend(c) => &c.engine,
            StrategyConfig::Hunter(c) => &c.engine,
            StrategyConfig::Volume(c) => &c.engine,
        }
    }

    /// Fully resolved engine settings
    pub fn engine(&self) -> EngineSettings {
        self.overrides().resolve(self.kind().engine_defaults())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = self.engine();
        engine.validate()?;

        match self {
            StrategyConfig::Reactive(c) => c.validate(),
            StrategyConfig::Grid(c) => c.validate(),
            StrategyConfig::Accumulate(c) => c.validate(),
            StrategyConfig::Trend(c) => {
                c.validate()?;
                if c.slow_period > engine.price_window_size {
                    return Err(ConfigError::invalid(
                        "price_window_size",
                        format!("must hold slow_period ({}) samples", c.slow_period),
                    ));
                }
                Ok(())
            }
            StrategyConfig::Hunter(c) => c.validate(),
            StrategyConfig::Volume(c) => c.validate(),
        }
    }

    /// Validate and construct the decision policy
    pub fn build(&self) -> Result<Box<dyn Strategy>, ConfigError> {
        self.validate()?;
        let trade_fraction = self.engine().trade_fraction;

        let strategy: Box<dyn Strategy> = match self {
            StrategyConfig::Reactive(c) => {
                Box::new(ReactiveStrategy::new(c.thresholds(), trade_fraction))
            }
            StrategyConfig::Grid(c) => Box::new(GridStrategy::new(c.clone(), trade_fraction)),
            StrategyConfig::Accumulate(c) => Box::new(AccumulateStrategy::new(c.clone())),
            StrategyConfig::Trend(c) => Box::new(TrendStrategy::new(c.clone(), trade_fraction)),
            StrategyConfig::Hunter(c) => Box::new(HunterStrategy::new(c.clone(), trade_fraction)),
            StrategyConfig::Volume(c) => Box::new(VolumeStrategy::new(c.clone(), trade_fraction)),
        };
        Ok(strategy)
    }
}
