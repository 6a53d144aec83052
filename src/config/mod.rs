// Application configuration: TOML file layered with MMBOT__* environment overrides
pub mod strategy;

pub use strategy::{EngineOverrides, StrategyConfig, StrategyKind};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::execution::{FeedConfig, RouterConfig};
use crate::models::Mint;
use crate::venue::PaperConfig;

pub const DEFAULT_CONFIG_PATH: &str = "Settings.toml";
pub const ENV_PREFIX: &str = "MMBOT";

fn default_log_filter() -> String {
    "mmbot=info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Instrument every configured strategy trades
    pub mint: Mint,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Override for the DexScreener API base URL
    #[serde(default)]
    pub dexscreener_url: Option<String>,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

/// Just the tag of a strategy table, to report unknown kinds precisely
#[derive(Deserialize)]
struct KindOnly {
    kind: String,
}

#[derive(Deserialize)]
struct StrategyKinds {
    #[serde(default)]
    strategies: Vec<KindOnly>,
}

impl AppConfig {
    /// Load `path` (optional) plus environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, &[], None)
    }

    /// Like [`AppConfig::load`], with explicit key overrides applied last and
    /// optionally narrowed to a single strategy kind
    pub fn load_with(
        path: impl AsRef<Path>,
        overrides: &[(&str, String)],
        only: Option<StrategyKind>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        for (key, value) in overrides {
            builder = builder.set_override(*key, value.as_str())?;
        }

        Self::from_config(builder.build()?, only)
    }

    /// Parse a TOML document, without environment overrides
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::from_config(settings, None)
    }

    fn from_config(settings: Config, only: Option<StrategyKind>) -> Result<Self, ConfigError> {
        // Unknown strategy kinds are reported by name rather than as a serde error
        let kinds: StrategyKinds = settings.clone().try_deserialize()?;
        for entry in &kinds.strategies {
            entry.kind.parse::<StrategyKind>()?;
        }

        let mut config: AppConfig = settings.try_deserialize()?;
        if let Some(kind) = only {
            config.retain_kind(kind);
        }
        config.validate()?;
        Ok(config)
    }

    /// Keep only strategies of `kind`, falling back to its defaults if none
    /// are configured
    pub fn retain_kind(&mut self, kind: StrategyKind) {
        self.strategies.retain(|s| s.kind() == kind);
        if self.strategies.is_empty() {
            self.strategies.push(StrategyConfig::default_for(kind));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategies.is_empty() {
            return Err(ConfigError::invalid(
                "strategies",
                "at least one strategy is required",
            ));
        }
        for strategy in &self.strategies {
            strategy.validate()?;
        }

        if self.router.gas_reserve_sol < 0.0 {
            return Err(ConfigError::invalid("router.gas_reserve_sol", "must not be negative"));
        }
        require_positive("router.min_trade_sol", self.router.min_trade_sol)?;
        if self.feed.cache_ttl_ms == 0 || self.feed.tracker_poll_ms == 0 {
            return Err(ConfigError::invalid("feed", "intervals must be positive"));
        }
        Ok(())
    }
}

/// Shared check for percentages and amounts that must be strictly positive
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{} must be positive", value)))
    }
}
