// Orchestration: one shared price feed, many engines
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{AppConfig, StrategyConfig};
use crate::engine::{EngineHandle, EngineStatus, EventSink, StrategyEngine};
use crate::error::ConfigError;
use crate::execution::{FeedConfig, PriceFeed, RouterConfig};
use crate::models::Mint;
use crate::stats::Stats;
use crate::venue::{PriceOracle, VenueClient};

/// Final outcome of one engine after shutdown
#[derive(Debug, Clone)]
pub struct EngineReport {
    pub id: Uuid,
    pub mint: Mint,
    pub strategy: &'static str,
    pub halt_reason: Option<String>,
    pub stats: Stats,
}

/// Owns the price feed (and with it every tracker) plus all engine handles
pub struct Supervisor {
    feed: Arc<PriceFeed>,
    venue: Arc<dyn VenueClient>,
    router: RouterConfig,
    sink: Arc<dyn EventSink>,
    handles: Vec<EngineHandle>,
}

impl Supervisor {
    pub fn new(
        venue: Arc<dyn VenueClient>,
        oracle: Arc<dyn PriceOracle>,
        feed: FeedConfig,
        router: RouterConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            feed: Arc::new(PriceFeed::new(venue.clone(), oracle, feed)),
            venue,
            router,
            sink,
            handles: Vec::new(),
        }
    }

    pub fn feed(&self) -> &Arc<PriceFeed> {
        &self.feed
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Validate `config`, then spawn an engine trading `mint` with it
    pub fn launch(&mut self, mint: Mint, config: &StrategyConfig) -> Result<Uuid, ConfigError> {
        let engine = StrategyEngine::new(
            mint.clone(),
            config,
            self.feed.clone(),
            self.venue.clone(),
            self.router.clone(),
            self.sink.clone(),
        )?;

        if !self.handles.is_empty() {
            tracing::warn!(
                engines = self.handles.len() + 1,
                "⚠️ Engines share one wallet; concurrent buys may each see the same free balance"
            );
        }

        let handle = engine.spawn();
        let id = handle.id();
        tracing::info!(
            engine = %id,
            mint = %mint.short(),
            strategy = %config.kind(),
            "Engine launched"
        );

        self.handles.push(handle);
        Ok(id)
    }

    /// Launch one engine per configured strategy
    ///
    /// Every strategy is validated before any engine starts.
    pub fn launch_all(&mut self, config: &AppConfig) -> Result<Vec<Uuid>, ConfigError> {
        config.validate()?;
        config
            .strategies
            .iter()
            .map(|strategy| self.launch(config.mint.clone(), strategy))
            .collect()
    }

    pub fn statuses(&self) -> Vec<EngineStatus> {
        self.handles.iter().map(EngineHandle::status).collect()
    }

    pub fn pause(&self, id: Uuid) -> bool {
        self.handle(id).is_some_and(EngineHandle::pause)
    }

    pub fn resume(&self, id: Uuid) -> bool {
        self.handle(id).is_some_and(EngineHandle::resume)
    }

    /// Stop a single engine; its tracker stays up for the others
    pub async fn stop(&mut self, id: Uuid) -> Option<EngineReport> {
        let index = self.handles.iter().position(|h| h.id() == id)?;
        let handle = self.handles.swap_remove(index);
        Some(finish(handle).await)
    }

    /// Stop every engine, then release the trackers
    pub async fn shutdown(mut self) -> Vec<EngineReport> {
        let mut reports = Vec::with_capacity(self.handles.len());
        for handle in self.handles.drain(..) {
            reports.push(finish(handle).await);
        }

        self.feed.shutdown();
        tracing::info!(engines = reports.len(), "👋 Supervisor shut down");
        reports
    }

    fn handle(&self, id: Uuid) -> Option<&EngineHandle> {
        self.handles.iter().find(|h| h.id() == id)
    }
}

async fn finish(handle: EngineHandle) -> EngineReport {
    let before = handle.status();
    let stats = handle.stop().await;

    EngineReport {
        id: before.id,
        mint: before.mint,
        strategy: before.strategy,
        halt_reason: before.halt_reason,
        stats,
    }
}
