use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};

use super::tracker::{PriceListener, PriceTracker, TrackerRegistry};
use crate::error::VenueError;
use crate::models::{Mint, PriceSample, PriceSource, Venue};
use crate::venue::{checked_price, PriceOracle, VenueClient};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Cached prices younger than this are served without a fetch
    pub cache_ttl_ms: u64,
    /// Tracker safety-net poll period
    pub tracker_poll_ms: u64,
    /// Tracker prices older than this are ignored
    pub tracker_stale_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 500,
            tracker_poll_ms: 1_000,
            tracker_stale_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceCacheEntry {
    pub sample: PriceSample,
    pub fetched_at: Instant,
    pub venue: Option<Venue>,
}

/// Process-wide price cache keyed by instrument
///
/// Single writer per instrument (its tracker or the fallback fetch);
/// readers get copies.
#[derive(Debug, Default)]
pub struct PriceCache {
    entries: RwLock<HashMap<Mint, PriceCacheEntry>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, mint: Mint, entry: PriceCacheEntry) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(mint, entry);
    }

    pub fn get(&self, mint: &Mint) -> Option<PriceCacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(mint)
            .copied()
    }

    /// Entry for `mint` if it is younger than `ttl`
    pub fn get_fresh(&self, mint: &Mint, ttl: Duration) -> Option<PriceCacheEntry> {
        self.get(mint).filter(|entry| entry.fetched_at.elapsed() < ttl)
    }
}

/// Source of prices for strategy engines
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Current price, or `None` if every source failed (skip the tick)
    async fn get_price(&self, mint: &Mint) -> Option<PriceSample>;

    /// Register background tracking and subscribe to its push updates
    ///
    /// Trackers outlive the caller; whoever owns the feed releases them.
    fn track(&self, _mint: &Mint) -> Option<broadcast::Receiver<PriceSample>> {
        None
    }
}

/// Cached, multi-source price feed
///
/// Resolution order: live tracker, fresh cache entry, direct venue query,
/// external aggregator (only when the direct query errored).
pub struct PriceFeed {
    venue: Arc<dyn VenueClient>,
    oracle: Arc<dyn PriceOracle>,
    cache: Arc<PriceCache>,
    registry: TrackerRegistry,
    config: FeedConfig,
}

impl PriceFeed {
    pub fn new(
        venue: Arc<dyn VenueClient>,
        oracle: Arc<dyn PriceOracle>,
        config: FeedConfig,
    ) -> Self {
        Self {
            venue,
            oracle,
            cache: Arc::new(PriceCache::new()),
            registry: TrackerRegistry::new(),
            config,
        }
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    pub fn registry(&self) -> &TrackerRegistry {
        &self.registry
    }

    pub fn tracker(&self, mint: &Mint) -> Option<Arc<PriceTracker>> {
        self.registry.get(mint)
    }

    /// Start (or reuse) the background tracker for `mint`
    pub fn start_tracking(
        &self,
        mint: &Mint,
        on_update: Option<PriceListener>,
    ) -> Arc<PriceTracker> {
        self.registry.start(
            mint,
            &self.venue,
            &self.cache,
            Duration::from_millis(self.config.tracker_poll_ms),
            on_update,
        )
    }

    pub fn stop_tracking(&self, mint: &Mint) -> bool {
        self.registry.stop(mint)
    }

    /// Release every tracker
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    async fn fetch_direct(&self, mint: &Mint) -> Result<(f64, Venue), VenueError> {
        let status = self.venue.venue_status(mint).await?;
        let price = checked_price(self.venue.quote_price(mint, status.venue).await?)?;
        Ok((price, status.venue))
    }

    fn store(&self, mint: &Mint, price: f64, source: PriceSource, venue: Option<Venue>) -> PriceSample {
        let sample = PriceSample::new(price, source);
        self.cache.insert(
            mint.clone(),
            PriceCacheEntry {
                sample,
                fetched_at: Instant::now(),
                venue,
            },
        );
        sample
    }
}

#[async_trait]
impl PriceProvider for PriceFeed {
    async fn get_price(&self, mint: &Mint) -> Option<PriceSample> {
        // 1. Live tracker
        if let Some(sample) = self
            .registry
            .get(mint)
            .and_then(|t| t.latest_fresh(Duration::from_millis(self.config.tracker_stale_ms)))
        {
            return Some(sample);
        }

        // 2. Fresh cache entry
        if let Some(entry) = self
            .cache
            .get_fresh(mint, Duration::from_millis(self.config.cache_ttl_ms))
        {
            return Some(entry.sample);
        }

        // 3. Direct venue query
        let direct_error = match self.fetch_direct(mint).await {
            Ok((price, venue)) => return Some(self.store(mint, price, PriceSource::Rpc, Some(venue))),
            Err(e) => e,
        };

        tracing::warn!(
            mint = %mint.short(),
            error = %direct_error,
            "Direct price query failed, falling back to aggregator"
        );

        // 4. External aggregator
        match self.oracle.price(mint).await.and_then(checked_price) {
            Ok(price) => Some(self.store(mint, price, PriceSource::ExternalApi, None)),
            Err(e) => {
                tracing::warn!(mint = %mint.short(), error = %e, "All price sources failed");
                None
            }
        }
    }

    fn track(&self, mint: &Mint) -> Option<broadcast::Receiver<PriceSample>> {
        Some(self.start_tracking(mint, None).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_mint, ScriptedOracle, ScriptedVenue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn feed(venue: &Arc<ScriptedVenue>, oracle: &Arc<ScriptedOracle>) -> PriceFeed {
        PriceFeed::new(venue.clone(), oracle.clone(), FeedConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_freshness_window() {
        let venue = Arc::new(ScriptedVenue::new(1.0));
        let oracle = Arc::new(ScriptedOracle::new(9.0));
        let feed = feed(&venue, &oracle);
        let mint = test_mint();

        let first = feed.get_price(&mint).await.unwrap();
        assert_eq!(first.price, 1.0);
        assert_eq!(first.source, PriceSource::Rpc);

        venue.set_price(2.0);

        tokio::time::advance(Duration::from_millis(400)).await;
        let cached = feed.get_price(&mint).await.unwrap();
        assert_eq!(cached, first);

        tokio::time::advance(Duration::from_millis(200)).await;
        let fresh = feed.get_price(&mint).await.unwrap();
        assert_eq!(fresh.price, 2.0);
        assert_eq!(venue.quote_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_aggregator_on_direct_error() {
        let venue = Arc::new(ScriptedVenue::new(1.0));
        venue.fail_quotes(true);
        let oracle = Arc::new(ScriptedOracle::new(3.0));
        let feed = feed(&venue, &oracle);
        let mint = test_mint();

        let sample = feed.get_price(&mint).await.unwrap();
        assert_eq!(sample.price, 3.0);
        assert_eq!(sample.source, PriceSource::ExternalApi);

        // Aggregator result was cached
        let entry = feed.cache().get(&mint).unwrap();
        assert_eq!(entry.sample.price, 3.0);
        assert_eq!(entry.venue, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_direct_price_falls_back() {
        let venue = Arc::new(ScriptedVenue::new(0.0));
        let oracle = Arc::new(ScriptedOracle::new(4.0));
        let feed = feed(&venue, &oracle);

        let sample = feed.get_price(&test_mint()).await.unwrap();
        assert_eq!(sample.price, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_when_all_sources_fail() {
        let venue = Arc::new(ScriptedVenue::new(1.0));
        venue.fail_quotes(true);
        let oracle = Arc::new(ScriptedOracle::new(3.0));
        oracle.fail(true);
        let feed = feed(&venue, &oracle);

        assert!(feed.get_price(&test_mint()).await.is_none());
        assert!(feed.cache().get(&test_mint()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregator_not_consulted_when_direct_succeeds() {
        let venue = Arc::new(ScriptedVenue::new(1.0));
        let oracle = Arc::new(ScriptedOracle::new(3.0));
        let feed = feed(&venue, &oracle);

        feed.get_price(&test_mint()).await.unwrap();
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_start_tracking_is_idempotent() {
        let venue = Arc::new(ScriptedVenue::new(1.0));
        let oracle = Arc::new(ScriptedOracle::new(1.0));
        let feed = feed(&venue, &oracle);
        let mint = test_mint();

        let first = feed.start_tracking(&mint, None);
        let second = feed.start_tracking(&mint, None);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(feed.registry().len(), 1);

        assert!(feed.stop_tracking(&mint));
        assert!(!feed.stop_tracking(&mint));
        assert!(feed.registry().is_empty());
    }

    #[tokio::test]
    async fn test_tracker_push_updates_cache_and_listeners() {
        let venue = Arc::new(ScriptedVenue::new(1.0));
        let push = venue.enable_push_stream();
        let oracle = Arc::new(ScriptedOracle::new(1.0));
        let feed = feed(&venue, &oracle);
        let mint = test_mint();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_listener = seen.clone();
        let tracker = feed.start_tracking(
            &mint,
            Some(Arc::new(move |_sample: &PriceSample| {
                seen_in_listener.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let mut updates = tracker.subscribe();

        push.send(5.0).await.unwrap();

        // The first poll may land before the push; wait for the pushed value
        let pushed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let sample = updates.recv().await.unwrap();
                if sample.price == 5.0 {
                    break sample;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(pushed.source, PriceSource::Tracker);
        assert_eq!(feed.cache().get(&mint).map(|e| e.sample.price), Some(5.0));
        assert_eq!(feed.get_price(&mint).await.map(|s| s.price), Some(5.0));

        tokio::time::timeout(Duration::from_secs(2), async {
            while seen.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        feed.shutdown();
        assert!(feed.tracker(&mint).is_none());
    }
}
