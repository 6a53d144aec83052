use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use super::price_feed::{PriceCache, PriceCacheEntry};
use crate::error::VenueError;
use crate::models::{Mint, PriceSample, PriceSource, Venue};
use crate::venue::{checked_price, VenueClient};

const UPDATE_BUFFER: usize = 64;

/// Callback invoked for every tracker update, off the tracker's own loop
pub type PriceListener = Arc<dyn Fn(&PriceSample) + Send + Sync>;

struct TrackerShared {
    mint: Mint,
    latest: RwLock<Option<(PriceSample, Instant)>>,
    updates: broadcast::Sender<PriceSample>,
    cache: Arc<PriceCache>,
}

impl TrackerShared {
    fn publish(&self, price: f64, source: PriceSource, venue: Option<Venue>) {
        let sample = PriceSample::new(price, source);
        let now = Instant::now();

        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some((sample, now));
        self.cache.insert(
            self.mint.clone(),
            PriceCacheEntry {
                sample,
                fetched_at: now,
                venue,
            },
        );

        // No receivers is fine
        let _ = self.updates.send(sample);
    }
}

enum TrackerEvent {
    Pushed(Option<f64>),
    Poll,
}

/// Background price tracker for one instrument
///
/// Consumes the venue's push stream when one exists and polls on a fixed
/// interval as a safety net. Every update lands in the shared cache and is
/// broadcast to subscribers; pushed samples are tagged `Tracker`, polled ones
/// `Rpc`. Tasks are aborted on drop.
pub struct PriceTracker {
    shared: Arc<TrackerShared>,
    task: JoinHandle<()>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl PriceTracker {
    fn spawn(
        mint: Mint,
        venue: Arc<dyn VenueClient>,
        cache: Arc<PriceCache>,
        poll_interval: Duration,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let shared = Arc::new(TrackerShared {
            mint,
            latest: RwLock::new(None),
            updates,
            cache,
        });

        let task = tokio::spawn(run_tracker(shared.clone(), venue, poll_interval));

        Self {
            shared,
            task,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn mint(&self) -> &Mint {
        &self.shared.mint
    }

    /// Last published sample and when it arrived
    pub fn latest(&self) -> Option<(PriceSample, Instant)> {
        *self.shared.latest.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Last published sample if younger than `max_age`
    pub fn latest_fresh(&self, max_age: Duration) -> Option<PriceSample> {
        self.latest()
            .filter(|(_, at)| at.elapsed() <= max_age)
            .map(|(sample, _)| sample)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceSample> {
        self.shared.updates.subscribe()
    }

    /// Register a callback; it runs on its own task so a slow listener
    /// never stalls the tracker
    pub fn add_listener(&self, listener: PriceListener) {
        let mut rx = self.subscribe();
        let mint = self.shared.mint.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(sample) => listener(&sample),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(mint = %mint.short(), skipped, "Price listener lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    fn abort(&self) {
        self.task.abort();
        for handle in self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            handle.abort();
        }
    }
}

impl Drop for PriceTracker {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn next_push(stream: &mut Option<mpsc::Receiver<f64>>) -> Option<f64> {
    match stream {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn poll_once(venue: &dyn VenueClient, mint: &Mint) -> Result<(f64, Venue), VenueError> {
    let status = venue.venue_status(mint).await?;
    let price = checked_price(venue.quote_price(mint, status.venue).await?)?;
    Ok((price, status.venue))
}

async fn run_tracker(shared: Arc<TrackerShared>, venue: Arc<dyn VenueClient>, poll: Duration) {
    let mut stream = venue.subscribe_prices(&shared.mint);
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        mint = %shared.mint.short(),
        push = stream.is_some(),
        poll_ms = poll.as_millis() as u64,
        "Price tracker started"
    );

    loop {
        let event = tokio::select! {
            pushed = next_push(&mut stream) => TrackerEvent::Pushed(pushed),
            _ = ticker.tick() => TrackerEvent::Poll,
        };

        match event {
            TrackerEvent::Pushed(Some(price)) => match checked_price(price) {
                Ok(price) => shared.publish(price, PriceSource::Tracker, None),
                Err(e) => tracing::debug!(mint = %shared.mint.short(), error = %e, "Ignoring pushed price"),
            },
            TrackerEvent::Pushed(None) => {
                tracing::warn!(mint = %shared.mint.short(), "Push stream closed, polling only");
                stream = None;
            }
            TrackerEvent::Poll => match poll_once(venue.as_ref(), &shared.mint).await {
                Ok((price, venue)) => shared.publish(price, PriceSource::Rpc, Some(venue)),
                Err(e) => {
                    tracing::debug!(mint = %shared.mint.short(), error = %e, "Tracker poll failed")
                }
            },
        }
    }
}

/// Registry of running trackers, at most one per instrument
///
/// Owned by whoever orchestrates engine lifecycles; `shutdown` releases
/// every tracker.
#[derive(Default)]
pub struct TrackerRegistry {
    trackers: Mutex<HashMap<Mint, Arc<PriceTracker>>>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `mint`, or return the tracker already running for it
    pub fn start(
        &self,
        mint: &Mint,
        venue: &Arc<dyn VenueClient>,
        cache: &Arc<PriceCache>,
        poll_interval: Duration,
        listener: Option<PriceListener>,
    ) -> Arc<PriceTracker> {
        let mut trackers = self.trackers.lock().unwrap_or_else(|e| e.into_inner());

        let tracker = trackers
            .entry(mint.clone())
            .or_insert_with(|| {
                Arc::new(PriceTracker::spawn(
                    mint.clone(),
                    venue.clone(),
                    cache.clone(),
                    poll_interval,
                ))
            })
            .clone();

        if let Some(listener) = listener {
            tracker.add_listener(listener);
        }

        tracker
    }

    /// Stop and forget the tracker for `mint`; false if none was running
    pub fn stop(&self, mint: &Mint) -> bool {
        let removed = self
            .trackers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(mint);

        match removed {
            Some(tracker) => {
                tracker.abort();
                tracing::info!(mint = %mint.short(), "Price tracker stopped");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, mint: &Mint) -> Option<Arc<PriceTracker>> {
        self.trackers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(mint)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.trackers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every tracker
    pub fn shutdown(&self) {
        let drained: Vec<Arc<PriceTracker>> = self
            .trackers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, tracker)| tracker)
            .collect();

        for tracker in &drained {
            tracker.abort();
        }

        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Price trackers shut down");
        }
    }
}
