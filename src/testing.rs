//! Scriptable fakes for unit tests
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::error::VenueError;
use crate::execution::PriceProvider;
use crate::models::{Mint, PriceSample, PriceSource, Venue, VenueStatus, LAMPORTS_PER_SOL};
use crate::venue::{PriceOracle, VenueClient, VenueOrder};

pub(crate) fn test_mint() -> Mint {
    "So11111111111111111111111111111111111111112".parse().unwrap()
}

struct VenueState {
    price: f64,
    status: VenueStatus,
    lamports: u64,
    tokens: f64,
    fail_quotes: bool,
    fail_status: bool,
    fail_balance: bool,
    fail_buys: bool,
    fail_sells: bool,
    quote_calls: usize,
    status_calls: usize,
    buys: Vec<VenueOrder>,
    sells: Vec<VenueOrder>,
    push: Option<mpsc::Receiver<f64>>,
}

/// In-memory venue: fills at the scripted price, failures on demand
pub(crate) struct ScriptedVenue {
    state: Mutex<VenueState>,
}

impl ScriptedVenue {
    pub fn new(price: f64) -> Self {
        Self {
            state: Mutex::new(VenueState {
                price,
                status: VenueStatus::bonding_curve(),
                lamports: 10 * LAMPORTS_PER_SOL as u64,
                tokens: 0.0,
                fail_quotes: false,
                fail_status: false,
                fail_balance: false,
                fail_buys: false,
                fail_sells: false,
                quote_calls: 0,
                status_calls: 0,
                buys: Vec::new(),
                sells: Vec::new(),
                push: None,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut VenueState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_price(&self, price: f64) {
        self.with(|s| s.price = price);
    }

    pub fn set_status(&self, status: VenueStatus) {
        self.with(|s| s.status = status);
    }

    pub fn set_sol(&self, sol: f64) {
        self.with(|s| s.lamports = (sol * LAMPORTS_PER_SOL) as u64);
    }

    pub fn fail_quotes(&self, fail: bool) {
        self.with(|s| s.fail_quotes = fail);
    }

    pub fn fail_status(&self, fail: bool) {
        self.with(|s| s.fail_status = fail);
    }

    pub fn fail_balance(&self, fail: bool) {
        self.with(|s| s.fail_balance = fail);
    }

    pub fn fail_buys(&self, fail: bool) {
        self.with(|s| s.fail_buys = fail);
    }

    pub fn fail_sells(&self, fail: bool) {
        self.with(|s| s.fail_sells = fail);
    }

    pub fn quote_calls(&self) -> usize {
        self.with(|s| s.quote_calls)
    }

    pub fn status_calls(&self) -> usize {
        self.with(|s| s.status_calls)
    }

    pub fn buys(&self) -> Vec<VenueOrder> {
        self.with(|s| s.buys.clone())
    }

    pub fn sells(&self) -> Vec<VenueOrder> {
        self.with(|s| s.sells.clone())
    }

    pub fn tokens(&self) -> f64 {
        self.with(|s| s.tokens)
    }

    /// Offer a push stream to the next tracker; returns its sender
    pub fn enable_push_stream(&self) -> mpsc::Sender<f64> {
        let (tx, rx) = mpsc::channel(16);
        self.with(|s| s.push = Some(rx));
        tx
    }
}

#[async_trait]
impl VenueClient for ScriptedVenue {
    async fn venue_status(&self, _mint: &Mint) -> Result<VenueStatus, VenueError> {
        self.with(|s| {
            s.status_calls += 1;
            if s.fail_status {
                Err(VenueError::Network("status unavailable".into()))
            } else {
                Ok(s.status.clone())
            }
        })
    }

    async fn quote_price(&self, _mint: &Mint, _venue: Venue) -> Result<f64, VenueError> {
        self.with(|s| {
            s.quote_calls += 1;
            if s.fail_quotes {
                Err(VenueError::Network("rpc down".into()))
            } else {
                Ok(s.price)
            }
        })
    }

    async fn sol_balance(&self) -> Result<u64, VenueError> {
        self.with(|s| {
            if s.fail_balance {
                Err(VenueError::Network("balance unavailable".into()))
            } else {
                Ok(s.lamports)
            }
        })
    }

    async fn token_balance(&self, _mint: &Mint) -> Result<f64, VenueError> {
        self.with(|s| {
            if s.fail_balance {
                Err(VenueError::Network("balance unavailable".into()))
            } else {
                Ok(s.tokens)
            }
        })
    }

    async fn buy(&self, order: &VenueOrder) -> Result<String, VenueError> {
        self.with(|s| {
            if s.fail_buys {
                return Err(VenueError::Rejected("buy rejected".into()));
            }
            s.lamports = s
                .lamports
                .saturating_sub((order.amount * LAMPORTS_PER_SOL) as u64);
            s.tokens += order.amount / s.price;
            s.buys.push(order.clone());
            Ok(format!("sig-buy-{}", s.buys.len()))
        })
    }

    async fn sell(&self, order: &VenueOrder) -> Result<String, VenueError> {
        self.with(|s| {
            if s.fail_sells {
                return Err(VenueError::Rejected("sell rejected".into()));
            }
            s.tokens = (s.tokens - order.amount).max(0.0);
            s.lamports += (order.amount * s.price * LAMPORTS_PER_SOL) as u64;
            s.sells.push(order.clone());
            Ok(format!("sig-sell-{}", s.sells.len()))
        })
    }

    fn subscribe_prices(&self, _mint: &Mint) -> Option<mpsc::Receiver<f64>> {
        self.with(|s| s.push.take())
    }
}

/// Aggregator fake
pub(crate) struct ScriptedOracle {
    price: Mutex<f64>,
    failing: Mutex<bool>,
    calls: Mutex<usize>,
}

impl ScriptedOracle {
    pub fn new(price: f64) -> Self {
        Self {
            price: Mutex::new(price),
            failing: Mutex::new(false),
            calls: Mutex::new(0),
        }
    }

    pub fn fail(&self, fail: bool) {
        *self.failing.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PriceOracle for ScriptedOracle {
    async fn price(&self, _mint: &Mint) -> Result<f64, VenueError> {
        *self.calls.lock().unwrap() += 1;
        if *self.failing.lock().unwrap() {
            Err(VenueError::Network("aggregator down".into()))
        } else {
            Ok(*self.price.lock().unwrap())
        }
    }

    async fn venue_status(&self, _mint: &Mint) -> Result<VenueStatus, VenueError> {
        Ok(VenueStatus::bonding_curve())
    }
}

/// Price provider that serves whatever price was set last
pub(crate) struct ScriptedPrices {
    price: Mutex<Option<f64>>,
    updates: broadcast::Sender<PriceSample>,
}

impl ScriptedPrices {
    pub fn new(price: f64) -> Self {
        let (updates, _) = broadcast::channel(16);
        Self {
            price: Mutex::new(Some(price)),
            updates,
        }
    }

    pub fn set(&self, price: f64) {
        *self.price.lock().unwrap() = Some(price);
    }

    pub fn clear(&self) {
        *self.price.lock().unwrap() = None;
    }

    /// Set the price and wake tracking subscribers
    pub fn push(&self, price: f64) {
        self.set(price);
        let _ = self
            .updates
            .send(PriceSample::new(price, PriceSource::Tracker));
    }
}

#[async_trait]
impl PriceProvider for ScriptedPrices {
    async fn get_price(&self, _mint: &Mint) -> Option<PriceSample> {
        self.price
            .lock()
            .unwrap()
            .map(|p| PriceSample::new(p, PriceSource::Rpc))
    }

    fn track(&self, _mint: &Mint) -> Option<broadcast::Receiver<PriceSample>> {
        Some(self.updates.subscribe())
    }
}
