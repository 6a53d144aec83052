// Generic control loop shared by every strategy
mod handle;
mod sink;

pub use handle::EngineHandle;
pub use sink::{ChannelSink, EngineNotice, EventSink, NoticeLevel, SinkEvent, TracingSink};

use handle::Control;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::StrategyConfig;
use crate::error::{ConfigError, EngineError, ExecutionError};
use crate::execution::{
    BuyRequest, BuySize, ExecutionRouter, Position, PriceProvider, RollingWindow, RouteOutcome,
    RouterConfig, SellAmount, SellRequest, SkipReason,
};
use crate::models::{Mint, PriceSample, PriceSource, TradeEvent, TradeReceipt, TradeSide};
use crate::stats::{Stats, StatsRecorder};
use crate::strategy::{Action, Fill, Strategy, StrategyDetail, TickContext};
use crate::venue::VenueClient;

/// Share of the position above which a sell closes it
const FULL_EXIT_SHARE: f64 = 0.999;

/// Loop and sizing knobs common to every strategy, fully resolved
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub check_interval_ms: u64,
    pub price_window_size: usize,
    /// Fraction of available balance per regular buy
    pub trade_fraction: f64,
    /// Cap on total exposure as a fraction of balance + position
    pub max_position_fraction: f64,
    pub slippage: f64,
    /// Register a background tracker and wake on its updates
    pub track_prices: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: 5_000,
            price_window_size: 12,
            trade_fraction: 0.2,
            max_position_fraction: 0.5,
            slippage: 0.25,
            track_prices: true,
        }
    }
}

impl EngineSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_ms == 0 {
            return Err(ConfigError::invalid("check_interval_ms", "must be positive"));
        }
        if self.price_window_size < 2 {
            return Err(ConfigError::invalid("price_window_size", "must be at least 2"));
        }
        if !(self.trade_fraction > 0.0 && self.trade_fraction <= 0.5) {
            return Err(ConfigError::invalid(
                "trade_fraction",
                format!("{} is outside (0, 0.5]", self.trade_fraction),
            ));
        }
        if !(0.001..=0.5).contains(&self.slippage) {
            return Err(ConfigError::invalid(
                "slippage",
                format!("{} is outside [0.001, 0.5]", self.slippage),
            ));
        }
        if !(self.trade_fraction..=1.0).contains(&self.max_position_fraction) {
            return Err(ConfigError::invalid(
                "max_position_fraction",
                format!(
                    "{} must lie between trade_fraction ({}) and 1",
                    self.max_position_fraction, self.trade_fraction
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
            EngineState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of an engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub id: Uuid,
    pub mint: Mint,
    pub strategy: &'static str,
    pub state: EngineState,
    pub running: bool,
    pub paused: bool,
    pub tick: u64,
    pub last_price: Option<f64>,
    pub stats: Stats,
    pub position: Option<Position>,
    pub detail: StrategyDetail,
    pub halt_reason: Option<String>,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NotRunning,
    /// Every price source failed
    NoPrice,
    Paused,
    WarmingUp { have: usize, need: usize },
    /// Venue status was required but unavailable
    NoVenueStatus,
    Held,
    Traded(TradeEvent),
    /// Deliberate no-op by the router
    Skipped(SkipReason),
    Failed(ExecutionError),
    Halted(String),
}

enum LoopEvent {
    Wake,
    /// Routine poll result; the regular interval picks it up
    Polled,
    UpdatesClosed,
    Command(Option<Control>),
}

/// One strategy instance trading one instrument
///
/// Exclusively owns its window, position and stats. Each tick samples a
/// price, lets the strategy decide, and executes at most one action.
pub struct StrategyEngine {
    id: Uuid,
    mint: Mint,
    settings: EngineSettings,
    strategy: Box<dyn Strategy>,
    prices: Arc<dyn PriceProvider>,
    venue: Arc<dyn VenueClient>,
    router: ExecutionRouter,
    sink: Arc<dyn EventSink>,
    window: RollingWindow,
    position: Option<Position>,
    stats: StatsRecorder,
    state: EngineState,
    paused: bool,
    tick: u64,
    last_price: Option<f64>,
    last_trade: Option<Instant>,
    halt_reason: Option<String>,
    updates: Option<broadcast::Receiver<PriceSample>>,
}

impl StrategyEngine {
    /// Validate `config` and build an idle engine for it
    pub fn new(
        mint: Mint,
        config: &StrategyConfig,
        prices: Arc<dyn PriceProvider>,
        venue: Arc<dyn VenueClient>,
        router: RouterConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        let strategy = config.build()?;
        Self::with_strategy(mint, config.engine(), strategy, prices, venue, router, sink)
    }

    /// Build an engine around an already constructed strategy
    pub fn with_strategy(
        mint: Mint,
        settings: EngineSettings,
        strategy: Box<dyn Strategy>,
        prices: Arc<dyn PriceProvider>,
        venue: Arc<dyn VenueClient>,
        router: RouterConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        if strategy.warmup() > settings.price_window_size {
            return Err(ConfigError::invalid(
                "price_window_size",
                format!(
                    "{} needs {} samples, window holds {}",
                    strategy.name(),
                    strategy.warmup(),
                    settings.price_window_size
                ),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            window: RollingWindow::new(settings.price_window_size),
            router: ExecutionRouter::new(venue.clone(), router),
            mint,
            settings,
            strategy,
            prices,
            venue,
            sink,
            position: None,
            stats: StatsRecorder::new(),
            state: EngineState::Idle,
            paused: false,
            tick: 0,
            last_price: None,
            last_trade: None,
            halt_reason: None,
            updates: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mint(&self) -> &Mint {
        &self.mint
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            id: self.id,
            mint: self.mint.clone(),
            strategy: self.strategy.name(),
            state: self.state,
            running: self.state == EngineState::Running,
            paused: self.paused,
            tick: self.tick,
            last_price: self.last_price,
            stats: self.stats.snapshot(),
            position: self.position.clone(),
            detail: self.strategy.detail(),
            halt_reason: self.halt_reason.clone(),
        }
    }

    /// Idle -> Running: fetch the base price, seed the window, start tracking
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Idle {
            return Err(self.invalid_transition("start"));
        }

        let sample = self
            .prices
            .get_price(&self.mint)
            .await
            .ok_or_else(|| EngineError::NoBasePrice(self.mint.to_string()))?;

        self.observe(sample);
        self.strategy.on_start(sample.price);

        if self.settings.track_prices {
            self.updates = self.prices.track(&self.mint);
        }

        self.state = EngineState::Running;
        self.notify(
            NoticeLevel::Info,
            format!(
                "🚀 {} started at base price {:.10}",
                self.strategy.name(),
                sample.price
            ),
        );
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Err(self.invalid_transition("pause"));
        }
        if !self.paused {
            self.paused = true;
            self.notify(NoticeLevel::Info, "⏸️ paused".to_string());
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Err(self.invalid_transition("resume"));
        }
        if self.paused {
            self.paused = false;
            self.notify(NoticeLevel::Info, "▶️ resumed".to_string());
        }
        Ok(())
    }

    /// Run one iteration of the control loop
    ///
    /// Never fails: data and execution errors are logged and skip the tick.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.state != EngineState::Running {
            return TickOutcome::NotRunning;
        }
        self.tick += 1;

        let Some(sample) = self.prices.get_price(&self.mint).await else {
            self.notify(NoticeLevel::Warn, "price unavailable, skipping tick".to_string());
            return TickOutcome::NoPrice;
        };
        self.observe(sample);

        tracing::debug!(
            engine = %self.id,
            mint = %self.mint.short(),
            tick = self.tick,
            price = sample.price,
            source = ?sample.source,
            high = self.window.high(),
            low = self.window.low(),
            samples = self.window.len(),
            "Tick"
        );

        if self.paused {
            return TickOutcome::Paused;
        }

        let need = self.strategy.warmup();
        if self.window.len() < need {
            return TickOutcome::WarmingUp {
                have: self.window.len(),
                need,
            };
        }

        let venue_status = if self.strategy.needs_venue_status() {
            match self.venue.venue_status(&self.mint).await {
                Ok(status) => Some(status),
                Err(e) => {
                    self.notify(
                        NoticeLevel::Warn,
                        format!("venue status unavailable ({}), skipping tick", e),
                    );
                    return TickOutcome::NoVenueStatus;
                }
            }
        } else {
            None
        };

        let ctx = TickContext {
            price: sample.price,
            window: &self.window,
            position: self.position.as_ref(),
            since_last_trade: self.last_trade.map(|at| at.elapsed()),
            venue: venue_status.as_ref(),
        };
        let action = self.strategy.evaluate(&ctx);

        match action {
            Action::Hold => TickOutcome::Held,
            Action::Buy { size, reason } => self.execute_buy(size, sample.price, reason).await,
            Action::Sell { amount, reason } => {
                self.execute_sell(amount, sample.price, reason, false).await
            }
            Action::Halt { reason } => self.halt(reason).await,
        }
    }

    /// Running -> Stopping -> Stopped, closing any open position
    ///
    /// Always returns the accumulated stats, even if the final sell fails.
    pub async fn stop(&mut self) -> Stats {
        match self.state {
            EngineState::Stopped => return self.stats.snapshot(),
            EngineState::Idle => {
                self.state = EngineState::Stopped;
                return self.stats.snapshot();
            }
            EngineState::Running | EngineState::Stopping => {}
        }

        self.state = EngineState::Stopping;
        self.liquidate("engine stop".to_string()).await;
        self.updates = None;
        self.state = EngineState::Stopped;

        self.notify(NoticeLevel::Info, "🛑 stopped".to_string());
        self.stats.snapshot()
    }

    /// Run the loop on its own task
    pub fn spawn(self) -> EngineHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(self.status());
        let id = self.id;
        let mint = self.mint.clone();

        let task = tokio::spawn(self.run(control_rx, status_tx));

        EngineHandle {
            id,
            mint,
            control: control_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut control: mpsc::UnboundedReceiver<Control>,
        status: watch::Sender<EngineStatus>,
    ) -> Stats {
        if self.state == EngineState::Idle {
            if let Err(e) = self.start().await {
                self.notify(NoticeLevel::Error, format!("failed to start: {}", e));
                self.halt_reason = Some(e.to_string());
                self.state = EngineState::Stopped;
                status.send_replace(self.status());
                return self.stats.snapshot();
            }
        }

        let interval = self.settings.check_interval();

        while self.state == EngineState::Running {
            self.tick().await;
            status.send_replace(self.status());
            if self.state != EngineState::Running {
                break;
            }

            // Sleep until the next tick, an early wake from a price push, or a command
            let deadline = Instant::now() + interval;
            loop {
                let event = tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => LoopEvent::Wake,
                    update = next_update(&mut self.updates) => update,
                    command = control.recv() => LoopEvent::Command(command),
                };

                match event {
                    LoopEvent::Wake => break,
                    LoopEvent::Polled => {}
                    LoopEvent::UpdatesClosed => self.updates = None,
                    LoopEvent::Command(Some(Control::Pause)) => {
                        let _ = self.pause();
                        status.send_replace(self.status());
                    }
                    LoopEvent::Command(Some(Control::Resume)) => {
                        let _ = self.resume();
                        status.send_replace(self.status());
                    }
                    LoopEvent::Command(Some(Control::Stop)) | LoopEvent::Command(None) => {
                        let stats = self.stop().await;
                        status.send_replace(self.status());
                        return stats;
                    }
                }
            }
        }

        self.stats.snapshot()
    }

    async fn execute_buy(&mut self, size: BuySize, price: f64, reason: String) -> TickOutcome {
        let request = BuyRequest {
            size,
            price,
            held_sol: self.position.as_ref().map_or(0.0, |p| p.size_sol),
            max_position_fraction: self.settings.max_position_fraction,
            slippage: self.settings.slippage,
        };

        match self.router.buy(&self.mint, &request).await {
            Ok(RouteOutcome::Filled(receipt)) => {
                match self.position.as_mut() {
                    Some(position) => position.add(receipt.sol_amount, receipt.price),
                    None => {
                        self.position =
                            Some(Position::open(self.mint.clone(), receipt.sol_amount, receipt.price))
                    }
                }
                self.stats.record_buy(receipt.sol_amount);
                self.last_trade = Some(Instant::now());
                self.strategy.on_fill(&Fill {
                    side: TradeSide::Buy,
                    price: receipt.price,
                    sol_amount: receipt.sol_amount,
                    token_amount: receipt.token_amount,
                    closed_position: false,
                });

                TickOutcome::Traded(self.emit(receipt, reason, None))
            }
            Ok(RouteOutcome::Skipped(skip)) => self.skipped(TradeSide::Buy, skip),
            Err(e) => self.failed(TradeSide::Buy, &reason, e),
        }
    }

    async fn execute_sell(
        &mut self,
        amount: SellAmount,
        price: f64,
        reason: String,
        force: bool,
    ) -> TickOutcome {
        let Some(held_tokens) = self.position.as_ref().map(Position::tokens) else {
            return self.skipped(TradeSide::Sell, SkipReason::NothingToSell);
        };

        let request = SellRequest {
            amount,
            price,
            slippage: self.settings.slippage,
            held_tokens: Some(held_tokens),
            force,
        };

        match self.router.sell(&self.mint, &request).await {
            Ok(RouteOutcome::Filled(receipt)) => {
                let share = if held_tokens > 0.0 {
                    receipt.token_amount / held_tokens
                } else {
                    1.0
                };
                let closed = amount == SellAmount::All || share >= FULL_EXIT_SHARE;

                let realized = if closed {
                    self.position.take().map(|p| p.close(receipt.price))
                } else {
                    self.position
                        .as_mut()
                        .map(|p| p.reduce(share, receipt.price))
                };

                if let Some(realized) = &realized {
                    self.stats.record_sell(realized);
                }
                self.last_trade = Some(Instant::now());
                self.strategy.on_fill(&Fill {
                    side: TradeSide::Sell,
                    price: receipt.price,
                    sol_amount: receipt.sol_amount,
                    token_amount: receipt.token_amount,
                    closed_position: closed,
                });

                let profit = realized.map(|r| r.profit_pct);
                TickOutcome::Traded(self.emit(receipt, reason, profit))
            }
            Ok(RouteOutcome::Skipped(skip)) => self.skipped(TradeSide::Sell, skip),
            Err(e) => self.failed(TradeSide::Sell, &reason, e),
        }
    }

    /// Liquidate and stop; the engine does not resume after a halt
    async fn halt(&mut self, reason: String) -> TickOutcome {
        self.notify(NoticeLevel::Error, format!("🚨 halting: {}", reason));
        self.state = EngineState::Stopping;

        self.liquidate(reason.clone()).await;

        self.halt_reason = Some(reason.clone());
        self.updates = None;
        self.state = EngineState::Stopped;
        TickOutcome::Halted(reason)
    }

    /// Best-effort forced exit of the open position
    async fn liquidate(&mut self, reason: String) {
        if self.position.is_none() {
            return;
        }

        let price = match self.prices.get_price(&self.mint).await {
            Some(sample) => sample.price,
            None => match self.last_price {
                Some(price) => price,
                None => return,
            },
        };

        match self.execute_sell(SellAmount::All, price, reason, true).await {
            TickOutcome::Traded(_) => {}
            outcome => self.notify(
                NoticeLevel::Warn,
                format!("final liquidation did not fill ({:?}), position left open", outcome),
            ),
        }
    }

    fn observe(&mut self, sample: PriceSample) {
        self.window.push(sample);
        self.stats.observe_price(sample.price);
        self.last_price = Some(sample.price);
    }

    fn emit(&self, receipt: TradeReceipt, reason: String, profit_pct: Option<f64>) -> TradeEvent {
        let event = TradeEvent {
            kind: receipt.side,
            mint: self.mint.clone(),
            amount_sol: receipt.sol_amount,
            price: receipt.price,
            reason,
            profit_pct,
            receipt,
        };
        self.sink.trade(&event);
        event
    }

    fn skipped(&mut self, side: TradeSide, skip: SkipReason) -> TickOutcome {
        self.strategy.on_reject();
        self.notify(NoticeLevel::Info, format!("{} skipped: {}", side, skip));
        TickOutcome::Skipped(skip)
    }

    fn failed(&mut self, side: TradeSide, reason: &str, error: ExecutionError) -> TickOutcome {
        self.strategy.on_reject();
        self.notify(
            NoticeLevel::Warn,
            format!("{} failed ({}): {}", side, reason, error),
        );
        TickOutcome::Failed(error)
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Info => tracing::info!(
                engine = %self.id,
                mint = %self.mint.short(),
                tick = self.tick,
                "{}",
                message
            ),
            NoticeLevel::Warn => tracing::warn!(
                engine = %self.id,
                mint = %self.mint.short(),
                tick = self.tick,
                "{}",
                message
            ),
            NoticeLevel::Error => tracing::error!(
                engine = %self.id,
                mint = %self.mint.short(),
                tick = self.tick,
                "{}",
                message
            ),
        }

        self.sink.notice(&EngineNotice {
            engine: self.id,
            mint: self.mint.clone(),
            tick: self.tick,
            level,
            message,
        });
    }

    fn invalid_transition(&self, action: &'static str) -> EngineError {
        EngineError::InvalidTransition {
            action,
            state: self.state.as_str(),
        }
    }
}

async fn next_update(updates: &mut Option<broadcast::Receiver<PriceSample>>) -> LoopEvent {
    match updates {
        Some(rx) => match rx.recv().await {
            // Only venue pushes cut the wait short
            Ok(sample) if sample.source == PriceSource::Tracker => LoopEvent::Wake,
            Ok(_) => LoopEvent::Polled,
            Err(broadcast::error::RecvError::Lagged(_)) => LoopEvent::Wake,
            Err(broadcast::error::RecvError::Closed) => LoopEvent::UpdatesClosed,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOverrides;
    use crate::strategy::{GridConfig, HunterConfig, ReactiveConfig, TrendConfig};
    use crate::testing::{test_mint, ScriptedPrices, ScriptedVenue};

    struct Harness {
        engine: StrategyEngine,
        venue: Arc<ScriptedVenue>,
        prices: Arc<ScriptedPrices>,
        events: mpsc::UnboundedReceiver<SinkEvent>,
    }

    impl Harness {
        fn new(config: StrategyConfig, price: f64) -> Self {
            let venue = Arc::new(ScriptedVenue::new(price));
            let prices = Arc::new(ScriptedPrices::new(price));
            let (sink, events) = ChannelSink::new();
            let engine = StrategyEngine::new(
                test_mint(),
                &config,
                prices.clone(),
                venue.clone(),
                RouterConfig::default(),
                Arc::new(sink),
            )
            .unwrap();

            Self {
                engine,
                venue,
                prices,
                events,
            }
        }

        async fn started(config: StrategyConfig, price: f64) -> Self {
            let mut harness = Self::new(config, price);
            harness.engine.start().await.unwrap();
            harness
        }

        async fn feed(&mut self, price: f64) -> TickOutcome {
            self.prices.set(price);
            self.venue.set_price(price);
            self.engine.tick().await
        }

        fn trades(&mut self) -> Vec<TradeEvent> {
            let mut trades = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                if let SinkEvent::Trade(trade) = event {
                    trades.push(trade);
                }
            }
            trades
        }
    }

    fn reactive() -> StrategyConfig {
        StrategyConfig::Reactive(ReactiveConfig::default())
    }

    fn traded(outcome: TickOutcome) -> TradeEvent {
        match outcome {
            TickOutcome::Traded(event) => event,
            other => panic!("expected a trade, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dip_pump_round_trip() {
        let mut h = Harness::started(reactive(), 100.0).await;

        assert_eq!(h.feed(100.0).await, TickOutcome::Held);
        assert_eq!(h.feed(100.0).await, TickOutcome::Held);

        let buy = traded(h.feed(85.0).await);
        assert_eq!(buy.kind, TradeSide::Buy);
        assert_eq!(buy.price, 85.0);
        assert!(h.engine.position().is_some());

        let sell = traded(h.feed(102.0).await);
        assert_eq!(sell.kind, TradeSide::Sell);
        assert!((sell.profit_pct.unwrap() - 20.0).abs() < 1e-6);
        assert!(h.engine.position().is_none());

        let stats = h.engine.status().stats;
        assert_eq!(stats.buys, 1);
        assert_eq!(stats.sells, 1);
        assert_eq!(stats.wins, 1);

        let trades = h.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0], buy);
        assert_eq!(trades[1], sell);
    }

    #[tokio::test]
    async fn test_failed_buy_creates_no_position_and_retries() {
        let mut h = Harness::started(reactive(), 100.0).await;
        h.venue.fail_buys(true);

        assert!(matches!(
            h.feed(85.0).await,
            TickOutcome::Failed(ExecutionError::Submission(_))
        ));
        assert!(h.engine.position().is_none());
        assert_eq!(h.engine.status().stats.buys, 0);
        assert!(h.trades().is_empty());

        h.venue.fail_buys(false);
        traded(h.feed(85.0).await);
        assert!(h.engine.position().is_some());
    }

    #[tokio::test]
    async fn test_failed_sell_keeps_position() {
        let mut h = Harness::started(reactive(), 100.0).await;
        traded(h.feed(85.0).await);

        h.venue.fail_sells(true);
        assert!(matches!(h.feed(102.0).await, TickOutcome::Failed(_)));
        assert!(h.engine.position().is_some());

        h.venue.fail_sells(false);
        traded(h.feed(102.0).await);
        assert!(h.engine.position().is_none());
    }

    #[tokio::test]
    async fn test_missing_price_skips_tick() {
        let mut h = Harness::started(reactive(), 100.0).await;
        h.prices.clear();

        assert_eq!(h.engine.tick().await, TickOutcome::NoPrice);
        assert_eq!(h.engine.window().len(), 1);
        assert_eq!(h.engine.status().tick, 1);
        assert_eq!(h.engine.state(), EngineState::Running);
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_a_noop() {
        let mut h = Harness::started(reactive(), 100.0).await;
        h.venue.set_sol(0.005);

        assert!(matches!(
            h.feed(85.0).await,
            TickOutcome::Skipped(SkipReason::InsufficientFunds { .. })
        ));
        assert!(h.engine.position().is_none());
        assert!(h.trades().is_empty());
    }

    #[tokio::test]
    async fn test_waits_for_warmup() {
        let config = StrategyConfig::Trend(TrendConfig::default());
        let mut h = Harness::started(config, 100.0).await;

        assert_eq!(
            h.feed(100.0).await,
            TickOutcome::WarmingUp { have: 2, need: 8 }
        );
    }

    #[tokio::test]
    async fn test_trend_enters_once() {
        let config = StrategyConfig::Trend(TrendConfig {
            scale_in_trigger_pct: 25.0,
            ..Default::default()
        });
        let mut h = Harness::started(config, 100.0).await;

        for _ in 0..7 {
            h.feed(100.0).await;
        }

        let mut buys = Vec::new();
        for price in (101..=120).map(f64::from) {
            if let TickOutcome::Traded(event) = h.feed(price).await {
                buys.push(event);
            }
        }

        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].kind, TradeSide::Buy);
        assert_eq!(buys[0].price, 105.0);
    }

    fn grid() -> StrategyConfig {
        StrategyConfig::Grid(GridConfig {
            levels: 2,
            spacing_pct: 12.0,
            take_profit_pct: 15.0,
            emergency_stop_pct: 30.0,
            ..Default::default()
        })
    }

    fn filled_levels(engine: &StrategyEngine) -> Vec<bool> {
        match engine.status().detail {
            StrategyDetail::Grid { levels, .. } => levels.iter().map(|l| l.filled).collect(),
            other => panic!("expected grid detail, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_grid_level_cycle() {
        let mut h = Harness::started(grid(), 100.0).await;

        let buy = traded(h.feed(88.0).await);
        assert_eq!(buy.price, 88.0);
        assert_eq!(filled_levels(&h.engine), vec![true, false]);

        let sell = traded(h.feed(101.2).await);
        assert!((sell.profit_pct.unwrap() - 15.0).abs() < 1e-6);
        assert_eq!(filled_levels(&h.engine), vec![false, false]);
        assert!(h.engine.position().is_none());

        assert_eq!(h.feed(95.0).await, TickOutcome::Held);
        assert_eq!(filled_levels(&h.engine), vec![false, false]);
    }

    #[tokio::test]
    async fn test_grid_emergency_halts_and_liquidates() {
        let mut h = Harness::started(grid(), 100.0).await;
        traded(h.feed(88.0).await);

        assert!(matches!(h.feed(65.0).await, TickOutcome::Halted(_)));

        let status = h.engine.status();
        assert_eq!(status.state, EngineState::Stopped);
        assert!(!status.running);
        assert!(status.halt_reason.is_some());
        assert!(status.position.is_none());
        assert_eq!(h.venue.sells().len(), 1);

        assert_eq!(h.feed(100.0).await, TickOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_pause_samples_without_trading() {
        let mut h = Harness::started(reactive(), 100.0).await;

        h.engine.pause().unwrap();
        assert_eq!(h.feed(85.0).await, TickOutcome::Paused);
        assert_eq!(h.engine.window().len(), 2);
        assert!(h.engine.status().paused);

        h.engine.resume().unwrap();
        traded(h.feed(85.0).await);
    }

    #[tokio::test]
    async fn test_stop_closes_position() {
        let mut h = Harness::started(reactive(), 100.0).await;
        traded(h.feed(85.0).await);

        let stats = h.engine.stop().await;

        assert_eq!(stats.buys, 1);
        assert_eq!(stats.sells, 1);
        assert_eq!(h.engine.state(), EngineState::Stopped);
        assert!(h.engine.position().is_none());

        // Stopping again is harmless
        assert_eq!(h.engine.stop().await, stats);
    }

    #[tokio::test]
    async fn test_stop_returns_stats_when_liquidation_fails() {
        let mut h = Harness::started(reactive(), 100.0).await;
        traded(h.feed(85.0).await);
        h.venue.fail_sells(true);

        let stats = h.engine.stop().await;

        assert_eq!(stats.buys, 1);
        assert_eq!(stats.sells, 0);
        assert_eq!(h.engine.state(), EngineState::Stopped);
        assert!(h.engine.position().is_some());
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let mut h = Harness::new(reactive(), 100.0);

        tokio_test::assert_err!(h.engine.pause());
        assert_eq!(h.engine.tick().await, TickOutcome::NotRunning);

        tokio_test::assert_ok!(h.engine.start().await);
        assert_eq!(
            h.engine.start().await,
            Err(EngineError::InvalidTransition {
                action: "start",
                state: "running"
            })
        );
    }

    #[tokio::test]
    async fn test_start_requires_base_price() {
        let mut h = Harness::new(reactive(), 100.0);
        h.prices.clear();

        assert!(matches!(
            h.engine.start().await,
            Err(EngineError::NoBasePrice(_))
        ));
        assert_eq!(h.engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_hunter_skips_tick_without_venue_status() {
        let config = StrategyConfig::Hunter(HunterConfig::default());
        let mut h = Harness::started(config, 100.0).await;
        h.venue.fail_status(true);

        assert_eq!(h.feed(50.0).await, TickOutcome::NoVenueStatus);
        assert!(h.venue.buys().is_empty());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let config = StrategyConfig::Reactive(ReactiveConfig {
            engine: EngineOverrides {
                trade_fraction: Some(0.9),
                ..Default::default()
            },
            ..Default::default()
        });

        let result = StrategyEngine::new(
            test_mint(),
            &config,
            Arc::new(ScriptedPrices::new(1.0)),
            Arc::new(ScriptedVenue::new(1.0)),
            RouterConfig::default(),
            Arc::new(TracingSink),
        );

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "trade_fraction",
                ..
            })
        ));
    }

    #[test]
    fn test_nan_position_cap_rejected() {
        let settings = EngineSettings {
            max_position_fraction: f64::NAN,
            ..Default::default()
        };

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                field: "max_position_fraction",
                ..
            })
        ));
    }

    fn quick(interval_ms: u64) -> StrategyConfig {
        StrategyConfig::Reactive(ReactiveConfig {
            engine: EngineOverrides {
                check_interval_ms: Some(interval_ms),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_engine_ticks_until_stopped() {
        let h = Harness::new(quick(1_000), 100.0);
        let handle = h.engine.spawn();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let status = handle.status();
        assert!(status.running);
        assert!(status.tick >= 3);

        let stats = handle.stop().await;
        assert_eq!(stats.buys, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_update_wakes_engine_early() {
        let h = Harness::new(quick(60_000), 100.0);
        let started = Instant::now();
        let mut handle = h.engine.spawn();

        assert!(handle.changed().await);
        assert_eq!(handle.status().tick, 1);

        h.venue.set_price(85.0);
        h.prices.push(85.0);

        assert!(handle.changed().await);
        let status = handle.status();
        assert_eq!(status.tick, 2);
        assert!(status.position.is_some());
        assert!(started.elapsed() < Duration::from_secs(60));

        let stats = handle.stop().await;
        assert_eq!(stats.sells, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_pause_and_resume() {
        let h = Harness::new(quick(1_000), 100.0);
        let mut handle = h.engine.spawn();
        assert!(handle.changed().await);

        assert!(handle.pause());
        assert!(handle.changed().await);
        assert!(handle.status().paused);

        assert!(handle.resume());
        assert!(handle.changed().await);
        assert!(!handle.status().paused);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_without_price_stops() {
        let h = Harness::new(quick(1_000), 100.0);
        h.prices.clear();
        let mut handle = h.engine.spawn();

        assert!(handle.changed().await);
        let status = handle.status();
        assert_eq!(status.state, EngineState::Stopped);
        assert!(status.halt_reason.is_some());
    }
}
