use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{Mint, TradeEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// Operator-facing message from an engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineNotice {
    pub engine: Uuid,
    pub mint: Mint,
    pub tick: u64,
    pub level: NoticeLevel,
    pub message: String,
}

/// Output capability injected into every engine
pub trait EventSink: Send + Sync {
    /// Called once per executed buy or sell
    fn trade(&self, event: &TradeEvent);

    fn notice(&self, _notice: &EngineNotice) {}
}

/// Writes trade events to the log; notices are already logged by the engine
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn trade(&self, event: &TradeEvent) {
        match event.profit_pct {
            Some(profit) => tracing::info!(
                mint = %event.mint.short(),
                side = %event.kind,
                sol = event.amount_sol,
                price = event.price,
                profit_pct = profit,
                signature = %event.receipt.signature,
                "💰 {} {:.4} SOL @ {:.10} ({:+.2}%): {}",
                event.kind,
                event.amount_sol,
                event.price,
                profit,
                event.reason
            ),
            None => tracing::info!(
                mint = %event.mint.short(),
                side = %event.kind,
                sol = event.amount_sol,
                price = event.price,
                signature = %event.receipt.signature,
                "📈 {} {:.4} SOL @ {:.10}: {}",
                event.kind,
                event.amount_sol,
                event.price,
                event.reason
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Trade(TradeEvent),
    Notice(EngineNotice),
}

/// Forwards everything to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn trade(&self, event: &TradeEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(SinkEvent::Trade(event.clone()));
    }

    fn notice(&self, notice: &EngineNotice) {
        let _ = self.tx.send(SinkEvent::Notice(notice.clone()));
    }
}
