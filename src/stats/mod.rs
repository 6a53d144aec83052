// Per-engine trade statistics
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::Realized;

/// Monotonically accumulating trade metrics for one engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub buys: u32,
    pub sells: u32,
    pub wins: u32,
    pub losses: u32,
    /// Sum of realized profit percent over all sells
    pub total_profit_pct: f64,
    pub realized_pnl_sol: f64,
    /// SOL traded in both directions
    pub volume_sol: f64,
    pub best_trade_pct: Option<f64>,
    pub worst_trade_pct: Option<f64>,
    pub highest_price: Option<f64>,
    pub lowest_price: Option<f64>,
    pub started_at: DateTime<Utc>,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            buys: 0,
            sells: 0,
            wins: 0,
            losses: 0,
            total_profit_pct: 0.0,
            realized_pnl_sol: 0.0,
            volume_sol: 0.0,
            best_trade_pct: None,
            worst_trade_pct: None,
            highest_price: None,
            lowest_price: None,
            started_at: Utc::now(),
        }
    }
}

impl Stats {
    pub fn total_trades(&self) -> u32 {
        self.buys + self.sells
    }

    /// Percentage of sells that realized a profit
    pub fn win_rate(&self) -> f64 {
        let closed = self.wins + self.losses;
        if closed == 0 {
            0.0
        } else {
            self.wins as f64 / closed as f64 * 100.0
        }
    }

    pub fn print_report(&self, label: &str) {
        println!("\n=== {} ===", label);
        println!("  Running since:         {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("  Buys / Sells:          {} / {}", self.buys, self.sells);
        println!(
            "  Wins / Losses:         {} / {} ({:.1}%)",
            self.wins,
            self.losses,
            self.win_rate()
        );
        println!("  Total Profit:          {:+.2}%", self.total_profit_pct);
        println!("  Realized P&L:          {:+.6} SOL", self.realized_pnl_sol);
        println!("  Volume:                {:.6} SOL", self.volume_sol);

        if let (Some(best), Some(worst)) = (self.best_trade_pct, self.worst_trade_pct) {
            println!("  Best / Worst Trade:    {:+.2}% / {:+.2}%", best, worst);
        }
        if let (Some(high), Some(low)) = (self.highest_price, self.lowest_price) {
            println!("  Price Range:           {:.10} - {:.10}", low, high);
        }
    }
}

/// Accumulates [`Stats`] for exactly one engine
#[derive(Debug, Default)]
pub struct StatsRecorder {
    stats: Stats,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_buy(&mut self, sol_amount: f64) {
        self.stats.buys += 1;
        self.stats.volume_sol += sol_amount;
    }

    /// Record a full or partial exit; breakeven counts as a loss
    pub fn record_sell(&mut self, realized: &Realized) {
        let stats = &mut self.stats;
        stats.sells += 1;
        stats.volume_sol += realized.proceeds_sol;
        stats.realized_pnl_sol += realized.pnl_sol();
        stats.total_profit_pct += realized.profit_pct;

        if realized.pnl_sol() > 0.0 {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }

        stats.best_trade_pct = Some(
            stats
                .best_trade_pct
                .map_or(realized.profit_pct, |best| best.max(realized.profit_pct)),
        );
        stats.worst_trade_pct = Some(
            stats
                .worst_trade_pct
                .map_or(realized.profit_pct, |worst| worst.min(realized.profit_pct)),
        );
    }

    pub fn observe_price(&mut self, price: f64) {
        let stats = &mut self.stats;
        stats.highest_price = Some(stats.highest_price.map_or(price, |h| h.max(price)));
        stats.lowest_price = Some(stats.lowest_price.map_or(price, |l| l.min(price)));
    }

    pub fn snapshot(&self) -> Stats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realized(cost_sol: f64, proceeds_sol: f64) -> Realized {
        Realized {
            cost_sol,
            proceeds_sol,
            profit_pct: (proceeds_sol - cost_sol) / cost_sol * 100.0,
        }
    }

    #[test]
    fn test_records_wins_and_losses() {
        let mut recorder = StatsRecorder::new();

        recorder.record_buy(1.0);
        recorder.record_sell(&realized(1.0, 1.2));
        recorder.record_buy(1.0);
        recorder.record_sell(&realized(1.0, 0.9));

        let stats = recorder.snapshot();
        assert_eq!(stats.buys, 2);
        assert_eq!(stats.sells, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.win_rate(), 50.0);
        assert!((stats.total_profit_pct - 10.0).abs() < 1e-9);
        assert!((stats.realized_pnl_sol - 0.1).abs() < 1e-9);
        assert!((stats.volume_sol - 4.1).abs() < 1e-9);
        assert!((stats.best_trade_pct.unwrap() - 20.0).abs() < 1e-9);
        assert!((stats.worst_trade_pct.unwrap() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_breakeven_is_a_loss() {
        let mut recorder = StatsRecorder::new();
        recorder.record_sell(&realized(1.0, 1.0));

        let stats = recorder.snapshot();
        assert_eq!(stats.wins, 0);
        assert_eq!(stats.losses, 1);
    }

    #[test]
    fn test_price_extrema() {
        let mut recorder = StatsRecorder::new();
        assert_eq!(recorder.snapshot().highest_price, None);

        for price in [100.0, 85.0, 102.0, 90.0] {
            recorder.observe_price(price);
        }

        let stats = recorder.snapshot();
        assert_eq!(stats.highest_price, Some(102.0));
        assert_eq!(stats.lowest_price, Some(85.0));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut recorder = StatsRecorder::new();
        let before = recorder.snapshot();
        recorder.record_buy(0.5);

        assert_eq!(before.buys, 0);
        assert_eq!(recorder.snapshot().buys, 1);
    }
}
