use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indicators::pct_change;
use crate::models::Mint;

/// One fill composing a position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub sol_amount: f64,
    pub price: f64,
}

impl Entry {
    pub fn tokens(&self) -> f64 {
        self.sol_amount / self.price
    }
}

/// Realized outcome of reducing a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Realized {
    pub cost_sol: f64,
    pub proceeds_sol: f64,
    pub profit_pct: f64,
}

impl Realized {
    pub fn pnl_sol(&self) -> f64 {
        self.proceeds_sol - self.cost_sol
    }
}

/// Open position in one instrument
///
/// Exists only while size > 0; created by a successful buy, grown by
/// average-in buys, shrunk by partial sells and dropped on a full sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub mint: Mint,
    pub size_sol: f64,         // Cost basis in SOL
    pub entry_price: f64,      // Volume-weighted average entry
    pub opened_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
}

impl Position {
    pub fn open(mint: Mint, sol_amount: f64, price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            mint,
            size_sol: sol_amount,
            entry_price: price,
            opened_at: Utc::now(),
            entries: vec![Entry { sol_amount, price }],
        }
    }

    /// Average in another fill
    pub fn add(&mut self, sol_amount: f64, price: f64) {
        self.entries.push(Entry { sol_amount, price });
        self.recompute();

        tracing::debug!(
            mint = %self.mint.short(),
            avg = self.entry_price,
            size_sol = self.size_sol,
            "Averaged into position"
        );
    }

    /// Token quantity implied by the fills
    pub fn tokens(&self) -> f64 {
        self.entries.iter().map(Entry::tokens).sum()
    }

    pub fn profit_pct(&self, price: f64) -> f64 {
        pct_change(self.entry_price, price)
    }

    pub fn value_at(&self, price: f64) -> f64 {
        self.tokens() * price
    }

    /// Scale every entry down by `fraction` sold at `price`
    pub fn reduce(&mut self, fraction: f64, price: f64) -> Realized {
        let fraction = fraction.clamp(0.0, 1.0);
        let cost_sol = self.size_sol * fraction;
        let proceeds_sol = self.tokens() * fraction * price;

        for entry in &mut self.entries {
            entry.sol_amount *= 1.0 - fraction;
        }
        self.size_sol -= cost_sol;

        Realized {
            cost_sol,
            proceeds_sol,
            profit_pct: self.profit_pct(price),
        }
    }

    /// Realize the whole position at `price`
    pub fn close(self, price: f64) -> Realized {
        Realized {
            cost_sol: self.size_sol,
            proceeds_sol: self.value_at(price),
            profit_pct: self.profit_pct(price),
        }
    }

    fn recompute(&mut self) {
        self.size_sol = self.entries.iter().map(|e| e.sol_amount).sum();
        let tokens = self.tokens();
        if tokens > 0.0 {
            self.entry_price = self.size_sol / tokens;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_mint;

    #[test]
    fn test_open_position() {
        let position = Position::open(test_mint(), 1.0, 0.5);

        assert_eq!(position.size_sol, 1.0);
        assert_eq!(position.entry_price, 0.5);
        assert_eq!(position.tokens(), 2.0);
        assert_eq!(position.entries.len(), 1);
    }

    #[test]
    fn test_average_entry_is_volume_weighted() {
        let mut position = Position::open(test_mint(), 1.0, 100.0);
        position.add(1.0, 50.0);

        // 0.01 + 0.02 tokens for 2 SOL
        assert!((position.tokens() - 0.03).abs() < 1e-12);
        assert!((position.entry_price - 2.0 / 0.03).abs() < 1e-9);
        assert_eq!(position.size_sol, 2.0);
    }

    #[test]
    fn test_profit_pct() {
        let position = Position::open(test_mint(), 1.0, 85.0);
        assert!((position.profit_pct(102.0) - 20.0).abs() < 1e-9);
        assert!((position.profit_pct(68.0) + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_reduce() {
        let mut position = Position::open(test_mint(), 2.0, 1.0);

        let realized = position.reduce(0.25, 1.5);

        assert!((realized.cost_sol - 0.5).abs() < 1e-12);
        assert!((realized.proceeds_sol - 0.75).abs() < 1e-12);
        assert!((realized.pnl_sol() - 0.25).abs() < 1e-12);
        assert!((position.size_sol - 1.5).abs() < 1e-12);
        assert!((position.tokens() - 1.5).abs() < 1e-12);
        // Average entry unchanged by a proportional reduction
        assert_eq!(position.entry_price, 1.0);
    }

    #[test]
    fn test_close() {
        let position = Position::open(test_mint(), 1.0, 2.0);
        let realized = position.close(1.0);

        assert_eq!(realized.cost_sol, 1.0);
        assert_eq!(realized.proceeds_sol, 0.5);
        assert!((realized.profit_pct + 50.0).abs() < 1e-9);
    }
}
