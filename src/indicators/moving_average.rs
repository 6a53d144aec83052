/// Tolerance for threshold comparisons on percentages
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Calculate Simple Moving Average (SMA) over the most recent `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Percentage change from `from` to `to` (positive on a rise)
pub fn pct_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        return 0.0;
    }
    (to - from) / from * 100.0
}

/// Whether `value` has reached `threshold`, tolerating float noise
///
/// `pct_change(85.0, 102.0)` lands a hair under 20.0 in binary floating point
pub fn reached(value: f64, threshold: f64) -> bool {
    value + THRESHOLD_EPSILON >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_uses_most_recent() {
        let prices = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(calculate_sma(&prices, 2), Some(3.5));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert!(calculate_sma(&prices, 5).is_none());
        assert!(calculate_sma(&prices, 0).is_none());
    }

    #[test]
    fn test_pct_change() {
        assert!((pct_change(100.0, 85.0) + 15.0).abs() < 1e-9);
        assert!((pct_change(85.0, 102.0) - 20.0).abs() < 1e-9);
        assert_eq!(pct_change(0.0, 10.0), 0.0);
    }

    #[test]
    fn test_reached_tolerates_rounding() {
        assert!(reached(pct_change(88.0, 101.2), 15.0));
        assert!(reached(20.0, 20.0));
        assert!(!reached(19.9, 20.0));
    }
}
