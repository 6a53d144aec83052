// Price statistics shared by the rolling window and the strategies
pub mod moving_average;

pub use moving_average::{calculate_sma, pct_change, reached};
