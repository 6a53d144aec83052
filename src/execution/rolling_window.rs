use crate::error::InsufficientData;
use crate::indicators::calculate_sma;
use crate::models::PriceSample;
use std::collections::VecDeque;

/// Bounded, insertion-ordered window of price samples
///
/// Holds at most `capacity` samples; the oldest is evicted first.
/// Owned by a single engine, so no locking.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl RollingWindow {
    /// Create a new window
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of samples to keep (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, returning the evicted one if the window was full
    pub fn push(&mut self, sample: PriceSample) -> Option<PriceSample> {
        self.samples.push_back(sample);

        if self.samples.len() > self.capacity {
            self.samples.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    /// The sample before the latest one
    pub fn previous(&self) -> Option<&PriceSample> {
        self.samples.iter().rev().nth(1)
    }

    pub fn high(&self) -> Option<f64> {
        self.samples.iter().map(|s| s.price).reduce(f64::max)
    }

    pub fn low(&self) -> Option<f64> {
        self.samples.iter().map(|s| s.price).reduce(f64::min)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.price).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Mean of the most recent `k` samples
    ///
    /// Fails rather than approximating when fewer than `k` samples are held.
    pub fn moving_average(&self, k: usize) -> Result<f64, InsufficientData> {
        calculate_sma(&self.prices(), k).ok_or(InsufficientData {
            have: self.samples.len(),
            need: k.max(1),
        })
    }

    /// Prices oldest first
    pub fn prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.price).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceSample> {
        self.samples.iter()
    }
}
