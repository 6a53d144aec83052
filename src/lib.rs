// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod stats;
pub mod strategy;
pub mod supervisor;
pub mod venue;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{AppConfig, StrategyConfig, StrategyKind};
pub use engine::{EngineHandle, EngineStatus, StrategyEngine};
pub use models::*;
pub use strategy::Strategy;
pub use supervisor::{EngineReport, Supervisor};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
