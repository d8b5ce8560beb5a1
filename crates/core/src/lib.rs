// Lineflow Core - Domain Logic & Ports
// NO infrastructure dependencies (hexagonal architecture)

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::{OrchestratorConfig, StrategyConfig};
pub use error::{AppError, Result};
