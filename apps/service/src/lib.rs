//! Netpulse monitoring engine: scheduled health checks for network devices.

pub mod config;
pub mod database;
pub mod events;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;

pub use orchestrator::Orchestrator;
