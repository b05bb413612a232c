/// Monitoring engine module - probes, classification and scheduling
///
/// A scheduled tick flows probe -> classifier -> recorder -> alert
/// detection -> event publisher, driven by one timer per monitor.
pub mod alerts;
pub mod classifier;
pub mod config;
pub mod executor;
pub mod pipeline;
pub mod probe;
pub mod recorder;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use classifier::Thresholds;
pub use executor::MonitoringExecutor;
pub use recorder::ResultRecorder;
pub use scheduler::{MonitoringScheduler, SchedulerError};
pub use types::{MonitorStatus, ProtocolKind};
