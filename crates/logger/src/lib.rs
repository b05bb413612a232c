//! Tracing bootstrap shared by the netpulse binaries.

mod tracing;

pub use self::tracing::{LogFormat, init, init_tracing};
pub use ::tracing::level_filters::LevelFilter;
