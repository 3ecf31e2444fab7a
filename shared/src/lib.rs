pub mod config;
pub mod metrics;
pub mod metrics_defs;

pub use crate::metrics::{CapturingRecorder, Metrics};
