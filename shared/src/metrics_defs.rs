//! Common types for metrics definitions.
//!
//! Every component lists its metrics as `MetricDef` constants in its own
//! `metrics_defs.rs`. The names and label keys are part of the service's
//! external contract: dashboards and alerts are built on them.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
    /// Label keys every sample of this metric carries, in emission order.
    pub labels: &'static [&'static str],
}
