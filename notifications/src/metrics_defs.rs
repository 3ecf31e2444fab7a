//! Metrics definitions for the asset migration.

use shared::metrics_defs::{MetricDef, MetricType};

pub const MIGRATION_TUPLES: MetricDef = MetricDef {
    name: "kessel.migration.tuples",
    metric_type: MetricType::Counter,
    description: "Ownership tuples accepted by the relations API",
    labels: &[],
};

pub const MIGRATION_SKIPPED: MetricDef = MetricDef {
    name: "kessel.migration.skipped",
    metric_type: MetricType::Counter,
    description: "Endpoints skipped because their workspace could not be resolved",
    labels: &[],
};

pub const MIGRATION_DURATION: MetricDef = MetricDef {
    name: "kessel.migration.duration",
    metric_type: MetricType::Histogram,
    description: "Wall time of one migration run, in seconds",
    labels: &[],
};

pub const ALL_METRICS: &[MetricDef] = &[MIGRATION_TUPLES, MIGRATION_SKIPPED, MIGRATION_DURATION];
