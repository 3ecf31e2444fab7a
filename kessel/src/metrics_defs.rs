//! Metrics definitions for the authorization gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const LABEL_PERMISSION: &str = "permission";
pub const LABEL_RESOURCE_TYPE: &str = "resource_type";
pub const LABEL_RESULT: &str = "result";

pub const RESULT_SUCCESSES: &str = "successes";
pub const RESULT_FAILURES: &str = "failures";

pub const PERMISSION_CHECK_DURATION: MetricDef = MetricDef {
    name: "notifications.kessel.relationships.permission.check.requests",
    metric_type: MetricType::Histogram,
    description: "Time spent checking a permission on a resource, in seconds",
    labels: &[LABEL_PERMISSION, LABEL_RESOURCE_TYPE],
};

pub const PERMISSION_CHECK_COUNT: MetricDef = MetricDef {
    name: "notifications.kessel.relationships.permission.check.count",
    metric_type: MetricType::Counter,
    description: "Number of permission check requests, by result",
    labels: &[LABEL_RESULT],
};

pub const LOOKUP_RESOURCES_DURATION: MetricDef = MetricDef {
    name: "notifications.kessel.relationships.lookup.resources.requests",
    metric_type: MetricType::Histogram,
    description: "Time spent looking up and draining authorized resources, in seconds",
    labels: &[LABEL_PERMISSION, LABEL_RESOURCE_TYPE],
};

pub const LOOKUP_RESOURCES_COUNT: MetricDef = MetricDef {
    name: "notifications.kessel.relationships.lookup.check.count",
    metric_type: MetricType::Counter,
    description: "Number of resource lookup requests, by result",
    labels: &[LABEL_RESULT],
};

pub const WORKSPACE_CACHE_HIT: MetricDef = MetricDef {
    name: "notifications.rbac.workspace.cache.hit",
    metric_type: MetricType::Counter,
    description: "Default workspace lookups served from the cache",
    labels: &[],
};

pub const WORKSPACE_CACHE_MISS: MetricDef = MetricDef {
    name: "notifications.rbac.workspace.cache.miss",
    metric_type: MetricType::Counter,
    description: "Default workspace lookups that went to the RBAC directory",
    labels: &[],
};

pub const ALL_METRICS: &[MetricDef] = &[
    PERMISSION_CHECK_DURATION,
    PERMISSION_CHECK_COUNT,
    LOOKUP_RESOURCES_DURATION,
    LOOKUP_RESOURCES_COUNT,
    WORKSPACE_CACHE_HIT,
    WORKSPACE_CACHE_MISS,
];
