//! Relationship-based authorization for notification integrations: the
//! per-organization authorization capability, the ownership backfill job and
//! the administrative API that triggers it.

pub mod api;
pub mod authorization;
pub mod bootstrap;
pub mod config;
pub mod metrics_defs;
pub mod migration;
