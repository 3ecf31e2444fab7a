//! Client side of the relationship-based authorization service.
//!
//! [`authorization::KesselAuthorization`] gates access to integrations and
//! workspaces, [`relations`] speaks the relations API, and [`workspace`]
//! resolves an organization's default workspace from the RBAC directory.

pub mod authorization;
pub mod config;
pub mod errors;
pub mod identity;
pub mod metrics_defs;
pub mod permission;
pub mod relations;
pub mod types;
pub mod workspace;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

/// Namespace of every subject type this service sends.
pub const RBAC_NAMESPACE: &str = "rbac";
/// Subject type of a user.
pub const PRINCIPAL_SUBJECT_TYPE: &str = "principal";
/// Subject type of a workspace.
pub const WORKSPACE_SUBJECT_TYPE: &str = "workspace";
