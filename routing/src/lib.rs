//! Routing rules and the endpoint/event type visibility mapping derived
//! from them.
//!
//! Behavior groups connect event types to endpoints. Every mutation of that
//! graph goes through [`behavior_groups::BehaviorGroupService`], which runs the
//! mutation and the [`sync::AssociationSyncEngine`] refresh in one store
//! transaction.

pub mod behavior_groups;
pub mod errors;
pub mod store;
pub mod sync;
pub mod types;

pub use behavior_groups::{BehaviorGroupService, NewBehaviorGroup};
pub use errors::{RoutingError, StoreError};
pub use store::{RoutingStore, RoutingTx};
pub use sync::{AssociationSyncEngine, RefreshSummary};
