//! Transactional access to routing data.
//!
//! All reads and writes happen through a [`RoutingTx`]. Nothing is visible to
//! other transactions until `commit`; dropping a transaction discards it.

mod memory;
mod postgres;

pub use memory::MemoryRoutingStore;
pub use postgres::PgRoutingStore;

use crate::errors::StoreError;
use crate::types::{
    Application, BehaviorGroup, BehaviorGroupAction, Bundle, Endpoint, EndpointEventType,
    EventType,
};
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn RoutingTx>, StoreError>;
}

#[async_trait]
pub trait RoutingTx: Send {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn insert_bundle(&mut self, bundle: &Bundle) -> Result<(), StoreError>;
    async fn insert_application(&mut self, application: &Application) -> Result<(), StoreError>;
    async fn insert_event_type(&mut self, event_type: &EventType) -> Result<(), StoreError>;
    async fn insert_endpoint(&mut self, endpoint: &Endpoint) -> Result<(), StoreError>;

    async fn get_bundle(&mut self, id: Uuid) -> Result<Option<Bundle>, StoreError>;
    async fn get_application(&mut self, id: Uuid) -> Result<Option<Application>, StoreError>;
    async fn get_event_type(&mut self, id: Uuid) -> Result<Option<EventType>, StoreError>;
    async fn get_endpoint(&mut self, id: Uuid) -> Result<Option<Endpoint>, StoreError>;

    /// Endpoints ordered by id, starting strictly after `after`.
    async fn list_endpoints(
        &mut self,
        org_id: Option<&str>,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Endpoint>, StoreError>;

    async fn get_behavior_group(&mut self, id: Uuid) -> Result<Option<BehaviorGroup>, StoreError>;

    /// The organization's group with this name in the bundle. Names are
    /// unique per (organization, bundle); the lowest id wins otherwise.
    async fn find_behavior_group_by_name(
        &mut self,
        org_id: &str,
        bundle_id: Uuid,
        display_name: &str,
    ) -> Result<Option<BehaviorGroup>, StoreError>;

    async fn insert_behavior_group(&mut self, group: &BehaviorGroup) -> Result<(), StoreError>;

    /// Removes the group together with its actions and behaviors.
    async fn delete_behavior_group(&mut self, id: Uuid) -> Result<(), StoreError>;

    /// Actions of a group, ordered by position.
    async fn behavior_group_actions(
        &mut self,
        group_id: Uuid,
    ) -> Result<Vec<BehaviorGroupAction>, StoreError>;

    /// Replaces every action of a group; positions are assigned 0..n in the
    /// given order.
    async fn replace_behavior_group_actions(
        &mut self,
        group_id: Uuid,
        endpoint_ids: &[Uuid],
    ) -> Result<(), StoreError>;

    async fn behavior_group_event_types(&mut self, group_id: Uuid)
    -> Result<Vec<Uuid>, StoreError>;

    /// No-op when the link already exists.
    async fn insert_behavior(&mut self, group_id: Uuid, event_type_id: Uuid)
    -> Result<(), StoreError>;

    async fn delete_behavior(&mut self, group_id: Uuid, event_type_id: Uuid)
    -> Result<(), StoreError>;

    /// Groups of `org_id` linked to the event type.
    async fn behavior_groups_for_event_type(
        &mut self,
        org_id: &str,
        event_type_id: Uuid,
    ) -> Result<Vec<BehaviorGroup>, StoreError>;

    /// Pairs implied by the organization's behavior groups for the given
    /// event types.
    async fn reachable_pairs(
        &mut self,
        org_id: &str,
        event_type_ids: &[Uuid],
    ) -> Result<HashSet<EndpointEventType>, StoreError>;

    /// Persisted mapping rows for the given event types whose endpoint
    /// belongs to the organization.
    async fn endpoint_event_types(
        &mut self,
        org_id: &str,
        event_type_ids: &[Uuid],
    ) -> Result<HashSet<EndpointEventType>, StoreError>;

    async fn insert_endpoint_event_types(
        &mut self,
        pairs: &[EndpointEventType],
    ) -> Result<(), StoreError>;

    async fn delete_endpoint_event_types(
        &mut self,
        pairs: &[EndpointEventType],
    ) -> Result<(), StoreError>;
}
