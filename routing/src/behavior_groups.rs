//! Mutations of the behavior group graph.
//!
//! Each operation opens one transaction, applies the mutation, refreshes the
//! endpoint/event type links of every event type whose reachable endpoints
//! may have changed, and commits. An error anywhere drops the transaction.

use crate::errors::RoutingError;
use crate::store::{RoutingStore, RoutingTx};
use crate::sync::{AssociationSyncEngine, RefreshSummary};
use crate::types::{BehaviorGroup, EventType};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBehaviorGroup {
    pub bundle_id: Uuid,
    pub display_name: String,
    pub endpoint_ids: Vec<Uuid>,
    pub event_type_ids: Vec<Uuid>,
}

pub struct BehaviorGroupService {
    store: Arc<dyn RoutingStore>,
    sync: AssociationSyncEngine,
}

/// Keeps the first occurrence of each id.
fn dedup_ordered(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl BehaviorGroupService {
    pub fn new(store: Arc<dyn RoutingStore>) -> Self {
        BehaviorGroupService {
            store,
            sync: AssociationSyncEngine::new(),
        }
    }

    pub async fn create_behavior_group(
        &self,
        org_id: &str,
        request: NewBehaviorGroup,
    ) -> Result<BehaviorGroup, RoutingError> {
        let display_name = request.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(RoutingError::EmptyDisplayName);
        }

        let mut tx = self.store.begin().await?;

        if tx.get_bundle(request.bundle_id).await?.is_none() {
            return Err(RoutingError::BundleNotFound(request.bundle_id));
        }
        if tx
            .find_behavior_group_by_name(org_id, request.bundle_id, &display_name)
            .await?
            .is_some()
        {
            return Err(RoutingError::DuplicateDisplayName(display_name));
        }

        let endpoint_ids = validate_endpoints(tx.as_mut(), org_id, &request.endpoint_ids).await?;
        let event_type_ids =
            validate_event_types(tx.as_mut(), request.bundle_id, &request.event_type_ids).await?;

        let group = BehaviorGroup {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            bundle_id: request.bundle_id,
            display_name,
        };
        tx.insert_behavior_group(&group).await?;
        tx.replace_behavior_group_actions(group.id, &endpoint_ids)
            .await?;
        for event_type_id in &event_type_ids {
            tx.insert_behavior(group.id, *event_type_id).await?;
        }

        let affected: HashSet<Uuid> = event_type_ids.into_iter().collect();
        self.sync.refresh(tx.as_mut(), org_id, &affected).await?;
        tx.commit().await?;

        tracing::info!(org_id, behavior_group_id = %group.id, "created behavior group");
        Ok(group)
    }

    /// Replaces the group's endpoint list. Event types linked to the group
    /// are refreshed, since removing an endpoint can leave stale pairs.
    pub async fn update_behavior_group_actions(
        &self,
        org_id: &str,
        group_id: Uuid,
        endpoint_ids: &[Uuid],
    ) -> Result<RefreshSummary, RoutingError> {
        let mut tx = self.store.begin().await?;
        load_group(tx.as_mut(), org_id, group_id).await?;

        let endpoint_ids = validate_endpoints(tx.as_mut(), org_id, endpoint_ids).await?;
        let before: HashSet<Uuid> = tx
            .behavior_group_event_types(group_id)
            .await?
            .into_iter()
            .collect();

        tx.replace_behavior_group_actions(group_id, &endpoint_ids)
            .await?;

        let mut affected = before;
        affected.extend(tx.behavior_group_event_types(group_id).await?);

        let summary = self.sync.refresh(tx.as_mut(), org_id, &affected).await?;
        tx.commit().await?;
        Ok(summary)
    }

    /// Replaces the group's event type list. Both the old and the new event
    /// types are refreshed.
    pub async fn update_behavior_group_event_types(
        &self,
        org_id: &str,
        group_id: Uuid,
        event_type_ids: &[Uuid],
    ) -> Result<RefreshSummary, RoutingError> {
        let mut tx = self.store.begin().await?;
        let group = load_group(tx.as_mut(), org_id, group_id).await?;

        let wanted: HashSet<Uuid> =
            validate_event_types(tx.as_mut(), group.bundle_id, event_type_ids)
                .await?
                .into_iter()
                .collect();
        let current: HashSet<Uuid> = tx
            .behavior_group_event_types(group_id)
            .await?
            .into_iter()
            .collect();

        for event_type_id in current.difference(&wanted) {
            tx.delete_behavior(group_id, *event_type_id).await?;
        }
        for event_type_id in wanted.difference(&current) {
            tx.insert_behavior(group_id, *event_type_id).await?;
        }

        let affected: HashSet<Uuid> = current.union(&wanted).copied().collect();
        let summary = self.sync.refresh(tx.as_mut(), org_id, &affected).await?;
        tx.commit().await?;
        Ok(summary)
    }

    pub async fn append_behavior_group_to_event_type(
        &self,
        org_id: &str,
        group_id: Uuid,
        event_type_id: Uuid,
    ) -> Result<RefreshSummary, RoutingError> {
        let mut tx = self.store.begin().await?;
        let group = load_group(tx.as_mut(), org_id, group_id).await?;
        validate_event_types(tx.as_mut(), group.bundle_id, &[event_type_id]).await?;

        tx.insert_behavior(group_id, event_type_id).await?;

        let summary = self
            .sync
            .refresh(tx.as_mut(), org_id, &HashSet::from([event_type_id]))
            .await?;
        tx.commit().await?;
        Ok(summary)
    }

    pub async fn remove_behavior_group_from_event_type(
        &self,
        org_id: &str,
        group_id: Uuid,
        event_type_id: Uuid,
    ) -> Result<RefreshSummary, RoutingError> {
        let mut tx = self.store.begin().await?;
        load_group(tx.as_mut(), org_id, group_id).await?;

        tx.delete_behavior(group_id, event_type_id).await?;

        let summary = self
            .sync
            .refresh(tx.as_mut(), org_id, &HashSet::from([event_type_id]))
            .await?;
        tx.commit().await?;
        Ok(summary)
    }

    pub async fn delete_behavior_group(
        &self,
        org_id: &str,
        group_id: Uuid,
    ) -> Result<RefreshSummary, RoutingError> {
        let mut tx = self.store.begin().await?;
        load_group(tx.as_mut(), org_id, group_id).await?;

        let affected: HashSet<Uuid> = tx
            .behavior_group_event_types(group_id)
            .await?
            .into_iter()
            .collect();
        tx.delete_behavior_group(group_id).await?;

        let summary = self.sync.refresh(tx.as_mut(), org_id, &affected).await?;
        tx.commit().await?;

        tracing::info!(org_id, behavior_group_id = %group_id, "deleted behavior group");
        Ok(summary)
    }

    /// Replaces the set of the organization's groups linked to an event type.
    /// Every group must belong to the event type's bundle.
    pub async fn update_event_type_behavior_groups(
        &self,
        org_id: &str,
        event_type_id: Uuid,
        group_ids: &[Uuid],
    ) -> Result<RefreshSummary, RoutingError> {
        let mut tx = self.store.begin().await?;
        let (_, bundle_id) = load_event_type(tx.as_mut(), event_type_id).await?;

        let mut wanted = HashSet::new();
        for group_id in dedup_ordered(group_ids) {
            let group = load_group(tx.as_mut(), org_id, group_id).await?;
            if group.bundle_id != bundle_id {
                return Err(RoutingError::EventTypeOutsideBundle {
                    event_type_id,
                    bundle_id: group.bundle_id,
                });
            }
            wanted.insert(group_id);
        }
        let current: HashSet<Uuid> = tx
            .behavior_groups_for_event_type(org_id, event_type_id)
            .await?
            .into_iter()
            .map(|group| group.id)
            .collect();

        for group_id in current.difference(&wanted) {
            tx.delete_behavior(*group_id, event_type_id).await?;
        }
        for group_id in wanted.difference(&current) {
            tx.insert_behavior(*group_id, event_type_id).await?;
        }

        let summary = self
            .sync
            .refresh(tx.as_mut(), org_id, &HashSet::from([event_type_id]))
            .await?;
        tx.commit().await?;
        Ok(summary)
    }

    /// Sets the endpoints reachable from an event type, expressed in behavior
    /// groups.
    ///
    /// The event type is unlinked from every group of the organization, and a
    /// group left with no event types is deleted. The endpoints are then
    /// attached to the event type's own group, found by name in the bundle:
    /// missing endpoints are appended as actions and the event type is linked
    /// again. The group is created when it does not exist.
    pub async fn update_event_type_endpoints(
        &self,
        org_id: &str,
        event_type_id: Uuid,
        endpoint_ids: &[Uuid],
    ) -> Result<RefreshSummary, RoutingError> {
        let mut tx = self.store.begin().await?;

        let (event_type, bundle_id) = load_event_type(tx.as_mut(), event_type_id).await?;
        let endpoint_ids = validate_endpoints(tx.as_mut(), org_id, endpoint_ids).await?;

        let mut pruned = 0;
        for group in tx
            .behavior_groups_for_event_type(org_id, event_type_id)
            .await?
        {
            tx.delete_behavior(group.id, event_type_id).await?;
            if tx.behavior_group_event_types(group.id).await?.is_empty() {
                tx.delete_behavior_group(group.id).await?;
                pruned += 1;
            }
        }

        if !endpoint_ids.is_empty() {
            let name = event_type_group_name(&event_type.name);
            match tx
                .find_behavior_group_by_name(org_id, bundle_id, &name)
                .await?
            {
                Some(group) => {
                    let mut actions: Vec<Uuid> = tx
                        .behavior_group_actions(group.id)
                        .await?
                        .into_iter()
                        .map(|action| action.endpoint_id)
                        .collect();
                    let before = actions.len();
                    for endpoint_id in &endpoint_ids {
                        if !actions.contains(endpoint_id) {
                            actions.push(*endpoint_id);
                        }
                    }
                    if actions.len() != before {
                        tx.replace_behavior_group_actions(group.id, &actions)
                            .await?;
                    }
                    tx.insert_behavior(group.id, event_type_id).await?;
                }
                None => {
                    let group = BehaviorGroup {
                        id: Uuid::new_v4(),
                        org_id: org_id.to_string(),
                        bundle_id,
                        display_name: name,
                    };
                    tx.insert_behavior_group(&group).await?;
                    tx.replace_behavior_group_actions(group.id, &endpoint_ids)
                        .await?;
                    tx.insert_behavior(group.id, event_type_id).await?;
                }
            }
        }

        let summary = self
            .sync
            .refresh(tx.as_mut(), org_id, &HashSet::from([event_type_id]))
            .await?;
        tx.commit().await?;

        tracing::info!(
            org_id,
            event_type_id = %event_type_id,
            endpoints = endpoint_ids.len(),
            pruned_groups = pruned,
            "updated event type endpoints"
        );
        Ok(summary)
    }
}

/// Name of the group backing endpoints attached directly to an event type.
pub fn event_type_group_name(event_type_name: &str) -> String {
    format!("Event type \"{event_type_name}\" behavior group")
}

async fn load_event_type(
    tx: &mut dyn RoutingTx,
    event_type_id: Uuid,
) -> Result<(EventType, Uuid), RoutingError> {
    let event_type = tx
        .get_event_type(event_type_id)
        .await?
        .ok_or(RoutingError::EventTypeNotFound(event_type_id))?;
    let bundle_id = tx
        .get_application(event_type.application_id)
        .await?
        .map(|application| application.bundle_id)
        .ok_or(RoutingError::EventTypeNotFound(event_type_id))?;
    Ok((event_type, bundle_id))
}

async fn load_group(
    tx: &mut dyn RoutingTx,
    org_id: &str,
    group_id: Uuid,
) -> Result<BehaviorGroup, RoutingError> {
    match tx.get_behavior_group(group_id).await? {
        Some(group) if group.org_id == org_id => Ok(group),
        _ => Err(RoutingError::BehaviorGroupNotFound(group_id)),
    }
}

async fn validate_endpoints(
    tx: &mut dyn RoutingTx,
    org_id: &str,
    endpoint_ids: &[Uuid],
) -> Result<Vec<Uuid>, RoutingError> {
    let endpoint_ids = dedup_ordered(endpoint_ids);
    for endpoint_id in &endpoint_ids {
        match tx.get_endpoint(*endpoint_id).await? {
            Some(endpoint) if endpoint.org_id == org_id => {}
            _ => return Err(RoutingError::EndpointNotFound(*endpoint_id)),
        }
    }
    Ok(endpoint_ids)
}

async fn validate_event_types(
    tx: &mut dyn RoutingTx,
    bundle_id: Uuid,
    event_type_ids: &[Uuid],
) -> Result<Vec<Uuid>, RoutingError> {
    let event_type_ids = dedup_ordered(event_type_ids);
    for event_type_id in &event_type_ids {
        let event_type = tx
            .get_event_type(*event_type_id)
            .await?
            .ok_or(RoutingError::EventTypeNotFound(*event_type_id))?;
        let application = tx.get_application(event_type.application_id).await?;
        if application.map(|a| a.bundle_id) != Some(bundle_id) {
            return Err(RoutingError::EventTypeOutsideBundle {
                event_type_id: *event_type_id,
                bundle_id,
            });
        }
    }
    Ok(event_type_ids)
}
