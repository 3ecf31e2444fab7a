use super::{RoutingStore, RoutingTx};
use crate::errors::StoreError;
use crate::types::{
    Application, Behavior, BehaviorGroup, BehaviorGroupAction, Bundle, Endpoint,
    EndpointEventType, EventType,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone, Default)]
struct RoutingData {
    bundles: HashMap<Uuid, Bundle>,
    applications: HashMap<Uuid, Application>,
    event_types: HashMap<Uuid, EventType>,
    endpoints: BTreeMap<Uuid, Endpoint>,
    behavior_groups: HashMap<Uuid, BehaviorGroup>,
    // Endpoint ids in position order
    actions: HashMap<Uuid, Vec<Uuid>>,
    behaviors: BTreeSet<Behavior>,
    endpoint_event_types: BTreeSet<EndpointEventType>,
}

/// Routing store held in process memory.
///
/// Transactions are serialised: `begin` waits until the previous
/// transaction is committed or dropped. Each transaction works on its own
/// copy of the data, which replaces the shared copy on commit.
#[derive(Clone, Default)]
pub struct MemoryRoutingStore {
    data: Arc<Mutex<RoutingData>>,
}

impl MemoryRoutingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoutingStore for MemoryRoutingStore {
    async fn begin(&self) -> Result<Box<dyn RoutingTx>, StoreError> {
        let guard = self.data.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryRoutingTx { guard, working }))
    }
}

struct MemoryRoutingTx {
    guard: OwnedMutexGuard<RoutingData>,
    working: RoutingData,
}

fn constraint(message: String) -> StoreError {
    StoreError::Constraint(message)
}

#[async_trait]
impl RoutingTx for MemoryRoutingTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryRoutingTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn insert_bundle(&mut self, bundle: &Bundle) -> Result<(), StoreError> {
        let data = &mut self.working;
        if data.bundles.values().any(|b| b.name == bundle.name) {
            return Err(constraint(format!("duplicate bundle name {}", bundle.name)));
        }
        data.bundles.insert(bundle.id, bundle.clone());
        Ok(())
    }

    async fn insert_application(&mut self, application: &Application) -> Result<(), StoreError> {
        let data = &mut self.working;
        if !data.bundles.contains_key(&application.bundle_id) {
            return Err(constraint(format!(
                "unknown bundle {}",
                application.bundle_id
            )));
        }
        if data
            .applications
            .values()
            .any(|a| a.bundle_id == application.bundle_id && a.name == application.name)
        {
            return Err(constraint(format!(
                "duplicate application name {}",
                application.name
            )));
        }
        data.applications.insert(application.id, application.clone());
        Ok(())
    }

    async fn insert_event_type(&mut self, event_type: &EventType) -> Result<(), StoreError> {
        let data = &mut self.working;
        if !data.applications.contains_key(&event_type.application_id) {
            return Err(constraint(format!(
                "unknown application {}",
                event_type.application_id
            )));
        }
        if data.event_types.values().any(|e| {
            e.application_id == event_type.application_id && e.name == event_type.name
        }) {
            return Err(constraint(format!(
                "duplicate event type name {}",
                event_type.name
            )));
        }
        data.event_types.insert(event_type.id, event_type.clone());
        Ok(())
    }

    async fn insert_endpoint(&mut self, endpoint: &Endpoint) -> Result<(), StoreError> {
        self.working.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(())
    }

    async fn get_bundle(&mut self, id: Uuid) -> Result<Option<Bundle>, StoreError> {
        Ok(self.working.bundles.get(&id).cloned())
    }

    async fn get_application(&mut self, id: Uuid) -> Result<Option<Application>, StoreError> {
        Ok(self.working.applications.get(&id).cloned())
    }

    async fn get_event_type(&mut self, id: Uuid) -> Result<Option<EventType>, StoreError> {
        Ok(self.working.event_types.get(&id).cloned())
    }

    async fn get_endpoint(&mut self, id: Uuid) -> Result<Option<Endpoint>, StoreError> {
        Ok(self.working.endpoints.get(&id).cloned())
    }

    async fn list_endpoints(
        &mut self,
        org_id: Option<&str>,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Endpoint>, StoreError> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        Ok(self
            .working
            .endpoints
            .range((lower, Bound::Unbounded))
            .map(|(_, endpoint)| endpoint)
            .filter(|endpoint| org_id.is_none_or(|org_id| endpoint.org_id == org_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_behavior_group(&mut self, id: Uuid) -> Result<Option<BehaviorGroup>, StoreError> {
        Ok(self.working.behavior_groups.get(&id).cloned())
    }

    async fn find_behavior_group_by_name(
        &mut self,
        org_id: &str,
        bundle_id: Uuid,
        display_name: &str,
    ) -> Result<Option<BehaviorGroup>, StoreError> {
        Ok(self
            .working
            .behavior_groups
            .values()
            .filter(|g| {
                g.org_id == org_id && g.bundle_id == bundle_id && g.display_name == display_name
            })
            .min_by_key(|g| g.id)
            .cloned())
    }

    async fn insert_behavior_group(&mut self, group: &BehaviorGroup) -> Result<(), StoreError> {
        let data = &mut self.working;
        if !data.bundles.contains_key(&group.bundle_id) {
            return Err(constraint(format!("unknown bundle {}", group.bundle_id)));
        }
        data.behavior_groups.insert(group.id, group.clone());
        data.actions.insert(group.id, Vec::new());
        Ok(())
    }

    async fn delete_behavior_group(&mut self, id: Uuid) -> Result<(), StoreError> {
        let data = &mut self.working;
        data.behavior_groups.remove(&id);
        data.actions.remove(&id);
        data.behaviors.retain(|b| b.behavior_group_id != id);
        Ok(())
    }

    async fn behavior_group_actions(
        &mut self,
        group_id: Uuid,
    ) -> Result<Vec<BehaviorGroupAction>, StoreError> {
        let endpoints = self.working.actions.get(&group_id);
        Ok(endpoints
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(position, endpoint_id)| BehaviorGroupAction {
                behavior_group_id: group_id,
                endpoint_id: *endpoint_id,
                position: position as i32,
            })
            .collect())
    }

    async fn replace_behavior_group_actions(
        &mut self,
        group_id: Uuid,
        endpoint_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        let data = &mut self.working;
        if !data.behavior_groups.contains_key(&group_id) {
            return Err(constraint(format!("unknown behavior group {group_id}")));
        }
        let mut seen = HashSet::new();
        for endpoint_id in endpoint_ids {
            if !data.endpoints.contains_key(endpoint_id) {
                return Err(constraint(format!("unknown endpoint {endpoint_id}")));
            }
            if !seen.insert(*endpoint_id) {
                return Err(constraint(format!(
                    "duplicate action for endpoint {endpoint_id}"
                )));
            }
        }
        data.actions.insert(group_id, endpoint_ids.to_vec());
        Ok(())
    }

    async fn behavior_group_event_types(
        &mut self,
        group_id: Uuid,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .working
            .behaviors
            .iter()
            .filter(|b| b.behavior_group_id == group_id)
            .map(|b| b.event_type_id)
            .collect())
    }

    async fn insert_behavior(
        &mut self,
        group_id: Uuid,
        event_type_id: Uuid,
    ) -> Result<(), StoreError> {
        let data = &mut self.working;
        if !data.behavior_groups.contains_key(&group_id) {
            return Err(constraint(format!("unknown behavior group {group_id}")));
        }
        if !data.event_types.contains_key(&event_type_id) {
            return Err(constraint(format!("unknown event type {event_type_id}")));
        }
        data.behaviors.insert(Behavior {
            behavior_group_id: group_id,
            event_type_id,
        });
        Ok(())
    }

    async fn delete_behavior(
        &mut self,
        group_id: Uuid,
        event_type_id: Uuid,
    ) -> Result<(), StoreError> {
        self.working.behaviors.remove(&Behavior {
            behavior_group_id: group_id,
            event_type_id,
        });
        Ok(())
    }

    async fn behavior_groups_for_event_type(
        &mut self,
        org_id: &str,
        event_type_id: Uuid,
    ) -> Result<Vec<BehaviorGroup>, StoreError> {
        let data = &self.working;
        Ok(data
            .behaviors
            .iter()
            .filter(|b| b.event_type_id == event_type_id)
            .filter_map(|b| data.behavior_groups.get(&b.behavior_group_id))
            .filter(|g| g.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn reachable_pairs(
        &mut self,
        org_id: &str,
        event_type_ids: &[Uuid],
    ) -> Result<HashSet<EndpointEventType>, StoreError> {
        let data = &self.working;
        let wanted: HashSet<&Uuid> = event_type_ids.iter().collect();
        let mut pairs = HashSet::new();

        for behavior in data
            .behaviors
            .iter()
            .filter(|b| wanted.contains(&b.event_type_id))
        {
            let in_org = data
                .behavior_groups
                .get(&behavior.behavior_group_id)
                .is_some_and(|g| g.org_id == org_id);
            if !in_org {
                continue;
            }
            for endpoint_id in data
                .actions
                .get(&behavior.behavior_group_id)
                .into_iter()
                .flatten()
            {
                pairs.insert(EndpointEventType::new(*endpoint_id, behavior.event_type_id));
            }
        }

        Ok(pairs)
    }

    async fn endpoint_event_types(
        &mut self,
        org_id: &str,
        event_type_ids: &[Uuid],
    ) -> Result<HashSet<EndpointEventType>, StoreError> {
        let data = &self.working;
        let wanted: HashSet<&Uuid> = event_type_ids.iter().collect();

        Ok(data
            .endpoint_event_types
            .iter()
            .filter(|pair| wanted.contains(&pair.event_type_id))
            .filter(|pair| {
                data.endpoints
                    .get(&pair.endpoint_id)
                    .is_some_and(|e| e.org_id == org_id)
            })
            .copied()
            .collect())
    }

    async fn insert_endpoint_event_types(
        &mut self,
        pairs: &[EndpointEventType],
    ) -> Result<(), StoreError> {
        self.working.endpoint_event_types.extend(pairs.iter().copied());
        Ok(())
    }

    async fn delete_endpoint_event_types(
        &mut self,
        pairs: &[EndpointEventType],
    ) -> Result<(), StoreError> {
        for pair in pairs {
            self.working.endpoint_event_types.remove(pair);
        }
        Ok(())
    }
}
