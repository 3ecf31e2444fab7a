use crate::errors::StoreError;
use crate::store::RoutingTx;
use crate::types::EndpointEventType;
use std::collections::HashSet;
use uuid::Uuid;

/// Writes performed by one refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub inserted: usize,
    pub deleted: usize,
}

impl RefreshSummary {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }
}

/// Keeps the endpoint/event type mapping equal to what the behavior groups
/// imply.
///
/// For each event type T, the endpoints reachable from T are the union of
/// the actions of every behavior group linked to T. A refresh recomputes that
/// set from the join tables and rewrites only the rows that differ, so
/// running it again without an intervening change writes nothing.
///
/// The refresh runs inside the caller's transaction and takes no locks of its
/// own.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssociationSyncEngine;

impl AssociationSyncEngine {
    pub fn new() -> Self {
        AssociationSyncEngine
    }

    pub async fn refresh(
        &self,
        tx: &mut dyn RoutingTx,
        org_id: &str,
        event_type_ids: &HashSet<Uuid>,
    ) -> Result<RefreshSummary, StoreError> {
        if event_type_ids.is_empty() {
            return Ok(RefreshSummary::default());
        }

        let mut ids: Vec<Uuid> = event_type_ids.iter().copied().collect();
        ids.sort();

        let desired = tx.reachable_pairs(org_id, &ids).await?;
        let current = tx.endpoint_event_types(org_id, &ids).await?;

        let mut to_insert: Vec<EndpointEventType> = desired.difference(&current).copied().collect();
        let mut to_delete: Vec<EndpointEventType> = current.difference(&desired).copied().collect();
        to_insert.sort();
        to_delete.sort();

        tx.delete_endpoint_event_types(&to_delete).await?;
        tx.insert_endpoint_event_types(&to_insert).await?;

        let summary = RefreshSummary {
            inserted: to_insert.len(),
            deleted: to_delete.len(),
        };

        tracing::debug!(
            org_id,
            event_types = ids.len(),
            inserted = summary.inserted,
            deleted = summary.deleted,
            "refreshed endpoint event type links"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRoutingStore, RoutingStore};
    use crate::types::{Application, BehaviorGroup, Bundle, Endpoint, EventType};

    struct Fixture {
        store: MemoryRoutingStore,
        bundle_id: Uuid,
        event_types: Vec<Uuid>,
        endpoints: Vec<Uuid>,
    }

    async fn fixture(org_id: &str) -> Fixture {
        let store = MemoryRoutingStore::new();
        let mut tx = store.begin().await.unwrap();

        let bundle = Bundle {
            id: Uuid::new_v4(),
            name: "rhel".into(),
            display_name: "RHEL".into(),
        };
        tx.insert_bundle(&bundle).await.unwrap();
        let application = Application {
            id: Uuid::new_v4(),
            bundle_id: bundle.id,
            name: "policies".into(),
            display_name: "Policies".into(),
        };
        tx.insert_application(&application).await.unwrap();

        let mut event_types = Vec::new();
        for name in ["triggered", "resolved", "created"] {
            let event_type = EventType {
                id: Uuid::new_v4(),
                application_id: application.id,
                name: name.into(),
                display_name: name.into(),
            };
            tx.insert_event_type(&event_type).await.unwrap();
            event_types.push(event_type.id);
        }

        let mut endpoints = Vec::new();
        for name in ["hook", "slack", "email"] {
            let endpoint = Endpoint {
                id: Uuid::new_v4(),
                org_id: org_id.into(),
                endpoint_type: name.into(),
                name: name.into(),
                properties: serde_json::Value::Null,
            };
            tx.insert_endpoint(&endpoint).await.unwrap();
            endpoints.push(endpoint.id);
        }
        tx.commit().await.unwrap();

        Fixture {
            store,
            bundle_id: bundle.id,
            event_types,
            endpoints,
        }
    }

    async fn add_group(
        tx: &mut dyn RoutingTx,
        org_id: &str,
        bundle_id: Uuid,
        endpoints: &[Uuid],
        event_types: &[Uuid],
    ) -> Uuid {
        let group = BehaviorGroup {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            bundle_id,
            display_name: "group".into(),
        };
        tx.insert_behavior_group(&group).await.unwrap();
        tx.replace_behavior_group_actions(group.id, endpoints)
            .await
            .unwrap();
        for event_type in event_types {
            tx.insert_behavior(group.id, *event_type).await.unwrap();
        }
        group.id
    }

    #[tokio::test]
    async fn test_refresh_materializes_union_of_groups() {
        let f = fixture("org").await;
        let (t0, t1) = (f.event_types[0], f.event_types[1]);
        let (e0, e1, e2) = (f.endpoints[0], f.endpoints[1], f.endpoints[2]);
        let engine = AssociationSyncEngine::new();

        let mut tx = f.store.begin().await.unwrap();
        add_group(tx.as_mut(), "org", f.bundle_id, &[e0, e1], &[t0]).await;
        add_group(tx.as_mut(), "org", f.bundle_id, &[e1, e2], &[t0, t1]).await;

        let ids = HashSet::from([t0, t1]);
        let summary = engine.refresh(tx.as_mut(), "org", &ids).await.unwrap();
        assert_eq!(summary, RefreshSummary { inserted: 5, deleted: 0 });

        let rows = tx.endpoint_event_types("org", &[t0, t1]).await.unwrap();
        assert_eq!(
            rows,
            HashSet::from([
                EndpointEventType::new(e0, t0),
                EndpointEventType::new(e1, t0),
                EndpointEventType::new(e2, t0),
                EndpointEventType::new(e1, t1),
                EndpointEventType::new(e2, t1),
            ])
        );
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let f = fixture("org").await;
        let engine = AssociationSyncEngine::new();

        let mut tx = f.store.begin().await.unwrap();
        add_group(
            tx.as_mut(),
            "org",
            f.bundle_id,
            &f.endpoints,
            &f.event_types,
        )
        .await;

        let ids: HashSet<Uuid> = f.event_types.iter().copied().collect();
        let first = engine.refresh(tx.as_mut(), "org", &ids).await.unwrap();
        assert_eq!(first.inserted, 9);

        let second = engine.refresh(tx.as_mut(), "org", &ids).await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_refresh_removes_stale_pairs() {
        let f = fixture("org").await;
        let (t0, e0, e1) = (f.event_types[0], f.endpoints[0], f.endpoints[1]);
        let engine = AssociationSyncEngine::new();

        let mut tx = f.store.begin().await.unwrap();
        let group = add_group(tx.as_mut(), "org", f.bundle_id, &[e0, e1], &[t0]).await;
        let ids = HashSet::from([t0]);
        engine.refresh(tx.as_mut(), "org", &ids).await.unwrap();

        // Dropping an endpoint leaves the event type set unchanged
        tx.replace_behavior_group_actions(group, &[e1]).await.unwrap();
        let summary = engine.refresh(tx.as_mut(), "org", &ids).await.unwrap();
        assert_eq!(summary, RefreshSummary { inserted: 0, deleted: 1 });
        assert_eq!(
            tx.endpoint_event_types("org", &[t0]).await.unwrap(),
            HashSet::from([EndpointEventType::new(e1, t0)])
        );
    }

    #[tokio::test]
    async fn test_refresh_only_touches_requested_event_types() {
        let f = fixture("org").await;
        let (t0, t1, e0) = (f.event_types[0], f.event_types[1], f.endpoints[0]);
        let engine = AssociationSyncEngine::new();

        let mut tx = f.store.begin().await.unwrap();
        add_group(tx.as_mut(), "org", f.bundle_id, &[e0], &[t0, t1]).await;

        engine
            .refresh(tx.as_mut(), "org", &HashSet::from([t0]))
            .await
            .unwrap();

        assert_eq!(tx.endpoint_event_types("org", &[t0]).await.unwrap().len(), 1);
        assert!(tx.endpoint_event_types("org", &[t1]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_ignores_other_organizations() {
        let f = fixture("org").await;
        let t0 = f.event_types[0];
        let engine = AssociationSyncEngine::new();

        let mut tx = f.store.begin().await.unwrap();
        let foreign = Endpoint {
            id: Uuid::new_v4(),
            org_id: "other".into(),
            endpoint_type: "webhook".into(),
            name: "theirs".into(),
            properties: serde_json::Value::Null,
        };
        tx.insert_endpoint(&foreign).await.unwrap();
        add_group(tx.as_mut(), "other", f.bundle_id, &[foreign.id], &[t0]).await;
        engine
            .refresh(tx.as_mut(), "other", &HashSet::from([t0]))
            .await
            .unwrap();

        // The other organization's row is neither computed nor deleted here
        let summary = engine
            .refresh(tx.as_mut(), "org", &HashSet::from([t0]))
            .await
            .unwrap();
        assert!(summary.is_noop());
        assert_eq!(
            tx.endpoint_event_types("other", &[t0]).await.unwrap(),
            HashSet::from([EndpointEventType::new(foreign.id, t0)])
        );
    }

    #[tokio::test]
    async fn test_refresh_with_no_event_types() {
        let f = fixture("org").await;
        let mut tx = f.store.begin().await.unwrap();
        let summary = AssociationSyncEngine::new()
            .refresh(tx.as_mut(), "org", &HashSet::new())
            .await
            .unwrap();
        assert!(summary.is_noop());
    }
}
