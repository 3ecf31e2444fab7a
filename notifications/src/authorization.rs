//! The authorization capability used by the resource layer, with one variant
//! per back-end.
//!
//! Callers ask an [`AuthorizationSelector`] for the variant that serves an
//! organization and only ever see the [`Authorization`] trait.

use async_trait::async_trait;
use kessel::authorization::KesselAuthorization;
use kessel::errors::AuthorizationError;
use kessel::identity::CallerIdentity;
use kessel::permission::{IntegrationPermission, Permission, ResourceType, WorkspacePermission};
use routing::RoutingStore;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const ENDPOINT_PAGE_SIZE: usize = 1_000;

#[async_trait]
pub trait Authorization: Send + Sync {
    async fn check(
        &self,
        identity: &CallerIdentity,
        permission: Permission,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<(), AuthorizationError>;

    /// A denial is reported as `NotFound`.
    async fn check_integration(
        &self,
        identity: &CallerIdentity,
        permission: IntegrationPermission,
        integration_id: Uuid,
    ) -> Result<(), AuthorizationError>;

    async fn check_workspace(
        &self,
        identity: &CallerIdentity,
        permission: WorkspacePermission,
        workspace_id: &str,
    ) -> Result<(), AuthorizationError>;

    async fn lookup_authorized_integrations(
        &self,
        identity: &CallerIdentity,
        permission: IntegrationPermission,
    ) -> Result<HashSet<Uuid>, AuthorizationError>;
}

#[async_trait]
impl Authorization for KesselAuthorization {
    async fn check(
        &self,
        identity: &CallerIdentity,
        permission: Permission,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<(), AuthorizationError> {
        KesselAuthorization::check(self, identity, permission, resource_type, resource_id).await
    }

    async fn check_integration(
        &self,
        identity: &CallerIdentity,
        permission: IntegrationPermission,
        integration_id: Uuid,
    ) -> Result<(), AuthorizationError> {
        KesselAuthorization::check_integration(self, identity, permission, integration_id).await
    }

    async fn check_workspace(
        &self,
        identity: &CallerIdentity,
        permission: WorkspacePermission,
        workspace_id: &str,
    ) -> Result<(), AuthorizationError> {
        KesselAuthorization::check_workspace(self, identity, permission, workspace_id).await
    }

    async fn lookup_authorized_integrations(
        &self,
        identity: &CallerIdentity,
        permission: IntegrationPermission,
    ) -> Result<HashSet<Uuid>, AuthorizationError> {
        self.lookup_authorized_resources(identity, permission.into(), ResourceType::Integration)
            .await
    }
}

/// Role-based authorization from the permissions carried by the caller
/// identity. Integrations are visible to every caller of their organization
/// who holds the permission.
pub struct RbacAuthorization {
    store: Arc<dyn RoutingStore>,
}

impl RbacAuthorization {
    pub fn new(store: Arc<dyn RoutingStore>) -> Self {
        RbacAuthorization { store }
    }

    fn require(identity: &CallerIdentity, permission: Permission) -> Result<(), AuthorizationError> {
        if identity.has_legacy_permission(permission.legacy_permission()) {
            Ok(())
        } else {
            Err(AuthorizationError::Forbidden)
        }
    }
}

fn backend_error(e: routing::StoreError) -> AuthorizationError {
    AuthorizationError::Backend(Box::new(e))
}

#[async_trait]
impl Authorization for RbacAuthorization {
    async fn check(
        &self,
        identity: &CallerIdentity,
        permission: Permission,
        _resource_type: ResourceType,
        _resource_id: &str,
    ) -> Result<(), AuthorizationError> {
        Self::require(identity, permission)
    }

    async fn check_integration(
        &self,
        identity: &CallerIdentity,
        permission: IntegrationPermission,
        integration_id: Uuid,
    ) -> Result<(), AuthorizationError> {
        Self::require(identity, permission.into())?;

        let mut tx = self.store.begin().await.map_err(backend_error)?;
        let endpoint = tx
            .get_endpoint(integration_id)
            .await
            .map_err(backend_error)?;

        match endpoint {
            Some(endpoint) if endpoint.org_id == identity.org_id => Ok(()),
            _ => Err(AuthorizationError::integration_not_found()),
        }
    }

    async fn check_workspace(
        &self,
        identity: &CallerIdentity,
        permission: WorkspacePermission,
        _workspace_id: &str,
    ) -> Result<(), AuthorizationError> {
        Self::require(identity, permission.into())
    }

    async fn lookup_authorized_integrations(
        &self,
        identity: &CallerIdentity,
        permission: IntegrationPermission,
    ) -> Result<HashSet<Uuid>, AuthorizationError> {
        if Self::require(identity, permission.into()).is_err() {
            return Ok(HashSet::new());
        }

        let mut tx = self.store.begin().await.map_err(backend_error)?;
        let mut ids = HashSet::new();
        let mut after = None;
        loop {
            let page = tx
                .list_endpoints(Some(&identity.org_id), after, ENDPOINT_PAGE_SIZE)
                .await
                .map_err(backend_error)?;
            ids.extend(page.iter().map(|endpoint| endpoint.id));

            match page.last() {
                Some(last) if page.len() == ENDPOINT_PAGE_SIZE => after = Some(last.id),
                _ => break,
            }
        }

        Ok(ids)
    }
}

/// Picks the back-end serving an organization.
#[derive(Clone)]
pub struct AuthorizationSelector {
    kessel: Arc<dyn Authorization>,
    rbac: Arc<dyn Authorization>,
    kessel_enabled: bool,
    kessel_orgs: HashSet<String>,
}

impl AuthorizationSelector {
    pub fn new<I>(
        kessel: Arc<dyn Authorization>,
        rbac: Arc<dyn Authorization>,
        kessel_enabled: bool,
        kessel_orgs: I,
    ) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        AuthorizationSelector {
            kessel,
            rbac,
            kessel_enabled,
            kessel_orgs: kessel_orgs.into_iter().collect(),
        }
    }

    pub fn uses_kessel(&self, org_id: &str) -> bool {
        self.kessel_enabled || self.kessel_orgs.contains(org_id)
    }

    pub fn for_org(&self, org_id: &str) -> Arc<dyn Authorization> {
        if self.uses_kessel(org_id) {
            self.kessel.clone()
        } else {
            self.rbac.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kessel::testutils::{FakePage, FakeRelationsTransport};
    use kessel::types::Allowed;
    use routing::store::MemoryRoutingStore;
    use routing::types::Endpoint;
    use shared::Metrics;

    fn endpoint(org_id: &str) -> Endpoint {
        Endpoint {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            endpoint_type: "webhook".into(),
            name: "hook".into(),
            properties: serde_json::Value::Null,
        }
    }

    async fn store_with(endpoints: &[Endpoint]) -> Arc<MemoryRoutingStore> {
        let store = Arc::new(MemoryRoutingStore::new());
        let mut tx = store.begin().await.unwrap();
        for endpoint in endpoints {
            tx.insert_endpoint(endpoint).await.unwrap();
        }
        tx.commit().await.unwrap();
        store
    }

    fn reader() -> CallerIdentity {
        CallerIdentity::new("org-1", "1", "reader")
            .with_legacy_permissions(["notifications:integrations:read"])
    }

    #[tokio::test]
    async fn test_rbac_check_uses_legacy_permissions() {
        let rbac = RbacAuthorization::new(store_with(&[]).await);

        rbac.check(
            &reader(),
            IntegrationPermission::View.into(),
            ResourceType::Integration,
            "any",
        )
        .await
        .unwrap();

        let err = rbac
            .check_workspace(&reader(), WorkspacePermission::IntegrationsCreate, "ws")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::Forbidden));
    }

    #[tokio::test]
    async fn test_rbac_check_integration_is_org_scoped() {
        let ours = endpoint("org-1");
        let theirs = endpoint("org-2");
        let rbac = RbacAuthorization::new(store_with(&[ours.clone(), theirs.clone()]).await);

        rbac.check_integration(&reader(), IntegrationPermission::View, ours.id)
            .await
            .unwrap();

        let err = rbac
            .check_integration(&reader(), IntegrationPermission::View, theirs.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::NotFound { .. }));

        let err = rbac
            .check_integration(&reader(), IntegrationPermission::Edit, ours.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::Forbidden));
    }

    #[tokio::test]
    async fn test_rbac_lookup_returns_org_integrations() {
        let first = endpoint("org-1");
        let second = endpoint("org-1");
        let rbac = RbacAuthorization::new(
            store_with(&[first.clone(), second.clone(), endpoint("org-2")]).await,
        );

        let ids = rbac
            .lookup_authorized_integrations(&reader(), IntegrationPermission::View)
            .await
            .unwrap();
        assert_eq!(ids, HashSet::from([first.id, second.id]));

        let ids = rbac
            .lookup_authorized_integrations(&reader(), IntegrationPermission::Delete)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_selector_routes_by_org() {
        let integration = Uuid::new_v4();
        let transport = Arc::new(
            FakeRelationsTransport::new()
                .allowing(Allowed::False)
                .with_lookup_pages(vec![FakePage::Resource(integration.to_string())]),
        );
        let kessel: Arc<dyn Authorization> = Arc::new(KesselAuthorization::new(
            transport.clone(),
            "redhat",
            Metrics::noop(),
        ));
        let rbac: Arc<dyn Authorization> =
            Arc::new(RbacAuthorization::new(store_with(&[]).await));

        let selector =
            AuthorizationSelector::new(kessel.clone(), rbac.clone(), false, ["org-k".to_string()]);
        assert!(selector.uses_kessel("org-k"));
        assert!(!selector.uses_kessel("org-1"));

        let identity = CallerIdentity::new("org-k", "7", "user");
        let ids = selector
            .for_org(&identity.org_id)
            .lookup_authorized_integrations(&identity, IntegrationPermission::View)
            .await
            .unwrap();
        assert_eq!(ids, HashSet::from([integration]));

        // Denied by the relations API, reported as not found
        let err = selector
            .for_org(&identity.org_id)
            .check_integration(&identity, IntegrationPermission::View, integration)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::NotFound { .. }));
        assert_eq!(transport.check_requests().len(), 1);

        // Other organizations never reach the relations API
        let ids = selector
            .for_org("org-1")
            .lookup_authorized_integrations(&reader(), IntegrationPermission::View)
            .await
            .unwrap();
        assert!(ids.is_empty());
        assert_eq!(transport.lookup_requests().len(), 1);

        let everyone = AuthorizationSelector::new(kessel, rbac, true, Vec::new());
        assert!(everyone.uses_kessel("org-1"));
    }
}
