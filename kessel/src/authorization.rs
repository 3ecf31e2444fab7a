//! Permission checks and resource lookups against the relations API.

use crate::errors::AuthorizationError;
use crate::identity::CallerIdentity;
use crate::metrics_defs::{
    LABEL_PERMISSION, LABEL_RESOURCE_TYPE, LABEL_RESULT, LOOKUP_RESOURCES_COUNT,
    LOOKUP_RESOURCES_DURATION, PERMISSION_CHECK_COUNT, PERMISSION_CHECK_DURATION,
    RESULT_FAILURES, RESULT_SUCCESSES,
};
use crate::permission::{IntegrationPermission, Permission, ResourceType, WorkspacePermission};
use crate::relations::RelationsTransport;
use crate::types::{
    Allowed, CheckRequest, LookupResourcesRequest, ObjectReference, ObjectType, SubjectReference,
};
use shared::Metrics;
use shared::metrics_defs::MetricDef;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Gateway to the relationship-based authorization service.
///
/// Every call records one latency sample tagged with the permission and the
/// resource type, and one outcome counter increment. Errors are never
/// retried or swallowed.
pub struct KesselAuthorization {
    transport: Arc<dyn RelationsTransport>,
    domain: String,
    metrics: Metrics,
}

impl KesselAuthorization {
    pub fn new<D: Into<String>>(
        transport: Arc<dyn RelationsTransport>,
        domain: D,
        metrics: Metrics,
    ) -> Self {
        KesselAuthorization {
            transport,
            domain: domain.into(),
            metrics,
        }
    }

    /// Succeeds only if the service explicitly allows `permission` on the
    /// resource. Any other answer is `Forbidden`.
    pub async fn check(
        &self,
        identity: &CallerIdentity,
        permission: Permission,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> Result<(), AuthorizationError> {
        let request = self.build_check_request(identity, permission, resource_type, resource_id);
        let started = Instant::now();

        let result = self.transport.check(request).await;

        self.record(
            &PERMISSION_CHECK_DURATION,
            &PERMISSION_CHECK_COUNT,
            permission,
            resource_type,
            started,
            result.is_ok(),
        );

        let response = result.map_err(|e| {
            tracing::error!(
                org_id = %identity.org_id,
                %permission,
                %resource_type,
                resource_id,
                error = %e,
                "permission check failed"
            );
            e
        })?;

        if response.allowed != Allowed::True {
            tracing::debug!(
                org_id = %identity.org_id,
                user_id = %identity.user_id,
                %permission,
                %resource_type,
                resource_id,
                allowed = ?response.allowed,
                "permission denied"
            );
            return Err(AuthorizationError::Forbidden);
        }

        Ok(())
    }

    /// Checks a permission on one integration. A denial is reported as
    /// `NotFound` so that the caller learns nothing about the integration.
    pub async fn check_integration(
        &self,
        identity: &CallerIdentity,
        permission: IntegrationPermission,
        integration_id: Uuid,
    ) -> Result<(), AuthorizationError> {
        match self
            .check(
                identity,
                permission.into(),
                ResourceType::Integration,
                &integration_id.to_string(),
            )
            .await
        {
            Err(AuthorizationError::Forbidden) => Err(AuthorizationError::integration_not_found()),
            other => other,
        }
    }

    pub async fn check_workspace(
        &self,
        identity: &CallerIdentity,
        permission: WorkspacePermission,
        workspace_id: &str,
    ) -> Result<(), AuthorizationError> {
        self.check(
            identity,
            permission.into(),
            ResourceType::Workspace,
            workspace_id,
        )
        .await
    }

    /// Ids of every resource of `resource_type` on which the caller holds
    /// `permission`. The whole stream is drained before returning; a failure
    /// on any page fails the call and no partial set is returned.
    pub async fn lookup_authorized_resources(
        &self,
        identity: &CallerIdentity,
        permission: Permission,
        resource_type: ResourceType,
    ) -> Result<HashSet<Uuid>, AuthorizationError> {
        let request = self.build_lookup_request(identity, permission, resource_type);
        let started = Instant::now();

        let result = self.drain_lookup(request).await;

        self.record(
            &LOOKUP_RESOURCES_DURATION,
            &LOOKUP_RESOURCES_COUNT,
            permission,
            resource_type,
            started,
            result.is_ok(),
        );

        match &result {
            Ok(ids) => tracing::debug!(
                org_id = %identity.org_id,
                %permission,
                %resource_type,
                count = ids.len(),
                "looked up authorized resources"
            ),
            Err(e) => tracing::error!(
                org_id = %identity.org_id,
                %permission,
                %resource_type,
                error = %e,
                "resource lookup failed"
            ),
        }

        result
    }

    async fn drain_lookup(
        &self,
        request: LookupResourcesRequest,
    ) -> Result<HashSet<Uuid>, AuthorizationError> {
        let mut stream = self.transport.lookup_resources(request).await?;
        let mut ids = HashSet::new();

        while let Some(page) = stream.next_page().await? {
            let id = Uuid::parse_str(&page.resource.id).map_err(|source| {
                AuthorizationError::InvalidResourceId {
                    id: page.resource.id.clone(),
                    source,
                }
            })?;
            ids.insert(id);
        }

        Ok(ids)
    }

    pub fn build_check_request(
        &self,
        identity: &CallerIdentity,
        permission: Permission,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> CheckRequest {
        CheckRequest {
            resource: ObjectReference::new(resource_type.object_type(), resource_id),
            relation: permission.relation().to_string(),
            subject: self.principal(identity),
        }
    }

    pub fn build_lookup_request(
        &self,
        identity: &CallerIdentity,
        permission: Permission,
        resource_type: ResourceType,
    ) -> LookupResourcesRequest {
        LookupResourcesRequest {
            resource_type: resource_type.object_type(),
            relation: permission.relation().to_string(),
            subject: self.principal(identity),
        }
    }

    fn principal(&self, identity: &CallerIdentity) -> SubjectReference {
        ObjectReference::new(
            ObjectType::principal(),
            format!("{}/{}", self.domain, identity.user_id),
        )
        .into()
    }

    fn record(
        &self,
        duration: &MetricDef,
        count: &MetricDef,
        permission: Permission,
        resource_type: ResourceType,
        started: Instant,
        success: bool,
    ) {
        self.metrics
            .histogram(
                duration,
                &[
                    (LABEL_PERMISSION, permission.relation()),
                    (LABEL_RESOURCE_TYPE, resource_type.metric_tag()),
                ],
            )
            .record(started.elapsed().as_secs_f64());

        let result = if success {
            RESULT_SUCCESSES
        } else {
            RESULT_FAILURES
        };
        self.metrics
            .counter(count, &[(LABEL_RESULT, result)])
            .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::RelationsError;
    use crate::testutils::{FakePage, FakeRelationsTransport};
    use shared::CapturingRecorder;

    fn identity() -> CallerIdentity {
        CallerIdentity::new("org-1", "1234", "jdoe")
    }

    fn gateway(transport: Arc<FakeRelationsTransport>) -> (KesselAuthorization, CapturingRecorder) {
        let recorder = CapturingRecorder::new();
        let gateway = KesselAuthorization::new(transport, "redhat", recorder.handle());
        (gateway, recorder)
    }

    fn check_outcomes(recorder: &CapturingRecorder) -> (u64, u64) {
        (
            recorder.counter_value(&PERMISSION_CHECK_COUNT, &[(LABEL_RESULT, RESULT_SUCCESSES)]),
            recorder.counter_value(&PERMISSION_CHECK_COUNT, &[(LABEL_RESULT, RESULT_FAILURES)]),
        )
    }

    #[tokio::test]
    async fn test_check_allowed() {
        let transport = Arc::new(FakeRelationsTransport::new().allowing(Allowed::True));
        let (gateway, recorder) = gateway(transport.clone());

        let id = Uuid::new_v4();
        gateway
            .check(
                &identity(),
                IntegrationPermission::View.into(),
                ResourceType::Integration,
                &id.to_string(),
            )
            .await
            .unwrap();

        let requests = transport.check_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].resource.id, id.to_string());
        assert_eq!(
            requests[0].resource.r#type,
            ObjectType::new("notifications", "integration")
        );
        assert_eq!(requests[0].relation, "view");
        assert_eq!(requests[0].subject.subject.r#type, ObjectType::principal());
        assert_eq!(requests[0].subject.subject.id, "redhat/1234");

        assert_eq!(check_outcomes(&recorder), (1, 0));
        assert_eq!(
            recorder
                .histogram_samples(
                    &PERMISSION_CHECK_DURATION,
                    &[
                        (LABEL_PERMISSION, "view"),
                        (LABEL_RESOURCE_TYPE, "INTEGRATION")
                    ]
                )
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_check_denied_unless_explicitly_true() {
        for allowed in [Allowed::False, Allowed::Unspecified] {
            let transport = Arc::new(FakeRelationsTransport::new().allowing(allowed));
            let (gateway, recorder) = gateway(transport);

            let err = gateway
                .check(
                    &identity(),
                    WorkspacePermission::IntegrationsView.into(),
                    ResourceType::Workspace,
                    "ws-1",
                )
                .await
                .unwrap_err();

            assert!(matches!(err, AuthorizationError::Forbidden));
            // A denial is still a successful call
            assert_eq!(check_outcomes(&recorder), (1, 0));
            assert_eq!(recorder.histogram_count(&PERMISSION_CHECK_DURATION), 1);
        }
    }

    #[tokio::test]
    async fn test_check_transport_failure() {
        let transport = Arc::new(FakeRelationsTransport::new().failing_checks());
        let (gateway, recorder) = gateway(transport);

        let err = gateway
            .check(
                &identity(),
                IntegrationPermission::Edit.into(),
                ResourceType::Integration,
                "abc",
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthorizationError::Relations(RelationsError::Stream { .. })
        ));
        assert_eq!(check_outcomes(&recorder), (0, 1));
        assert_eq!(
            recorder
                .histogram_samples(
                    &PERMISSION_CHECK_DURATION,
                    &[
                        (LABEL_PERMISSION, "edit"),
                        (LABEL_RESOURCE_TYPE, "INTEGRATION")
                    ]
                )
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_check_integration_hides_denials() {
        let transport = Arc::new(FakeRelationsTransport::new().allowing(Allowed::False));
        let (gateway, _) = gateway(transport);

        let err = gateway
            .check_integration(&identity(), IntegrationPermission::View, Uuid::new_v4())
            .await
            .unwrap_err();

        match err {
            AuthorizationError::NotFound { body } => {
                assert_eq!(body, r#"{"error":"Integration not found"}"#)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_integration_keeps_other_failures() {
        let transport = Arc::new(FakeRelationsTransport::new().failing_checks());
        let (gateway, _) = gateway(transport);

        let err = gateway
            .check_integration(&identity(), IntegrationPermission::View, Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthorizationError::Relations(_)));
    }

    #[tokio::test]
    async fn test_check_workspace_targets_workspace_type() {
        let transport = Arc::new(FakeRelationsTransport::new().allowing(Allowed::True));
        let (gateway, recorder) = gateway(transport.clone());

        gateway
            .check_workspace(&identity(), WorkspacePermission::BehaviorGroupsEdit, "ws-9")
            .await
            .unwrap();

        let requests = transport.check_requests();
        assert_eq!(requests[0].resource.r#type, ObjectType::workspace());
        assert_eq!(requests[0].resource.id, "ws-9");
        assert_eq!(requests[0].relation, "notifications_behavior_groups_edit");
        assert_eq!(
            recorder
                .histogram_samples(
                    &PERMISSION_CHECK_DURATION,
                    &[
                        (LABEL_PERMISSION, "notifications_behavior_groups_edit"),
                        (LABEL_RESOURCE_TYPE, "WORKSPACE")
                    ]
                )
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_lookup_drains_and_deduplicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let transport = Arc::new(FakeRelationsTransport::new().with_lookup_pages(vec![
            FakePage::Resource(a.to_string()),
            FakePage::Resource(b.to_string()),
            FakePage::Resource(a.to_string()),
        ]));
        let (gateway, recorder) = gateway(transport.clone());

        let ids = gateway
            .lookup_authorized_resources(
                &identity(),
                IntegrationPermission::View.into(),
                ResourceType::Integration,
            )
            .await
            .unwrap();

        assert_eq!(ids, HashSet::from([a, b]));

        let requests = transport.lookup_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].resource_type,
            ObjectType::new("notifications", "integration")
        );
        assert_eq!(requests[0].subject.subject.id, "redhat/1234");

        assert_eq!(
            recorder.counter_value(&LOOKUP_RESOURCES_COUNT, &[(LABEL_RESULT, RESULT_SUCCESSES)]),
            1
        );
        assert_eq!(recorder.counter_total(&LOOKUP_RESOURCES_COUNT), 1);
        // One sample for the whole drain, not one per page
        assert_eq!(recorder.histogram_count(&LOOKUP_RESOURCES_DURATION), 1);
    }

    #[tokio::test]
    async fn test_lookup_page_error_fails_whole_call() {
        let transport = Arc::new(FakeRelationsTransport::new().with_lookup_pages(vec![
            FakePage::Resource(Uuid::new_v4().to_string()),
            FakePage::Error {
                code: 14,
                message: "unavailable".into(),
            },
            FakePage::Resource(Uuid::new_v4().to_string()),
        ]));
        let (gateway, recorder) = gateway(transport);

        let err = gateway
            .lookup_authorized_resources(
                &identity(),
                IntegrationPermission::View.into(),
                ResourceType::Integration,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthorizationError::Relations(RelationsError::Stream { code: 14, .. })
        ));
        assert_eq!(
            recorder.counter_value(&LOOKUP_RESOURCES_COUNT, &[(LABEL_RESULT, RESULT_FAILURES)]),
            1
        );
        assert_eq!(recorder.counter_total(&LOOKUP_RESOURCES_COUNT), 1);
        assert_eq!(recorder.histogram_count(&LOOKUP_RESOURCES_DURATION), 1);
    }

    #[tokio::test]
    async fn test_lookup_rejects_malformed_ids() {
        let transport = Arc::new(
            FakeRelationsTransport::new()
                .with_lookup_pages(vec![FakePage::Resource("not-a-uuid".into())]),
        );
        let (gateway, recorder) = gateway(transport);

        let err = gateway
            .lookup_authorized_resources(
                &identity(),
                IntegrationPermission::View.into(),
                ResourceType::Integration,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AuthorizationError::InvalidResourceId { ref id, .. } if id == "not-a-uuid"));
        assert_eq!(
            recorder.counter_value(&LOOKUP_RESOURCES_COUNT, &[(LABEL_RESULT, RESULT_FAILURES)]),
            1
        );
    }

    #[tokio::test]
    async fn test_lookup_empty_stream() {
        let transport = Arc::new(FakeRelationsTransport::new());
        let (gateway, _) = gateway(transport);

        let ids = gateway
            .lookup_authorized_resources(
                &identity(),
                IntegrationPermission::View.into(),
                ResourceType::Integration,
            )
            .await
            .unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_checks_share_counters() {
        let transport = Arc::new(FakeRelationsTransport::new().allowing(Allowed::True));
        let (gateway, recorder) = gateway(transport);
        let gateway = Arc::new(gateway);

        let mut handles = Vec::new();
        for i in 0..20 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                gateway
                    .check(
                        &identity(),
                        IntegrationPermission::View.into(),
                        ResourceType::Integration,
                        &i.to_string(),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(check_outcomes(&recorder), (20, 0));
        assert_eq!(recorder.histogram_count(&PERMISSION_CHECK_DURATION), 20);
    }
}
