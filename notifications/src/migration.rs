//! Backfills endpoint ownership into the relations API.
//!
//! Every endpoint becomes one tuple stating that its organization's default
//! workspace owns it. Tuples are sent in bulk requests of at most
//! `max_batch_size`. An endpoint whose workspace cannot be resolved is
//! skipped; a failed bulk request ends the run.

use crate::metrics_defs::{MIGRATION_DURATION, MIGRATION_SKIPPED, MIGRATION_TUPLES};
use kessel::permission::ResourceType;
use kessel::relations::{RelationsError, RelationsTransport};
use kessel::types::{CreateTuplesRequest, ObjectReference, ObjectType, Relationship};
use kessel::workspace::WorkspaceResolver;
use routing::{RoutingStore, StoreError};
use shared::Metrics;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Relation linking an integration to the workspace that owns it.
pub const WORKSPACE_RELATION: &str = "workspace";

#[derive(thiserror::Error, Debug)]
pub enum MigrationError {
    #[error("max batch size must be at least 1")]
    InvalidBatchSize,
    #[error("could not read endpoints: {0}")]
    Store(#[from] StoreError),
    #[error("bulk tuple creation failed after {requests_sent} successful requests: {source}")]
    CreateTuples {
        requests_sent: usize,
        #[source]
        source: RelationsError,
    },
}

/// Counts of one migration run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub endpoints_seen: usize,
    pub tuples_sent: usize,
    pub skipped: usize,
    pub requests_sent: usize,
}

pub struct BatchMigrationJob {
    store: Arc<dyn RoutingStore>,
    workspaces: Arc<dyn WorkspaceResolver>,
    relations: Arc<dyn RelationsTransport>,
    metrics: Metrics,
    page_size: usize,
}

pub fn ownership_tuple(endpoint_id: Uuid, workspace_id: Uuid) -> Relationship {
    Relationship {
        resource: ObjectReference::new(
            ResourceType::Integration.object_type(),
            endpoint_id.to_string(),
        ),
        relation: WORKSPACE_RELATION.to_string(),
        subject: ObjectReference::new(ObjectType::workspace(), workspace_id.to_string()).into(),
    }
}

impl BatchMigrationJob {
    pub fn new(
        store: Arc<dyn RoutingStore>,
        workspaces: Arc<dyn WorkspaceResolver>,
        relations: Arc<dyn RelationsTransport>,
        metrics: Metrics,
        page_size: usize,
    ) -> Self {
        BatchMigrationJob {
            store,
            workspaces,
            relations,
            metrics,
            page_size: page_size.max(1),
        }
    }

    /// Walks every endpoint, or those of `org_id`, in id order.
    pub async fn migrate(
        &self,
        max_batch_size: usize,
        org_id: Option<&str>,
    ) -> Result<MigrationReport, MigrationError> {
        if max_batch_size == 0 {
            return Err(MigrationError::InvalidBatchSize);
        }

        tracing::info!(org_id, max_batch_size, "starting asset migration");
        let started = Instant::now();

        let result = self.run(max_batch_size, org_id).await;

        self.metrics
            .histogram(&MIGRATION_DURATION, &[])
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(report) => tracing::info!(
                org_id,
                endpoints_seen = report.endpoints_seen,
                tuples_sent = report.tuples_sent,
                skipped = report.skipped,
                requests_sent = report.requests_sent,
                "asset migration finished"
            ),
            Err(e) => tracing::error!(org_id, error = %e, "asset migration failed"),
        }

        result
    }

    async fn run(
        &self,
        max_batch_size: usize,
        org_id: Option<&str>,
    ) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport::default();
        let mut pending: Vec<Relationship> = Vec::with_capacity(max_batch_size);
        let mut after = None;

        loop {
            let page = {
                let mut tx = self.store.begin().await?;
                tx.list_endpoints(org_id, after, self.page_size).await?
            };
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);
            let exhausted = page.len() < self.page_size;

            for endpoint in &page {
                report.endpoints_seen += 1;

                let workspace_id = match self.workspaces.default_workspace_id(&endpoint.org_id).await
                {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(
                            org_id = %endpoint.org_id,
                            endpoint_id = %endpoint.id,
                            error = %e,
                            "skipping endpoint, workspace could not be resolved"
                        );
                        self.metrics.counter(&MIGRATION_SKIPPED, &[]).increment(1);
                        report.skipped += 1;
                        continue;
                    }
                };

                pending.push(ownership_tuple(endpoint.id, workspace_id));
                if pending.len() == max_batch_size {
                    self.flush(&mut pending, &mut report).await?;
                }
            }

            if exhausted {
                break;
            }
        }

        if !pending.is_empty() {
            self.flush(&mut pending, &mut report).await?;
        }

        Ok(report)
    }

    async fn flush(
        &self,
        pending: &mut Vec<Relationship>,
        report: &mut MigrationReport,
    ) -> Result<(), MigrationError> {
        let tuples = std::mem::take(pending);
        let count = tuples.len();

        self.relations
            .create_tuples(CreateTuplesRequest {
                upsert: true,
                tuples,
            })
            .await
            .map_err(|source| MigrationError::CreateTuples {
                requests_sent: report.requests_sent,
                source,
            })?;

        report.requests_sent += 1;
        report.tuples_sent += count;
        self.metrics
            .counter(&MIGRATION_TUPLES, &[])
            .increment(count as u64);
        tracing::debug!(
            tuples = count,
            requests_sent = report.requests_sent,
            "sent ownership tuples"
        );

        Ok(())
    }
}
