//! Resolves an organization's default workspace from the RBAC directory.
//! Successful lookups are cached per organization; failures are not.

use crate::config::RbacConfig;
use crate::metrics_defs::{WORKSPACE_CACHE_HIT, WORKSPACE_CACHE_MISS};
use async_trait::async_trait;
use moka::sync::Cache;
use reqwest::StatusCode;
use serde::Deserialize;
use shared::Metrics;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const WORKSPACES_PATH: &str = "api/rbac/v2/workspaces/";

const PSK_HEADER: &str = "x-rh-rbac-psk";
const CLIENT_ID_HEADER: &str = "x-rh-rbac-client-id";
const ORG_ID_HEADER: &str = "x-rh-rbac-org-id";

#[derive(thiserror::Error, Debug)]
pub enum WorkspaceError {
    #[error("RBAC request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid RBAC URL: {0}")]
    InvalidUrl(String),
    #[error("RBAC returned {status} for org {org_id}: {body}")]
    Status {
        org_id: String,
        status: StatusCode,
        body: String,
    },
    #[error("expected exactly one default workspace for org {org_id}, found {count}")]
    NotUnique { org_id: String, count: usize },
}

#[async_trait]
pub trait WorkspaceResolver: Send + Sync {
    async fn default_workspace_id(&self, org_id: &str) -> Result<Uuid, WorkspaceError>;
}

#[derive(Deserialize)]
struct RbacWorkspace {
    id: Uuid,
}

#[derive(Deserialize)]
struct RbacWorkspacePage {
    data: Vec<RbacWorkspace>,
}

pub struct RbacWorkspaceClient {
    client: reqwest::Client,
    workspaces_url: Url,
    psk: String,
    client_id: String,
    cache: Cache<String, Uuid>,
    metrics: Metrics,
}

impl RbacWorkspaceClient {
    pub fn new(config: &RbacConfig, metrics: Metrics) -> Result<Self, WorkspaceError> {
        let base = format!("{}/", config.url.trim_end_matches('/'));
        let workspaces_url = Url::parse(&base)
            .and_then(|base| base.join(WORKSPACES_PATH))
            .map_err(|e| WorkspaceError::InvalidUrl(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let cache = Cache::builder()
            .max_capacity(config.workspace_cache_size)
            .time_to_live(Duration::from_secs(config.workspace_cache_ttl_secs))
            .build();

        Ok(RbacWorkspaceClient {
            client,
            workspaces_url,
            psk: config.psk.clone(),
            client_id: config.client_id.clone(),
            cache,
            metrics,
        })
    }

    async fn fetch_default_workspace(&self, org_id: &str) -> Result<Uuid, WorkspaceError> {
        let mut url = self.workspaces_url.clone();
        url.query_pairs_mut()
            .append_pair("type", "default")
            .append_pair("offset", "0")
            .append_pair("limit", "1");

        let response = self
            .client
            .get(url)
            .header(PSK_HEADER, &self.psk)
            .header(CLIENT_ID_HEADER, &self.client_id)
            .header(ORG_ID_HEADER, org_id)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkspaceError::Status {
                org_id: org_id.to_string(),
                status,
                body,
            });
        }

        let page = response.json::<RbacWorkspacePage>().await?;
        match page.data.as_slice() {
            [workspace] => Ok(workspace.id),
            other => Err(WorkspaceError::NotUnique {
                org_id: org_id.to_string(),
                count: other.len(),
            }),
        }
    }
}

#[async_trait]
impl WorkspaceResolver for RbacWorkspaceClient {
    async fn default_workspace_id(&self, org_id: &str) -> Result<Uuid, WorkspaceError> {
        if let Some(id) = self.cache.get(org_id) {
            self.metrics.counter(&WORKSPACE_CACHE_HIT, &[]).increment(1);
            return Ok(id);
        }
        self.metrics.counter(&WORKSPACE_CACHE_MISS, &[]).increment(1);

        let id = self.fetch_default_workspace(org_id).await?;
        tracing::debug!(org_id, workspace_id = %id, "resolved default workspace");
        self.cache.insert(org_id.to_string(), id);
        Ok(id)
    }
}
