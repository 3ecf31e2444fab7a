//! Process wiring shared by the CLI commands.

use crate::authorization::{AuthorizationSelector, RbacAuthorization};
use crate::config::{Config, LoggingConfig, MetricsConfig, RoutingStoreConfig};
use crate::migration::BatchMigrationJob;
use kessel::authorization::KesselAuthorization;
use kessel::relations::{RelationsClient, RelationsError};
use kessel::workspace::{RbacWorkspaceClient, WorkspaceError};
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use routing::store::{MemoryRoutingStore, PgRoutingStore};
use routing::{RoutingStore, StoreError};
use shared::Metrics;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] StatsdError),
    #[error("could not open routing store: {0}")]
    Store(#[from] StoreError),
    #[error("could not build relations client: {0}")]
    Relations(#[from] RelationsError),
    #[error("could not build workspace client: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// Installs the tracing subscriber, with Sentry reporting when a DSN is
/// configured. The returned guard must outlive the process's work.
pub fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging
        .and_then(|l| l.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

/// A statsd-backed handle, or a no-op one when metrics are not configured.
pub fn init_metrics(config: Option<&MetricsConfig>) -> Result<Metrics, BootstrapError> {
    let metrics = match config {
        Some(config) => {
            let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
                .build(Some(&config.prefix))?;
            Metrics::new(recorder)
        }
        None => Metrics::noop(),
    };

    metrics.describe(kessel::metrics_defs::ALL_METRICS);
    metrics.describe(crate::metrics_defs::ALL_METRICS);

    Ok(metrics)
}

pub async fn build_store(
    config: &RoutingStoreConfig,
) -> Result<Arc<dyn RoutingStore>, BootstrapError> {
    match config {
        RoutingStoreConfig::Postgres { url, init_schema } => {
            let store = PgRoutingStore::connect(url).await?;
            if *init_schema {
                store.init_schema().await?;
                tracing::info!("routing store schema initialized");
            }
            Ok(Arc::new(store))
        }
        RoutingStoreConfig::Memory => {
            tracing::warn!("using the in-memory routing store, nothing will be persisted");
            Ok(Arc::new(MemoryRoutingStore::new()))
        }
    }
}

pub fn build_migration_job(
    config: &Config,
    store: Arc<dyn RoutingStore>,
    metrics: Metrics,
) -> Result<BatchMigrationJob, BootstrapError> {
    let relations = RelationsClient::new(&config.kessel.relations)?;
    let workspaces = RbacWorkspaceClient::new(&config.kessel.rbac, metrics.clone())?;

    Ok(BatchMigrationJob::new(
        store,
        Arc::new(workspaces),
        Arc::new(relations),
        metrics,
        config.migration.page_size,
    ))
}

/// Both authorization back-ends, with organizations routed per the
/// `kessel.enabled` and `kessel.enabled_orgs` settings.
pub fn build_authorization(
    config: &Config,
    store: Arc<dyn RoutingStore>,
    metrics: Metrics,
) -> Result<AuthorizationSelector, BootstrapError> {
    let relations = RelationsClient::new(&config.kessel.relations)?;
    let kessel = KesselAuthorization::new(
        Arc::new(relations),
        config.kessel.relations.domain.clone(),
        metrics,
    );
    let rbac = RbacAuthorization::new(store);

    if config.kessel.enabled {
        tracing::info!("relations API authorization enabled for every organization");
    } else if !config.kessel.enabled_orgs.is_empty() {
        tracing::info!(
            orgs = config.kessel.enabled_orgs.len(),
            "relations API authorization enabled for selected organizations"
        );
    }

    Ok(AuthorizationSelector::new(
        Arc::new(kessel),
        Arc::new(rbac),
        config.kessel.enabled,
        config.kessel.enabled_orgs.iter().cloned(),
    ))
}
