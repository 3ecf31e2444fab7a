use kessel::config::{RbacConfig, RelationsConfig};
use serde::Deserialize;
use shared::config::{Listener, ListenerError};
use std::fs::File;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("invalid listener: {0}")]
    Listener(#[from] ListenerError),
    #[error("invalid kessel config: {0}")]
    Kessel(#[from] kessel::config::ValidationError),
    #[error("migration max_batch_size must be at least 1")]
    InvalidBatchSize,
    #[error("migration page_size must be at least 1")]
    InvalidPageSize,
    #[error("routing store URL cannot be empty")]
    EmptyStoreUrl,
    #[error("statsd host cannot be empty")]
    EmptyStatsdHost,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

fn default_metrics_prefix() -> String {
    "notifications".into()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum RoutingStoreConfig {
    Postgres {
        url: String,
        #[serde(default)]
        init_schema: bool,
    },
    Memory,
}

/// Relationship-based authorization settings.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct KesselConfig {
    /// Routes every organization to the relations API
    #[serde(default)]
    pub enabled: bool,
    /// Organizations routed to the relations API while `enabled` is off
    #[serde(default)]
    pub enabled_orgs: Vec<String>,
    pub relations: RelationsConfig,
    pub rbac: RbacConfig,
}

fn default_max_batch_size() -> usize {
    1_000
}

fn default_page_size() -> usize {
    1_000
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct MigrationConfig {
    /// Most tuples sent in one bulk request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Endpoints read from the store per query
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        MigrationConfig {
            max_batch_size: default_max_batch_size(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub listener: Listener,
    pub routing_store: RoutingStoreConfig,
    pub kessel: KesselConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Parses and validates.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.kessel.relations.validate()?;
        self.kessel.rbac.validate()?;

        if let RoutingStoreConfig::Postgres { url, .. } = &self.routing_store {
            if url.is_empty() {
                return Err(ValidationError::EmptyStoreUrl);
            }
        }

        if let Some(metrics) = &self.common.metrics {
            if metrics.statsd_host.is_empty() {
                return Err(ValidationError::EmptyStatsdHost);
            }
        }

        if self.migration.max_batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.migration.page_size == 0 {
            return Err(ValidationError::InvalidPageSize);
        }

        Ok(())
    }
}
