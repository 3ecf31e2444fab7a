use serde::Deserialize;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("{0} URL cannot be empty")]
    EmptyUrl(&'static str),
    #[error("authorization domain cannot be empty")]
    EmptyDomain,
    #[error("{0} timeout cannot be 0")]
    InvalidTimeout(&'static str),
    #[error("RBAC pre-shared key cannot be empty")]
    EmptyPsk,
}

fn default_domain() -> String {
    "redhat".into()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_client_id() -> String {
    "notifications".into()
}

fn default_workspace_cache_ttl_secs() -> u64 {
    300
}

fn default_workspace_cache_size() -> u64 {
    10_000
}

/// Relations API connection settings
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RelationsConfig {
    pub url: String,
    /// Prefix of every principal id, as in `<domain>/<user id>`
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Sent as a bearer token when present
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Deadline for one call, stream drain included
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RelationsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::EmptyUrl("relations"));
        }
        if self.domain.is_empty() {
            return Err(ValidationError::EmptyDomain);
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("relations"));
        }
        Ok(())
    }
}

/// RBAC directory settings used for workspace resolution
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RbacConfig {
    pub url: String,
    pub psk: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_workspace_cache_ttl_secs")]
    pub workspace_cache_ttl_secs: u64,
    #[serde(default = "default_workspace_cache_size")]
    pub workspace_cache_size: u64,
}

impl RbacConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::EmptyUrl("RBAC"));
        }
        if self.psk.is_empty() {
            return Err(ValidationError::EmptyPsk);
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("RBAC"));
        }
        Ok(())
    }
}
