use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("constraint violation: {0}")]
    Constraint(String),
}

#[derive(thiserror::Error, Debug)]
pub enum RoutingError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("bundle {0} not found")]
    BundleNotFound(Uuid),
    #[error("event type {0} not found")]
    EventTypeNotFound(Uuid),
    #[error("event type {event_type_id} does not belong to bundle {bundle_id}")]
    EventTypeOutsideBundle { event_type_id: Uuid, bundle_id: Uuid },
    /// Missing, or owned by another organization.
    #[error("endpoint {0} not found")]
    EndpointNotFound(Uuid),
    /// Missing, or owned by another organization.
    #[error("behavior group {0} not found")]
    BehaviorGroupNotFound(Uuid),
    #[error("a behavior group named {0:?} already exists in this bundle")]
    DuplicateDisplayName(String),
    #[error("behavior group display name cannot be empty")]
    EmptyDisplayName,
}
