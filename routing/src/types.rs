use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub bundle_id: Uuid,
    pub name: String,
    pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub display_name: String,
}

/// A delivery target, also called an integration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub org_id: String,
    pub endpoint_type: String,
    pub name: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// A named routing rule of one organization, scoped to a bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorGroup {
    pub id: Uuid,
    pub org_id: String,
    pub bundle_id: Uuid,
    pub display_name: String,
}

/// Links a behavior group to an endpoint. Positions within a group are
/// unique and run from 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BehaviorGroupAction {
    pub behavior_group_id: Uuid,
    pub endpoint_id: Uuid,
    pub position: i32,
}

/// Links a behavior group to an event type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Behavior {
    pub behavior_group_id: Uuid,
    pub event_type_id: Uuid,
}

/// "Endpoint is reachable from event type". Only ever written by the
/// association refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointEventType {
    pub endpoint_id: Uuid,
    pub event_type_id: Uuid,
}

impl EndpointEventType {
    pub fn new(endpoint_id: Uuid, event_type_id: Uuid) -> Self {
        EndpointEventType {
            endpoint_id,
            event_type_id,
        }
    }
}
