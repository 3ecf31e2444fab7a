//! Relations API payloads, in the shape of its JSON binding.

use crate::{PRINCIPAL_SUBJECT_TYPE, RBAC_NAMESPACE, WORKSPACE_SUBJECT_TYPE};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectType {
    pub namespace: String,
    pub name: String,
}

impl ObjectType {
    pub fn new<N, T>(namespace: N, name: T) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        ObjectType {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn principal() -> Self {
        ObjectType::new(RBAC_NAMESPACE, PRINCIPAL_SUBJECT_TYPE)
    }

    pub fn workspace() -> Self {
        ObjectType::new(RBAC_NAMESPACE, WORKSPACE_SUBJECT_TYPE)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectReference {
    pub r#type: ObjectType,
    pub id: String,
}

impl ObjectReference {
    pub fn new<I: Into<String>>(r#type: ObjectType, id: I) -> Self {
        ObjectReference {
            r#type,
            id: id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectReference {
    pub subject: ObjectReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl From<ObjectReference> for SubjectReference {
    fn from(subject: ObjectReference) -> Self {
        SubjectReference {
            subject,
            relation: None,
        }
    }
}

/// A stored fact: `subject` holds `relation` on `resource`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub resource: ObjectReference,
    pub relation: String,
    pub subject: SubjectReference,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub resource: ObjectReference,
    pub relation: String,
    pub subject: SubjectReference,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Allowed {
    #[default]
    #[serde(rename = "ALLOWED_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "ALLOWED_TRUE")]
    True,
    #[serde(rename = "ALLOWED_FALSE")]
    False,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub allowed: Allowed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResourcesRequest {
    pub resource_type: ObjectType,
    pub relation: String,
    pub subject: SubjectReference,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePagination {
    pub continuation_token: String,
}

/// One frame of a lookup stream. Each frame names exactly one resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LookupResourcesResponse {
    pub resource: ObjectReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<ResponsePagination>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateTuplesRequest {
    pub upsert: bool,
    pub tuples: Vec<Relationship>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_request_wire_shape() {
        let request = CheckRequest {
            resource: ObjectReference::new(ObjectType::new("notifications", "integration"), "abc"),
            relation: "view".into(),
            subject: ObjectReference::new(ObjectType::principal(), "redhat/1234").into(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "resource": {"type": {"namespace": "notifications", "name": "integration"}, "id": "abc"},
                "relation": "view",
                "subject": {"subject": {"type": {"namespace": "rbac", "name": "principal"}, "id": "redhat/1234"}}
            })
        );
    }

    #[test]
    fn test_allowed_parsing() {
        let response: CheckResponse = serde_json::from_str(r#"{"allowed":"ALLOWED_TRUE"}"#).unwrap();
        assert_eq!(response.allowed, Allowed::True);

        let response: CheckResponse =
            serde_json::from_str(r#"{"allowed":"ALLOWED_FALSE"}"#).unwrap();
        assert_eq!(response.allowed, Allowed::False);

        // Default enum values are omitted by the JSON binding
        let response: CheckResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.allowed, Allowed::Unspecified);
    }

    #[test]
    fn test_lookup_request_uses_camel_case() {
        let request = LookupResourcesRequest {
            resource_type: ObjectType::new("notifications", "integration"),
            relation: "view".into(),
            subject: ObjectReference::new(ObjectType::principal(), "redhat/1").into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("resourceType").is_some());
        assert!(json.get("resource_type").is_none());
    }
}
