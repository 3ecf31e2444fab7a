use crate::types::ObjectType;
use std::fmt;

/// Resource types that permissions are checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Integration,
    Workspace,
}

impl ResourceType {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ResourceType::Integration => ObjectType::new("notifications", "integration"),
            ResourceType::Workspace => ObjectType::workspace(),
        }
    }

    /// Value of the `resource_type` metric label.
    pub const fn metric_tag(&self) -> &'static str {
        match self {
            ResourceType::Integration => "INTEGRATION",
            ResourceType::Workspace => "WORKSPACE",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_tag())
    }
}

/// Permissions held on a single integration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntegrationPermission {
    Delete,
    Disable,
    Edit,
    Enable,
    Test,
    View,
    ViewHistory,
}

impl IntegrationPermission {
    pub const fn relation(&self) -> &'static str {
        match self {
            IntegrationPermission::Delete => "delete",
            IntegrationPermission::Disable => "disable",
            IntegrationPermission::Edit => "edit",
            IntegrationPermission::Enable => "enable",
            IntegrationPermission::Test => "test",
            IntegrationPermission::View => "view",
            IntegrationPermission::ViewHistory => "view_history",
        }
    }

    pub const fn legacy_permission(&self) -> &'static str {
        match self {
            IntegrationPermission::View | IntegrationPermission::ViewHistory => {
                "notifications:integrations:read"
            }
            IntegrationPermission::Delete
            | IntegrationPermission::Disable
            | IntegrationPermission::Edit
            | IntegrationPermission::Enable
            | IntegrationPermission::Test => "notifications:integrations:write",
        }
    }
}

/// Permissions held on a workspace as a whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkspacePermission {
    BehaviorGroupsEdit,
    BehaviorGroupsView,
    EventLogView,
    IntegrationsCreate,
    IntegrationsView,
    NotificationsEdit,
    NotificationsView,
}

impl WorkspacePermission {
    pub const fn relation(&self) -> &'static str {
        match self {
            WorkspacePermission::BehaviorGroupsEdit => "notifications_behavior_groups_edit",
            WorkspacePermission::BehaviorGroupsView => "notifications_behavior_groups_view",
            WorkspacePermission::EventLogView => "notifications_events_view",
            WorkspacePermission::IntegrationsCreate => "notifications_integrations_create",
            WorkspacePermission::IntegrationsView => "notifications_integrations_view",
            WorkspacePermission::NotificationsEdit => "notifications_notifications_edit",
            WorkspacePermission::NotificationsView => "notifications_notifications_view",
        }
    }

    pub const fn legacy_permission(&self) -> &'static str {
        match self {
            WorkspacePermission::BehaviorGroupsView
            | WorkspacePermission::EventLogView
            | WorkspacePermission::NotificationsView => "notifications:notifications:read",
            WorkspacePermission::BehaviorGroupsEdit | WorkspacePermission::NotificationsEdit => {
                "notifications:notifications:write"
            }
            WorkspacePermission::IntegrationsView => "notifications:integrations:read",
            WorkspacePermission::IntegrationsCreate => "notifications:integrations:write",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    Integration(IntegrationPermission),
    Workspace(WorkspacePermission),
}

impl Permission {
    /// Name of the relation or permission in the authorization schema.
    pub const fn relation(&self) -> &'static str {
        match self {
            Permission::Integration(p) => p.relation(),
            Permission::Workspace(p) => p.relation(),
        }
    }

    /// The role-based permission string that grants the same access.
    pub const fn legacy_permission(&self) -> &'static str {
        match self {
            Permission::Integration(p) => p.legacy_permission(),
            Permission::Workspace(p) => p.legacy_permission(),
        }
    }
}

impl From<IntegrationPermission> for Permission {
    fn from(permission: IntegrationPermission) -> Self {
        Permission::Integration(permission)
    }
}

impl From<WorkspacePermission> for Permission {
    fn from(permission: WorkspacePermission) -> Self {
        Permission::Workspace(permission)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.relation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_types() {
        let integration = ResourceType::Integration.object_type();
        assert_eq!(integration.namespace, "notifications");
        assert_eq!(integration.name, "integration");

        let workspace = ResourceType::Workspace.object_type();
        assert_eq!(workspace.namespace, "rbac");
        assert_eq!(workspace.name, "workspace");

        assert_eq!(ResourceType::Integration.to_string(), "INTEGRATION");
    }

    #[test]
    fn test_permission_names() {
        let view: Permission = IntegrationPermission::View.into();
        assert_eq!(view.relation(), "view");
        assert_eq!(view.legacy_permission(), "notifications:integrations:read");

        let edit: Permission = WorkspacePermission::BehaviorGroupsEdit.into();
        assert_eq!(edit.relation(), "notifications_behavior_groups_edit");
        assert_eq!(edit.legacy_permission(), "notifications:notifications:write");
    }
}
