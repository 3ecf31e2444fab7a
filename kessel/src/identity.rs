use std::collections::HashSet;

/// The authenticated caller of a request, as extracted upstream of this
/// service. Only the fields authorization needs are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    pub org_id: String,
    pub user_id: String,
    pub username: String,
    /// Role-based permissions granted to the caller, e.g.
    /// `notifications:integrations:read`.
    pub legacy_permissions: HashSet<String>,
}

impl CallerIdentity {
    pub fn new<O, U, N>(org_id: O, user_id: U, username: N) -> Self
    where
        O: Into<String>,
        U: Into<String>,
        N: Into<String>,
    {
        CallerIdentity {
            org_id: org_id.into(),
            user_id: user_id.into(),
            username: username.into(),
            legacy_permissions: HashSet::new(),
        }
    }

    pub fn with_legacy_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.legacy_permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Whether any granted permission covers `permission`. Granted
    /// permissions may use `*` for any segment, as in `notifications:*:*`.
    pub fn has_legacy_permission(&self, permission: &str) -> bool {
        self.legacy_permissions
            .iter()
            .any(|granted| legacy_permission_matches(granted, permission))
    }
}

fn legacy_permission_matches(granted: &str, wanted: &str) -> bool {
    let granted: Vec<&str> = granted.split(':').collect();
    let wanted: Vec<&str> = wanted.split(':').collect();

    granted.len() == wanted.len()
        && granted
            .iter()
            .zip(wanted.iter())
            .all(|(g, w)| *g == "*" || g == w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_permission_matching() {
        let identity = CallerIdentity::new("org", "1", "user")
            .with_legacy_permissions(["notifications:integrations:read"]);
        assert!(identity.has_legacy_permission("notifications:integrations:read"));
        assert!(!identity.has_legacy_permission("notifications:integrations:write"));

        let admin = CallerIdentity::new("org", "2", "admin")
            .with_legacy_permissions(["notifications:*:*"]);
        assert!(admin.has_legacy_permission("notifications:integrations:write"));
        assert!(admin.has_legacy_permission("notifications:notifications:read"));
        assert!(!admin.has_legacy_permission("integrations:endpoints:read"));

        let nobody = CallerIdentity::new("org", "3", "nobody");
        assert!(!nobody.has_legacy_permission("notifications:integrations:read"));
    }
}
