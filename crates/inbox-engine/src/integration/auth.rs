use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// Permissions gating supervisor operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "teams.manage")]
    TeamsManage,
    #[serde(rename = "session.bulk_transfer")]
    SessionBulkTransfer,
    #[serde(rename = "session.reengage")]
    SessionReengage,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::TeamsManage => "teams.manage",
            Permission::SessionBulkTransfer => "session.bulk_transfer",
            Permission::SessionReengage => "session.reengage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = InboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "teams.manage" => Ok(Permission::TeamsManage),
            "session.bulk_transfer" => Ok(Permission::SessionBulkTransfer),
            "session.reengage" => Ok(Permission::SessionReengage),
            other => Err(InboxError::validation(format!("unknown permission '{}'", other))),
        }
    }
}

/// Authenticated caller, as supplied by the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub tenant_id: String,
    pub user_id: String,
    pub permissions: HashSet<Permission>,
}

impl Actor {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            permissions: HashSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    /// Caller holding every permission
    pub fn supervisor(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(tenant_id, user_id)
            .with_permission(Permission::TeamsManage)
            .with_permission(Permission::SessionBulkTransfer)
            .with_permission(Permission::SessionReengage)
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> Result<()> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(InboxError::forbidden(format!(
                "user {} lacks permission {}",
                self.user_id, permission
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_missing_permission() {
        let agent = Actor::new("t1", "agent-1");
        let err = agent.require(Permission::SessionBulkTransfer).unwrap_err();
        assert!(matches!(err, InboxError::Forbidden(_)));
        assert!(err.to_string().contains("session.bulk_transfer"));

        let supervisor = Actor::supervisor("t1", "sup-1");
        assert!(supervisor.require(Permission::SessionReengage).is_ok());
    }

    #[test]
    fn test_permission_parsing() {
        assert_eq!("teams.manage".parse::<Permission>().unwrap(), Permission::TeamsManage);
        assert!("teams.delete".parse::<Permission>().is_err());
    }
}
