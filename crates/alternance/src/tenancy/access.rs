use serde::Serialize;

use super::domain::{Permission, Role};
use crate::ids::{TenantId, UserId};

/// Identity attached to every service call once credentials have been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessScope {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
}

/// Denials produced by scope checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("role {role} is not allowed to {permission:?}")]
    Forbidden {
        role: &'static str,
        permission: Permission,
    },
    #[error("resource not found")]
    OutOfTenant,
}

impl AccessScope {
    pub fn new(tenant_id: TenantId, user_id: UserId, role: Role) -> Self {
        Self {
            tenant_id,
            user_id,
            role,
        }
    }

    pub fn require(&self, permission: Permission) -> Result<(), AccessError> {
        if self.role.allows(permission) {
            Ok(())
        } else {
            Err(AccessError::Forbidden {
                role: self.role.label(),
                permission,
            })
        }
    }

    /// Records owned by another tenant are reported as missing, never as forbidden.
    pub fn ensure_tenant(&self, owner: &TenantId) -> Result<(), AccessError> {
        if &self.tenant_id == owner {
            Ok(())
        } else {
            Err(AccessError::OutOfTenant)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_tenant_is_hidden() {
        let scope = AccessScope::new(TenantId::from("tnt_a"), UserId::from("usr_1"), Role::Admin);
        assert_eq!(scope.ensure_tenant(&TenantId::from("tnt_a")), Ok(()));
        assert_eq!(
            scope.ensure_tenant(&TenantId::from("tnt_b")),
            Err(AccessError::OutOfTenant)
        );
    }

    #[test]
    fn require_reports_role_and_permission() {
        let scope = AccessScope::new(
            TenantId::from("tnt_a"),
            UserId::from("usr_2"),
            Role::Apprenti,
        );
        let error = scope
            .require(Permission::ManageTsf)
            .expect_err("apprentices cannot manage the TSF");
        assert_eq!(
            error,
            AccessError::Forbidden {
                role: "apprenti",
                permission: Permission::ManageTsf,
            }
        );
    }
}
