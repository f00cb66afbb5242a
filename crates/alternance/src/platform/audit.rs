use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AuditId, TenantId, UserId};

/// One mutating operation, recorded after it succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub tenant_id: TenantId,
    /// `None` for system jobs (cron, archiving).
    pub actor: Option<UserId>,
    pub action: String,
    pub resource: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        tenant_id: TenantId,
        actor: Option<UserId>,
        action: &str,
        resource: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditId::generate(),
            tenant_id,
            actor,
            action: action.to_string(),
            resource: resource.into(),
            at,
        }
    }
}
