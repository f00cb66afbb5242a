use chrono::{DateTime, Utc};
use tracing::info;

use super::{require, AlternanceService, ServiceError};
use crate::ids::{ApiKeyId, TenantId, UserId};
use crate::platform::repository::{Store, StoreError};
use crate::tenancy::credentials::{api_key_prefix, issue_api_key};
use crate::tenancy::{
    AccessScope, ApiKey, CredentialError, IssuedApiKey, Permission, Tenant, User, UserDraft,
};
use crate::workflows::notifications::{NotificationSender, WebhookPublisher};

impl<S, W, N> AlternanceService<S, W, N>
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    /// Provision a training center. Platform-level: no caller scope exists yet.
    pub fn create_tenant(
        &self,
        name: &str,
        slug: &str,
        siret: Option<String>,
    ) -> Result<Tenant, ServiceError> {
        let tenant = Tenant::create(name, slug, siret, Utc::now())?;
        let tenant = self.store.insert_tenant(tenant)?;
        info!(tenant_id = %tenant.id, slug = %tenant.slug, "tenant created");
        self.audit(&tenant.id, None, "tenant.create", tenant.id.to_string());
        Ok(tenant)
    }

    /// Create a user without a caller scope (tenant bootstrap, demo seeding).
    pub fn register_user(&self, tenant_id: &TenantId, draft: UserDraft) -> Result<User, ServiceError> {
        self.store
            .tenant(tenant_id)?
            .ok_or(StoreError::NotFound("tenant"))?;
        let user = User::create(tenant_id.clone(), draft, Utc::now())?;
        let user = self.store.insert_user(user)?;
        self.audit(tenant_id, None, "user.create", user.id.to_string());
        Ok(user)
    }

    pub fn add_user(&self, scope: &AccessScope, draft: UserDraft) -> Result<User, ServiceError> {
        require(scope, Permission::ManageTenant)?;
        let user = User::create(scope.tenant_id.clone(), draft, Utc::now())?;
        let user = self.store.insert_user(user)?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "user.create",
            user.id.to_string(),
        );
        Ok(user)
    }

    pub fn list_users(&self, scope: &AccessScope) -> Result<Vec<User>, ServiceError> {
        require(scope, Permission::ManageTenant)?;
        Ok(self.store.users(&scope.tenant_id)?)
    }

    /// Issue the first key of a tenant for one of its users.
    pub fn issue_api_key_for(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        label: &str,
    ) -> Result<IssuedApiKey, ServiceError> {
        let user = self
            .store
            .user(tenant_id, user_id)?
            .ok_or(StoreError::NotFound("user"))?;
        let issued = issue_api_key(user.tenant_id, user.id, label, Utc::now());
        self.store.insert_api_key(issued.key.clone())?;
        self.audit(tenant_id, None, "api_key.issue", issued.key.id.to_string());
        Ok(issued)
    }

    /// Issue a key for `user_id`; only tenant admins may mint keys for someone else.
    pub fn issue_api_key(
        &self,
        scope: &AccessScope,
        user_id: &UserId,
        label: &str,
    ) -> Result<IssuedApiKey, ServiceError> {
        if user_id != &scope.user_id {
            require(scope, Permission::ManageTenant)?;
        }
        let user = self
            .store
            .user(&scope.tenant_id, user_id)?
            .ok_or(StoreError::NotFound("user"))?;
        let issued = issue_api_key(user.tenant_id, user.id, label, Utc::now());
        self.store.insert_api_key(issued.key.clone())?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "api_key.issue",
            issued.key.id.to_string(),
        );
        Ok(issued)
    }

    pub fn revoke_api_key(&self, scope: &AccessScope, key_id: &ApiKeyId) -> Result<ApiKey, ServiceError> {
        require(scope, Permission::ManageTenant)?;
        let tenant_id = scope.tenant_id.clone();
        let now = Utc::now();
        let key = self.store.update_api_key(key_id, |key| {
            if key.tenant_id != tenant_id {
                return Err(ServiceError::from(StoreError::NotFound("api key")));
            }
            if key.revoked_at.is_none() {
                key.revoked_at = Some(now);
            }
            Ok(key.clone())
        })?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "api_key.revoke",
            key_id.to_string(),
        );
        Ok(key)
    }

    /// Resolve a presented API key into the caller's scope.
    pub fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<AccessScope, ServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialError::Missing.into());
        }
        let prefix = api_key_prefix(token)?;
        let key = self
            .store
            .api_key_by_prefix(prefix)?
            .ok_or(CredentialError::Unknown)?;
        if !key.matches(token) {
            return Err(CredentialError::Unknown.into());
        }
        if key.is_revoked() {
            return Err(CredentialError::Revoked.into());
        }

        let tenant = self
            .store
            .tenant(&key.tenant_id)?
            .ok_or(CredentialError::Unknown)?;
        if !tenant.active {
            return Err(CredentialError::InactiveTenant.into());
        }
        let user = self
            .store
            .user(&key.tenant_id, &key.user_id)?
            .ok_or(CredentialError::Unknown)?;

        self.store.update_api_key(&key.id, |stored| {
            stored.last_used_at = Some(now);
            Ok::<_, StoreError>(())
        })?;

        Ok(AccessScope::new(tenant.id, user.id, user.role))
    }
}
