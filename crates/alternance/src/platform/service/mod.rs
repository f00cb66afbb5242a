//! Service composing the store, access checks, domain rules and outbound hooks.
//!
//! Every public operation takes the caller's [`AccessScope`] (except bootstrap and
//! system jobs), checks the permission first, resolves records inside the caller's tenant,
//! then writes through one atomic store call before dispatching webhooks.

mod directory;
mod jobs;
mod livrets;
mod quality;
mod training;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::json;
use tracing::warn;

use super::audit::AuditEntry;
use super::repository::{Store, StoreError};
use crate::config::WorkflowConfig;
use crate::ids::{ContractId, TenantId, UserId};
use crate::tenancy::{AccessError, AccessScope, CredentialError, Permission, Role, TenancyError};
use crate::workflows::apprenticeship::{
    ContractError, Contract, PositioningError, ProofError, SignatureError, TsfError,
    TsfGenerator,
};
use crate::workflows::notifications::{NotificationSender, WebhookEvent, WebhookPublisher};
use crate::workflows::quality::{QualiopiExportError, RemediationError, SupportError};
use crate::workflows::referentiel::{Referentiel, ReferentielError, ReferentielImportError};

pub use jobs::ReminderRun;
pub use livrets::SigningLink;
pub use quality::RemediationRequest;

pub struct AlternanceService<S, W, N> {
    store: Arc<S>,
    webhooks: Arc<W>,
    notifier: Arc<N>,
    workflow: WorkflowConfig,
    tsf: TsfGenerator,
}

impl<S, W, N> AlternanceService<S, W, N>
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(store: Arc<S>, webhooks: Arc<W>, notifier: Arc<N>, workflow: WorkflowConfig) -> Self {
        let tsf = TsfGenerator::new(workflow.tsf_period_months);
        Self {
            store,
            webhooks,
            notifier,
            workflow,
            tsf,
        }
    }

    pub fn workflow(&self) -> &WorkflowConfig {
        &self.workflow
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn audit(
        &self,
        tenant_id: &TenantId,
        actor: Option<&UserId>,
        action: &str,
        resource: impl Into<String>,
    ) {
        let entry = AuditEntry::new(
            tenant_id.clone(),
            actor.cloned(),
            action,
            resource,
            Utc::now(),
        );
        if let Err(error) = self.store.append_audit(entry) {
            warn!(%tenant_id, action, %error, "failed to append audit entry");
        }
    }

    /// Webhook failures never undo the write that triggered them.
    fn publish(&self, event: WebhookEvent) {
        let kind = event.kind.name();
        let resource = event.resource_id.clone();
        if let Err(error) = self.webhooks.publish(event) {
            warn!(kind, %resource, %error, "webhook dispatch failed");
        }
    }

    /// Load a contract the caller may see: in the tenant, and one of their own when the
    /// caller is an apprentice or a tutor.
    fn visible_contract(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
    ) -> Result<Contract, ServiceError> {
        let contract = self
            .store
            .contract(&scope.tenant_id, contract_id)?
            .ok_or(StoreError::NotFound("contract"))?;
        if is_party(scope, &contract) {
            Ok(contract)
        } else {
            Err(StoreError::NotFound("contract").into())
        }
    }

    fn referentiel_of(&self, contract: &Contract) -> Result<Referentiel, ServiceError> {
        Ok(self
            .store
            .referentiel(&contract.tenant_id, &contract.referentiel_id)?
            .ok_or(StoreError::NotFound("referential"))?)
    }
}

fn is_party(scope: &AccessScope, contract: &Contract) -> bool {
    match scope.role {
        Role::Apprenti => contract.apprentice_id == scope.user_id,
        Role::Tuteur => contract.tutor_id == scope.user_id,
        Role::Admin | Role::Formateur => true,
    }
}

fn require(scope: &AccessScope, permission: Permission) -> Result<(), ServiceError> {
    scope.require(permission).map_err(ServiceError::from)
}

/// Error raised by the service; each variant maps onto one HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
    #[error(transparent)]
    Referentiel(#[from] ReferentielError),
    #[error(transparent)]
    Import(#[from] ReferentielImportError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Positioning(#[from] PositioningError),
    #[error(transparent)]
    Tsf(#[from] TsfError),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Remediation(#[from] RemediationError),
    #[error(transparent)]
    Support(#[from] SupportError),
    #[error(transparent)]
    Export(#[from] QualiopiExportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cron endpoint is disabled")]
    CronDisabled,
    #[error("reference date {0} must fall between the years 1900 and 9999")]
    DateOutOfRange(NaiveDate),
    #[error("archive retention of {0} days cannot be applied")]
    RetentionOutOfRange(i64),
}

/// Years accepted as "today" for reports, health scores and cron runs.
pub const REFERENCE_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

/// Reject reference dates whose reporting windows would leave chrono's range.
pub(crate) fn reference_day(day: NaiveDate) -> Result<NaiveDate, ServiceError> {
    if REFERENCE_YEARS.contains(&day.year()) {
        Ok(day)
    } else {
        Err(ServiceError::DateOutOfRange(day))
    }
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Access(AccessError::OutOfTenant) => StatusCode::NOT_FOUND,
            ServiceError::Access(AccessError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            ServiceError::Credential(CredentialError::InvalidLifetime(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Credential(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ServiceError::Store(StoreError::Unavailable(_)) | ServiceError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Import(ReferentielImportError::Io(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Contract(
                ContractError::DuplicateExternalId(_)
                | ContractError::InvalidTransition { .. }
                | ContractError::Closed(_),
            ) => StatusCode::CONFLICT,
            ServiceError::Tsf(TsfError::AlreadyValidated(_)) => StatusCode::CONFLICT,
            ServiceError::Tsf(TsfError::Missing) => StatusCode::NOT_FOUND,
            ServiceError::Proof(ProofError::AlreadyReviewed(_)) => StatusCode::CONFLICT,
            ServiceError::Signature(SignatureError::AlreadySigned(_) | SignatureError::Locked) => {
                StatusCode::CONFLICT
            }
            ServiceError::Signature(SignatureError::NotASigner(_)) => StatusCode::FORBIDDEN,
            ServiceError::Remediation(
                RemediationError::VersionConflict { .. }
                | RemediationError::AlreadyOpen
                | RemediationError::Closed
                | RemediationError::ActionAlreadyDone,
            ) => StatusCode::CONFLICT,
            ServiceError::Remediation(RemediationError::UnknownAction(_)) => StatusCode::NOT_FOUND,
            ServiceError::Support(SupportError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ServiceError::CronDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::RetentionOutOfRange(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_families() {
        assert_eq!(
            ServiceError::from(AccessError::OutOfTenant).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::from(AccessError::Forbidden {
                role: "apprenti",
                permission: Permission::ManageTsf
            })
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::from(CredentialError::Revoked).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::from(RemediationError::VersionConflict {
                expected: 1,
                actual: 2
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::from(ProofError::EmptyTitle).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::from(StoreError::Unavailable("down".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::CronDisabled.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::from(CredentialError::InvalidLifetime(i64::MAX)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn reference_days_stay_within_supported_years() {
        let inside = NaiveDate::from_ymd_opt(2026, 10, 18).expect("valid date");
        assert_eq!(reference_day(inside).expect("accepted"), inside);

        for day in [NaiveDate::MIN, NaiveDate::MAX] {
            let error = reference_day(day).expect_err("extreme date refused");
            assert!(matches!(error, ServiceError::DateOutOfRange(_)));
            assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }
}
