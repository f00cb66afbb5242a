use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;

use super::{reference_day, require, AlternanceService, ServiceError};
use crate::ids::{ContractId, RemediationActionId, RemediationPlanId, TicketId};
use crate::platform::audit::AuditEntry;
use crate::platform::repository::{Store, StoreError};
use crate::tenancy::{AccessScope, Permission};
use crate::workflows::apprenticeship::Contract;
use crate::workflows::notifications::{
    NotificationSender, WebhookEvent, WebhookKind, WebhookPublisher,
};
use crate::workflows::quality::health::{self, HealthInputs};
use crate::workflows::quality::qualiopi::{self, QualiopiInputs};
use crate::workflows::quality::{
    suggest_actions, ActionDraft, HealthReport, QualiopiReport, RemediationError,
    RemediationPlan, SupportTicket, TicketDraft, TicketStatus,
};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 500;

/// Body of a remediation opening request.
#[derive(Debug, Clone, Deserialize)]
pub struct RemediationRequest {
    pub reason: String,
    #[serde(default)]
    pub actions: Vec<ActionDraft>,
    /// Append the actions suggested by the contract's current health report.
    #[serde(default)]
    pub seed_from_health: bool,
}

impl<S, W, N> AlternanceService<S, W, N>
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    pub fn contract_health(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
        today: NaiveDate,
    ) -> Result<HealthReport, ServiceError> {
        require(scope, Permission::ViewReports)?;
        let today = reference_day(today)?;
        let contract = self.visible_contract(scope, contract_id)?;
        self.health_of(&contract, today)
    }

    fn health_of(&self, contract: &Contract, today: NaiveDate) -> Result<HealthReport, ServiceError> {
        let progression = self.progression_of(contract)?;
        let proofs = self.store.proofs(&contract.tenant_id, &contract.id)?;
        let livrets = self.store.livrets(&contract.tenant_id, &contract.id)?;
        let tsf = self.store.tsf(&contract.tenant_id, &contract.id)?;
        let open_remediation = self
            .store
            .remediations(&contract.tenant_id, &contract.id)?
            .iter()
            .any(RemediationPlan::is_open);

        let inputs = HealthInputs::gather(
            contract,
            &progression,
            &proofs,
            &livrets,
            tsf.as_ref(),
            open_remediation,
            today,
        );
        Ok(health::score(contract.id.clone(), inputs, today))
    }

    pub fn open_remediation(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
        request: RemediationRequest,
    ) -> Result<RemediationPlan, ServiceError> {
        require(scope, Permission::ManageRemediation)?;
        let contract = self.visible_contract(scope, contract_id)?;
        contract.ensure_open()?;

        let mut drafts = request.actions;
        if request.seed_from_health {
            let report = self.health_of(&contract, Utc::now().date_naive())?;
            drafts.extend(suggest_actions(&report));
        }

        let now = Utc::now();
        let plan = RemediationPlan::open(
            contract.tenant_id.clone(),
            contract.id.clone(),
            &request.reason,
            drafts,
            now,
        )?;
        let plan = self
            .store
            .insert_remediation(plan)
            .map_err(|error| match error {
                StoreError::Conflict(_) => ServiceError::from(RemediationError::AlreadyOpen),
                other => ServiceError::from(other),
            })?;

        info!(
            contract_id = %contract.id,
            plan_id = %plan.id,
            actions = plan.actions.len(),
            "remediation plan opened"
        );
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "remediation.open",
            plan.id.to_string(),
        );
        self.publish(
            WebhookEvent::new(
                WebhookKind::RemediationOpened,
                contract.tenant_id.clone(),
                plan.id.to_string(),
                now,
            )
            .with_detail("contract_id", contract.id.to_string())
            .with_detail("reason", plan.reason.clone()),
        );
        Ok(plan)
    }

    pub fn get_remediation(
        &self,
        scope: &AccessScope,
        plan_id: &RemediationPlanId,
    ) -> Result<RemediationPlan, ServiceError> {
        require(scope, Permission::ManageRemediation)?;
        Ok(self
            .store
            .remediation(&scope.tenant_id, plan_id)?
            .ok_or(StoreError::NotFound("remediation plan"))?)
    }

    pub fn add_remediation_action(
        &self,
        scope: &AccessScope,
        plan_id: &RemediationPlanId,
        expected_version: u64,
        draft: ActionDraft,
    ) -> Result<RemediationPlan, ServiceError> {
        self.write_remediation(scope, plan_id, "remediation.add_action", |plan| {
            plan.add_action(expected_version, draft).map(|_| ())
        })
    }

    pub fn complete_remediation_action(
        &self,
        scope: &AccessScope,
        plan_id: &RemediationPlanId,
        action_id: &RemediationActionId,
        expected_version: u64,
    ) -> Result<RemediationPlan, ServiceError> {
        let now = Utc::now();
        self.write_remediation(scope, plan_id, "remediation.complete_action", |plan| {
            plan.complete_action(expected_version, action_id, now)
        })
    }

    pub fn close_remediation(
        &self,
        scope: &AccessScope,
        plan_id: &RemediationPlanId,
        expected_version: u64,
        force: bool,
    ) -> Result<RemediationPlan, ServiceError> {
        let now = Utc::now();
        self.write_remediation(scope, plan_id, "remediation.close", |plan| {
            plan.close(expected_version, force, now)
        })
    }

    /// Versioned write: a stale `expected_version` aborts before anything is stored.
    fn write_remediation<F>(
        &self,
        scope: &AccessScope,
        plan_id: &RemediationPlanId,
        action: &str,
        f: F,
    ) -> Result<RemediationPlan, ServiceError>
    where
        F: FnOnce(&mut RemediationPlan) -> Result<(), RemediationError>,
    {
        require(scope, Permission::ManageRemediation)?;
        let plan = self
            .store
            .update_remediation(&scope.tenant_id, plan_id, |plan| {
                f(plan)?;
                Ok::<_, ServiceError>(plan.clone())
            })?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            action,
            format!("{plan_id}@{}", plan.version),
        );
        Ok(plan)
    }

    pub fn qualiopi_report(
        &self,
        scope: &AccessScope,
        today: NaiveDate,
    ) -> Result<QualiopiReport, ServiceError> {
        require(scope, Permission::ViewReports)?;
        let today = reference_day(today)?;
        let snapshot = self.store.snapshot(&scope.tenant_id)?;
        let report = qualiopi::build_report(
            scope.tenant_id.clone(),
            QualiopiInputs {
                contracts: &snapshot.contracts,
                positionings: &snapshot.positionings,
                assessments: &snapshot.assessments,
                tsf: &snapshot.tsf,
                livrets: &snapshot.livrets,
                tickets: &snapshot.tickets,
            },
            today,
        );
        info!(
            tenant_id = %scope.tenant_id,
            compliant = report.is_compliant(),
            "Qualiopi report generated"
        );
        Ok(report)
    }

    pub fn qualiopi_csv(&self, scope: &AccessScope, today: NaiveDate) -> Result<String, ServiceError> {
        let report = self.qualiopi_report(scope, today)?;
        Ok(qualiopi::to_csv(&report)?)
    }

    pub fn open_ticket(
        &self,
        scope: &AccessScope,
        draft: TicketDraft,
    ) -> Result<SupportTicket, ServiceError> {
        require(scope, Permission::UseSupport)?;
        let ticket = SupportTicket::open(
            draft,
            scope.tenant_id.clone(),
            scope.user_id.clone(),
            Utc::now(),
        )?;
        let ticket = self.store.insert_ticket(ticket)?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "ticket.open",
            ticket.id.to_string(),
        );
        Ok(ticket)
    }

    /// Support staff see every ticket of the tenant, other users only their own.
    pub fn list_tickets(&self, scope: &AccessScope) -> Result<Vec<SupportTicket>, ServiceError> {
        require(scope, Permission::UseSupport)?;
        let tickets = self.store.tickets(&scope.tenant_id)?;
        if scope.role.allows(Permission::ManageSupport) {
            return Ok(tickets);
        }
        Ok(tickets
            .into_iter()
            .filter(|ticket| ticket.opened_by == scope.user_id)
            .collect())
    }

    pub fn transition_ticket(
        &self,
        scope: &AccessScope,
        ticket_id: &TicketId,
        next: TicketStatus,
    ) -> Result<SupportTicket, ServiceError> {
        require(scope, Permission::ManageSupport)?;
        let now = Utc::now();
        let ticket = self
            .store
            .update_ticket(&scope.tenant_id, ticket_id, |ticket| {
                ticket.transition(next, now)?;
                Ok::<_, ServiceError>(ticket.clone())
            })?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "ticket.transition",
            format!("{ticket_id}:{}", next.label()),
        );
        Ok(ticket)
    }

    pub fn audit_log(
        &self,
        scope: &AccessScope,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        require(scope, Permission::ViewAudit)?;
        let limit = limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .clamp(1, MAX_AUDIT_LIMIT);
        Ok(self.store.audit(&scope.tenant_id, limit)?)
    }
}
