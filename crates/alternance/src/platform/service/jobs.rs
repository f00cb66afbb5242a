use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{reference_day, AlternanceService, ServiceError};
use crate::platform::repository::Store;
use crate::tenancy::{CredentialError, Tenant};
use crate::workflows::apprenticeship::Contract;
use crate::workflows::archive::{
    is_archivable, retention_cutoff, ArchiveFailure, ArchiveReport, ArchiveUploader,
    ArchivedContract, ContractArchive,
};
use crate::workflows::notifications::{
    collect_reminders, NotificationSender, ReminderSnapshot, WebhookEvent, WebhookKind,
    WebhookPublisher,
};

/// Counts returned by the reminder cron.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderRun {
    pub tenants: usize,
    pub reminders: usize,
    pub sent: usize,
    pub failed: usize,
}

impl<S, W, N> AlternanceService<S, W, N>
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    /// Gate for the cron endpoints: disabled without a configured secret.
    pub fn check_cron_secret(&self, presented: Option<&str>) -> Result<(), ServiceError> {
        let expected = self
            .workflow
            .cron_secret
            .as_deref()
            .ok_or(ServiceError::CronDisabled)?;
        match presented.map(str::trim) {
            None | Some("") => Err(CredentialError::Missing.into()),
            Some(value) if value == expected => Ok(()),
            Some(_) => Err(CredentialError::Unknown.into()),
        }
    }

    /// Send the reminders due at `today` across every active tenant.
    pub fn run_reminders(&self, today: NaiveDate) -> Result<ReminderRun, ServiceError> {
        let today = reference_day(today)?;
        let mut run = ReminderRun::default();
        for tenant in self.store.tenants()?.into_iter().filter(|tenant| tenant.active) {
            let snapshot = self.store.snapshot(&tenant.id)?;
            let reminders = collect_reminders(
                ReminderSnapshot {
                    contracts: &snapshot.contracts,
                    livrets: &snapshot.livrets,
                    proofs: &snapshot.proofs,
                    tsf: &snapshot.tsf,
                },
                today,
                self.workflow.reminder_after_days,
            );

            run.tenants += 1;
            run.reminders += reminders.len();
            for reminder in &reminders {
                match self.notifier.send(reminder) {
                    Ok(()) => run.sent += 1,
                    Err(error) => {
                        run.failed += 1;
                        warn!(
                            tenant_id = %tenant.id,
                            recipient = %reminder.recipient,
                            resource = %reminder.resource_id,
                            %error,
                            "reminder not delivered"
                        );
                    }
                }
            }
        }

        info!(
            tenants = run.tenants,
            reminders = run.reminders,
            sent = run.sent,
            failed = run.failed,
            "reminder sweep finished"
        );
        Ok(run)
    }

    /// Upload and purge every finished contract past the retention window.
    pub fn archive_expired(
        &self,
        today: NaiveDate,
        uploader: &dyn ArchiveUploader,
    ) -> Result<ArchiveReport, ServiceError> {
        let retention_days = self.workflow.archive_retention_days;
        let cutoff = retention_cutoff(reference_day(today)?, retention_days)
            .ok_or(ServiceError::RetentionOutOfRange(retention_days))?;
        let mut report = ArchiveReport {
            cutoff: Some(cutoff),
            ..ArchiveReport::default()
        };

        for tenant in self.store.tenants()? {
            let expired: Vec<Contract> = self
                .store
                .contracts(&tenant.id)?
                .into_iter()
                .filter(|contract| is_archivable(contract, cutoff))
                .collect();

            for contract in expired {
                match self.archive_one(&tenant, &contract, uploader) {
                    Ok(storage_key) => report.archived.push(ArchivedContract {
                        tenant_id: tenant.id.clone(),
                        contract_id: contract.id.clone(),
                        storage_key,
                    }),
                    Err(reason) => {
                        warn!(
                            tenant_id = %tenant.id,
                            contract_id = %contract.id,
                            %reason,
                            "contract not archived"
                        );
                        report.failed.push(ArchiveFailure {
                            tenant_id: tenant.id.clone(),
                            contract_id: contract.id.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        info!(
            %cutoff,
            archived = report.archived.len(),
            failed = report.failed.len(),
            "archive run finished"
        );
        Ok(report)
    }

    fn archive_one(
        &self,
        tenant: &Tenant,
        contract: &Contract,
        uploader: &dyn ArchiveUploader,
    ) -> Result<String, String> {
        let archive = self.collect_archive(contract).map_err(|error| error.to_string())?;
        let payload = archive.to_json().map_err(|error| error.to_string())?;
        let storage_key = uploader
            .upload(&archive.storage_key(), &payload)
            .map_err(|error| error.to_string())?;

        self.store
            .delete_contract(&tenant.id, &contract.id)
            .map_err(|error| format!("uploaded to {storage_key} but not purged: {error}"))?;

        self.audit(&tenant.id, None, "contract.archive", contract.id.to_string());
        self.publish(
            WebhookEvent::new(
                WebhookKind::ContractArchived,
                tenant.id.clone(),
                contract.id.to_string(),
                archive.archived_at,
            )
            .with_detail("storage_key", storage_key.clone()),
        );
        Ok(storage_key)
    }

    fn collect_archive(&self, contract: &Contract) -> Result<ContractArchive, ServiceError> {
        let tenant = &contract.tenant_id;
        Ok(ContractArchive {
            contract: contract.clone(),
            positionings: self.store.positionings(tenant, &contract.id)?,
            assessments: self.store.assessments(tenant, &contract.id)?,
            tsf: self.store.tsf(tenant, &contract.id)?,
            proofs: self.store.proofs(tenant, &contract.id)?,
            livrets: self.store.livrets(tenant, &contract.id)?,
            remediation_plans: self.store.remediations(tenant, &contract.id)?,
            archived_at: Utc::now(),
        })
    }
}
