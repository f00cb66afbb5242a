use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use alternance::config::WorkflowConfig;
use alternance::platform::{AlternanceService, MemoryStore, ServiceError};
use alternance::tenancy::{Role, Tenant, UserDraft};
use alternance::workflows::archive::{ArchiveError, ArchiveUploader};
use alternance::workflows::notifications::{
    NotificationError, NotificationSender, Reminder, WebhookError, WebhookEvent, WebhookPublisher,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

pub(crate) type PlatformService =
    AlternanceService<MemoryStore, LogWebhookPublisher, LogNotificationSender>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Emits webhook events as structured log lines until an HTTP dispatcher is configured.
#[derive(Debug, Default, Clone)]
pub(crate) struct LogWebhookPublisher;

impl WebhookPublisher for LogWebhookPublisher {
    fn publish(&self, event: WebhookEvent) -> Result<(), WebhookError> {
        let payload = serde_json::to_string(&event.details)
            .map_err(|err| WebhookError::Transport(err.to_string()))?;
        info!(
            kind = event.kind.name(),
            tenant_id = %event.tenant_id,
            resource_id = %event.resource_id,
            occurred_at = %event.occurred_at,
            details = %payload,
            "webhook event"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(&self, reminder: &Reminder) -> Result<(), NotificationError> {
        info!(
            tenant_id = %reminder.tenant_id,
            recipient = %reminder.recipient,
            contract_id = %reminder.contract_id,
            subject = %reminder.subject,
            "reminder queued"
        );
        Ok(())
    }
}

/// Writes archive payloads below a local directory, one file per storage key.
#[derive(Debug, Clone)]
pub(crate) struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn target(&self, key: &str) -> Result<PathBuf, ArchiveError> {
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative
                .components()
                .any(|part| matches!(part, std::path::Component::ParentDir))
        {
            return Err(ArchiveError::Upload(format!("refusing storage key {key}")));
        }
        Ok(self.root.join(relative))
    }
}

impl ArchiveUploader for DirectoryUploader {
    fn upload(&self, key: &str, payload: &[u8]) -> Result<String, ArchiveError> {
        let target = self.target(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| ArchiveError::Upload(err.to_string()))?;
        }
        fs::write(&target, payload).map_err(|err| ArchiveError::Upload(err.to_string()))?;
        Ok(target.display().to_string())
    }
}

pub(crate) fn platform_service(workflow: WorkflowConfig) -> Arc<PlatformService> {
    Arc::new(AlternanceService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(LogWebhookPublisher),
        Arc::new(LogNotificationSender),
        workflow,
    ))
}

/// Tenant and admin key created at startup so a fresh in-memory instance is usable.
pub(crate) struct Bootstrap {
    pub(crate) tenant: Tenant,
    pub(crate) admin_key: String,
}

pub(crate) fn bootstrap_tenant(
    service: &PlatformService,
    slug: &str,
) -> Result<Bootstrap, ServiceError> {
    let tenant = service.create_tenant("CFA de démonstration", slug, None)?;
    let admin = service.register_user(
        &tenant.id,
        UserDraft {
            email: format!("admin@{slug}.local"),
            display_name: "Administrateur".to_string(),
            role: Role::Admin,
        },
    )?;
    let issued = service.issue_api_key_for(&tenant.id, &admin.id, "bootstrap")?;
    Ok(Bootstrap {
        tenant,
        admin_key: issued.token,
    })
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn bootstrap_key_authenticates_as_admin() {
        let service = platform_service(WorkflowConfig::default());
        let bootstrap = bootstrap_tenant(&service, "cfa-local").expect("bootstrap succeeds");
        let scope = service
            .authenticate(&bootstrap.admin_key, Utc::now())
            .expect("key valid");
        assert_eq!(scope.tenant_id, bootstrap.tenant.id);
        assert_eq!(scope.role, Role::Admin);
    }

    #[test]
    fn uploader_rejects_keys_escaping_the_root() {
        let uploader = DirectoryUploader::new(std::env::temp_dir().join("alternance-tests"));
        assert!(uploader.upload("../outside.json", b"{}").is_err());
    }

    #[test]
    fn uploader_writes_nested_keys() {
        let root = std::env::temp_dir().join(format!("alternance-upload-{}", std::process::id()));
        let uploader = DirectoryUploader::new(&root);
        let stored = uploader
            .upload("archives/tnt_a/2024/ctr_1.json", b"{\"ok\":true}")
            .expect("upload succeeds");
        let written = fs::read(&stored).expect("file written");
        assert_eq!(written, b"{\"ok\":true}");
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(
            parse_date("2026-09-01"),
            Ok(NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date"))
        );
        assert!(parse_date("01/09/2026").is_err());
    }
}
