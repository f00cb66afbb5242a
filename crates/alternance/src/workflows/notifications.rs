//! Outbound integration points: webhook events fired after state changes and the reminder
//! sweep run by the cron endpoint.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ContractId, TenantId, UserId};
use crate::workflows::apprenticeship::{
    Contract, ContractStatus, Livret, LivretStatus, Proof, ProofStatus, TsfMapping,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookKind {
    #[serde(rename = "tsf.validated")]
    TsfValidated,
    #[serde(rename = "livret.signed")]
    LivretSigned,
    #[serde(rename = "proof.reviewed")]
    ProofReviewed,
    #[serde(rename = "contract.archived")]
    ContractArchived,
    #[serde(rename = "remediation.opened")]
    RemediationOpened,
}

impl WebhookKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::TsfValidated => "tsf.validated",
            Self::LivretSigned => "livret.signed",
            Self::ProofReviewed => "proof.reviewed",
            Self::ContractArchived => "contract.archived",
            Self::RemediationOpened => "remediation.opened",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    pub tenant_id: TenantId,
    pub resource_id: String,
    pub occurred_at: DateTime<Utc>,
    pub details: BTreeMap<String, String>,
}

impl WebhookEvent {
    pub fn new(
        kind: WebhookKind,
        tenant_id: TenantId,
        resource_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            tenant_id,
            resource_id: resource_id.into(),
            occurred_at,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Outbound webhook hook (HTTP dispatcher, queue, or test recorder).
pub trait WebhookPublisher: Send + Sync {
    fn publish(&self, event: WebhookEvent) -> Result<(), WebhookError>;
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook transport unavailable: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    MissingSignature,
    ProofAwaitingReview,
    TsfNotValidated,
}

/// Message queued for a user by the reminder sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub kind: ReminderKind,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub recipient: UserId,
    pub subject: String,
    pub resource_id: String,
}

/// E-mail (or other channel) sender used for reminders.
pub trait NotificationSender: Send + Sync {
    fn send(&self, reminder: &Reminder) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification channel unavailable: {0}")]
    Channel(String),
}

pub const TSF_REMINDER_WINDOW_DAYS: i64 = 30;

/// Records the sweep inspects; built by the caller from the store.
#[derive(Debug, Clone, Copy)]
pub struct ReminderSnapshot<'a> {
    pub contracts: &'a [Contract],
    pub livrets: &'a [Livret],
    pub proofs: &'a [Proof],
    pub tsf: &'a [TsfMapping],
}

pub fn collect_reminders(
    snapshot: ReminderSnapshot<'_>,
    today: NaiveDate,
    after_days: i64,
) -> Vec<Reminder> {
    let mut reminders = Vec::new();
    let contract_by_id = |id: &ContractId| snapshot.contracts.iter().find(|c| &c.id == id);

    for livret in snapshot
        .livrets
        .iter()
        .filter(|livret| livret.status == LivretStatus::AwaitingSignatures)
    {
        let Some(contract) = contract_by_id(&livret.contract_id) else {
            continue;
        };
        let Some(first) = livret.signatures.first_signed_at() else {
            continue;
        };
        if (today - first.date_naive()).num_days() < after_days {
            continue;
        }
        for signer in livret.signatures.missing() {
            reminders.push(Reminder {
                kind: ReminderKind::MissingSignature,
                tenant_id: livret.tenant_id.clone(),
                contract_id: contract.id.clone(),
                recipient: signer.expected_user(contract).clone(),
                subject: format!(
                    "Signature attendue ({}) sur le livret « {} »",
                    signer.label(),
                    livret.period_label
                ),
                resource_id: livret.id.to_string(),
            });
        }
    }

    for proof in snapshot
        .proofs
        .iter()
        .filter(|proof| proof.status == ProofStatus::Submitted)
    {
        let Some(contract) = contract_by_id(&proof.contract_id) else {
            continue;
        };
        if (today - proof.submitted_at.date_naive()).num_days() < after_days {
            continue;
        }
        reminders.push(Reminder {
            kind: ReminderKind::ProofAwaitingReview,
            tenant_id: proof.tenant_id.clone(),
            contract_id: contract.id.clone(),
            recipient: contract.referent_id.clone(),
            subject: format!("Preuve « {} » en attente de revue", proof.title),
            resource_id: proof.id.to_string(),
        });
    }

    for contract in snapshot
        .contracts
        .iter()
        .filter(|contract| contract.status == ContractStatus::Active)
    {
        let days_left = contract.days_until_end(today);
        if !(0..=TSF_REMINDER_WINDOW_DAYS).contains(&days_left) {
            continue;
        }
        let validated = snapshot
            .tsf
            .iter()
            .any(|mapping| mapping.contract_id == contract.id && mapping.is_validated());
        if validated {
            continue;
        }
        reminders.push(Reminder {
            kind: ReminderKind::TsfNotValidated,
            tenant_id: contract.tenant_id.clone(),
            contract_id: contract.id.clone(),
            recipient: contract.referent_id.clone(),
            subject: format!(
                "TSF non validé, fin de contrat dans {} jour(s)",
                days_left
            ),
            resource_id: contract.id.to_string(),
        });
    }

    reminders
}
