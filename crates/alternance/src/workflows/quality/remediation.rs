//! Remediation plans opened when a contract's health degrades.
//!
//! Every write carries the version the caller last read. A stale version is rejected before
//! anything is mutated, so two editors can never silently overwrite each other's actions.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::health::{HealthReport, SignalKind};
use crate::ids::{ContractId, RemediationActionId, RemediationPlanId, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub id: RemediationActionId,
    pub label: String,
    pub owner: Option<UserId>,
    pub due_on: Option<NaiveDate>,
    pub done_at: Option<DateTime<Utc>>,
}

impl RemediationAction {
    pub fn is_done(&self) -> bool {
        self.done_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDraft {
    pub label: String,
    #[serde(default)]
    pub owner: Option<UserId>,
    #[serde(default)]
    pub due_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub id: RemediationPlanId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub reason: String,
    pub status: RemediationStatus,
    pub actions: Vec<RemediationAction>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemediationError {
    #[error("remediation reason must not be empty")]
    EmptyReason,
    #[error("action label must not be empty")]
    EmptyLabel,
    #[error("plan was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("remediation plan is closed")]
    Closed,
    #[error("contract already has an open remediation plan")]
    AlreadyOpen,
    #[error("unknown action {0}")]
    UnknownAction(RemediationActionId),
    #[error("action already completed")]
    ActionAlreadyDone,
    #[error("{0} action(s) still pending")]
    PendingActions(usize),
}

impl RemediationPlan {
    pub fn open(
        tenant_id: TenantId,
        contract_id: ContractId,
        reason: &str,
        drafts: Vec<ActionDraft>,
        now: DateTime<Utc>,
    ) -> Result<Self, RemediationError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RemediationError::EmptyReason);
        }
        let actions = drafts
            .into_iter()
            .map(RemediationAction::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: RemediationPlanId::generate(),
            tenant_id,
            contract_id,
            reason: reason.to_string(),
            status: RemediationStatus::Open,
            actions,
            version: 1,
            created_at: now,
            closed_at: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == RemediationStatus::Open
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.iter().filter(|action| !action.is_done()).count()
    }

    fn check_writable(&self, expected_version: u64) -> Result<(), RemediationError> {
        if self.version != expected_version {
            return Err(RemediationError::VersionConflict {
                expected: expected_version,
                actual: self.version,
            });
        }
        if !self.is_open() {
            return Err(RemediationError::Closed);
        }
        Ok(())
    }

    pub fn add_action(
        &mut self,
        expected_version: u64,
        draft: ActionDraft,
    ) -> Result<RemediationActionId, RemediationError> {
        self.check_writable(expected_version)?;
        let action = RemediationAction::try_from(draft)?;
        let id = action.id.clone();
        self.actions.push(action);
        self.version += 1;
        Ok(id)
    }

    pub fn complete_action(
        &mut self,
        expected_version: u64,
        action_id: &RemediationActionId,
        at: DateTime<Utc>,
    ) -> Result<(), RemediationError> {
        self.check_writable(expected_version)?;
        let action = self
            .actions
            .iter_mut()
            .find(|action| &action.id == action_id)
            .ok_or_else(|| RemediationError::UnknownAction(action_id.clone()))?;
        if action.is_done() {
            return Err(RemediationError::ActionAlreadyDone);
        }
        action.done_at = Some(at);
        self.version += 1;
        Ok(())
    }

    pub fn close(
        &mut self,
        expected_version: u64,
        force: bool,
        at: DateTime<Utc>,
    ) -> Result<(), RemediationError> {
        self.check_writable(expected_version)?;
        let pending = self.pending_actions();
        if pending > 0 && !force {
            return Err(RemediationError::PendingActions(pending));
        }
        self.status = RemediationStatus::Closed;
        self.closed_at = Some(at);
        self.version += 1;
        Ok(())
    }
}

impl TryFrom<ActionDraft> for RemediationAction {
    type Error = RemediationError;

    fn try_from(draft: ActionDraft) -> Result<Self, Self::Error> {
        let label = draft.label.trim();
        if label.is_empty() {
            return Err(RemediationError::EmptyLabel);
        }
        Ok(Self {
            id: RemediationActionId::generate(),
            label: label.to_string(),
            owner: draft.owner,
            due_on: draft.due_on,
            done_at: None,
        })
    }
}

/// Default follow-up actions for the signals raised in `report`, due two weeks out.
pub fn suggest_actions(report: &HealthReport) -> Vec<ActionDraft> {
    let due_on = Some(report.computed_on + Duration::days(14));
    report
        .signals
        .iter()
        .map(|signal| {
            let label = match signal.kind {
                SignalKind::SeverelyBehindPace | SignalKind::BehindPace => {
                    "Planifier un point d'étape tripartite sur la progression"
                }
                SignalKind::NoRecentProof => "Relancer l'apprenti sur le dépôt de preuves",
                SignalKind::HighRejectionRate => {
                    "Revoir les attendus des preuves avec l'apprenti"
                }
                SignalKind::StaleLivrets => "Relancer les signataires du livret",
                SignalKind::TsfNotValidated => "Valider le TSF avec l'entreprise",
            };
            ActionDraft {
                label: label.to_string(),
                owner: None,
                due_on,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::quality::health::{score, HealthInputs};

    fn plan() -> RemediationPlan {
        RemediationPlan::open(
            TenantId::from("tnt_a"),
            ContractId::from("ctr_1"),
            "Retard de progression",
            vec![ActionDraft {
                label: "Point d'étape".to_string(),
                owner: None,
                due_on: None,
            }],
            Utc::now(),
        )
        .expect("plan opens")
    }

    fn draft(label: &str) -> ActionDraft {
        ActionDraft {
            label: label.to_string(),
            owner: Some(UserId::from("usr_f")),
            due_on: None,
        }
    }

    #[test]
    fn open_requires_reason_and_labels() {
        assert_eq!(
            RemediationPlan::open(
                TenantId::from("tnt_a"),
                ContractId::from("ctr_1"),
                "  ",
                Vec::new(),
                Utc::now()
            ),
            Err(RemediationError::EmptyReason)
        );
        assert_eq!(
            RemediationPlan::open(
                TenantId::from("tnt_a"),
                ContractId::from("ctr_1"),
                "Retard",
                vec![draft(" ")],
                Utc::now()
            ),
            Err(RemediationError::EmptyLabel)
        );
    }

    #[test]
    fn each_write_bumps_the_version() {
        let mut plan = plan();
        assert_eq!(plan.version, 1);
        let action = plan.add_action(1, draft("Relance")).expect("added");
        assert_eq!(plan.version, 2);
        plan.complete_action(2, &action, Utc::now()).expect("completed");
        assert_eq!(plan.version, 3);
        assert_eq!(plan.pending_actions(), 1);
    }

    #[test]
    fn stale_version_is_rejected_without_writing() {
        let mut plan = plan();
        plan.add_action(1, draft("Relance")).expect("first writer wins");
        let before = plan.clone();

        assert_eq!(
            plan.add_action(1, draft("Écrasement")),
            Err(RemediationError::VersionConflict {
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(plan, before);
    }

    #[test]
    fn close_requires_done_actions_unless_forced() {
        let mut plan = plan();
        assert_eq!(
            plan.close(1, false, Utc::now()),
            Err(RemediationError::PendingActions(1))
        );
        plan.close(1, true, Utc::now()).expect("forced close");
        assert_eq!(plan.status, RemediationStatus::Closed);
        assert_eq!(
            plan.add_action(2, draft("Trop tard")),
            Err(RemediationError::Closed)
        );
    }

    #[test]
    fn completing_twice_fails() {
        let mut plan = plan();
        let id = plan.actions[0].id.clone();
        plan.complete_action(1, &id, Utc::now()).unwrap();
        assert_eq!(
            plan.complete_action(2, &id, Utc::now()),
            Err(RemediationError::ActionAlreadyDone)
        );
        assert!(matches!(
            plan.complete_action(2, &RemediationActionId::from("act_missing"), Utc::now()),
            Err(RemediationError::UnknownAction(_))
        ));
    }

    #[test]
    fn suggestions_follow_signals() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let report = score(
            ContractId::from("ctr_1"),
            HealthInputs {
                progression_rate: 0.1,
                elapsed_fraction: 0.6,
                days_running: 400,
                recent_proofs: 0,
                reviewed_proofs: 0,
                rejected_proofs: 0,
                stale_livrets: 0,
                tsf_validated: true,
                open_remediation: false,
            },
            today,
        );
        let actions = suggest_actions(&report);
        assert_eq!(actions.len(), 2);
        assert!(actions
            .iter()
            .all(|action| action.due_on == Some(today + Duration::days(14))));
    }
}
