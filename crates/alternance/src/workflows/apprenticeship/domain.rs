use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ContractId, ReferentielId, TenantId, UserId};

/// Apprenticeship contract binding an apprentice, a company tutor and a CFA referent to a
/// referential over a fixed date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub tenant_id: TenantId,
    pub external_id: Option<String>,
    pub apprentice_id: UserId,
    pub tutor_id: UserId,
    pub referent_id: UserId,
    pub referentiel_id: ReferentielId,
    pub company_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDraft {
    #[serde(default)]
    pub external_id: Option<String>,
    pub apprentice_id: UserId,
    pub tutor_id: UserId,
    pub referent_id: UserId,
    pub referentiel_id: ReferentielId,
    pub company_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Active,
    Suspended,
    Completed,
    Terminated,
}

impl ContractStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Terminated => "terminated",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }

    pub fn can_transition_to(self, next: ContractStatus) -> bool {
        use ContractStatus::*;

        matches!(
            (self, next),
            (Draft, Active)
                | (Active, Suspended)
                | (Suspended, Active)
                | (Active, Completed)
                | (Draft | Active | Suspended, Terminated)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("contract must end after it starts ({start} -> {end})")]
    InvalidDates { start: NaiveDate, end: NaiveDate },
    #[error("company name must not be empty")]
    MissingCompany,
    #[error("user {user} cannot act as {expected}")]
    RoleMismatch { user: UserId, expected: &'static str },
    #[error("external id '{0}' already used in this tenant")]
    DuplicateExternalId(String),
    #[error("cannot move contract from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("contract is {0} and no longer accepts changes")]
    Closed(&'static str),
}

impl ContractDraft {
    pub fn validate(mut self) -> Result<ContractDraft, ContractError> {
        if self.end_date <= self.start_date {
            return Err(ContractError::InvalidDates {
                start: self.start_date,
                end: self.end_date,
            });
        }

        self.company_name = self.company_name.trim().to_string();
        if self.company_name.is_empty() {
            return Err(ContractError::MissingCompany);
        }

        self.external_id = self
            .external_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(self)
    }
}

impl Contract {
    pub fn from_draft(draft: ContractDraft, tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            id: ContractId::generate(),
            tenant_id,
            external_id: draft.external_id,
            apprentice_id: draft.apprentice_id,
            tutor_id: draft.tutor_id,
            referent_id: draft.referent_id,
            referentiel_id: draft.referentiel_id,
            company_name: draft.company_name,
            start_date: draft.start_date,
            end_date: draft.end_date,
            status: ContractStatus::Draft,
            created_at: now,
        }
    }

    pub fn transition(&mut self, next: ContractStatus) -> Result<(), ContractError> {
        if !self.status.can_transition_to(next) {
            return Err(ContractError::InvalidTransition {
                from: self.status.label(),
                to: next.label(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Reject writes to tracking data once the contract reached a terminal status.
    pub fn ensure_open(&self) -> Result<(), ContractError> {
        if self.status.is_terminal() {
            Err(ContractError::Closed(self.status.label()))
        } else {
            Ok(())
        }
    }

    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// Share of the contract already elapsed at `today`, clamped to `[0, 1]`.
    pub fn elapsed_fraction(&self, today: NaiveDate) -> f32 {
        let total = self.duration_days();
        if total <= 0 {
            return 1.0;
        }
        let elapsed = (today - self.start_date).num_days();
        (elapsed as f32 / total as f32).clamp(0.0, 1.0)
    }

    pub fn days_until_end(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days()
    }
}

/// Filter accepted by contract listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContractFilter {
    #[serde(default)]
    pub status: Option<ContractStatus>,
    #[serde(default)]
    pub apprentice_id: Option<UserId>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        self.status.map_or(true, |status| contract.status == status)
            && self
                .apprentice_id
                .as_ref()
                .map_or(true, |apprentice| &contract.apprentice_id == apprentice)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn draft_rejects_inverted_dates_and_blank_company() {
        let mut draft = ContractDraft {
            external_id: Some("  ".to_string()),
            apprentice_id: UserId::from("usr_a"),
            tutor_id: UserId::from("usr_t"),
            referent_id: UserId::from("usr_f"),
            referentiel_id: ReferentielId::from("ref_1"),
            company_name: " Boulangerie Martin ".to_string(),
            start_date: date(2025, 9, 1),
            end_date: date(2025, 9, 1),
        };
        assert!(matches!(
            draft.clone().validate(),
            Err(ContractError::InvalidDates { .. })
        ));

        draft.end_date = date(2027, 8, 31);
        let validated = draft.clone().validate().expect("valid");
        assert_eq!(validated.company_name, "Boulangerie Martin");
        assert_eq!(validated.external_id, None);

        draft.company_name = "   ".to_string();
        assert_eq!(draft.validate(), Err(ContractError::MissingCompany));
    }

    #[test]
    fn transitions_follow_lifecycle() {
        let mut contract = contract(date(2025, 9, 1), date(2027, 8, 31));
        contract.status = ContractStatus::Draft;
        assert!(contract.transition(ContractStatus::Completed).is_err());
        contract.transition(ContractStatus::Active).unwrap();
        contract.transition(ContractStatus::Suspended).unwrap();
        contract.transition(ContractStatus::Active).unwrap();
        contract.transition(ContractStatus::Completed).unwrap();
        assert_eq!(
            contract.transition(ContractStatus::Terminated),
            Err(ContractError::InvalidTransition {
                from: "completed",
                to: "terminated",
            })
        );
        assert!(contract.ensure_open().is_err());
    }

    #[test]
    fn elapsed_fraction_is_clamped() {
        let contract = contract(date(2025, 1, 1), date(2025, 12, 31));
        assert_eq!(contract.elapsed_fraction(date(2024, 6, 1)), 0.0);
        assert_eq!(contract.elapsed_fraction(date(2026, 6, 1)), 1.0);
        let midway = contract.elapsed_fraction(date(2025, 7, 2));
        assert!((midway - 0.5).abs() < 0.01);
    }

    #[test]
    fn filter_matches_status_and_apprentice() {
        let contract = contract(date(2025, 1, 1), date(2025, 12, 31));
        assert!(ContractFilter::default().matches(&contract));
        let by_status = ContractFilter {
            status: Some(ContractStatus::Suspended),
            apprentice_id: None,
        };
        assert!(!by_status.matches(&contract));
        let by_apprentice = ContractFilter {
            status: None,
            apprentice_id: Some(UserId::from("usr_apprenti")),
        };
        assert!(by_apprentice.matches(&contract));
    }
}
