use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::Contract;
use crate::ids::{ContractId, LivretId, TenantId, UserId};
use crate::tenancy::Role;

/// Livret d'apprentissage entry for one period, co-signed by the three parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Livret {
    pub id: LivretId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub period_label: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub notes: LivretNotes,
    pub signatures: TripartiteSignatures,
    pub status: LivretStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivretNotes {
    pub apprentice: Option<String>,
    pub tutor: Option<String>,
    pub cfa: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripartiteSignatures {
    pub apprentice_at: Option<DateTime<Utc>>,
    pub tutor_at: Option<DateTime<Utc>>,
    pub cfa_at: Option<DateTime<Utc>>,
}

impl TripartiteSignatures {
    pub fn get(&self, signer: Signer) -> Option<DateTime<Utc>> {
        match signer {
            Signer::Apprentice => self.apprentice_at,
            Signer::Tutor => self.tutor_at,
            Signer::Cfa => self.cfa_at,
        }
    }

    fn slot(&mut self, signer: Signer) -> &mut Option<DateTime<Utc>> {
        match signer {
            Signer::Apprentice => &mut self.apprentice_at,
            Signer::Tutor => &mut self.tutor_at,
            Signer::Cfa => &mut self.cfa_at,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.apprentice_at.is_some() && self.tutor_at.is_some() && self.cfa_at.is_some()
    }

    pub fn first_signed_at(&self) -> Option<DateTime<Utc>> {
        [self.apprentice_at, self.tutor_at, self.cfa_at]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn missing(&self) -> Vec<Signer> {
        Signer::ordered()
            .into_iter()
            .filter(|signer| self.get(*signer).is_none())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signer {
    Apprentice,
    Tutor,
    Cfa,
}

impl Signer {
    pub const fn ordered() -> [Self; 3] {
        [Self::Apprentice, Self::Tutor, Self::Cfa]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Apprentice => "apprentice",
            Self::Tutor => "tutor",
            Self::Cfa => "cfa",
        }
    }

    /// Whether `user` (holding `role`) may sign in this capacity on `contract`.
    pub fn accepts(self, contract: &Contract, user: &UserId, role: Role) -> bool {
        match self {
            Self::Apprentice => role == Role::Apprenti && &contract.apprentice_id == user,
            Self::Tutor => role == Role::Tuteur && &contract.tutor_id == user,
            Self::Cfa => role.is_cfa_staff(),
        }
    }

    /// Recipient expected to sign in this capacity.
    pub fn expected_user<'a>(self, contract: &'a Contract) -> &'a UserId {
        match self {
            Self::Apprentice => &contract.apprentice_id,
            Self::Tutor => &contract.tutor_id,
            Self::Cfa => &contract.referent_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivretStatus {
    Draft,
    AwaitingSignatures,
    Signed,
}

impl LivretStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::AwaitingSignatures => "awaiting_signatures",
            Self::Signed => "signed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivretDraft {
    pub period_label: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("{0} already signed")]
    AlreadySigned(&'static str),
    #[error("user cannot sign as {0}")]
    NotASigner(&'static str),
    #[error("livret is locked once signing has started")]
    Locked,
    #[error("period label must not be empty")]
    EmptyLabel,
    #[error("livret period must end after it starts")]
    InvalidPeriod,
    #[error("livret period falls outside the contract")]
    OutsideContract,
}

/// Result of applying one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOutcome {
    Recorded { remaining: usize },
    Completed,
}

impl Livret {
    pub fn create(
        draft: LivretDraft,
        contract: &Contract,
        now: DateTime<Utc>,
    ) -> Result<Self, SignatureError> {
        let period_label = draft.period_label.trim().to_string();
        if period_label.is_empty() {
            return Err(SignatureError::EmptyLabel);
        }
        if draft.period_end <= draft.period_start {
            return Err(SignatureError::InvalidPeriod);
        }
        if draft.period_start < contract.start_date || draft.period_end > contract.end_date {
            return Err(SignatureError::OutsideContract);
        }

        Ok(Self {
            id: LivretId::generate(),
            tenant_id: contract.tenant_id.clone(),
            contract_id: contract.id.clone(),
            period_label,
            period_start: draft.period_start,
            period_end: draft.period_end,
            notes: LivretNotes::default(),
            signatures: TripartiteSignatures::default(),
            status: LivretStatus::Draft,
            created_at: now,
        })
    }

    pub fn update_notes(&mut self, author: Signer, text: String) -> Result<(), SignatureError> {
        if self.status != LivretStatus::Draft {
            return Err(SignatureError::Locked);
        }
        let text = Some(text.trim().to_string()).filter(|text| !text.is_empty());
        match author {
            Signer::Apprentice => self.notes.apprentice = text,
            Signer::Tutor => self.notes.tutor = text,
            Signer::Cfa => self.notes.cfa = text,
        }
        Ok(())
    }

    /// Record a signature; the caller has already checked who is signing.
    pub fn sign(
        &mut self,
        signer: Signer,
        at: DateTime<Utc>,
    ) -> Result<SignatureOutcome, SignatureError> {
        let slot = self.signatures.slot(signer);
        if slot.is_some() {
            return Err(SignatureError::AlreadySigned(signer.label()));
        }
        *slot = Some(at);

        if self.signatures.is_complete() {
            self.status = LivretStatus::Signed;
            Ok(SignatureOutcome::Completed)
        } else {
            self.status = LivretStatus::AwaitingSignatures;
            Ok(SignatureOutcome::Recorded {
                remaining: self.signatures.missing().len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::apprenticeship::domain::fixtures::{contract, date};
    use chrono::Duration;

    fn livret() -> (Contract, Livret) {
        let contract = contract(date(2025, 9, 1), date(2027, 8, 31));
        let livret = Livret::create(
            LivretDraft {
                period_label: "Semestre 1".to_string(),
                period_start: date(2025, 9, 1),
                period_end: date(2026, 2, 28),
            },
            &contract,
            Utc::now(),
        )
        .expect("livret created");
        (contract, livret)
    }

    #[test]
    fn create_checks_period_against_contract() {
        let contract = contract(date(2025, 9, 1), date(2027, 8, 31));
        let outside = LivretDraft {
            period_label: "Avant contrat".to_string(),
            period_start: date(2025, 6, 1),
            period_end: date(2025, 9, 30),
        };
        assert_eq!(
            Livret::create(outside, &contract, Utc::now()),
            Err(SignatureError::OutsideContract)
        );
    }

    #[test]
    fn third_signature_completes_the_livret() {
        let (_, mut livret) = livret();
        let now = Utc::now();

        assert_eq!(
            livret.sign(Signer::Tutor, now),
            Ok(SignatureOutcome::Recorded { remaining: 2 })
        );
        assert_eq!(livret.status, LivretStatus::AwaitingSignatures);
        assert_eq!(
            livret.sign(Signer::Tutor, now),
            Err(SignatureError::AlreadySigned("tutor"))
        );
        assert_eq!(
            livret.sign(Signer::Apprentice, now + Duration::hours(1)),
            Ok(SignatureOutcome::Recorded { remaining: 1 })
        );
        assert_eq!(livret.signatures.missing(), vec![Signer::Cfa]);
        assert_eq!(
            livret.sign(Signer::Cfa, now + Duration::hours(2)),
            Ok(SignatureOutcome::Completed)
        );
        assert_eq!(livret.status, LivretStatus::Signed);
        assert_eq!(livret.signatures.first_signed_at(), Some(now));
    }

    #[test]
    fn notes_are_locked_after_first_signature() {
        let (_, mut livret) = livret();
        livret
            .update_notes(Signer::Apprentice, " Intégration réussie ".to_string())
            .expect("draft accepts notes");
        assert_eq!(livret.notes.apprentice.as_deref(), Some("Intégration réussie"));

        livret.sign(Signer::Cfa, Utc::now()).unwrap();
        assert_eq!(
            livret.update_notes(Signer::Tutor, "trop tard".to_string()),
            Err(SignatureError::Locked)
        );
    }

    #[test]
    fn signer_roles_are_bound_to_contract_parties() {
        let (contract, _) = livret();
        assert!(Signer::Apprentice.accepts(&contract, &contract.apprentice_id, Role::Apprenti));
        assert!(!Signer::Apprentice.accepts(&contract, &UserId::from("usr_other"), Role::Apprenti));
        assert!(!Signer::Tutor.accepts(&contract, &contract.apprentice_id, Role::Apprenti));
        assert!(Signer::Cfa.accepts(&contract, &UserId::from("usr_any_staff"), Role::Formateur));
        assert!(!Signer::Cfa.accepts(&contract, &contract.tutor_id, Role::Tuteur));
    }
}
