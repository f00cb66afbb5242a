use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TenantId, UserId};

/// A training center subscribing to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub slug: String,
    pub siret: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn create(
        name: &str,
        slug: &str,
        siret: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, TenancyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TenancyError::EmptyName);
        }
        Ok(Self {
            id: TenantId::generate(),
            name: name.to_string(),
            slug: validate_slug(slug)?,
            siret: normalize_siret(siret)?,
            active: true,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDraft {
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl User {
    pub fn create(
        tenant_id: TenantId,
        draft: UserDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, TenancyError> {
        let display_name = draft.display_name.trim();
        if display_name.is_empty() {
            return Err(TenancyError::EmptyName);
        }
        Ok(Self {
            id: UserId::generate(),
            tenant_id,
            email: normalize_email(&draft.email)?,
            display_name: display_name.to_string(),
            role: draft.role,
            created_at: now,
        })
    }
}

/// Roles known to the platform. A tenant admin manages the CFA, formateurs follow
/// apprentices pedagogically, tuteurs supervise them in the company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Formateur,
    Tuteur,
    Apprenti,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Formateur => "formateur",
            Role::Tuteur => "tuteur",
            Role::Apprenti => "apprenti",
        }
    }

    /// CFA-side staff may act on behalf of the training center.
    pub const fn is_cfa_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Formateur)
    }

    pub fn allows(self, permission: Permission) -> bool {
        use Permission::*;

        match self {
            Role::Admin => true,
            Role::Formateur => matches!(
                permission,
                ReadReferentiels
                    | ReadContracts
                    | ManageContracts
                    | RecordPositioning
                    | RecordAssessment
                    | ManageTsf
                    | ReviewProof
                    | ManageLivret
                    | SignAsCfa
                    | ManageRemediation
                    | ViewReports
                    | UseSupport
                    | ManageSupport
            ),
            Role::Tuteur => matches!(
                permission,
                ReadContracts | RecordAssessment | ReviewProof | SignAsTutor | UseSupport
            ),
            Role::Apprenti => matches!(
                permission,
                ReadContracts | SubmitProof | SignAsApprentice | UseSupport
            ),
        }
    }
}

/// Individual capabilities checked by the service layer before any read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageTenant,
    ReadReferentiels,
    ManageReferentiels,
    ReadContracts,
    ManageContracts,
    RecordPositioning,
    RecordAssessment,
    ManageTsf,
    SubmitProof,
    ReviewProof,
    ManageLivret,
    SignAsApprentice,
    SignAsTutor,
    SignAsCfa,
    ManageRemediation,
    ViewReports,
    UseSupport,
    ManageSupport,
    ViewAudit,
    RunArchive,
}

/// Validation failures raised while creating tenants or users.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenancyError {
    #[error("tenant slug '{0}' must be lowercase letters, digits or dashes")]
    InvalidSlug(String),
    #[error("name must not be empty")]
    EmptyName,
    #[error("email '{0}' is not a valid address")]
    InvalidEmail(String),
    #[error("SIRET must contain exactly 14 digits")]
    InvalidSiret,
}

pub(crate) fn validate_slug(slug: &str) -> Result<String, TenancyError> {
    let slug = slug.trim().to_string();
    let valid = !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(slug)
    } else {
        Err(TenancyError::InvalidSlug(slug))
    }
}

pub(crate) fn normalize_email(email: &str) -> Result<String, TenancyError> {
    let normalized = email.trim().to_ascii_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if valid && !normalized.contains(char::is_whitespace) {
        Ok(normalized)
    } else {
        Err(TenancyError::InvalidEmail(email.to_string()))
    }
}

pub(crate) fn normalize_siret(siret: Option<String>) -> Result<Option<String>, TenancyError> {
    match siret {
        None => Ok(None),
        Some(raw) => {
            let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            if digits.len() == 14 && digits.chars().all(|c| c.is_ascii_digit()) {
                Ok(Some(digits))
            } else {
                Err(TenancyError::InvalidSiret)
            }
        }
    }
}
