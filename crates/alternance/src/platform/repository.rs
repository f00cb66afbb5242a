//! Storage abstraction so the service can be exercised against any backend.
//!
//! Lookups take the caller's tenant: a record owned by another tenant is reported as absent.
//! `update_*` methods apply the closure to a copy of the record and only persist it when the
//! closure succeeds, as a single atomic step.

use crate::ids::{
    ApiKeyId, ContractId, LivretId, ProofId, ReferentielId, RemediationPlanId, TenantId,
    TicketId, UserId,
};
use crate::platform::audit::AuditEntry;
use crate::tenancy::{ApiKey, MagicToken, Tenant, User};
use crate::workflows::apprenticeship::{
    Assessment, Contract, Livret, Positioning, Proof, TsfMapping,
};
use crate::workflows::quality::{RemediationPlan, SupportTicket};
use crate::workflows::referentiel::Referentiel;

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait DirectoryStore: Send + Sync {
    fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, StoreError>;
    fn tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError>;
    fn tenants(&self) -> Result<Vec<Tenant>, StoreError>;
    fn insert_user(&self, user: User) -> Result<User, StoreError>;
    fn user(&self, tenant: &TenantId, id: &UserId) -> Result<Option<User>, StoreError>;
    fn users(&self, tenant: &TenantId) -> Result<Vec<User>, StoreError>;

    fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError>;
    fn api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, StoreError>;
    fn update_api_key<T, E, F>(&self, id: &ApiKeyId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut ApiKey) -> Result<T, E>,
        E: From<StoreError>;

    fn insert_magic_token(&self, token: MagicToken) -> Result<(), StoreError>;
    fn update_magic_token<T, E, F>(&self, token_hash: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut MagicToken) -> Result<T, E>,
        E: From<StoreError>;
}

pub trait ReferentielStore: Send + Sync {
    /// Rejects a second referential with the same RNCP code in the tenant.
    fn insert_referentiel(&self, referentiel: Referentiel) -> Result<Referentiel, StoreError>;
    fn referentiel(
        &self,
        tenant: &TenantId,
        id: &ReferentielId,
    ) -> Result<Option<Referentiel>, StoreError>;
    fn referentiels(&self, tenant: &TenantId) -> Result<Vec<Referentiel>, StoreError>;
    /// Refused while a contract still references the referential.
    fn delete_referentiel(&self, tenant: &TenantId, id: &ReferentielId) -> Result<(), StoreError>;
}

pub trait ContractStore: Send + Sync {
    /// Rejects a duplicate external id within the tenant.
    fn insert_contract(&self, contract: Contract) -> Result<Contract, StoreError>;
    fn contract(&self, tenant: &TenantId, id: &ContractId)
        -> Result<Option<Contract>, StoreError>;
    fn contracts(&self, tenant: &TenantId) -> Result<Vec<Contract>, StoreError>;
    fn update_contract<T, E, F>(&self, tenant: &TenantId, id: &ContractId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Contract) -> Result<T, E>,
        E: From<StoreError>;
    /// Removes the contract and every record hanging off it.
    fn delete_contract(&self, tenant: &TenantId, id: &ContractId) -> Result<(), StoreError>;
}

pub trait TrackingStore: Send + Sync {
    fn insert_positioning(&self, positioning: Positioning) -> Result<Positioning, StoreError>;
    /// All positionings of a contract, oldest first.
    fn positionings(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<Vec<Positioning>, StoreError>;
    fn insert_assessment(&self, assessment: Assessment) -> Result<Assessment, StoreError>;
    fn assessments(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<Vec<Assessment>, StoreError>;

    /// Compute and store the contract's TSF from the current one in a single step.
    fn replace_tsf<E, F>(&self, tenant: &TenantId, contract: &ContractId, f: F) -> Result<TsfMapping, E>
    where
        F: FnOnce(Option<&TsfMapping>) -> Result<TsfMapping, E>,
        E: From<StoreError>;
    fn tsf(&self, tenant: &TenantId, contract: &ContractId)
        -> Result<Option<TsfMapping>, StoreError>;
    fn update_tsf<T, E, F>(&self, tenant: &TenantId, contract: &ContractId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut TsfMapping) -> Result<T, E>,
        E: From<StoreError>;

    fn insert_proof(&self, proof: Proof) -> Result<Proof, StoreError>;
    fn proof(&self, tenant: &TenantId, id: &ProofId) -> Result<Option<Proof>, StoreError>;
    fn proofs(&self, tenant: &TenantId, contract: &ContractId) -> Result<Vec<Proof>, StoreError>;
    fn update_proof<T, E, F>(&self, tenant: &TenantId, id: &ProofId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Proof) -> Result<T, E>,
        E: From<StoreError>;

    fn insert_livret(&self, livret: Livret) -> Result<Livret, StoreError>;
    fn livret(&self, tenant: &TenantId, id: &LivretId) -> Result<Option<Livret>, StoreError>;
    fn livrets(&self, tenant: &TenantId, contract: &ContractId)
        -> Result<Vec<Livret>, StoreError>;
    fn update_livret<T, E, F>(&self, tenant: &TenantId, id: &LivretId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Livret) -> Result<T, E>,
        E: From<StoreError>;

    /// Every tracking record of the tenant, used by reports and the reminder sweep.
    fn snapshot(&self, tenant: &TenantId) -> Result<TenantSnapshot, StoreError>;
}

pub trait QualityStore: Send + Sync {
    /// Rejects a second open plan for the same contract.
    fn insert_remediation(&self, plan: RemediationPlan) -> Result<RemediationPlan, StoreError>;
    fn remediation(
        &self,
        tenant: &TenantId,
        id: &RemediationPlanId,
    ) -> Result<Option<RemediationPlan>, StoreError>;
    fn remediations(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<Vec<RemediationPlan>, StoreError>;
    fn update_remediation<T, E, F>(
        &self,
        tenant: &TenantId,
        id: &RemediationPlanId,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut RemediationPlan) -> Result<T, E>,
        E: From<StoreError>;

    fn insert_ticket(&self, ticket: SupportTicket) -> Result<SupportTicket, StoreError>;
    fn ticket(&self, tenant: &TenantId, id: &TicketId)
        -> Result<Option<SupportTicket>, StoreError>;
    fn tickets(&self, tenant: &TenantId) -> Result<Vec<SupportTicket>, StoreError>;
    fn update_ticket<T, E, F>(&self, tenant: &TenantId, id: &TicketId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SupportTicket) -> Result<T, E>,
        E: From<StoreError>;
}

pub trait AuditStore: Send + Sync {
    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;
    /// Newest first.
    fn audit(&self, tenant: &TenantId, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;
}

/// Everything the service needs from a backend.
pub trait Store:
    DirectoryStore + ReferentielStore + ContractStore + TrackingStore + QualityStore + AuditStore
{
}

impl<T> Store for T where
    T: DirectoryStore + ReferentielStore + ContractStore + TrackingStore + QualityStore + AuditStore
{
}

/// Tenant-wide copy of the tracking records.
#[derive(Debug, Clone, Default)]
pub struct TenantSnapshot {
    pub contracts: Vec<Contract>,
    pub positionings: Vec<Positioning>,
    pub assessments: Vec<Assessment>,
    pub tsf: Vec<TsfMapping>,
    pub proofs: Vec<Proof>,
    pub livrets: Vec<Livret>,
    pub tickets: Vec<SupportTicket>,
}
