//! In-memory backend. All tables sit behind one mutex, so every trait call is atomic with
//! respect to every other one.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use super::audit::AuditEntry;
use super::repository::{
    AuditStore, ContractStore, DirectoryStore, QualityStore, ReferentielStore, StoreError,
    TenantSnapshot, TrackingStore,
};
use crate::ids::{
    ApiKeyId, ContractId, LivretId, ProofId, ReferentielId, RemediationPlanId, TenantId,
    TicketId, UserId,
};
use crate::tenancy::{ApiKey, MagicToken, Tenant, User};
use crate::workflows::apprenticeship::{
    Assessment, Contract, Livret, Positioning, Proof, TsfMapping,
};
use crate::workflows::quality::{RemediationPlan, SupportTicket};
use crate::workflows::referentiel::Referentiel;

#[derive(Default)]
struct Tables {
    tenants: HashMap<TenantId, Tenant>,
    users: HashMap<UserId, User>,
    api_keys: HashMap<ApiKeyId, ApiKey>,
    magic_tokens: HashMap<String, MagicToken>,
    referentiels: HashMap<ReferentielId, Referentiel>,
    contracts: HashMap<ContractId, Contract>,
    positionings: Vec<Positioning>,
    assessments: Vec<Assessment>,
    tsf: HashMap<ContractId, TsfMapping>,
    proofs: HashMap<ProofId, Proof>,
    livrets: HashMap<LivretId, Livret>,
    remediations: HashMap<RemediationPlanId, RemediationPlan>,
    tickets: HashMap<TicketId, SupportTicket>,
    audit: Vec<AuditEntry>,
}

impl Tables {
    /// Child records are only written while their contract is still stored for the tenant.
    fn require_contract(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<(), StoreError> {
        match self.contracts.get(contract) {
            Some(record) if &record.tenant_id == tenant => Ok(()),
            _ => Err(StoreError::NotFound("contract")),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn owned_copy<K, V>(
    map: &HashMap<K, V>,
    key: &K,
    owner: impl Fn(&V) -> bool,
) -> Option<V>
where
    K: Eq + Hash,
    V: Clone,
{
    map.get(key).filter(|value| owner(value)).cloned()
}

/// Apply `f` to a copy and write it back only when `f` succeeds.
fn update_owned<K, V, T, E, F>(
    map: &mut HashMap<K, V>,
    key: &K,
    owner: impl Fn(&V) -> bool,
    what: &'static str,
    f: F,
) -> Result<T, E>
where
    K: Eq + Hash,
    V: Clone,
    F: FnOnce(&mut V) -> Result<T, E>,
    E: From<StoreError>,
{
    let slot = map
        .get_mut(key)
        .filter(|value| owner(value))
        .ok_or_else(|| E::from(StoreError::NotFound(what)))?;
    let mut draft = slot.clone();
    let output = f(&mut draft)?;
    *slot = draft;
    Ok(output)
}

fn sorted_by<V, K: Ord>(mut values: Vec<V>, key: impl Fn(&V) -> K) -> Vec<V> {
    values.sort_by_key(|value| key(value));
    values
}

impl DirectoryStore for MemoryStore {
    fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, StoreError> {
        let mut tables = self.lock()?;
        if tables.tenants.values().any(|other| other.slug == tenant.slug) {
            return Err(StoreError::Conflict(format!(
                "tenant slug '{}' already taken",
                tenant.slug
            )));
        }
        tables.tenants.insert(tenant.id.clone(), tenant.clone());
        Ok(tenant)
    }

    fn tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.lock()?.tenants.get(id).cloned())
    }

    fn tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let tables = self.lock()?;
        let tenants = tables.tenants.values().cloned().collect();
        Ok(sorted_by(tenants, |tenant: &Tenant| tenant.slug.clone()))
    }

    fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut tables = self.lock()?;
        let duplicate = tables
            .users
            .values()
            .any(|other| other.tenant_id == user.tenant_id && other.email == user.email);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "email '{}' already registered in this tenant",
                user.email
            )));
        }
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn user(&self, tenant: &TenantId, id: &UserId) -> Result<Option<User>, StoreError> {
        let tables = self.lock()?;
        Ok(owned_copy(&tables.users, id, |user| &user.tenant_id == tenant))
    }

    fn users(&self, tenant: &TenantId) -> Result<Vec<User>, StoreError> {
        let tables = self.lock()?;
        let users = tables
            .users
            .values()
            .filter(|user| &user.tenant_id == tenant)
            .cloned()
            .collect();
        Ok(sorted_by(users, |user: &User| user.email.clone()))
    }

    fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.api_keys.values().any(|other| other.prefix == key.prefix) {
            return Err(StoreError::Conflict("api key prefix collision".to_string()));
        }
        tables.api_keys.insert(key.id.clone(), key);
        Ok(())
    }

    fn api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .api_keys
            .values()
            .find(|key| key.prefix == prefix)
            .cloned())
    }

    fn update_api_key<T, E, F>(&self, id: &ApiKeyId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut ApiKey) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        update_owned(&mut tables.api_keys, id, |_| true, "api key", f)
    }

    fn insert_magic_token(&self, token: MagicToken) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables
            .magic_tokens
            .insert(token.token_hash.clone(), token);
        Ok(())
    }

    fn update_magic_token<T, E, F>(&self, token_hash: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut MagicToken) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        update_owned(
            &mut tables.magic_tokens,
            &token_hash.to_string(),
            |_| true,
            "signing link",
            f,
        )
    }
}

impl ReferentielStore for MemoryStore {
    fn insert_referentiel(&self, referentiel: Referentiel) -> Result<Referentiel, StoreError> {
        let mut tables = self.lock()?;
        let duplicate = tables.referentiels.values().any(|other| {
            other.tenant_id == referentiel.tenant_id && other.rncp_code == referentiel.rncp_code
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "referential {} already exists",
                referentiel.rncp_code
            )));
        }
        tables
            .referentiels
            .insert(referentiel.id.clone(), referentiel.clone());
        Ok(referentiel)
    }

    fn referentiel(
        &self,
        tenant: &TenantId,
        id: &ReferentielId,
    ) -> Result<Option<Referentiel>, StoreError> {
        let tables = self.lock()?;
        Ok(owned_copy(&tables.referentiels, id, |referentiel| {
            &referentiel.tenant_id == tenant
        }))
    }

    fn referentiels(&self, tenant: &TenantId) -> Result<Vec<Referentiel>, StoreError> {
        let tables = self.lock()?;
        let referentiels = tables
            .referentiels
            .values()
            .filter(|referentiel| &referentiel.tenant_id == tenant)
            .cloned()
            .collect();
        Ok(sorted_by(referentiels, |referentiel: &Referentiel| {
            referentiel.rncp_code.clone()
        }))
    }

    fn delete_referentiel(&self, tenant: &TenantId, id: &ReferentielId) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if owned_copy(&tables.referentiels, id, |referentiel| {
            &referentiel.tenant_id == tenant
        })
        .is_none()
        {
            return Err(StoreError::NotFound("referential"));
        }
        let in_use = tables
            .contracts
            .values()
            .filter(|contract| &contract.referentiel_id == id)
            .count();
        if in_use > 0 {
            return Err(StoreError::Conflict(format!(
                "referential is used by {in_use} contract(s)"
            )));
        }
        tables.referentiels.remove(id);
        Ok(())
    }
}

impl ContractStore for MemoryStore {
    fn insert_contract(&self, contract: Contract) -> Result<Contract, StoreError> {
        let mut tables = self.lock()?;
        if let Some(external_id) = &contract.external_id {
            let duplicate = tables.contracts.values().any(|other| {
                other.tenant_id == contract.tenant_id
                    && other.external_id.as_ref() == Some(external_id)
            });
            if duplicate {
                return Err(StoreError::Conflict(format!(
                    "external id '{external_id}' already used in this tenant"
                )));
            }
        }
        tables.contracts.insert(contract.id.clone(), contract.clone());
        Ok(contract)
    }

    fn contract(
        &self,
        tenant: &TenantId,
        id: &ContractId,
    ) -> Result<Option<Contract>, StoreError> {
        let tables = self.lock()?;
        Ok(owned_copy(&tables.contracts, id, |contract| {
            &contract.tenant_id == tenant
        }))
    }

    fn contracts(&self, tenant: &TenantId) -> Result<Vec<Contract>, StoreError> {
        let tables = self.lock()?;
        let contracts = tables
            .contracts
            .values()
            .filter(|contract| &contract.tenant_id == tenant)
            .cloned()
            .collect();
        Ok(sorted_by(contracts, |contract: &Contract| {
            (contract.created_at, contract.id.clone())
        }))
    }

    fn update_contract<T, E, F>(&self, tenant: &TenantId, id: &ContractId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Contract) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        update_owned(
            &mut tables.contracts,
            id,
            |contract| &contract.tenant_id == tenant,
            "contract",
            f,
        )
    }

    fn delete_contract(&self, tenant: &TenantId, id: &ContractId) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.require_contract(tenant, id)?;

        let livret_ids: Vec<LivretId> = tables
            .livrets
            .values()
            .filter(|livret| &livret.contract_id == id)
            .map(|livret| livret.id.clone())
            .collect();

        tables.contracts.remove(id);
        tables.positionings.retain(|record| &record.contract_id != id);
        tables.assessments.retain(|record| &record.contract_id != id);
        tables.tsf.remove(id);
        tables.proofs.retain(|_, proof| &proof.contract_id != id);
        tables.livrets.retain(|_, livret| &livret.contract_id != id);
        tables
            .remediations
            .retain(|_, plan| &plan.contract_id != id);
        tables
            .magic_tokens
            .retain(|_, token| !livret_ids.contains(&token.livret_id));
        Ok(())
    }
}

impl TrackingStore for MemoryStore {
    fn insert_positioning(&self, positioning: Positioning) -> Result<Positioning, StoreError> {
        let mut tables = self.lock()?;
        tables.require_contract(&positioning.tenant_id, &positioning.contract_id)?;
        tables.positionings.push(positioning.clone());
        Ok(positioning)
    }

    fn positionings(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<Vec<Positioning>, StoreError> {
        let tables = self.lock()?;
        let positionings = tables
            .positionings
            .iter()
            .filter(|record| &record.tenant_id == tenant && &record.contract_id == contract)
            .cloned()
            .collect();
        Ok(sorted_by(positionings, |record: &Positioning| {
            record.assessed_at
        }))
    }

    fn insert_assessment(&self, assessment: Assessment) -> Result<Assessment, StoreError> {
        let mut tables = self.lock()?;
        tables.require_contract(&assessment.tenant_id, &assessment.contract_id)?;
        tables.assessments.push(assessment.clone());
        Ok(assessment)
    }

    fn assessments(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<Vec<Assessment>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .assessments
            .iter()
            .filter(|record| &record.tenant_id == tenant && &record.contract_id == contract)
            .cloned()
            .collect())
    }

    fn replace_tsf<E, F>(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
        f: F,
    ) -> Result<TsfMapping, E>
    where
        F: FnOnce(Option<&TsfMapping>) -> Result<TsfMapping, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        tables.require_contract(tenant, contract)?;
        let mapping = f(tables.tsf.get(contract))?;
        tables.tsf.insert(contract.clone(), mapping.clone());
        Ok(mapping)
    }

    fn tsf(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<Option<TsfMapping>, StoreError> {
        let tables = self.lock()?;
        Ok(owned_copy(&tables.tsf, contract, |mapping| {
            &mapping.tenant_id == tenant
        }))
    }

    fn update_tsf<T, E, F>(&self, tenant: &TenantId, contract: &ContractId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut TsfMapping) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        update_owned(
            &mut tables.tsf,
            contract,
            |mapping| &mapping.tenant_id == tenant,
            "TSF",
            f,
        )
    }

    fn insert_proof(&self, proof: Proof) -> Result<Proof, StoreError> {
        let mut tables = self.lock()?;
        tables.require_contract(&proof.tenant_id, &proof.contract_id)?;
        tables.proofs.insert(proof.id.clone(), proof.clone());
        Ok(proof)
    }

    fn proof(&self, tenant: &TenantId, id: &ProofId) -> Result<Option<Proof>, StoreError> {
        let tables = self.lock()?;
        Ok(owned_copy(&tables.proofs, id, |proof| {
            &proof.tenant_id == tenant
        }))
    }

    fn proofs(&self, tenant: &TenantId, contract: &ContractId) -> Result<Vec<Proof>, StoreError> {
        let tables = self.lock()?;
        let proofs = tables
            .proofs
            .values()
            .filter(|proof| &proof.tenant_id == tenant && &proof.contract_id == contract)
            .cloned()
            .collect();
        Ok(sorted_by(proofs, |proof: &Proof| proof.submitted_at))
    }

    fn update_proof<T, E, F>(&self, tenant: &TenantId, id: &ProofId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Proof) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        update_owned(
            &mut tables.proofs,
            id,
            |proof| &proof.tenant_id == tenant,
            "proof",
            f,
        )
    }

    fn insert_livret(&self, livret: Livret) -> Result<Livret, StoreError> {
        let mut tables = self.lock()?;
        tables.require_contract(&livret.tenant_id, &livret.contract_id)?;
        tables.livrets.insert(livret.id.clone(), livret.clone());
        Ok(livret)
    }

    fn livret(&self, tenant: &TenantId, id: &LivretId) -> Result<Option<Livret>, StoreError> {
        let tables = self.lock()?;
        Ok(owned_copy(&tables.livrets, id, |livret| {
            &livret.tenant_id == tenant
        }))
    }

    fn livrets(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<Vec<Livret>, StoreError> {
        let tables = self.lock()?;
        let livrets = tables
            .livrets
            .values()
            .filter(|livret| &livret.tenant_id == tenant && &livret.contract_id == contract)
            .cloned()
            .collect();
        Ok(sorted_by(livrets, |livret: &Livret| livret.period_start))
    }

    fn update_livret<T, E, F>(&self, tenant: &TenantId, id: &LivretId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Livret) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        update_owned(
            &mut tables.livrets,
            id,
            |livret| &livret.tenant_id == tenant,
            "livret",
            f,
        )
    }

    fn snapshot(&self, tenant: &TenantId) -> Result<TenantSnapshot, StoreError> {
        let tables = self.lock()?;
        Ok(TenantSnapshot {
            contracts: sorted_by(
                tables
                    .contracts
                    .values()
                    .filter(|contract| &contract.tenant_id == tenant)
                    .cloned()
                    .collect(),
                |contract: &Contract| (contract.created_at, contract.id.clone()),
            ),
            positionings: tables
                .positionings
                .iter()
                .filter(|record| &record.tenant_id == tenant)
                .cloned()
                .collect(),
            assessments: tables
                .assessments
                .iter()
                .filter(|record| &record.tenant_id == tenant)
                .cloned()
                .collect(),
            tsf: tables
                .tsf
                .values()
                .filter(|mapping| &mapping.tenant_id == tenant)
                .cloned()
                .collect(),
            proofs: sorted_by(
                tables
                    .proofs
                    .values()
                    .filter(|proof| &proof.tenant_id == tenant)
                    .cloned()
                    .collect(),
                |proof: &Proof| proof.submitted_at,
            ),
            livrets: sorted_by(
                tables
                    .livrets
                    .values()
                    .filter(|livret| &livret.tenant_id == tenant)
                    .cloned()
                    .collect(),
                |livret: &Livret| (livret.created_at, livret.id.clone()),
            ),
            tickets: sorted_by(
                tables
                    .tickets
                    .values()
                    .filter(|ticket| &ticket.tenant_id == tenant)
                    .cloned()
                    .collect(),
                |ticket: &SupportTicket| ticket.created_at,
            ),
        })
    }
}

impl QualityStore for MemoryStore {
    fn insert_remediation(&self, plan: RemediationPlan) -> Result<RemediationPlan, StoreError> {
        let mut tables = self.lock()?;
        let already_open = tables
            .remediations
            .values()
            .any(|other| other.contract_id == plan.contract_id && other.is_open());
        if already_open {
            return Err(StoreError::Conflict(
                "contract already has an open remediation plan".to_string(),
            ));
        }
        tables.remediations.insert(plan.id.clone(), plan.clone());
        Ok(plan)
    }

    fn remediation(
        &self,
        tenant: &TenantId,
        id: &RemediationPlanId,
    ) -> Result<Option<RemediationPlan>, StoreError> {
        let tables = self.lock()?;
        Ok(owned_copy(&tables.remediations, id, |plan| {
            &plan.tenant_id == tenant
        }))
    }

    fn remediations(
        &self,
        tenant: &TenantId,
        contract: &ContractId,
    ) -> Result<Vec<RemediationPlan>, StoreError> {
        let tables = self.lock()?;
        let plans = tables
            .remediations
            .values()
            .filter(|plan| &plan.tenant_id == tenant && &plan.contract_id == contract)
            .cloned()
            .collect();
        Ok(sorted_by(plans, |plan: &RemediationPlan| plan.created_at))
    }

    fn update_remediation<T, E, F>(
        &self,
        tenant: &TenantId,
        id: &RemediationPlanId,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut RemediationPlan) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        update_owned(
            &mut tables.remediations,
            id,
            |plan| &plan.tenant_id == tenant,
            "remediation plan",
            f,
        )
    }

    fn insert_ticket(&self, ticket: SupportTicket) -> Result<SupportTicket, StoreError> {
        self.lock()?.tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(ticket)
    }

    fn ticket(
        &self,
        tenant: &TenantId,
        id: &TicketId,
    ) -> Result<Option<SupportTicket>, StoreError> {
        let tables = self.lock()?;
        Ok(owned_copy(&tables.tickets, id, |ticket| {
            &ticket.tenant_id == tenant
        }))
    }

    fn tickets(&self, tenant: &TenantId) -> Result<Vec<SupportTicket>, StoreError> {
        let tables = self.lock()?;
        let tickets = tables
            .tickets
            .values()
            .filter(|ticket| &ticket.tenant_id == tenant)
            .cloned()
            .collect();
        Ok(sorted_by(tickets, |ticket: &SupportTicket| ticket.created_at))
    }

    fn update_ticket<T, E, F>(&self, tenant: &TenantId, id: &TicketId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SupportTicket) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut tables = self.lock()?;
        update_owned(
            &mut tables.tickets,
            id,
            |ticket| &ticket.tenant_id == tenant,
            "ticket",
            f,
        )
    }
}

impl AuditStore for MemoryStore {
    fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.lock()?.audit.push(entry);
        Ok(())
    }

    fn audit(&self, tenant: &TenantId, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .audit
            .iter()
            .rev()
            .filter(|entry| &entry.tenant_id == tenant)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::apprenticeship::domain::fixtures::{contract, date};
    use crate::ids::{AssessmentId, PositioningId};
    use crate::tenancy::Role;
    use crate::workflows::apprenticeship::{LivretDraft, MasteryLevel, ProofStatus, Signer};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn stored_contract(store: &MemoryStore) -> Contract {
        store
            .insert_contract(contract(date(2025, 9, 1), date(2027, 8, 31)))
            .expect("inserted")
    }

    #[test]
    fn foreign_tenant_lookups_return_none() {
        let store = MemoryStore::new();
        let contract = stored_contract(&store);
        assert!(store
            .contract(&contract.tenant_id, &contract.id)
            .unwrap()
            .is_some());
        assert!(store
            .contract(&TenantId::from("tnt_b"), &contract.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn duplicate_external_ids_conflict() {
        let store = MemoryStore::new();
        stored_contract(&store);
        let error = store
            .insert_contract(contract(date(2025, 9, 1), date(2027, 8, 31)))
            .unwrap_err();
        assert!(matches!(error, StoreError::Conflict(_)));
    }

    #[test]
    fn failed_updates_leave_the_record_untouched() {
        let store = MemoryStore::new();
        let contract = stored_contract(&store);
        let result: Result<(), StoreError> =
            store.update_contract(&contract.tenant_id, &contract.id, |record| {
                record.company_name = "Renamed".to_string();
                Err(StoreError::Conflict("abort".to_string()))
            });
        assert!(result.is_err());
        let stored = store
            .contract(&contract.tenant_id, &contract.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.company_name, contract.company_name);
    }

    #[test]
    fn deleting_a_contract_cascades() {
        let store = MemoryStore::new();
        let contract = stored_contract(&store);
        let mut livret = Livret::create(
            LivretDraft {
                period_label: "Semestre 1".to_string(),
                period_start: date(2025, 9, 1),
                period_end: date(2026, 2, 28),
            },
            &contract,
            Utc::now(),
        )
        .unwrap();
        livret.sign(Signer::Apprentice, Utc::now()).unwrap();
        let livret = store.insert_livret(livret).unwrap();

        store
            .delete_contract(&contract.tenant_id, &contract.id)
            .expect("deleted");
        assert!(store
            .livret(&contract.tenant_id, &livret.id)
            .unwrap()
            .is_none());
        assert_eq!(
            store.delete_contract(&contract.tenant_id, &contract.id),
            Err(StoreError::NotFound("contract"))
        );
    }

    #[test]
    fn children_of_a_missing_contract_are_refused() {
        let store = MemoryStore::new();
        let contract = stored_contract(&store);
        let livret = Livret::create(
            LivretDraft {
                period_label: "Semestre 1".to_string(),
                period_start: date(2025, 9, 1),
                period_end: date(2026, 2, 28),
            },
            &contract,
            Utc::now(),
        )
        .unwrap();
        store
            .delete_contract(&contract.tenant_id, &contract.id)
            .expect("deleted");

        let missing = Err(StoreError::NotFound("contract"));
        assert_eq!(store.insert_livret(livret.clone()).map(|_| ()), missing);
        assert_eq!(
            store
                .insert_positioning(Positioning {
                    id: PositioningId::generate(),
                    tenant_id: contract.tenant_id.clone(),
                    contract_id: contract.id.clone(),
                    levels: BTreeMap::new(),
                    assessed_by: contract.referent_id.clone(),
                    assessed_at: Utc::now(),
                })
                .map(|_| ()),
            missing
        );
        assert_eq!(
            store
                .insert_assessment(Assessment {
                    id: AssessmentId::generate(),
                    tenant_id: contract.tenant_id.clone(),
                    contract_id: contract.id.clone(),
                    competence_code: "C1.1".to_string(),
                    level: MasteryLevel::Acquis,
                    evaluator_id: contract.tutor_id.clone(),
                    evaluator_role: Role::Tuteur,
                    assessed_on: date(2026, 1, 15),
                    comment: None,
                })
                .map(|_| ()),
            missing
        );
        let proof = Proof {
            id: ProofId::generate(),
            tenant_id: contract.tenant_id.clone(),
            contract_id: contract.id.clone(),
            title: "Compte rendu".to_string(),
            description: String::new(),
            competence_codes: vec!["C1.1".to_string()],
            attachment: None,
            status: ProofStatus::Submitted,
            submitted_by: contract.apprentice_id.clone(),
            submitted_at: Utc::now(),
            review: None,
        };
        assert_eq!(store.insert_proof(proof.clone()).map(|_| ()), missing);

        assert!(store
            .livret(&contract.tenant_id, &livret.id)
            .unwrap()
            .is_none());
        assert!(store.proof(&contract.tenant_id, &proof.id).unwrap().is_none());
        assert!(store
            .positionings(&contract.tenant_id, &contract.id)
            .unwrap()
            .is_empty());
        assert!(store
            .assessments(&contract.tenant_id, &contract.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn children_cannot_attach_to_another_tenants_contract() {
        let store = MemoryStore::new();
        let contract = stored_contract(&store);
        let mut livret = Livret::create(
            LivretDraft {
                period_label: "Semestre 1".to_string(),
                period_start: date(2025, 9, 1),
                period_end: date(2026, 2, 28),
            },
            &contract,
            Utc::now(),
        )
        .unwrap();
        livret.tenant_id = TenantId::from("tnt_b");
        assert_eq!(
            store.insert_livret(livret).map(|_| ()),
            Err(StoreError::NotFound("contract"))
        );
    }

    #[test]
    fn audit_is_listed_newest_first() {
        let store = MemoryStore::new();
        let tenant = TenantId::from("tnt_a");
        for action in ["first", "second", "third"] {
            store
                .append_audit(AuditEntry::new(tenant.clone(), None, action, "x", Utc::now()))
                .unwrap();
        }
        store
            .append_audit(AuditEntry::new(
                TenantId::from("tnt_b"),
                None,
                "foreign",
                "x",
                Utc::now(),
            ))
            .unwrap();
        let entries = store.audit(&tenant, 2).unwrap();
        let actions: Vec<&str> = entries.iter().map(|entry| entry.action.as_str()).collect();
        assert_eq!(actions, vec!["third", "second"]);
    }
}
