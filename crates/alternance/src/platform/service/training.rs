use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;

use super::{require, AlternanceService, ServiceError};
use crate::ids::{ContractId, PositioningId, ProofId, ReferentielId, UserId};
use crate::platform::repository::{Store, StoreError};
use crate::tenancy::{AccessScope, Permission, Role};
use crate::workflows::apprenticeship::{
    check_levels, journal, progression, Assessment, AssessmentDraft, Contract, ContractDraft,
    ContractError, ContractFilter, ContractStatus, MasteryLevel, Positioning, Progression, Proof,
    ProofJournal, ProofSubmission, ReviewDecision, TsfError, TsfMapping,
};
use crate::workflows::notifications::{
    NotificationSender, WebhookEvent, WebhookKind, WebhookPublisher,
};
use crate::workflows::referentiel::{
    Referentiel, ReferentielDraft, ReferentielHeader, ReferentielImporter,
};

impl<S, W, N> AlternanceService<S, W, N>
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    pub fn create_referentiel(
        &self,
        scope: &AccessScope,
        draft: ReferentielDraft,
    ) -> Result<Referentiel, ServiceError> {
        require(scope, Permission::ManageReferentiels)?;
        let draft = draft.validate()?;
        self.store_referentiel(scope, draft)
    }

    /// Build a referential from the RNCP CSV export and store it.
    pub fn import_referentiel(
        &self,
        scope: &AccessScope,
        header: ReferentielHeader,
        csv: &str,
    ) -> Result<Referentiel, ServiceError> {
        require(scope, Permission::ManageReferentiels)?;
        let draft = ReferentielImporter::from_reader(csv.as_bytes(), header)?;
        self.store_referentiel(scope, draft)
    }

    fn store_referentiel(
        &self,
        scope: &AccessScope,
        draft: ReferentielDraft,
    ) -> Result<Referentiel, ServiceError> {
        let referentiel = Referentiel::from_draft(draft, scope.tenant_id.clone(), Utc::now());
        let referentiel = self.store.insert_referentiel(referentiel)?;
        info!(
            tenant_id = %scope.tenant_id,
            referentiel_id = %referentiel.id,
            rncp = %referentiel.rncp_code,
            competences = referentiel.competence_count(),
            "referential stored"
        );
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "referentiel.create",
            referentiel.id.to_string(),
        );
        Ok(referentiel)
    }

    pub fn get_referentiel(
        &self,
        scope: &AccessScope,
        id: &ReferentielId,
    ) -> Result<Referentiel, ServiceError> {
        require(scope, Permission::ReadReferentiels)?;
        Ok(self
            .store
            .referentiel(&scope.tenant_id, id)?
            .ok_or(StoreError::NotFound("referential"))?)
    }

    pub fn list_referentiels(&self, scope: &AccessScope) -> Result<Vec<Referentiel>, ServiceError> {
        require(scope, Permission::ReadReferentiels)?;
        Ok(self.store.referentiels(&scope.tenant_id)?)
    }

    pub fn delete_referentiel(
        &self,
        scope: &AccessScope,
        id: &ReferentielId,
    ) -> Result<(), ServiceError> {
        require(scope, Permission::ManageReferentiels)?;
        self.store.delete_referentiel(&scope.tenant_id, id)?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "referentiel.delete",
            id.to_string(),
        );
        Ok(())
    }

    pub fn create_contract(
        &self,
        scope: &AccessScope,
        draft: ContractDraft,
    ) -> Result<Contract, ServiceError> {
        require(scope, Permission::ManageContracts)?;
        let draft = draft.validate()?;

        self.store
            .referentiel(&scope.tenant_id, &draft.referentiel_id)?
            .ok_or(StoreError::NotFound("referential"))?;
        self.ensure_role(scope, &draft.apprentice_id, "apprentice", |role| {
            role == Role::Apprenti
        })?;
        self.ensure_role(scope, &draft.tutor_id, "tutor", |role| role == Role::Tuteur)?;
        self.ensure_role(scope, &draft.referent_id, "referent", Role::is_cfa_staff)?;

        let external_id = draft.external_id.clone();
        let contract = Contract::from_draft(draft, scope.tenant_id.clone(), Utc::now());
        let contract = self
            .store
            .insert_contract(contract)
            .map_err(|error| match (error, external_id) {
                (StoreError::Conflict(_), Some(external_id)) => {
                    ServiceError::from(ContractError::DuplicateExternalId(external_id))
                }
                (error, _) => ServiceError::from(error),
            })?;

        info!(tenant_id = %scope.tenant_id, contract_id = %contract.id, "contract created");
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "contract.create",
            contract.id.to_string(),
        );
        Ok(contract)
    }

    fn ensure_role(
        &self,
        scope: &AccessScope,
        user_id: &UserId,
        expected: &'static str,
        accepts: impl Fn(Role) -> bool,
    ) -> Result<(), ServiceError> {
        match self.store.user(&scope.tenant_id, user_id)? {
            Some(user) if accepts(user.role) => Ok(()),
            _ => Err(ContractError::RoleMismatch {
                user: user_id.clone(),
                expected,
            }
            .into()),
        }
    }

    pub fn get_contract(
        &self,
        scope: &AccessScope,
        id: &ContractId,
    ) -> Result<Contract, ServiceError> {
        require(scope, Permission::ReadContracts)?;
        self.visible_contract(scope, id)
    }

    /// Contracts matching `filter`; apprentices and tutors only see their own.
    pub fn list_contracts(
        &self,
        scope: &AccessScope,
        filter: &ContractFilter,
    ) -> Result<Vec<Contract>, ServiceError> {
        require(scope, Permission::ReadContracts)?;
        Ok(self
            .store
            .contracts(&scope.tenant_id)?
            .into_iter()
            .filter(|contract| filter.matches(contract) && super::is_party(scope, contract))
            .collect())
    }

    pub fn transition_contract(
        &self,
        scope: &AccessScope,
        id: &ContractId,
        next: ContractStatus,
    ) -> Result<Contract, ServiceError> {
        require(scope, Permission::ManageContracts)?;
        let contract = self.store.update_contract(&scope.tenant_id, id, |contract| {
            contract.transition(next)?;
            Ok::<_, ServiceError>(contract.clone())
        })?;
        info!(contract_id = %id, status = next.label(), "contract status changed");
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "contract.transition",
            format!("{id}:{}", next.label()),
        );
        Ok(contract)
    }

    pub fn delete_contract(&self, scope: &AccessScope, id: &ContractId) -> Result<(), ServiceError> {
        require(scope, Permission::ManageContracts)?;
        self.store.delete_contract(&scope.tenant_id, id)?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "contract.delete",
            id.to_string(),
        );
        Ok(())
    }

    /// Entry positioning; a later positioning supersedes earlier ones.
    pub fn record_positioning(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
        levels: BTreeMap<String, MasteryLevel>,
    ) -> Result<Positioning, ServiceError> {
        require(scope, Permission::RecordPositioning)?;
        let contract = self.visible_contract(scope, contract_id)?;
        contract.ensure_open()?;
        let referentiel = self.referentiel_of(&contract)?;
        check_levels(&referentiel, &levels)?;

        let positioning = self.store.insert_positioning(Positioning {
            id: PositioningId::generate(),
            tenant_id: contract.tenant_id.clone(),
            contract_id: contract.id.clone(),
            levels,
            assessed_by: scope.user_id.clone(),
            assessed_at: Utc::now(),
        })?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "positioning.record",
            positioning.id.to_string(),
        );
        Ok(positioning)
    }

    pub fn latest_positioning(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
    ) -> Result<Option<Positioning>, ServiceError> {
        require(scope, Permission::ReadContracts)?;
        let contract = self.visible_contract(scope, contract_id)?;
        Ok(self
            .store
            .positionings(&contract.tenant_id, &contract.id)?
            .pop())
    }

    pub fn record_assessment(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
        draft: AssessmentDraft,
    ) -> Result<Assessment, ServiceError> {
        require(scope, Permission::RecordAssessment)?;
        let contract = self.visible_contract(scope, contract_id)?;
        contract.ensure_open()?;
        let referentiel = self.referentiel_of(&contract)?;
        let assessment = Assessment::record(
            draft,
            &referentiel,
            contract.tenant_id.clone(),
            contract.id.clone(),
            scope.user_id.clone(),
            scope.role,
            Utc::now().date_naive(),
        )?;
        let assessment = self.store.insert_assessment(assessment)?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "assessment.record",
            assessment.id.to_string(),
        );
        Ok(assessment)
    }

    pub fn progression(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
    ) -> Result<Progression, ServiceError> {
        require(scope, Permission::ReadContracts)?;
        let contract = self.visible_contract(scope, contract_id)?;
        self.progression_of(&contract)
    }

    pub(super) fn progression_of(&self, contract: &Contract) -> Result<Progression, ServiceError> {
        let referentiel = self.referentiel_of(contract)?;
        let positioning = self
            .store
            .positionings(&contract.tenant_id, &contract.id)?
            .pop();
        let assessments = self.store.assessments(&contract.tenant_id, &contract.id)?;
        Ok(progression(&referentiel, positioning.as_ref(), &assessments))
    }

    /// Generate (or regenerate while still a draft) the contract's TSF.
    pub fn generate_tsf(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
    ) -> Result<TsfMapping, ServiceError> {
        require(scope, Permission::ManageTsf)?;
        let contract = self.visible_contract(scope, contract_id)?;
        contract.ensure_open()?;
        let referentiel = self.referentiel_of(&contract)?;
        let positioning = self
            .store
            .positionings(&contract.tenant_id, &contract.id)?
            .pop();

        let mapping = self
            .store
            .replace_tsf(&contract.tenant_id, &contract.id, |current| {
                if let Some(current) = current.filter(|mapping| mapping.is_validated()) {
                    let at = current.validated_at.unwrap_or(current.generated_at);
                    return Err(ServiceError::from(TsfError::AlreadyValidated(at)));
                }
                Ok(self
                    .tsf
                    .generate(&contract, &referentiel, positioning.as_ref(), Utc::now())?)
            })?;

        info!(
            contract_id = %contract.id,
            periods = mapping.periods.len(),
            scheduled = mapping.scheduled_competences(),
            acquired = mapping.already_acquired.len(),
            "TSF generated"
        );
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "tsf.generate",
            contract.id.to_string(),
        );
        Ok(mapping)
    }

    pub fn get_tsf(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
    ) -> Result<TsfMapping, ServiceError> {
        require(scope, Permission::ReadContracts)?;
        let contract = self.visible_contract(scope, contract_id)?;
        Ok(self
            .store
            .tsf(&contract.tenant_id, &contract.id)?
            .ok_or(TsfError::Missing)?)
    }

    pub fn validate_tsf(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
    ) -> Result<TsfMapping, ServiceError> {
        require(scope, Permission::ManageTsf)?;
        let contract = self.visible_contract(scope, contract_id)?;
        contract.ensure_open()?;
        if self.store.tsf(&contract.tenant_id, &contract.id)?.is_none() {
            return Err(TsfError::Missing.into());
        }

        let now = Utc::now();
        let mapping = self
            .store
            .update_tsf(&contract.tenant_id, &contract.id, |mapping| {
                mapping.validate(scope.user_id.clone(), now)?;
                Ok::<_, ServiceError>(mapping.clone())
            })?;

        info!(contract_id = %contract.id, validated_by = %scope.user_id, "TSF validated");
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "tsf.validate",
            contract.id.to_string(),
        );
        self.publish(
            WebhookEvent::new(
                WebhookKind::TsfValidated,
                contract.tenant_id.clone(),
                mapping.id.to_string(),
                now,
            )
            .with_detail("contract_id", contract.id.to_string())
            .with_detail("validated_by", scope.user_id.to_string()),
        );
        Ok(mapping)
    }

    pub fn submit_proof(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
        submission: ProofSubmission,
    ) -> Result<Proof, ServiceError> {
        require(scope, Permission::SubmitProof)?;
        let contract = self.visible_contract(scope, contract_id)?;
        contract.ensure_open()?;
        let referentiel = self.referentiel_of(&contract)?;
        let proof = Proof::submit(
            submission,
            &referentiel,
            contract.tenant_id.clone(),
            contract.id.clone(),
            scope.user_id.clone(),
            Utc::now(),
        )?;
        let proof = self.store.insert_proof(proof)?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "proof.submit",
            proof.id.to_string(),
        );
        Ok(proof)
    }

    pub fn review_proof(
        &self,
        scope: &AccessScope,
        proof_id: &ProofId,
        decision: ReviewDecision,
        comment: Option<String>,
    ) -> Result<Proof, ServiceError> {
        require(scope, Permission::ReviewProof)?;
        let current = self
            .store
            .proof(&scope.tenant_id, proof_id)?
            .ok_or(StoreError::NotFound("proof"))?;
        let contract = self.visible_contract(scope, &current.contract_id)?;
        contract.ensure_open()?;

        let now = Utc::now();
        let proof = self
            .store
            .update_proof(&scope.tenant_id, proof_id, |proof| {
                proof.review(decision, scope.user_id.clone(), comment, now)?;
                Ok::<_, ServiceError>(proof.clone())
            })?;

        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "proof.review",
            proof.id.to_string(),
        );
        self.publish(
            WebhookEvent::new(
                WebhookKind::ProofReviewed,
                proof.tenant_id.clone(),
                proof.id.to_string(),
                now,
            )
            .with_detail("contract_id", proof.contract_id.to_string())
            .with_detail("status", proof.status.label()),
        );
        Ok(proof)
    }

    pub fn proof_journal(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
    ) -> Result<ProofJournal, ServiceError> {
        require(scope, Permission::ReadContracts)?;
        let contract = self.visible_contract(scope, contract_id)?;
        let proofs = self.store.proofs(&contract.tenant_id, &contract.id)?;
        Ok(journal(contract.id, proofs))
    }
}
