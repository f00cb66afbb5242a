use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::{require, AlternanceService, ServiceError};
use crate::ids::{ContractId, LivretId, UserId};
use crate::platform::repository::{Store, StoreError};
use crate::tenancy::credentials::{hash_token, issue_magic_token};
use crate::tenancy::{AccessScope, CredentialError, Permission, Role};
use crate::workflows::apprenticeship::{
    Contract, Livret, LivretDraft, SignatureError, SignatureOutcome, Signer,
};
use crate::workflows::notifications::{
    NotificationSender, WebhookEvent, WebhookKind, WebhookPublisher,
};

/// Signing link handed to one signer; `token` is only ever returned here.
#[derive(Debug, Clone, Serialize)]
pub struct SigningLink {
    pub livret_id: LivretId,
    pub signer: Signer,
    pub issued_to: UserId,
    pub expires_at: DateTime<Utc>,
    pub token: String,
}

fn signer_for(role: Role) -> Signer {
    match role {
        Role::Apprenti => Signer::Apprentice,
        Role::Tuteur => Signer::Tutor,
        Role::Admin | Role::Formateur => Signer::Cfa,
    }
}

fn sign_permission(signer: Signer) -> Permission {
    match signer {
        Signer::Apprentice => Permission::SignAsApprentice,
        Signer::Tutor => Permission::SignAsTutor,
        Signer::Cfa => Permission::SignAsCfa,
    }
}

impl<S, W, N> AlternanceService<S, W, N>
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    pub fn create_livret(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
        draft: LivretDraft,
    ) -> Result<Livret, ServiceError> {
        require(scope, Permission::ManageLivret)?;
        let contract = self.visible_contract(scope, contract_id)?;
        contract.ensure_open()?;
        let livret = Livret::create(draft, &contract, Utc::now())?;
        let livret = self.store.insert_livret(livret)?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "livret.create",
            livret.id.to_string(),
        );
        Ok(livret)
    }

    pub fn list_livrets(
        &self,
        scope: &AccessScope,
        contract_id: &ContractId,
    ) -> Result<Vec<Livret>, ServiceError> {
        require(scope, Permission::ReadContracts)?;
        let contract = self.visible_contract(scope, contract_id)?;
        Ok(self.store.livrets(&contract.tenant_id, &contract.id)?)
    }

    /// Load a livret together with its contract, hiding livrets of contracts the caller
    /// is not a party to.
    fn livret_for(
        &self,
        scope: &AccessScope,
        livret_id: &LivretId,
    ) -> Result<(Contract, Livret), ServiceError> {
        let livret = self
            .store
            .livret(&scope.tenant_id, livret_id)?
            .ok_or(StoreError::NotFound("livret"))?;
        let contract = self.visible_contract(scope, &livret.contract_id)?;
        Ok((contract, livret))
    }

    /// Write the caller's own section; the section follows from the caller's role.
    pub fn update_livret_notes(
        &self,
        scope: &AccessScope,
        livret_id: &LivretId,
        text: String,
    ) -> Result<Livret, ServiceError> {
        let author = signer_for(scope.role);
        require(scope, sign_permission(author))?;
        let (contract, _) = self.livret_for(scope, livret_id)?;
        contract.ensure_open()?;
        if !author.accepts(&contract, &scope.user_id, scope.role) {
            return Err(SignatureError::NotASigner(author.label()).into());
        }

        let livret = self
            .store
            .update_livret(&scope.tenant_id, livret_id, |livret| {
                livret.update_notes(author, text)?;
                Ok::<_, ServiceError>(livret.clone())
            })?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "livret.notes",
            format!("{livret_id}:{}", author.label()),
        );
        Ok(livret)
    }

    /// Sign in the capacity matching the caller's role.
    pub fn sign_livret(
        &self,
        scope: &AccessScope,
        livret_id: &LivretId,
    ) -> Result<Livret, ServiceError> {
        let signer = signer_for(scope.role);
        require(scope, sign_permission(signer))?;
        let (contract, _) = self.livret_for(scope, livret_id)?;
        contract.ensure_open()?;
        if !signer.accepts(&contract, &scope.user_id, scope.role) {
            return Err(SignatureError::NotASigner(signer.label()).into());
        }
        self.apply_signature(&contract, livret_id, signer, &scope.user_id, Utc::now())
    }

    pub fn issue_signing_link(
        &self,
        scope: &AccessScope,
        livret_id: &LivretId,
        signer: Signer,
    ) -> Result<SigningLink, ServiceError> {
        require(scope, Permission::ManageLivret)?;
        let (contract, livret) = self.livret_for(scope, livret_id)?;
        contract.ensure_open()?;
        if livret.signatures.get(signer).is_some() {
            return Err(SignatureError::AlreadySigned(signer.label()).into());
        }

        let issued_to = signer.expected_user(&contract).clone();
        let issued = issue_magic_token(
            contract.tenant_id.clone(),
            livret.id.clone(),
            signer,
            issued_to.clone(),
            Utc::now(),
            self.workflow.magic_link_ttl_hours,
        )?;
        let expires_at = issued.token.expires_at;
        self.store.insert_magic_token(issued.token)?;
        self.audit(
            &scope.tenant_id,
            Some(&scope.user_id),
            "livret.signing_link",
            format!("{livret_id}:{}", signer.label()),
        );

        Ok(SigningLink {
            livret_id: livret.id,
            signer,
            issued_to,
            expires_at,
            token: issued.plaintext,
        })
    }

    /// Redeem a signing link. The token is consumed before the signature is applied, so a
    /// link is spent even when the signature itself is refused.
    pub fn sign_with_token(&self, token: &str, now: DateTime<Utc>) -> Result<Livret, ServiceError> {
        let token_hash = hash_token(token);
        let grant = self
            .store
            .update_magic_token(&token_hash, |stored| {
                stored.check_usable(now)?;
                stored.consumed_at = Some(now);
                Ok::<_, ServiceError>(stored.clone())
            })
            .map_err(|error| match error {
                ServiceError::Store(StoreError::NotFound(_)) => CredentialError::Unknown.into(),
                other => other,
            })?;

        let tenant = self
            .store
            .tenant(&grant.tenant_id)?
            .ok_or(CredentialError::Unknown)?;
        if !tenant.active {
            return Err(CredentialError::InactiveTenant.into());
        }
        let livret = self
            .store
            .livret(&grant.tenant_id, &grant.livret_id)?
            .ok_or(StoreError::NotFound("livret"))?;
        let contract = self
            .store
            .contract(&grant.tenant_id, &livret.contract_id)?
            .ok_or(StoreError::NotFound("contract"))?;
        contract.ensure_open()?;

        self.apply_signature(
            &contract,
            &grant.livret_id,
            grant.grant.signer,
            &grant.issued_to,
            now,
        )
    }

    /// Check-and-set of one signature in a single store update; only the call that
    /// completes the livret fires `livret.signed`.
    fn apply_signature(
        &self,
        contract: &Contract,
        livret_id: &LivretId,
        signer: Signer,
        actor: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Livret, ServiceError> {
        let (livret, outcome) =
            self.store
                .update_livret(&contract.tenant_id, livret_id, |livret| {
                    let outcome = livret.sign(signer, at)?;
                    Ok::<_, ServiceError>((livret.clone(), outcome))
                })?;

        self.audit(
            &contract.tenant_id,
            Some(actor),
            "livret.sign",
            format!("{livret_id}:{}", signer.label()),
        );

        match outcome {
            SignatureOutcome::Completed => {
                info!(livret_id = %livret.id, contract_id = %contract.id, "livret fully signed");
                self.publish(
                    WebhookEvent::new(
                        WebhookKind::LivretSigned,
                        contract.tenant_id.clone(),
                        livret.id.to_string(),
                        at,
                    )
                    .with_detail("contract_id", contract.id.to_string())
                    .with_detail("period", livret.period_label.clone()),
                );
            }
            SignatureOutcome::Recorded { remaining } => {
                info!(livret_id = %livret.id, signer = signer.label(), remaining, "signature recorded");
            }
        }
        Ok(livret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_sign_in_their_own_capacity() {
        assert_eq!(signer_for(Role::Apprenti), Signer::Apprentice);
        assert_eq!(signer_for(Role::Tuteur), Signer::Tutor);
        assert_eq!(signer_for(Role::Formateur), Signer::Cfa);
        assert_eq!(signer_for(Role::Admin), Signer::Cfa);
        assert_eq!(sign_permission(Signer::Tutor), Permission::SignAsTutor);
    }
}
