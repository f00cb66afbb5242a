use std::sync::{Arc, Mutex};

use axum::body::to_bytes;
use axum::response::Response;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::platform::{alternance_router, AlternanceService, MemoryStore};
use crate::tenancy::{AccessScope, Role, Tenant, User, UserDraft};
use crate::workflows::apprenticeship::{Contract, ContractDraft, ContractStatus, LivretDraft};
use crate::workflows::archive::{ArchiveError, ArchiveUploader};
use crate::workflows::notifications::{
    NotificationError, NotificationSender, Reminder, WebhookError, WebhookEvent, WebhookKind,
    WebhookPublisher,
};
use crate::workflows::referentiel::{BlocCompetence, Competence, Referentiel, ReferentielDraft};

pub(super) type TestService = AlternanceService<MemoryStore, RecordingWebhooks, RecordingNotifier>;

#[derive(Default)]
pub(super) struct RecordingWebhooks {
    pub events: Mutex<Vec<WebhookEvent>>,
    pub fail: bool,
}

impl RecordingWebhooks {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn kinds(&self) -> Vec<WebhookKind> {
        self.events
            .lock()
            .expect("webhook mutex poisoned")
            .iter()
            .map(|event| event.kind)
            .collect()
    }

    pub fn count(&self, kind: WebhookKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

impl WebhookPublisher for RecordingWebhooks {
    fn publish(&self, event: WebhookEvent) -> Result<(), WebhookError> {
        if self.fail {
            return Err(WebhookError::Transport("endpoint offline".to_string()));
        }
        self.events
            .lock()
            .expect("webhook mutex poisoned")
            .push(event);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    pub sent: Mutex<Vec<Reminder>>,
}

impl RecordingNotifier {
    pub fn reminders(&self) -> Vec<Reminder> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSender for RecordingNotifier {
    fn send(&self, reminder: &Reminder) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(reminder.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingUploader {
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingUploader {
    pub fn keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .expect("uploader mutex poisoned")
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl ArchiveUploader for RecordingUploader {
    fn upload(&self, key: &str, payload: &[u8]) -> Result<String, ArchiveError> {
        self.uploads
            .lock()
            .expect("uploader mutex poisoned")
            .push((key.to_string(), payload.to_vec()));
        Ok(key.to_string())
    }
}

pub(super) struct FailingUploader;

impl ArchiveUploader for FailingUploader {
    fn upload(&self, _key: &str, _payload: &[u8]) -> Result<String, ArchiveError> {
        Err(ArchiveError::Upload("bucket unreachable".to_string()))
    }
}

/// One tenant with a user per role, a referential and an active contract.
pub(super) struct Fixture {
    pub service: Arc<TestService>,
    pub webhooks: Arc<RecordingWebhooks>,
    pub notifier: Arc<RecordingNotifier>,
    pub tenant: Tenant,
    pub admin: AccessScope,
    pub formateur: AccessScope,
    pub tuteur: AccessScope,
    pub apprenti: AccessScope,
    pub admin_token: String,
    pub tuteur_token: String,
    pub apprenti_token: String,
    pub referentiel: Referentiel,
    pub contract: Contract,
}

pub(super) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(super) fn referentiel_draft(rncp_code: &str) -> ReferentielDraft {
    let competence = |code: &str, title: &str| Competence {
        code: code.to_string(),
        title: title.to_string(),
        indicateurs: Vec::new(),
    };
    ReferentielDraft {
        rncp_code: rncp_code.to_string(),
        title: "Développeur web".to_string(),
        level: Some(5),
        blocs: vec![
            BlocCompetence {
                code: "BC01".to_string(),
                title: "Développer une application".to_string(),
                competences: vec![
                    competence("C1.1", "Maquetter une interface"),
                    competence("C1.2", "Développer une interface"),
                ],
            },
            BlocCompetence {
                code: "BC02".to_string(),
                title: "Déployer une application".to_string(),
                competences: vec![competence("C2.1", "Mettre en production")],
            },
        ],
    }
}

pub(super) fn fixture() -> Fixture {
    fixture_with(WorkflowConfig::default(), RecordingWebhooks::default())
}

pub(super) fn fixture_with(workflow: WorkflowConfig, webhooks: RecordingWebhooks) -> Fixture {
    let webhooks = Arc::new(webhooks);
    let notifier = Arc::new(RecordingNotifier::default());
    let service = Arc::new(AlternanceService::new(
        Arc::new(MemoryStore::new()),
        Arc::clone(&webhooks),
        Arc::clone(&notifier),
        workflow,
    ));

    let tenant = service
        .create_tenant("CFA du Numérique", "cfa-numerique", None)
        .expect("tenant created");
    let admin_user = register(&service, &tenant, "direction@cfa.fr", "Claire Admin", Role::Admin);
    let formateur_user = register(
        &service,
        &tenant,
        "formateur@cfa.fr",
        "Hugo Formateur",
        Role::Formateur,
    );
    let tuteur_user = register(
        &service,
        &tenant,
        "tuteur@entreprise.fr",
        "Paul Tuteur",
        Role::Tuteur,
    );
    let apprenti_user = register(
        &service,
        &tenant,
        "apprenti@mail.fr",
        "Lina Apprentie",
        Role::Apprenti,
    );

    let admin_token = token_for(&service, &admin_user);
    let tuteur_token = token_for(&service, &tuteur_user);
    let apprenti_token = token_for(&service, &apprenti_user);

    let admin = service
        .authenticate(&admin_token, Utc::now())
        .expect("admin key valid");
    let formateur = scope_of(&formateur_user);
    let tuteur = scope_of(&tuteur_user);
    let apprenti = scope_of(&apprenti_user);

    let referentiel = service
        .create_referentiel(&admin, referentiel_draft("RNCP37873"))
        .expect("referential created");

    let contract = service
        .create_contract(
            &formateur,
            contract_draft(&referentiel, &apprenti, &tuteur, &formateur, Some("OPCO-001")),
        )
        .expect("contract created");
    let contract = service
        .transition_contract(&formateur, &contract.id, ContractStatus::Active)
        .expect("contract activated");

    Fixture {
        service,
        webhooks,
        notifier,
        tenant,
        admin,
        formateur,
        tuteur,
        apprenti,
        admin_token,
        tuteur_token,
        apprenti_token,
        referentiel,
        contract,
    }
}

pub(super) fn register(
    service: &TestService,
    tenant: &Tenant,
    email: &str,
    name: &str,
    role: Role,
) -> User {
    service
        .register_user(
            &tenant.id,
            UserDraft {
                email: email.to_string(),
                display_name: name.to_string(),
                role,
            },
        )
        .expect("user registered")
}

pub(super) fn token_for(service: &TestService, user: &User) -> String {
    service
        .issue_api_key_for(&user.tenant_id, &user.id, "tests")
        .expect("key issued")
        .token
}

pub(super) fn scope_of(user: &User) -> AccessScope {
    AccessScope::new(user.tenant_id.clone(), user.id.clone(), user.role)
}

/// Contract started 200 days ago and running for 500 more.
pub(super) fn contract_draft(
    referentiel: &Referentiel,
    apprenti: &AccessScope,
    tuteur: &AccessScope,
    referent: &AccessScope,
    external_id: Option<&str>,
) -> ContractDraft {
    ContractDraft {
        external_id: external_id.map(str::to_string),
        apprentice_id: apprenti.user_id.clone(),
        tutor_id: tuteur.user_id.clone(),
        referent_id: referent.user_id.clone(),
        referentiel_id: referentiel.id.clone(),
        company_name: "Atelier Logiciel SAS".to_string(),
        start_date: today() - Duration::days(200),
        end_date: today() + Duration::days(500),
    }
}

pub(super) fn livret_draft(contract: &Contract) -> LivretDraft {
    LivretDraft {
        period_label: "Semestre 1".to_string(),
        period_start: contract.start_date,
        period_end: contract.start_date + Duration::days(180),
    }
}

pub(super) fn router_for(fixture: &Fixture) -> axum::Router {
    alternance_router(
        Arc::clone(&fixture.service),
        Arc::new(RecordingUploader::default()),
    )
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
