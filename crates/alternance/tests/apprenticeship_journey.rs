use std::sync::{Arc, Mutex};

use alternance::config::WorkflowConfig;
use alternance::platform::{alternance_router, AlternanceService, MemoryStore};
use alternance::tenancy::{Role, UserDraft};
use alternance::workflows::archive::{ArchiveError, ArchiveUploader};
use alternance::workflows::notifications::{
    NotificationError, NotificationSender, Reminder, WebhookError, WebhookEvent, WebhookKind,
    WebhookPublisher,
};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

#[derive(Default)]
struct Outbox {
    events: Mutex<Vec<WebhookKind>>,
}

impl WebhookPublisher for Outbox {
    fn publish(&self, event: WebhookEvent) -> Result<(), WebhookError> {
        self.events
            .lock()
            .map_err(|_| WebhookError::Transport("outbox poisoned".to_string()))?
            .push(event.kind);
        Ok(())
    }
}

struct Mute;

impl NotificationSender for Mute {
    fn send(&self, _reminder: &Reminder) -> Result<(), NotificationError> {
        Ok(())
    }
}

struct NoUploads;

impl ArchiveUploader for NoUploads {
    fn upload(&self, key: &str, _payload: &[u8]) -> Result<String, ArchiveError> {
        Ok(key.to_string())
    }
}

async fn call(router: &Router, method: Method, uri: &str, key: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", key)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router responds");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

async fn issue_key(router: &Router, admin_key: &str, user_id: &Value) -> String {
    let (status, body) = call(
        router,
        Method::POST,
        "/api/v1/api-keys",
        admin_key,
        json!({ "user_id": user_id, "label": "journey" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().expect("token").to_string()
}

async fn add_user(router: &Router, admin_key: &str, email: &str, role: &str) -> Value {
    let (status, body) = call(
        router,
        Method::POST,
        "/api/v1/users",
        admin_key,
        json!({ "email": email, "display_name": email, "role": role }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].clone()
}

#[tokio::test]
async fn contract_runs_from_positioning_to_signed_livret() {
    let outbox = Arc::new(Outbox::default());
    let service = Arc::new(AlternanceService::new(
        Arc::new(MemoryStore::new()),
        Arc::clone(&outbox),
        Arc::new(Mute),
        WorkflowConfig::default(),
    ));
    let tenant = service
        .create_tenant("CFA Ouest", "cfa-ouest", None)
        .expect("tenant created");
    let admin = service
        .register_user(
            &tenant.id,
            UserDraft {
                email: "admin@cfa-ouest.fr".to_string(),
                display_name: "Admin".to_string(),
                role: Role::Admin,
            },
        )
        .expect("admin registered");
    let admin_key = service
        .issue_api_key_for(&tenant.id, &admin.id, "bootstrap")
        .expect("key issued")
        .token;
    let router = alternance_router(Arc::clone(&service), Arc::new(NoUploads));

    let formateur = add_user(&router, &admin_key, "formateur@cfa-ouest.fr", "formateur").await;
    let tuteur = add_user(&router, &admin_key, "tuteur@garage.fr", "tuteur").await;
    let apprenti = add_user(&router, &admin_key, "apprenti@mail.fr", "apprenti").await;
    let formateur_key = issue_key(&router, &admin_key, &formateur).await;
    let tuteur_key = issue_key(&router, &admin_key, &tuteur).await;
    let apprenti_key = issue_key(&router, &admin_key, &apprenti).await;

    let (status, referentiel) = call(
        &router,
        Method::POST,
        "/api/v1/referentiels",
        &admin_key,
        json!({
            "rncp_code": "RNCP36012",
            "title": "Mécanicien automobile",
            "level": 4,
            "blocs": [
                {
                    "code": "BC01",
                    "title": "Diagnostiquer",
                    "competences": [
                        { "code": "C1", "title": "Lire une fiche technique", "indicateurs": [] },
                        { "code": "C2", "title": "Utiliser la valise", "indicateurs": [] }
                    ]
                },
                {
                    "code": "BC02",
                    "title": "Réparer",
                    "competences": [
                        { "code": "C3", "title": "Remplacer un organe", "indicateurs": [] }
                    ]
                }
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{referentiel}");

    let today = Utc::now().date_naive();
    let (status, contract) = call(
        &router,
        Method::POST,
        "/api/v1/contracts",
        &formateur_key,
        json!({
            "external_id": "OPCO-42",
            "apprentice_id": apprenti,
            "tutor_id": tuteur,
            "referent_id": formateur,
            "referentiel_id": referentiel["id"],
            "company_name": "Garage du Port",
            "start_date": today - Duration::days(30),
            "end_date": today + Duration::days(700),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{contract}");
    let contract_id = contract["id"].as_str().expect("contract id").to_string();
    let contract_uri = format!("/api/v1/contracts/{contract_id}");

    let (status, body) = call(
        &router,
        Method::POST,
        &format!("{contract_uri}/status"),
        &formateur_key,
        json!({ "status": "active" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = call(
        &router,
        Method::POST,
        &format!("{contract_uri}/positioning"),
        &formateur_key,
        json!({ "levels": { "C1": "acquis", "C2": "en_cours", "C3": "non_acquis" } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, tsf) = call(
        &router,
        Method::POST,
        &format!("{contract_uri}/tsf"),
        &formateur_key,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{tsf}");
    assert_eq!(tsf["already_acquired"], json!(["C1"]));
    let (status, tsf) = call(
        &router,
        Method::POST,
        &format!("{contract_uri}/tsf/validate"),
        &formateur_key,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{tsf}");
    assert_eq!(tsf["status"], "validated");

    let (status, proof) = call(
        &router,
        Method::POST,
        &format!("{contract_uri}/proofs"),
        &apprenti_key,
        json!({
            "title": "Diagnostic d'un véhicule hybride",
            "competence_codes": ["C2"],
            "attachment": { "file_name": "rapport.pdf", "size_bytes": 120000 }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{proof}");
    assert_eq!(proof["attachment"]["content_type"], "application/pdf");

    let (status, reviewed) = call(
        &router,
        Method::POST,
        &format!("/api/v1/proofs/{}/review", proof["id"].as_str().expect("proof id")),
        &tuteur_key,
        json!({ "decision": "validate" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{reviewed}");
    assert_eq!(reviewed["status"], "validated");

    let (status, livret) = call(
        &router,
        Method::POST,
        &format!("{contract_uri}/livrets"),
        &formateur_key,
        json!({
            "period_label": "Période 1",
            "period_start": today - Duration::days(30),
            "period_end": today + Duration::days(150),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{livret}");
    let livret_uri = format!("/api/v1/livrets/{}", livret["id"].as_str().expect("livret id"));

    for key in [&apprenti_key, &formateur_key] {
        let (status, body) =
            call(&router, Method::POST, &format!("{livret_uri}/sign"), key, json!({})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (status, link) = call(
        &router,
        Method::POST,
        &format!("{livret_uri}/signing-links"),
        &formateur_key,
        json!({ "signer": "tutor" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{link}");
    let sign_request = Request::builder()
        .method(Method::POST)
        .uri(format!(
            "/api/v1/sign/{}",
            link["token"].as_str().expect("link token")
        ))
        .body(Body::empty())
        .expect("request builds");
    let response = router
        .clone()
        .oneshot(sign_request)
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);

    let (status, health) = call(
        &router,
        Method::GET,
        &format!("{contract_uri}/health"),
        &formateur_key,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(health["score"].as_u64().is_some());

    let (status, report) = call(
        &router,
        Method::GET,
        "/api/v1/reports/qualiopi",
        &admin_key,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let indicators = report["indicators"].as_array().expect("indicators");
    let tsf_indicator = indicators
        .iter()
        .find(|indicator| indicator["number"] == 10)
        .expect("indicator 10");
    assert_eq!(tsf_indicator["numerator"], 1);

    let events = outbox.events.lock().expect("outbox readable").clone();
    assert_eq!(
        events,
        vec![
            WebhookKind::TsfValidated,
            WebhookKind::ProofReviewed,
            WebhookKind::LivretSigned
        ]
    );
}
