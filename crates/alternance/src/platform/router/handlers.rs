use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;

use super::payloads::*;
use super::{RouterState, CRON_SECRET_HEADER};
use crate::ids::{
    ApiKeyId, ContractId, LivretId, ProofId, ReferentielId, RemediationActionId,
    RemediationPlanId, TicketId,
};
use crate::platform::repository::{Store, StoreError};
use crate::platform::service::{RemediationRequest, ServiceError};
use crate::tenancy::{AccessScope, UserDraft};
use crate::workflows::apprenticeship::{
    AssessmentDraft, ContractDraft, ContractFilter, LivretDraft, ProofSubmission,
};
use crate::workflows::notifications::{NotificationSender, WebhookPublisher};
use crate::workflows::quality::TicketDraft;
use crate::workflows::referentiel::ReferentielDraft;

type HandlerResult = Result<Response, ServiceError>;

fn ok<T: Serialize>(value: T) -> HandlerResult {
    Ok((StatusCode::OK, Json(value)).into_response())
}

fn created<T: Serialize>(value: T) -> HandlerResult {
    Ok((StatusCode::CREATED, Json(value)).into_response())
}

fn today(as_of: &AsOf) -> NaiveDate {
    as_of.on.unwrap_or_else(|| Utc::now().date_naive())
}

pub(super) async fn add_user_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Json(draft): Json<UserDraft>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(state.service.add_user(&scope, draft)?)
}

pub(super) async fn list_users_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.list_users(&scope)?)
}

pub(super) async fn issue_key_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Json(request): Json<ApiKeyRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    let user_id = request.user_id.unwrap_or_else(|| scope.user_id.clone());
    let issued = state
        .service
        .issue_api_key(&scope, &user_id, &request.label)?;
    created(IssuedKeyView {
        id: issued.key.id.to_string(),
        user_id: issued.key.user_id.to_string(),
        label: issued.key.label,
        prefix: issued.key.prefix,
        token: issued.token,
    })
}

pub(super) async fn revoke_key_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(key_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    let key = state
        .service
        .revoke_api_key(&scope, &ApiKeyId(key_id))?;
    ok(key_view(&key))
}

pub(super) async fn create_referentiel_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Json(draft): Json<ReferentielDraft>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(state.service.create_referentiel(&scope, draft)?)
}

pub(super) async fn import_referentiel_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Json(request): Json<ReferentielImportRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    let (header, csv) = request.into_parts();
    created(state.service.import_referentiel(&scope, header, &csv)?)
}

pub(super) async fn list_referentiels_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.list_referentiels(&scope)?)
}

pub(super) async fn get_referentiel_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(referentiel_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state
        .service
        .get_referentiel(&scope, &ReferentielId(referentiel_id))?)
}

pub(super) async fn delete_referentiel_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(referentiel_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    state
        .service
        .delete_referentiel(&scope, &ReferentielId(referentiel_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(super) async fn create_contract_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Json(draft): Json<ContractDraft>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(state.service.create_contract(&scope, draft)?)
}

pub(super) async fn list_contracts_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Query(filter): Query<ContractFilter>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.list_contracts(&scope, &filter)?)
}

pub(super) async fn get_contract_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.get_contract(&scope, &ContractId(contract_id))?)
}

pub(super) async fn delete_contract_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    state
        .service
        .delete_contract(&scope, &ContractId(contract_id))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(super) async fn transition_contract_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
    Json(request): Json<ContractStatusRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state
        .service
        .transition_contract(&scope, &ContractId(contract_id), request.status)?)
}

pub(super) async fn record_positioning_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
    Json(request): Json<PositioningRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(
        state
            .service
            .record_positioning(&scope, &ContractId(contract_id), request.levels)?,
    )
}

pub(super) async fn latest_positioning_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    let positioning = state
        .service
        .latest_positioning(&scope, &ContractId(contract_id))?
        .ok_or(StoreError::NotFound("positioning"))?;
    ok(positioning)
}

pub(super) async fn record_assessment_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
    Json(draft): Json<AssessmentDraft>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(
        state
            .service
            .record_assessment(&scope, &ContractId(contract_id), draft)?,
    )
}

pub(super) async fn progression_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.progression(&scope, &ContractId(contract_id))?)
}

pub(super) async fn generate_tsf_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(state.service.generate_tsf(&scope, &ContractId(contract_id))?)
}

pub(super) async fn get_tsf_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.get_tsf(&scope, &ContractId(contract_id))?)
}

pub(super) async fn validate_tsf_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.validate_tsf(&scope, &ContractId(contract_id))?)
}

pub(super) async fn submit_proof_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
    Json(submission): Json<ProofSubmission>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(
        state
            .service
            .submit_proof(&scope, &ContractId(contract_id), submission)?,
    )
}

pub(super) async fn proof_journal_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.proof_journal(&scope, &ContractId(contract_id))?)
}

pub(super) async fn review_proof_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(proof_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.review_proof(
        &scope,
        &ProofId(proof_id),
        request.decision,
        request.comment,
    )?)
}

pub(super) async fn create_livret_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
    Json(draft): Json<LivretDraft>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(
        state
            .service
            .create_livret(&scope, &ContractId(contract_id), draft)?,
    )
}

pub(super) async fn list_livrets_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.list_livrets(&scope, &ContractId(contract_id))?)
}

pub(super) async fn livret_notes_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(livret_id): Path<String>,
    Json(request): Json<NotesRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state
        .service
        .update_livret_notes(&scope, &LivretId(livret_id), request.text)?)
}

pub(super) async fn sign_livret_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(livret_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.sign_livret(&scope, &LivretId(livret_id))?)
}

pub(super) async fn signing_link_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(livret_id): Path<String>,
    Json(request): Json<SigningLinkRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(
        state
            .service
            .issue_signing_link(&scope, &LivretId(livret_id), request.signer)?,
    )
}

pub(super) async fn sign_with_token_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Path(token): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.sign_with_token(&token, Utc::now())?)
}

pub(super) async fn contract_health_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
    Query(as_of): Query<AsOf>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state
        .service
        .contract_health(&scope, &ContractId(contract_id), today(&as_of))?)
}

pub(super) async fn open_remediation_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(contract_id): Path<String>,
    Json(request): Json<RemediationRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(
        state
            .service
            .open_remediation(&scope, &ContractId(contract_id), request)?,
    )
}

pub(super) async fn get_remediation_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(plan_id): Path<String>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state
        .service
        .get_remediation(&scope, &RemediationPlanId(plan_id))?)
}

pub(super) async fn add_action_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(plan_id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.add_remediation_action(
        &scope,
        &RemediationPlanId(plan_id),
        request.expected_version,
        request.action,
    )?)
}

pub(super) async fn complete_action_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path((plan_id, action_id)): Path<(String, String)>,
    Json(request): Json<VersionRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.complete_remediation_action(
        &scope,
        &RemediationPlanId(plan_id),
        &RemediationActionId(action_id),
        request.expected_version,
    )?)
}

pub(super) async fn close_remediation_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(plan_id): Path<String>,
    Json(request): Json<CloseRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.close_remediation(
        &scope,
        &RemediationPlanId(plan_id),
        request.expected_version,
        request.force,
    )?)
}

pub(super) async fn qualiopi_report_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Query(as_of): Query<AsOf>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.qualiopi_report(&scope, today(&as_of))?)
}

pub(super) async fn qualiopi_csv_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Query(as_of): Query<AsOf>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    let csv = state.service.qualiopi_csv(&scope, today(&as_of))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.as_ref())],
        csv,
    )
        .into_response())
}

pub(super) async fn open_ticket_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Json(draft): Json<TicketDraft>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    created(state.service.open_ticket(&scope, draft)?)
}

pub(super) async fn list_tickets_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.list_tickets(&scope)?)
}

pub(super) async fn transition_ticket_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Path(ticket_id): Path<String>,
    Json(request): Json<TicketStatusRequest>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state
        .service
        .transition_ticket(&scope, &TicketId(ticket_id), request.status)?)
}

pub(super) async fn audit_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    Extension(scope): Extension<AccessScope>,
    Query(query): Query<AuditQuery>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    ok(state.service.audit_log(&scope, query.limit)?)
}

fn cron_secret(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CRON_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
}

pub(super) async fn cron_notifications_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    headers: HeaderMap,
    Query(as_of): Query<AsOf>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    state.service.check_cron_secret(cron_secret(&headers))?;
    let run = state.service.run_reminders(today(&as_of))?;
    ok(json!({ "status": "ok", "run": run }))
}

pub(super) async fn cron_archive_handler<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    headers: HeaderMap,
    Query(as_of): Query<AsOf>,
) -> HandlerResult
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    state.service.check_cron_secret(cron_secret(&headers))?;
    let report = state
        .service
        .archive_expired(today(&as_of), state.uploader.as_ref())?;
    ok(report)
}
