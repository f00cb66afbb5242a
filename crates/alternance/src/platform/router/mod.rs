//! JSON API under `/api/v1`.
//!
//! Every route registered before the `route_layer` call requires an API key; the signing
//! link and cron routes are added after it and carry their own credentials.

mod handlers;
mod payloads;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;

use super::repository::Store;
use super::service::{AlternanceService, ServiceError};
use crate::tenancy::CredentialError;
use crate::workflows::archive::ArchiveUploader;
use crate::workflows::notifications::{NotificationSender, WebhookPublisher};

use handlers::*;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Shared state handed to every handler.
pub struct RouterState<S, W, N> {
    pub service: Arc<AlternanceService<S, W, N>>,
    pub uploader: Arc<dyn ArchiveUploader>,
}

impl<S, W, N> Clone for RouterState<S, W, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            uploader: Arc::clone(&self.uploader),
        }
    }
}

/// Router builder exposing the alternance API.
pub fn alternance_router<S, W, N>(
    service: Arc<AlternanceService<S, W, N>>,
    uploader: Arc<dyn ArchiveUploader>,
) -> Router
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    let state = RouterState { service, uploader };

    Router::new()
        .route(
            "/api/v1/users",
            post(add_user_handler::<S, W, N>).get(list_users_handler::<S, W, N>),
        )
        .route("/api/v1/api-keys", post(issue_key_handler::<S, W, N>))
        .route(
            "/api/v1/api-keys/:key_id",
            axum::routing::delete(revoke_key_handler::<S, W, N>),
        )
        .route(
            "/api/v1/referentiels",
            post(create_referentiel_handler::<S, W, N>).get(list_referentiels_handler::<S, W, N>),
        )
        .route(
            "/api/v1/referentiels/import",
            post(import_referentiel_handler::<S, W, N>),
        )
        .route(
            "/api/v1/referentiels/:referentiel_id",
            get(get_referentiel_handler::<S, W, N>).delete(delete_referentiel_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts",
            post(create_contract_handler::<S, W, N>).get(list_contracts_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id",
            get(get_contract_handler::<S, W, N>).delete(delete_contract_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/status",
            post(transition_contract_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/positioning",
            post(record_positioning_handler::<S, W, N>).get(latest_positioning_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/assessments",
            post(record_assessment_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/progression",
            get(progression_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/tsf",
            post(generate_tsf_handler::<S, W, N>).get(get_tsf_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/tsf/validate",
            post(validate_tsf_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/proofs",
            post(submit_proof_handler::<S, W, N>).get(proof_journal_handler::<S, W, N>),
        )
        .route(
            "/api/v1/proofs/:proof_id/review",
            post(review_proof_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/livrets",
            post(create_livret_handler::<S, W, N>).get(list_livrets_handler::<S, W, N>),
        )
        .route(
            "/api/v1/livrets/:livret_id/notes",
            post(livret_notes_handler::<S, W, N>),
        )
        .route(
            "/api/v1/livrets/:livret_id/sign",
            post(sign_livret_handler::<S, W, N>),
        )
        .route(
            "/api/v1/livrets/:livret_id/signing-links",
            post(signing_link_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/health",
            get(contract_health_handler::<S, W, N>),
        )
        .route(
            "/api/v1/contracts/:contract_id/remediation",
            post(open_remediation_handler::<S, W, N>),
        )
        .route(
            "/api/v1/remediation/:plan_id",
            get(get_remediation_handler::<S, W, N>),
        )
        .route(
            "/api/v1/remediation/:plan_id/actions",
            post(add_action_handler::<S, W, N>),
        )
        .route(
            "/api/v1/remediation/:plan_id/actions/:action_id/complete",
            post(complete_action_handler::<S, W, N>),
        )
        .route(
            "/api/v1/remediation/:plan_id/close",
            post(close_remediation_handler::<S, W, N>),
        )
        .route(
            "/api/v1/reports/qualiopi",
            get(qualiopi_report_handler::<S, W, N>),
        )
        .route(
            "/api/v1/reports/qualiopi.csv",
            get(qualiopi_csv_handler::<S, W, N>),
        )
        .route(
            "/api/v1/support/tickets",
            post(open_ticket_handler::<S, W, N>).get(list_tickets_handler::<S, W, N>),
        )
        .route(
            "/api/v1/support/tickets/:ticket_id/status",
            post(transition_ticket_handler::<S, W, N>),
        )
        .route("/api/v1/audit", get(audit_handler::<S, W, N>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key::<S, W, N>,
        ))
        .route(
            "/api/v1/sign/:token",
            post(sign_with_token_handler::<S, W, N>),
        )
        .route(
            "/api/v1/cron/notifications",
            post(cron_notifications_handler::<S, W, N>),
        )
        .route(
            "/api/v1/cron/archive",
            post(cron_archive_handler::<S, W, N>),
        )
        .with_state(state)
}

/// `Authorization: Bearer <key>` wins over `x-api-key`.
pub(crate) fn presented_api_key(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|token| token.trim().to_string())
    })
}

/// Resolve the API key into an [`crate::tenancy::AccessScope`] request extension.
async fn require_api_key<S, W, N>(
    State(state): State<RouterState<S, W, N>>,
    mut request: Request,
    next: Next,
) -> Response
where
    S: Store + 'static,
    W: WebhookPublisher + 'static,
    N: NotificationSender + 'static,
{
    let Some(token) = presented_api_key(request.headers()) else {
        return ServiceError::from(CredentialError::Missing).into_response();
    };

    match state.service.authenticate(&token, Utc::now()) {
        Ok(scope) => {
            request.extensions_mut().insert(scope);
            next.run(request).await
        }
        Err(error) => error.into_response(),
    }
}
