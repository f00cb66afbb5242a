use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::UserId;
use crate::tenancy::ApiKey;
use crate::workflows::apprenticeship::{ContractStatus, MasteryLevel, ReviewDecision, Signer};
use crate::workflows::quality::{ActionDraft, TicketStatus};
use crate::workflows::referentiel::ReferentielHeader;

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    /// Defaults to the caller.
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct ReferentielImportRequest {
    pub rncp_code: String,
    pub title: String,
    #[serde(default)]
    pub level: Option<u8>,
    pub csv: String,
}

impl ReferentielImportRequest {
    pub fn into_parts(self) -> (ReferentielHeader, String) {
        let header = ReferentielHeader {
            rncp_code: self.rncp_code,
            title: self.title,
            level: self.level,
        };
        (header, self.csv)
    }
}

#[derive(Debug, Deserialize)]
pub struct ContractStatusRequest {
    pub status: ContractStatus,
}

#[derive(Debug, Deserialize)]
pub struct PositioningRequest {
    pub levels: BTreeMap<String, MasteryLevel>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SigningLinkRequest {
    pub signer: Signer,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub expected_version: u64,
    #[serde(flatten)]
    pub action: ActionDraft,
}

#[derive(Debug, Deserialize)]
pub struct VersionRequest {
    pub expected_version: u64,
}

#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    pub expected_version: u64,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct TicketStatusRequest {
    pub status: TicketStatus,
}

/// Optional `?on=YYYY-MM-DD` override for date-dependent computations.
#[derive(Debug, Default, Deserialize)]
pub struct AsOf {
    #[serde(default)]
    pub on: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct IssuedKeyView {
    pub id: String,
    pub user_id: String,
    pub label: String,
    pub prefix: String,
    pub token: String,
}

/// API key without its digest.
pub fn key_view(key: &ApiKey) -> Value {
    json!({
        "id": key.id,
        "user_id": key.user_id,
        "label": key.label,
        "prefix": key.prefix,
        "created_at": key.created_at,
        "last_used_at": key.last_used_at,
        "revoked_at": key.revoked_at,
    })
}
