//! Archiving of finished contracts: a JSON snapshot of everything hanging off the contract,
//! handed to an uploader before the records are purged.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ContractId, TenantId};
use crate::workflows::apprenticeship::{
    Assessment, Contract, Livret, Positioning, Proof, TsfMapping,
};
use crate::workflows::quality::RemediationPlan;

/// Everything stored for one contract at the moment it is archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractArchive {
    pub contract: Contract,
    pub positionings: Vec<Positioning>,
    pub assessments: Vec<Assessment>,
    pub tsf: Option<TsfMapping>,
    pub proofs: Vec<Proof>,
    pub livrets: Vec<Livret>,
    pub remediation_plans: Vec<RemediationPlan>,
    pub archived_at: DateTime<Utc>,
}

impl ContractArchive {
    pub fn storage_key(&self) -> String {
        format!(
            "archives/{}/{}/{}.json",
            self.contract.tenant_id,
            self.contract.end_date.format("%Y"),
            self.contract.id
        )
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ArchiveError> {
        serde_json::to_vec_pretty(self).map_err(ArchiveError::from)
    }
}

/// Storage backend receiving archive payloads (object store, drive, ...).
pub trait ArchiveUploader: Send + Sync {
    /// Store `payload` under `key` and return the key it was stored at.
    fn upload(&self, key: &str, payload: &[u8]) -> Result<String, ArchiveError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to serialize archive: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("upload failed: {0}")]
    Upload(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveFailure {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub cutoff: Option<NaiveDate>,
    pub archived: Vec<ArchivedContract>,
    pub failed: Vec<ArchiveFailure>,
}

/// Contracts that ended before this date are archived. `None` when the retention
/// window reaches past the calendar chrono can represent.
pub fn retention_cutoff(today: NaiveDate, retention_days: i64) -> Option<NaiveDate> {
    Duration::try_days(retention_days).and_then(|window| today.checked_sub_signed(window))
}

pub fn is_archivable(contract: &Contract, cutoff: NaiveDate) -> bool {
    contract.status.is_terminal() && contract.end_date < cutoff
}
