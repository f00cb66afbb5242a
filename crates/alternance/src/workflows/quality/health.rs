use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ContractId;
use crate::workflows::apprenticeship::{
    Contract, Livret, LivretStatus, Progression, Proof, ProofStatus, TsfMapping,
};

pub const PROOF_WINDOW_DAYS: i64 = 60;
pub const STALE_LIVRET_DAYS: i64 = 14;
const STALE_LIVRET_PENALTY: u8 = 10;
const STALE_LIVRET_CAP: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Watch,
    Critical,
}

impl HealthLevel {
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            Self::Healthy
        } else if score >= 40 {
            Self::Watch
        } else {
            Self::Critical
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Watch => "watch",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    SeverelyBehindPace,
    BehindPace,
    NoRecentProof,
    HighRejectionRate,
    StaleLivrets,
    TsfNotValidated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSignal {
    pub kind: SignalKind,
    pub label: String,
    pub penalty: u8,
}

/// Aggregates scored for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthInputs {
    pub progression_rate: f32,
    pub elapsed_fraction: f32,
    pub days_running: i64,
    pub recent_proofs: usize,
    pub reviewed_proofs: usize,
    pub rejected_proofs: usize,
    pub stale_livrets: usize,
    pub tsf_validated: bool,
    pub open_remediation: bool,
}

impl HealthInputs {
    pub fn gather(
        contract: &Contract,
        progression: &Progression,
        proofs: &[Proof],
        livrets: &[Livret],
        tsf: Option<&TsfMapping>,
        open_remediation: bool,
        today: NaiveDate,
    ) -> Self {
        let proof_cutoff = today - Duration::days(PROOF_WINDOW_DAYS);
        let recent_proofs = proofs
            .iter()
            .filter(|proof| proof.submitted_at.date_naive() > proof_cutoff)
            .count();
        let reviewed_proofs = proofs
            .iter()
            .filter(|proof| proof.status != ProofStatus::Submitted)
            .count();
        let rejected_proofs = proofs
            .iter()
            .filter(|proof| proof.status == ProofStatus::Rejected)
            .count();

        let stale_livrets = livrets
            .iter()
            .filter(|livret| livret.status == LivretStatus::AwaitingSignatures)
            .filter_map(|livret| livret.signatures.first_signed_at())
            .filter(|first: &DateTime<Utc>| {
                (today - first.date_naive()).num_days() > STALE_LIVRET_DAYS
            })
            .count();

        Self {
            progression_rate: progression.rate,
            elapsed_fraction: contract.elapsed_fraction(today),
            days_running: (today - contract.start_date).num_days().max(0),
            recent_proofs,
            reviewed_proofs,
            rejected_proofs,
            stale_livrets,
            tsf_validated: tsf.map_or(false, TsfMapping::is_validated),
            open_remediation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub contract_id: ContractId,
    pub computed_on: NaiveDate,
    pub score: u8,
    pub level: HealthLevel,
    pub signals: Vec<HealthSignal>,
    pub inputs: HealthInputs,
}

impl HealthReport {
    pub fn has_signal(&self, kind: SignalKind) -> bool {
        self.signals.iter().any(|signal| signal.kind == kind)
    }
}

/// Score a contract starting from 100 and subtracting one penalty per signal.
pub fn score(contract_id: ContractId, inputs: HealthInputs, today: NaiveDate) -> HealthReport {
    let mut signals = Vec::new();

    let expected_pct = inputs.elapsed_fraction.clamp(0.0, 1.0) * 100.0;
    let actual_pct = inputs.progression_rate.clamp(0.0, 1.0) * 100.0;
    let gap = expected_pct - actual_pct;
    if gap > 20.0 {
        signals.push(HealthSignal {
            kind: SignalKind::SeverelyBehindPace,
            label: format!("Progression {gap:.0} points behind expected pace"),
            penalty: 30,
        });
    } else if gap > 10.0 {
        signals.push(HealthSignal {
            kind: SignalKind::BehindPace,
            label: format!("Progression {gap:.0} points behind expected pace"),
            penalty: 15,
        });
    }

    // only once the contract has run for a full window
    if inputs.recent_proofs == 0 && inputs.days_running >= PROOF_WINDOW_DAYS {
        signals.push(HealthSignal {
            kind: SignalKind::NoRecentProof,
            label: format!("No proof submitted in the last {PROOF_WINDOW_DAYS} days"),
            penalty: 20,
        });
    }

    if inputs.reviewed_proofs >= 2 {
        let ratio = inputs.rejected_proofs as f32 / inputs.reviewed_proofs as f32;
        if ratio > 0.5 {
            signals.push(HealthSignal {
                kind: SignalKind::HighRejectionRate,
                label: format!(
                    "{} of {} reviewed proofs rejected",
                    inputs.rejected_proofs, inputs.reviewed_proofs
                ),
                penalty: 10,
            });
        }
    }

    if inputs.stale_livrets > 0 {
        let penalty = (inputs.stale_livrets.min(u8::MAX as usize) as u8)
            .saturating_mul(STALE_LIVRET_PENALTY)
            .min(STALE_LIVRET_CAP);
        signals.push(HealthSignal {
            kind: SignalKind::StaleLivrets,
            label: format!(
                "{} livret(s) awaiting signatures for more than {STALE_LIVRET_DAYS} days",
                inputs.stale_livrets
            ),
            penalty,
        });
    }

    if !inputs.tsf_validated && inputs.elapsed_fraction > 0.1 {
        signals.push(HealthSignal {
            kind: SignalKind::TsfNotValidated,
            label: "TSF still not validated after 10% of the contract".to_string(),
            penalty: 15,
        });
    }

    let penalties: u32 = signals.iter().map(|signal| u32::from(signal.penalty)).sum();
    let score = 100u32.saturating_sub(penalties).min(100) as u8;

    HealthReport {
        contract_id,
        computed_on: today,
        score,
        level: HealthLevel::from_score(score),
        signals,
        inputs,
    }
}
