//! Qualiopi indicator report computed over a tenant's contracts.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::support::{SupportTicket, TicketCategory};
use crate::ids::{ContractId, TenantId};
use crate::workflows::apprenticeship::{
    Assessment, Contract, ContractStatus, Livret, LivretStatus, Positioning, TsfMapping,
};

pub const WINDOW_DAYS: i64 = 183;
pub const DEFAULT_THRESHOLD: f32 = 0.9;
pub const COMPLAINT_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorResult {
    pub number: u8,
    pub label: &'static str,
    pub numerator: usize,
    pub denominator: usize,
    pub rate: f32,
    pub threshold: f32,
    pub compliant: bool,
    pub gaps: Vec<String>,
}

impl IndicatorResult {
    fn new(
        number: u8,
        label: &'static str,
        numerator: usize,
        denominator: usize,
        threshold: f32,
        gaps: Vec<String>,
    ) -> Self {
        let rate = if denominator == 0 {
            1.0
        } else {
            numerator as f32 / denominator as f32
        };
        Self {
            number,
            label,
            numerator,
            denominator,
            rate,
            threshold,
            compliant: rate >= threshold,
            gaps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualiopiReport {
    pub tenant_id: TenantId,
    pub generated_on: NaiveDate,
    pub window_days: i64,
    pub indicators: Vec<IndicatorResult>,
}

impl QualiopiReport {
    pub fn indicator(&self, number: u8) -> Option<&IndicatorResult> {
        self.indicators
            .iter()
            .find(|indicator| indicator.number == number)
    }

    pub fn is_compliant(&self) -> bool {
        self.indicators.iter().all(|indicator| indicator.compliant)
    }
}

/// Tenant records the indicators are computed from.
#[derive(Debug, Clone, Copy)]
pub struct QualiopiInputs<'a> {
    pub contracts: &'a [Contract],
    pub positionings: &'a [Positioning],
    pub assessments: &'a [Assessment],
    pub tsf: &'a [TsfMapping],
    pub livrets: &'a [Livret],
    pub tickets: &'a [SupportTicket],
}

pub fn build_report(
    tenant_id: TenantId,
    inputs: QualiopiInputs<'_>,
    today: NaiveDate,
) -> QualiopiReport {
    let window_start = today - Duration::days(WINDOW_DAYS);
    let tracked: Vec<&Contract> = inputs
        .contracts
        .iter()
        .filter(|contract| contract.status != ContractStatus::Draft)
        .collect();
    let recent_start = |contract: &Contract| contract.start_date > window_start;
    // records dated after the reference day do not count towards a past report
    let in_window = |day: NaiveDate| day > window_start && day <= today;

    let positioned: BTreeSet<&ContractId> = inputs
        .positionings
        .iter()
        .map(|positioning| &positioning.contract_id)
        .collect();
    let validated_tsf: BTreeSet<&ContractId> = inputs
        .tsf
        .iter()
        .filter(|mapping| mapping.is_validated())
        .map(|mapping| &mapping.contract_id)
        .collect();
    let assessed_recently: BTreeSet<&ContractId> = inputs
        .assessments
        .iter()
        .filter(|assessment| in_window(assessment.assessed_on))
        .map(|assessment| &assessment.contract_id)
        .collect();
    let assessed_ever: BTreeSet<&ContractId> = inputs
        .assessments
        .iter()
        .map(|assessment| &assessment.contract_id)
        .collect();
    let signed_recently: BTreeSet<&ContractId> = inputs
        .livrets
        .iter()
        .filter(|livret| livret.status == LivretStatus::Signed && in_window(livret.period_end))
        .map(|livret| &livret.contract_id)
        .collect();

    let mut indicators = vec![
        contract_indicator(
            8,
            "Positionnement à l'entrée",
            &tracked,
            |contract| positioned.contains(&contract.id),
        ),
        contract_indicator(
            10,
            "Parcours individualisé (TSF validé)",
            &tracked,
            |contract| validated_tsf.contains(&contract.id),
        ),
        contract_indicator(
            11,
            "Évaluation de l'atteinte des objectifs",
            &tracked,
            |contract| {
                assessed_recently.contains(&contract.id)
                    || (recent_start(contract)
                        && (assessed_ever.contains(&contract.id)
                            || positioned.contains(&contract.id)))
            },
        ),
        contract_indicator(
            13,
            "Coordination avec l'entreprise",
            &tracked,
            |contract| signed_recently.contains(&contract.id) || recent_start(contract),
        ),
    ];

    let complaints: Vec<&SupportTicket> = inputs
        .tickets
        .iter()
        .filter(|ticket| ticket.category == TicketCategory::Complaint)
        .collect();
    let (handled, unhandled): (Vec<&SupportTicket>, Vec<&SupportTicket>) = complaints
        .iter()
        .copied()
        .partition(|ticket| ticket.status.is_handled());
    indicators.push(IndicatorResult::new(
        31,
        "Traitement des réclamations",
        handled.len(),
        complaints.len(),
        COMPLAINT_THRESHOLD,
        unhandled.iter().map(|ticket| ticket.id.to_string()).collect(),
    ));

    QualiopiReport {
        tenant_id,
        generated_on: today,
        window_days: WINDOW_DAYS,
        indicators,
    }
}

fn contract_indicator(
    number: u8,
    label: &'static str,
    tracked: &[&Contract],
    satisfied: impl Fn(&Contract) -> bool,
) -> IndicatorResult {
    let mut gaps = Vec::new();
    let mut numerator = 0;
    for contract in tracked {
        if satisfied(contract) {
            numerator += 1;
        } else {
            gaps.push(contract.id.to_string());
        }
    }
    IndicatorResult::new(
        number,
        label,
        numerator,
        tracked.len(),
        DEFAULT_THRESHOLD,
        gaps,
    )
}

#[derive(Debug, thiserror::Error)]
pub enum QualiopiExportError {
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush CSV: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    indicator: u8,
    label: &'a str,
    numerator: usize,
    denominator: usize,
    rate: String,
    threshold: String,
    compliant: &'static str,
    gaps: String,
}

/// One row per indicator; gaps are joined with `;`.
pub fn to_csv(report: &QualiopiReport) -> Result<String, QualiopiExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for indicator in &report.indicators {
        writer.serialize(CsvRow {
            indicator: indicator.number,
            label: indicator.label,
            numerator: indicator.numerator,
            denominator: indicator.denominator,
            rate: format!("{:.2}", indicator.rate),
            threshold: format!("{:.2}", indicator.threshold),
            compliant: if indicator.compliant { "yes" } else { "no" },
            gaps: indicator.gaps.join(";"),
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| QualiopiExportError::Io(error.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}
