//! Tableau Stratégique de Formation: the contract's date range cut into fixed slices, with
//! competence blocs spread across them.

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::Contract;
use super::positioning::Positioning;
use crate::ids::{ContractId, TenantId, TsfId, UserId};
use crate::workflows::referentiel::Referentiel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TsfStatus {
    Draft,
    Validated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsfMapping {
    pub id: TsfId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub period_months: u32,
    pub periods: Vec<TsfPeriod>,
    pub already_acquired: Vec<String>,
    pub status: TsfStatus,
    pub generated_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsfPeriod {
    pub index: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub blocs: Vec<TsfBlocSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsfBlocSlot {
    pub bloc_code: String,
    pub bloc_title: String,
    pub competences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TsfError {
    #[error("period length must be at least one month")]
    InvalidPeriod,
    #[error("contract {contract} does not use referential {referentiel}")]
    ReferentielMismatch {
        contract: ContractId,
        referentiel: String,
    },
    #[error("referential has no competence bloc to schedule")]
    NothingToSchedule,
    #[error("TSF already validated on {0}")]
    AlreadyValidated(DateTime<Utc>),
    #[error("no TSF generated for this contract")]
    Missing,
}

impl TsfMapping {
    pub fn is_validated(&self) -> bool {
        self.status == TsfStatus::Validated
    }

    pub fn validate(&mut self, by: UserId, at: DateTime<Utc>) -> Result<(), TsfError> {
        if let Some(validated_at) = self.validated_at {
            return Err(TsfError::AlreadyValidated(validated_at));
        }
        self.status = TsfStatus::Validated;
        self.validated_at = Some(at);
        self.validated_by = Some(by);
        Ok(())
    }

    pub fn period_for_bloc(&self, bloc_code: &str) -> Option<&TsfPeriod> {
        self.periods
            .iter()
            .find(|period| period.blocs.iter().any(|slot| slot.bloc_code == bloc_code))
    }

    pub fn scheduled_competences(&self) -> usize {
        self.periods
            .iter()
            .flat_map(|period| period.blocs.iter())
            .map(|slot| slot.competences.len())
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TsfGenerator {
    period_months: u32,
}

impl Default for TsfGenerator {
    fn default() -> Self {
        Self { period_months: 6 }
    }
}

impl TsfGenerator {
    pub fn new(period_months: u32) -> Self {
        Self { period_months }
    }

    pub fn period_months(&self) -> u32 {
        self.period_months
    }

    pub fn generate(
        &self,
        contract: &Contract,
        referentiel: &Referentiel,
        positioning: Option<&Positioning>,
        now: DateTime<Utc>,
    ) -> Result<TsfMapping, TsfError> {
        if contract.referentiel_id != referentiel.id {
            return Err(TsfError::ReferentielMismatch {
                contract: contract.id.clone(),
                referentiel: referentiel.id.to_string(),
            });
        }
        if referentiel.blocs.is_empty() {
            return Err(TsfError::NothingToSchedule);
        }

        let windows = self.slice(contract.start_date, contract.end_date)?;
        let mut periods: Vec<TsfPeriod> = windows
            .iter()
            .enumerate()
            .map(|(index, (start, end))| TsfPeriod {
                index,
                start: *start,
                end: *end,
                blocs: Vec::new(),
            })
            .collect();

        let acquired = |code: &str| {
            positioning
                .and_then(|positioning| positioning.level_of(code))
                .map_or(false, |level| level.is_acquired())
        };

        let mut already_acquired = Vec::new();
        let bloc_count = referentiel.blocs.len();
        for (index, bloc) in referentiel.blocs.iter().enumerate() {
            let target = assign_period(index, bloc_count, periods.len());

            let mut competences = Vec::new();
            for competence in &bloc.competences {
                if acquired(&competence.code) {
                    already_acquired.push(competence.code.clone());
                } else {
                    competences.push(competence.code.clone());
                }
            }

            if !competences.is_empty() {
                periods[target].blocs.push(TsfBlocSlot {
                    bloc_code: bloc.code.clone(),
                    bloc_title: bloc.title.clone(),
                    competences,
                });
            }
        }

        Ok(TsfMapping {
            id: TsfId::generate(),
            tenant_id: contract.tenant_id.clone(),
            contract_id: contract.id.clone(),
            period_months: self.period_months,
            periods,
            already_acquired,
            status: TsfStatus::Draft,
            generated_at: now,
            validated_at: None,
            validated_by: None,
        })
    }

    /// Cut `[start, end)` into consecutive windows of `period_months`, the last one ending at `end`.
    pub fn slice(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, NaiveDate)>, TsfError> {
        if self.period_months == 0 {
            return Err(TsfError::InvalidPeriod);
        }

        let mut windows = Vec::new();
        let mut cursor = start;
        let mut step = 1;
        loop {
            // offsets are taken from the contract start so day clamping never accumulates
            let next = start
                .checked_add_months(Months::new(self.period_months * step))
                .unwrap_or(end);
            if next >= end {
                windows.push((cursor, end));
                break;
            }
            windows.push((cursor, next));
            cursor = next;
            step += 1;
        }

        Ok(windows)
    }
}

/// Period index for bloc `index` of `bloc_count` when there are `period_count` periods:
/// `floor(index / bloc_count * period_count)` in integer arithmetic.
pub fn assign_period(index: usize, bloc_count: usize, period_count: usize) -> usize {
    if bloc_count == 0 || period_count == 0 {
        return 0;
    }
    (index * period_count / bloc_count).min(period_count - 1)
}
