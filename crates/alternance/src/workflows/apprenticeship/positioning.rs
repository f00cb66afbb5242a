use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssessmentId, ContractId, PositioningId, TenantId, UserId};
use crate::tenancy::Role;
use crate::workflows::referentiel::{Referentiel, ReferentielError};

/// Mastery scale shared by entry positioning and later assessments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    NonAcquis,
    EnCours,
    Acquis,
    Maitrise,
}

impl MasteryLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NonAcquis => "Non acquis",
            Self::EnCours => "En cours d'acquisition",
            Self::Acquis => "Acquis",
            Self::Maitrise => "Maîtrisé",
        }
    }

    pub fn is_acquired(self) -> bool {
        self >= Self::Acquis
    }
}

/// Entry positioning: where the apprentice stands on each competence when the contract starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Positioning {
    pub id: PositioningId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub levels: BTreeMap<String, MasteryLevel>,
    pub assessed_by: UserId,
    pub assessed_at: DateTime<Utc>,
}

impl Positioning {
    pub fn level_of(&self, competence_code: &str) -> Option<MasteryLevel> {
        self.levels.get(competence_code).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositioningError {
    #[error("positioning must rate at least one competence")]
    Empty,
    #[error(transparent)]
    Referentiel(#[from] ReferentielError),
}

/// Validate rated codes against the contract's referential.
pub fn check_levels(
    referentiel: &Referentiel,
    levels: &BTreeMap<String, MasteryLevel>,
) -> Result<(), PositioningError> {
    if levels.is_empty() {
        return Err(PositioningError::Empty);
    }
    referentiel.ensure_competences(levels.keys())?;
    Ok(())
}

/// Periodic evaluation of one competence by a formateur or tutor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub competence_code: String,
    pub level: MasteryLevel,
    pub evaluator_id: UserId,
    pub evaluator_role: Role,
    pub assessed_on: NaiveDate,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentDraft {
    pub competence_code: String,
    pub level: MasteryLevel,
    /// Defaults to the day the assessment is recorded.
    #[serde(default)]
    pub assessed_on: Option<NaiveDate>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Assessment {
    pub fn record(
        draft: AssessmentDraft,
        referentiel: &Referentiel,
        tenant_id: TenantId,
        contract_id: ContractId,
        evaluator_id: UserId,
        evaluator_role: Role,
        today: NaiveDate,
    ) -> Result<Self, PositioningError> {
        let competence_code = draft.competence_code.trim().to_string();
        referentiel.ensure_competences([&competence_code])?;
        Ok(Self {
            id: AssessmentId::generate(),
            tenant_id,
            contract_id,
            competence_code,
            level: draft.level,
            evaluator_id,
            evaluator_role,
            assessed_on: draft.assessed_on.unwrap_or(today),
            comment: draft
                .comment
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompetenceProgress {
    pub competence_code: String,
    pub bloc_code: String,
    pub level: Option<MasteryLevel>,
    pub source: ProgressSource,
    pub last_update: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    Assessment,
    Positioning,
    Unrated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progression {
    pub competences: Vec<CompetenceProgress>,
    pub acquired: usize,
    pub total: usize,
    pub rate: f32,
}

/// Latest known level per competence: the most recent assessment wins over the positioning.
pub fn progression(
    referentiel: &Referentiel,
    positioning: Option<&Positioning>,
    assessments: &[Assessment],
) -> Progression {
    let mut latest: BTreeMap<&str, &Assessment> = BTreeMap::new();
    for assessment in assessments {
        let entry = latest
            .entry(assessment.competence_code.as_str())
            .or_insert(assessment);
        if assessment.assessed_on >= entry.assessed_on {
            *entry = assessment;
        }
    }

    let mut competences = Vec::new();
    for bloc in &referentiel.blocs {
        for competence in &bloc.competences {
            let progress = match latest.get(competence.code.as_str()) {
                Some(assessment) => CompetenceProgress {
                    competence_code: competence.code.clone(),
                    bloc_code: bloc.code.clone(),
                    level: Some(assessment.level),
                    source: ProgressSource::Assessment,
                    last_update: Some(assessment.assessed_on),
                },
                None => match positioning.and_then(|p| p.level_of(&competence.code)) {
                    Some(level) => CompetenceProgress {
                        competence_code: competence.code.clone(),
                        bloc_code: bloc.code.clone(),
                        level: Some(level),
                        source: ProgressSource::Positioning,
                        last_update: positioning.map(|p| p.assessed_at.date_naive()),
                    },
                    None => CompetenceProgress {
                        competence_code: competence.code.clone(),
                        bloc_code: bloc.code.clone(),
                        level: None,
                        source: ProgressSource::Unrated,
                        last_update: None,
                    },
                },
            };
            competences.push(progress);
        }
    }

    let total = competences.len();
    let acquired = competences
        .iter()
        .filter(|progress| progress.level.map_or(false, MasteryLevel::is_acquired))
        .count();
    let rate = if total == 0 {
        0.0
    } else {
        acquired as f32 / total as f32
    };

    Progression {
        competences,
        acquired,
        total,
        rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::referentiel::domain::fixtures::draft;

    fn referentiel() -> Referentiel {
        Referentiel::from_draft(
            draft(2, 2).validate().unwrap(),
            TenantId::from("tnt_a"),
            Utc::now(),
        )
    }

    fn assessment(code: &str, level: MasteryLevel, on: NaiveDate) -> Assessment {
        Assessment {
            id: AssessmentId::generate(),
            tenant_id: TenantId::from("tnt_a"),
            contract_id: ContractId::from("ctr_1"),
            competence_code: code.to_string(),
            level,
            evaluator_id: UserId::from("usr_f"),
            evaluator_role: Role::Formateur,
            assessed_on: on,
            comment: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    #[test]
    fn levels_are_ordered() {
        assert!(MasteryLevel::Maitrise > MasteryLevel::Acquis);
        assert!(MasteryLevel::Acquis.is_acquired());
        assert!(!MasteryLevel::EnCours.is_acquired());
    }

    #[test]
    fn check_levels_rejects_unknown_codes() {
        let referentiel = referentiel();
        let mut levels = BTreeMap::new();
        assert_eq!(
            check_levels(&referentiel, &levels),
            Err(PositioningError::Empty)
        );
        levels.insert("C1.1".to_string(), MasteryLevel::Acquis);
        levels.insert("Z9".to_string(), MasteryLevel::Acquis);
        assert!(matches!(
            check_levels(&referentiel, &levels),
            Err(PositioningError::Referentiel(
                ReferentielError::UnknownCompetence(_)
            ))
        ));
    }

    #[test]
    fn latest_assessment_overrides_positioning() {
        let referentiel = referentiel();
        let mut levels = BTreeMap::new();
        levels.insert("C1.1".to_string(), MasteryLevel::Acquis);
        levels.insert("C1.2".to_string(), MasteryLevel::NonAcquis);
        let positioning = Positioning {
            id: PositioningId::generate(),
            tenant_id: TenantId::from("tnt_a"),
            contract_id: ContractId::from("ctr_1"),
            levels,
            assessed_by: UserId::from("usr_f"),
            assessed_at: Utc::now(),
        };

        let assessments = vec![
            assessment("C1.2", MasteryLevel::Maitrise, day(20)),
            assessment("C1.2", MasteryLevel::EnCours, day(5)),
            assessment("C2.1", MasteryLevel::Acquis, day(12)),
        ];

        let progression = progression(&referentiel, Some(&positioning), &assessments);
        assert_eq!(progression.total, 4);
        assert_eq!(progression.acquired, 3);
        assert!((progression.rate - 0.75).abs() < f32::EPSILON);

        let c12 = &progression.competences[1];
        assert_eq!(c12.level, Some(MasteryLevel::Maitrise));
        assert_eq!(c12.source, ProgressSource::Assessment);
        assert_eq!(progression.competences[0].source, ProgressSource::Positioning);
        assert_eq!(progression.competences[3].source, ProgressSource::Unrated);
    }
}
