use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ReferentielId, TenantId};

/// RNCP certification framework: blocs of competences, each with observable indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referentiel {
    pub id: ReferentielId,
    pub tenant_id: TenantId,
    pub rncp_code: String,
    pub title: String,
    pub level: Option<u8>,
    pub blocs: Vec<BlocCompetence>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocCompetence {
    pub code: String,
    pub title: String,
    pub competences: Vec<Competence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competence {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub indicateurs: Vec<Indicateur>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicateur {
    pub code: String,
    pub description: String,
}

/// Payload used to create a referential; identifiers and timestamps are assigned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferentielDraft {
    pub rncp_code: String,
    pub title: String,
    #[serde(default)]
    pub level: Option<u8>,
    pub blocs: Vec<BlocCompetence>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferentielError {
    #[error("RNCP code '{0}' must look like RNCP followed by digits")]
    InvalidRncpCode(String),
    #[error("referential title must not be empty")]
    EmptyTitle,
    #[error("referential has no competence bloc")]
    NoBlocs,
    #[error("bloc {0} has no competence")]
    EmptyBloc(String),
    #[error("empty code in {0}")]
    EmptyCode(&'static str),
    #[error("duplicate bloc code {0}")]
    DuplicateBloc(String),
    #[error("duplicate competence code {0}")]
    DuplicateCompetence(String),
    #[error("level {0} is outside the RNCP scale (1-8)")]
    InvalidLevel(u8),
    #[error("unknown competence code {0}")]
    UnknownCompetence(String),
}

impl ReferentielDraft {
    /// Check structural invariants and return a normalized copy.
    pub fn validate(self) -> Result<ReferentielDraft, ReferentielError> {
        let rncp_code = self.rncp_code.trim().to_ascii_uppercase();
        let digits = rncp_code.strip_prefix("RNCP").unwrap_or_default();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ReferentielError::InvalidRncpCode(self.rncp_code));
        }

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ReferentielError::EmptyTitle);
        }

        if let Some(level) = self.level {
            if !(1..=8).contains(&level) {
                return Err(ReferentielError::InvalidLevel(level));
            }
        }

        if self.blocs.is_empty() {
            return Err(ReferentielError::NoBlocs);
        }

        let mut bloc_codes = HashSet::new();
        let mut competence_codes = HashSet::new();
        for bloc in &self.blocs {
            if bloc.code.trim().is_empty() {
                return Err(ReferentielError::EmptyCode("bloc"));
            }
            if !bloc_codes.insert(bloc.code.trim()) {
                return Err(ReferentielError::DuplicateBloc(bloc.code.clone()));
            }
            if bloc.competences.is_empty() {
                return Err(ReferentielError::EmptyBloc(bloc.code.clone()));
            }
            for competence in &bloc.competences {
                if competence.code.trim().is_empty() {
                    return Err(ReferentielError::EmptyCode("competence"));
                }
                if !competence_codes.insert(competence.code.trim()) {
                    return Err(ReferentielError::DuplicateCompetence(
                        competence.code.clone(),
                    ));
                }
            }
        }

        let blocs = self
            .blocs
            .into_iter()
            .map(|bloc| BlocCompetence {
                code: bloc.code.trim().to_string(),
                title: bloc.title.trim().to_string(),
                competences: bloc
                    .competences
                    .into_iter()
                    .map(|competence| Competence {
                        code: competence.code.trim().to_string(),
                        title: competence.title.trim().to_string(),
                        indicateurs: competence.indicateurs,
                    })
                    .collect(),
            })
            .collect();

        Ok(ReferentielDraft {
            rncp_code,
            title,
            level: self.level,
            blocs,
        })
    }
}

impl Referentiel {
    pub fn from_draft(draft: ReferentielDraft, tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            id: ReferentielId::generate(),
            tenant_id,
            rncp_code: draft.rncp_code,
            title: draft.title,
            level: draft.level,
            blocs: draft.blocs,
            created_at: now,
        }
    }

    pub fn competences(&self) -> impl Iterator<Item = &Competence> {
        self.blocs.iter().flat_map(|bloc| bloc.competences.iter())
    }

    pub fn competence(&self, code: &str) -> Option<&Competence> {
        self.competences().find(|competence| competence.code == code)
    }

    pub fn bloc_of(&self, competence_code: &str) -> Option<&BlocCompetence> {
        self.blocs.iter().find(|bloc| {
            bloc.competences
                .iter()
                .any(|competence| competence.code == competence_code)
        })
    }

    pub fn competence_codes(&self) -> Vec<String> {
        self.competences()
            .map(|competence| competence.code.clone())
            .collect()
    }

    pub fn competence_count(&self) -> usize {
        self.competences().count()
    }

    /// Fail on the first code that is not part of this referential.
    pub fn ensure_competences<'a, I>(&self, codes: I) -> Result<(), ReferentielError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for code in codes {
            if self.competence(code).is_none() {
                return Err(ReferentielError::UnknownCompetence(code.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn competence(code: &str) -> Competence {
        Competence {
            code: code.to_string(),
            title: format!("Competence {code}"),
            indicateurs: Vec::new(),
        }
    }

    pub(crate) fn draft(bloc_count: usize, competences_per_bloc: usize) -> ReferentielDraft {
        let blocs = (1..=bloc_count)
            .map(|bloc| BlocCompetence {
                code: format!("B{bloc}"),
                title: format!("Bloc {bloc}"),
                competences: (1..=competences_per_bloc)
                    .map(|index| competence(&format!("C{bloc}.{index}")))
                    .collect(),
            })
            .collect();

        ReferentielDraft {
            rncp_code: "RNCP35185".to_string(),
            title: "Développeur web et web mobile".to_string(),
            level: Some(5),
            blocs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn validate_normalizes_codes() {
        let mut raw = draft(2, 2);
        raw.rncp_code = " rncp35185 ".to_string();
        raw.blocs[0].code = " B1 ".to_string();
        let draft = raw.validate().expect("valid referential");
        assert_eq!(draft.rncp_code, "RNCP35185");
        assert_eq!(draft.blocs[0].code, "B1");
    }

    #[test]
    fn validate_rejects_structural_problems() {
        let mut no_blocs = draft(1, 1);
        no_blocs.blocs.clear();
        assert_eq!(no_blocs.validate(), Err(ReferentielError::NoBlocs));

        let mut empty_bloc = draft(2, 1);
        empty_bloc.blocs[1].competences.clear();
        assert_eq!(
            empty_bloc.validate(),
            Err(ReferentielError::EmptyBloc("B2".to_string()))
        );

        let mut duplicate = draft(2, 1);
        duplicate.blocs[1].competences[0].code = "C1.1".to_string();
        assert_eq!(
            duplicate.validate(),
            Err(ReferentielError::DuplicateCompetence("C1.1".to_string()))
        );

        let mut bad_code = draft(1, 1);
        bad_code.rncp_code = "RS1234".to_string();
        assert!(matches!(
            bad_code.validate(),
            Err(ReferentielError::InvalidRncpCode(_))
        ));

        let mut bad_level = draft(1, 1);
        bad_level.level = Some(9);
        assert_eq!(bad_level.validate(), Err(ReferentielError::InvalidLevel(9)));
    }

    #[test]
    fn lookups_resolve_competences_and_blocs() {
        let referentiel = Referentiel::from_draft(
            draft(3, 2).validate().unwrap(),
            TenantId::from("tnt_a"),
            Utc::now(),
        );
        assert_eq!(referentiel.competence_count(), 6);
        assert_eq!(referentiel.bloc_of("C2.2").map(|b| b.code.as_str()), Some("B2"));
        assert!(referentiel.competence("C9.9").is_none());
        assert_eq!(
            referentiel.ensure_competences(&["C1.1".to_string(), "X".to_string()]),
            Err(ReferentielError::UnknownCompetence("X".to_string()))
        );
    }
}
