mod normalizer;
mod parser;

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use super::domain::{
    BlocCompetence, Competence, Indicateur, ReferentielDraft, ReferentielError,
};
use parser::ReferentielRow;

#[derive(Debug, thiserror::Error)]
pub enum ReferentielImportError {
    #[error("failed to read referential export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid referential CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: {reason}")]
    Row { line: usize, reason: String },
    #[error("imported referential is invalid: {0}")]
    Referentiel(#[from] ReferentielError),
}

/// Header metadata that the CSV export does not carry.
#[derive(Debug, Clone)]
pub struct ReferentielHeader {
    pub rncp_code: String,
    pub title: String,
    pub level: Option<u8>,
}

/// Builds a validated [`ReferentielDraft`] from the flat one-row-per-indicator CSV export
/// published with RNCP sheets.
pub struct ReferentielImporter;

impl ReferentielImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        header: ReferentielHeader,
    ) -> Result<ReferentielDraft, ReferentielImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, header)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        header: ReferentielHeader,
    ) -> Result<ReferentielDraft, ReferentielImportError> {
        let rows = parser::parse_rows(reader)?;
        let blocs = group_rows(rows)?;

        let draft = ReferentielDraft {
            rncp_code: header.rncp_code,
            title: header.title,
            level: header.level,
            blocs,
        };

        Ok(draft.validate()?)
    }
}

fn group_rows(rows: Vec<ReferentielRow>) -> Result<Vec<BlocCompetence>, ReferentielImportError> {
    let mut blocs: Vec<BlocCompetence> = Vec::new();
    let mut seen_indicators: HashSet<(String, String, String)> = HashSet::new();

    for row in rows {
        if row.bloc_code.is_empty() || row.competence_code.is_empty() {
            return Err(ReferentielImportError::Row {
                line: row.line,
                reason: "bloc and competence codes are required".to_string(),
            });
        }

        let owner = blocs.iter().find(|bloc| {
            bloc.code != row.bloc_code
                && bloc
                    .competences
                    .iter()
                    .any(|competence| competence.code == row.competence_code)
        });
        if let Some(owner) = owner {
            return Err(ReferentielImportError::Row {
                line: row.line,
                reason: format!(
                    "competence {} already listed under bloc {}",
                    row.competence_code, owner.code
                ),
            });
        }

        let bloc_index = match blocs.iter().position(|bloc| bloc.code == row.bloc_code) {
            Some(index) => index,
            None => {
                blocs.push(BlocCompetence {
                    code: row.bloc_code.clone(),
                    title: row.bloc_title.clone(),
                    competences: Vec::new(),
                });
                blocs.len() - 1
            }
        };
        let bloc = &mut blocs[bloc_index];
        if bloc.title.is_empty() {
            bloc.title = row.bloc_title.clone();
        }

        let competence_index = match bloc
            .competences
            .iter()
            .position(|competence| competence.code == row.competence_code)
        {
            Some(index) => index,
            None => {
                bloc.competences.push(Competence {
                    code: row.competence_code.clone(),
                    title: row.competence_title.clone(),
                    indicateurs: Vec::new(),
                });
                bloc.competences.len() - 1
            }
        };
        let competence = &mut bloc.competences[competence_index];
        if competence.title.is_empty() {
            competence.title = row.competence_title.clone();
        }

        if let Some((code, description)) = row.indicateur {
            let key = (row.competence_code.clone(), code.clone(), description.clone());
            if seen_indicators.insert(key) {
                competence.indicateurs.push(Indicateur { code, description });
            }
        }
    }

    Ok(blocs)
}
