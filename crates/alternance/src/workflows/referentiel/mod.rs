pub mod domain;
pub mod import;

pub use domain::{
    BlocCompetence, Competence, Indicateur, Referentiel, ReferentielDraft, ReferentielError,
};
pub use import::{ReferentielHeader, ReferentielImportError, ReferentielImporter};
