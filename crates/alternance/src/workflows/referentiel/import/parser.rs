use super::normalizer::normalize_cell;
use serde::{Deserialize, Deserializer};
use std::io::Read;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReferentielRow {
    pub(crate) line: usize,
    pub(crate) bloc_code: String,
    pub(crate) bloc_title: String,
    pub(crate) competence_code: String,
    pub(crate) competence_title: String,
    pub(crate) indicateur: Option<(String, String)>,
}

pub(crate) fn parse_rows<R: Read>(reader: R) -> Result<Vec<ReferentielRow>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();

    for (index, record) in csv_reader.deserialize::<RawRow>().enumerate() {
        let row = record?;
        let indicateur = match (row.indicateur_code, row.indicateur) {
            (Some(code), Some(description)) => Some((code, description)),
            (None, Some(description)) => Some((String::new(), description)),
            (Some(code), None) => Some((code, String::new())),
            (None, None) => None,
        };

        rows.push(ReferentielRow {
            // header occupies line 1
            line: index + 2,
            bloc_code: normalize_cell(&row.bloc_code),
            bloc_title: normalize_cell(&row.bloc_title),
            competence_code: normalize_cell(&row.competence_code),
            competence_title: normalize_cell(&row.competence_title),
            indicateur,
        });
    }

    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Bloc Code", alias = "\u{feff}Bloc Code")]
    bloc_code: String,
    #[serde(rename = "Bloc Title", default)]
    bloc_title: String,
    #[serde(rename = "Competence Code")]
    competence_code: String,
    #[serde(rename = "Competence Title", default)]
    competence_title: String,
    #[serde(
        rename = "Indicateur Code",
        default,
        deserialize_with = "normalized_or_none"
    )]
    indicateur_code: Option<String>,
    #[serde(rename = "Indicateur", default, deserialize_with = "normalized_or_none")]
    indicateur: Option<String>,
}

fn normalized_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt
        .map(|value| normalize_cell(&value))
        .filter(|value| !value.is_empty()))
}
