use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mime::Mime;
use serde::{Deserialize, Serialize};

use crate::ids::{ContractId, ProofId, TenantId, UserId};
use crate::workflows::referentiel::{Referentiel, ReferentielError};

pub const MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

/// Evidence of competence collected in the apprentice's journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub id: ProofId,
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub title: String,
    pub description: String,
    pub competence_codes: Vec<String>,
    pub attachment: Option<ProofAttachment>,
    pub status: ProofStatus,
    pub submitted_by: UserId,
    pub submitted_at: DateTime<Utc>,
    pub review: Option<ProofReview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofAttachment {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofReview {
    pub decision: ReviewDecision,
    pub reviewer_id: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    Submitted,
    Validated,
    Rejected,
}

impl ProofStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Validate,
    Reject,
}

/// Submission payload; the attachment is described, never uploaded through this path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub competence_codes: Vec<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    #[error("proof title must not be empty")]
    EmptyTitle,
    #[error("proof must reference at least one competence")]
    NoCompetence,
    #[error(transparent)]
    Referentiel(#[from] ReferentielError),
    #[error("file name must not be empty")]
    EmptyFileName,
    #[error("content type {0} is not accepted")]
    UnsupportedContentType(String),
    #[error("unable to determine content type for {0}")]
    UnknownContentType(String),
    #[error("attachment is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("proof already {0}")]
    AlreadyReviewed(&'static str),
    #[error("a rejection needs a comment")]
    MissingRejectionComment,
}

impl Proof {
    pub fn submit(
        submission: ProofSubmission,
        referentiel: &Referentiel,
        tenant_id: TenantId,
        contract_id: ContractId,
        submitted_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, ProofError> {
        let title = submission.title.trim().to_string();
        if title.is_empty() {
            return Err(ProofError::EmptyTitle);
        }

        let mut competence_codes: Vec<String> = submission
            .competence_codes
            .iter()
            .map(|code| code.trim().to_string())
            .collect();
        competence_codes.sort();
        competence_codes.dedup();
        if competence_codes.is_empty() {
            return Err(ProofError::NoCompetence);
        }
        referentiel.ensure_competences(&competence_codes)?;

        let id = ProofId::generate();
        let attachment = submission
            .attachment
            .map(|descriptor| describe_attachment(descriptor, &tenant_id, &contract_id, &id))
            .transpose()?;

        Ok(Self {
            id,
            tenant_id,
            contract_id,
            title,
            description: submission.description.trim().to_string(),
            competence_codes,
            attachment,
            status: ProofStatus::Submitted,
            submitted_by,
            submitted_at: now,
            review: None,
        })
    }

    pub fn review(
        &mut self,
        decision: ReviewDecision,
        reviewer_id: UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ProofError> {
        if self.status != ProofStatus::Submitted {
            return Err(ProofError::AlreadyReviewed(self.status.label()));
        }

        let comment = comment
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if decision == ReviewDecision::Reject && comment.is_none() {
            return Err(ProofError::MissingRejectionComment);
        }

        self.status = match decision {
            ReviewDecision::Validate => ProofStatus::Validated,
            ReviewDecision::Reject => ProofStatus::Rejected,
        };
        self.review = Some(ProofReview {
            decision,
            reviewer_id,
            reviewed_at: now,
            comment,
        });
        Ok(())
    }
}

fn describe_attachment(
    descriptor: AttachmentDescriptor,
    tenant_id: &TenantId,
    contract_id: &ContractId,
    proof_id: &ProofId,
) -> Result<ProofAttachment, ProofError> {
    let file_name = sanitize_file_name(&descriptor.file_name);
    if file_name.is_empty() {
        return Err(ProofError::EmptyFileName);
    }

    if descriptor.size_bytes > MAX_ATTACHMENT_BYTES {
        return Err(ProofError::TooLarge {
            size: descriptor.size_bytes,
            limit: MAX_ATTACHMENT_BYTES,
        });
    }

    let content_type: Mime = match descriptor.content_type.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| ProofError::UnsupportedContentType(raw.to_string()))?,
        _ => mime_guess::from_path(&file_name)
            .first()
            .ok_or_else(|| ProofError::UnknownContentType(file_name.clone()))?,
    };

    if !is_accepted(&content_type) {
        return Err(ProofError::UnsupportedContentType(
            content_type.essence_str().to_string(),
        ));
    }

    Ok(ProofAttachment {
        storage_key: format!("proofs/{tenant_id}/{contract_id}/{proof_id}/{file_name}"),
        file_name,
        content_type: content_type.essence_str().to_string(),
        size_bytes: descriptor.size_bytes,
    })
}

fn sanitize_file_name(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    base.chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect()
}

fn is_accepted(content_type: &Mime) -> bool {
    let top = content_type.type_();
    let subtype = content_type.subtype().as_str();
    if top == mime::IMAGE || top == mime::AUDIO || top == mime::VIDEO {
        true
    } else if top == mime::TEXT {
        subtype == mime::PLAIN.as_str()
    } else if top == mime::APPLICATION {
        subtype == mime::PDF.as_str()
            || subtype == "msword"
            || subtype == "vnd.ms-excel"
            || subtype == "vnd.ms-powerpoint"
            || subtype.starts_with("vnd.openxmlformats-officedocument.")
            || subtype.starts_with("vnd.oasis.opendocument.")
    } else {
        false
    }
}

/// Journal view: proofs in submission order and validated proof counts per competence.
#[derive(Debug, Clone, Serialize)]
pub struct ProofJournal {
    pub contract_id: ContractId,
    pub entries: Vec<Proof>,
    pub validated_per_competence: BTreeMap<String, usize>,
    pub pending: usize,
}

pub fn journal(contract_id: ContractId, mut proofs: Vec<Proof>) -> ProofJournal {
    proofs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));

    let mut validated_per_competence = BTreeMap::new();
    for proof in proofs
        .iter()
        .filter(|proof| proof.status == ProofStatus::Validated)
    {
        for code in &proof.competence_codes {
            *validated_per_competence.entry(code.clone()).or_insert(0) += 1;
        }
    }
    let pending = proofs
        .iter()
        .filter(|proof| proof.status == ProofStatus::Submitted)
        .count();

    ProofJournal {
        contract_id,
        entries: proofs,
        validated_per_competence,
        pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::referentiel::domain::fixtures::draft;
    use chrono::Duration;

    fn referentiel() -> Referentiel {
        Referentiel::from_draft(
            draft(2, 2).validate().unwrap(),
            TenantId::from("tnt_a"),
            Utc::now(),
        )
    }

    fn submission(attachment: Option<AttachmentDescriptor>) -> ProofSubmission {
        ProofSubmission {
            title: " Mise en production du site vitrine ".to_string(),
            description: "Déploiement sur l'hébergement client".to_string(),
            competence_codes: vec!["C1.2".to_string(), "C1.1".to_string(), "C1.2".to_string()],
            attachment,
        }
    }

    fn submit(submission: ProofSubmission) -> Result<Proof, ProofError> {
        Proof::submit(
            submission,
            &referentiel(),
            TenantId::from("tnt_a"),
            ContractId::from("ctr_1"),
            UserId::from("usr_apprenti"),
            Utc::now(),
        )
    }

    #[test]
    fn submission_normalizes_codes_and_guesses_content_type() {
        let proof = submit(submission(Some(AttachmentDescriptor {
            file_name: "C:\\Users\\lea\\rapport.pdf".to_string(),
            content_type: None,
            size_bytes: 120_000,
        })))
        .expect("valid proof");

        assert_eq!(proof.title, "Mise en production du site vitrine");
        assert_eq!(proof.competence_codes, vec!["C1.1", "C1.2"]);
        let attachment = proof.attachment.expect("attachment described");
        assert_eq!(attachment.file_name, "rapport.pdf");
        assert_eq!(attachment.content_type, "application/pdf");
        assert_eq!(
            attachment.storage_key,
            format!("proofs/tnt_a/ctr_1/{}/rapport.pdf", proof.id)
        );
    }

    #[test]
    fn submission_rejects_unknown_competences_and_bad_files() {
        let mut unknown = submission(None);
        unknown.competence_codes = vec!["C7.7".to_string()];
        assert!(matches!(submit(unknown), Err(ProofError::Referentiel(_))));

        let mut none = submission(None);
        none.competence_codes.clear();
        assert_eq!(submit(none), Err(ProofError::NoCompetence));

        let executable = submission(Some(AttachmentDescriptor {
            file_name: "setup.exe".to_string(),
            content_type: Some("application/x-msdownload".to_string()),
            size_bytes: 10,
        }));
        assert!(matches!(
            submit(executable),
            Err(ProofError::UnsupportedContentType(_))
        ));

        let huge = submission(Some(AttachmentDescriptor {
            file_name: "demo.mp4".to_string(),
            content_type: None,
            size_bytes: MAX_ATTACHMENT_BYTES + 1,
        }));
        assert!(matches!(submit(huge), Err(ProofError::TooLarge { .. })));
    }

    #[test]
    fn office_documents_and_images_are_accepted() {
        for (name, content_type) in [
            ("bilan.docx", None),
            ("photo.jpg", None),
            ("notes.txt", Some("text/plain; charset=utf-8".to_string())),
            ("slides.odp", None),
        ] {
            let proof = submit(submission(Some(AttachmentDescriptor {
                file_name: name.to_string(),
                content_type,
                size_bytes: 1_024,
            })));
            assert!(proof.is_ok(), "{name} should be accepted: {proof:?}");
        }
    }

    #[test]
    fn review_requires_comment_for_rejection_and_happens_once() {
        let mut proof = submit(submission(None)).expect("valid proof");
        assert_eq!(
            proof.review(
                ReviewDecision::Reject,
                UserId::from("usr_tuteur"),
                Some("  ".to_string()),
                Utc::now()
            ),
            Err(ProofError::MissingRejectionComment)
        );

        proof
            .review(ReviewDecision::Validate, UserId::from("usr_tuteur"), None, Utc::now())
            .expect("validation succeeds");
        assert_eq!(proof.status, ProofStatus::Validated);
        assert_eq!(
            proof.review(ReviewDecision::Validate, UserId::from("usr_tuteur"), None, Utc::now()),
            Err(ProofError::AlreadyReviewed("validated"))
        );
    }

    #[test]
    fn journal_orders_entries_and_counts_validated_competences() {
        let now = Utc::now();
        let mut early = submit(submission(None)).unwrap();
        early.submitted_at = now - Duration::days(10);
        early
            .review(ReviewDecision::Validate, UserId::from("usr_t"), None, now)
            .unwrap();
        let mut late = submit(submission(None)).unwrap();
        late.submitted_at = now;

        let journal = journal(ContractId::from("ctr_1"), vec![late.clone(), early.clone()]);
        assert_eq!(journal.entries[0].id, early.id);
        assert_eq!(journal.pending, 1);
        assert_eq!(journal.validated_per_competence.get("C1.1"), Some(&1));
    }
}
