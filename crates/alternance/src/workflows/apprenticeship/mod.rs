//! Contract lifecycle and the tracking records hanging off a contract: entry positioning,
//! assessments, the TSF, the proof journal and the co-signed livret.

pub mod domain;
pub mod livret;
pub mod positioning;
pub mod proofs;
pub mod tsf;

pub use domain::{Contract, ContractDraft, ContractError, ContractFilter, ContractStatus};
pub use livret::{
    Livret, LivretDraft, LivretNotes, LivretStatus, SignatureError, SignatureOutcome, Signer,
    TripartiteSignatures,
};
pub use positioning::{
    check_levels, progression, Assessment, AssessmentDraft, MasteryLevel, Positioning,
    PositioningError, Progression,
};
pub use proofs::{
    journal, AttachmentDescriptor, Proof, ProofAttachment, ProofError, ProofJournal,
    ProofStatus, ProofSubmission, ReviewDecision,
};
pub use tsf::{TsfError, TsfGenerator, TsfMapping, TsfPeriod, TsfStatus};
