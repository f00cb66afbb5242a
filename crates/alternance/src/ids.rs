//! String identifiers for persisted entities.
//!
//! Generated identifiers carry a short type prefix (`ctr_`, `lvt_`, ...) followed by a
//! simple-format UUID so log lines stay readable without a lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

entity_id!(
    /// Training center (CFA) owning every other record.
    TenantId,
    "tnt"
);
entity_id!(UserId, "usr");
entity_id!(ApiKeyId, "key");
entity_id!(ReferentielId, "ref");
entity_id!(ContractId, "ctr");
entity_id!(PositioningId, "pos");
entity_id!(AssessmentId, "asm");
entity_id!(TsfId, "tsf");
entity_id!(ProofId, "prf");
entity_id!(LivretId, "lvt");
entity_id!(RemediationPlanId, "rem");
entity_id!(RemediationActionId, "act");
entity_id!(TicketId, "tkt");
entity_id!(AuditId, "aud");
