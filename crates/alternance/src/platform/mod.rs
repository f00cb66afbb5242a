//! Application plumbing shared by every workflow: storage seams, the in-memory backend,
//! the service facade, the audit trail and the HTTP router.

pub mod audit;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use audit::AuditEntry;
pub use memory::MemoryStore;
pub use repository::{Store, StoreError, TenantSnapshot};
pub use router::{alternance_router, RouterState};
pub use service::{AlternanceService, ReminderRun, RemediationRequest, ServiceError, SigningLink};
