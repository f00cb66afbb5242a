//! Follow-up quality: contract health, remediation plans, Qualiopi indicators and support.

pub mod health;
pub mod qualiopi;
pub mod remediation;
pub mod support;

pub use health::{HealthInputs, HealthLevel, HealthReport, HealthSignal, SignalKind};
pub use qualiopi::{IndicatorResult, QualiopiExportError, QualiopiInputs, QualiopiReport};
pub use remediation::{
    suggest_actions, ActionDraft, RemediationAction, RemediationError, RemediationPlan,
    RemediationStatus,
};
pub use support::{SupportError, SupportTicket, TicketCategory, TicketDraft, TicketStatus};
