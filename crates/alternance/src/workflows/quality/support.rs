use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TenantId, TicketId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Question,
    Incident,
    Complaint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::InProgress)
                | (Self::Open, Self::Resolved)
                | (Self::InProgress, Self::Resolved)
                | (Self::Resolved, Self::Closed)
                | (Self::Resolved, Self::InProgress)
        )
    }

    /// Resolved or closed tickets count as handled.
    pub fn is_handled(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: TicketId,
    pub tenant_id: TenantId,
    pub opened_by: UserId,
    pub category: TicketCategory,
    pub subject: String,
    pub body: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    pub category: TicketCategory,
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupportError {
    #[error("ticket subject must not be empty")]
    EmptySubject,
    #[error("ticket cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl SupportTicket {
    pub fn open(
        draft: TicketDraft,
        tenant_id: TenantId,
        opened_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, SupportError> {
        let subject = draft.subject.trim();
        if subject.is_empty() {
            return Err(SupportError::EmptySubject);
        }
        Ok(Self {
            id: TicketId::generate(),
            tenant_id,
            opened_by,
            category: draft.category,
            subject: subject.to_string(),
            body: draft.body.trim().to_string(),
            status: TicketStatus::Open,
            created_at: now,
            resolved_at: None,
        })
    }

    pub fn transition(&mut self, next: TicketStatus, at: DateTime<Utc>) -> Result<(), SupportError> {
        if !self.status.can_transition_to(next) {
            return Err(SupportError::InvalidTransition {
                from: self.status.label(),
                to: next.label(),
            });
        }
        match next {
            TicketStatus::Resolved => self.resolved_at = Some(at),
            TicketStatus::InProgress => self.resolved_at = None,
            _ => {}
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(category: TicketCategory) -> SupportTicket {
        SupportTicket::open(
            TicketDraft {
                category,
                subject: "Accès au livret".to_string(),
                body: "Je ne vois pas mon livret".to_string(),
            },
            TenantId::from("tnt_a"),
            UserId::from("usr_apprenti"),
            Utc::now(),
        )
        .expect("ticket opens")
    }

    #[test]
    fn blank_subject_is_rejected() {
        let draft = TicketDraft {
            category: TicketCategory::Question,
            subject: "   ".to_string(),
            body: String::new(),
        };
        assert_eq!(
            SupportTicket::open(draft, TenantId::from("tnt_a"), UserId::from("usr_a"), Utc::now()),
            Err(SupportError::EmptySubject)
        );
    }

    #[test]
    fn lifecycle_tracks_resolution_time() {
        let mut ticket = ticket(TicketCategory::Complaint);
        ticket.transition(TicketStatus::InProgress, Utc::now()).unwrap();
        ticket.transition(TicketStatus::Resolved, Utc::now()).unwrap();
        assert!(ticket.resolved_at.is_some());
        assert!(ticket.status.is_handled());

        ticket.transition(TicketStatus::InProgress, Utc::now()).unwrap();
        assert!(ticket.resolved_at.is_none());

        ticket.transition(TicketStatus::Resolved, Utc::now()).unwrap();
        ticket.transition(TicketStatus::Closed, Utc::now()).unwrap();
        assert_eq!(
            ticket.transition(TicketStatus::Open, Utc::now()),
            Err(SupportError::InvalidTransition {
                from: "closed",
                to: "open"
            })
        );
    }

    #[test]
    fn open_tickets_can_be_resolved_directly() {
        let mut ticket = ticket(TicketCategory::Question);
        assert!(ticket.transition(TicketStatus::Closed, Utc::now()).is_err());
        ticket.transition(TicketStatus::Resolved, Utc::now()).unwrap();
    }
}
