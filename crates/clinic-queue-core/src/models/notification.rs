//! Outbound notification commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason a patient or staff member should be told something.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Ticket issued at check-in
    TicketIssued,
    /// Patient summoned to the consultation room
    PatientCalled,
    /// Optimizer moved the entry to another doctor
    DoctorReassigned,
    /// Entry reached a new lifecycle status
    StatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TicketIssued => "ticket_issued",
            NotificationKind::PatientCalled => "patient_called",
            NotificationKind::DoctorReassigned => "doctor_reassigned",
            NotificationKind::StatusChanged => "status_changed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket_issued" => Some(NotificationKind::TicketIssued),
            "patient_called" => Some(NotificationKind::PatientCalled),
            "doctor_reassigned" => Some(NotificationKind::DoctorReassigned),
            "status_changed" => Some(NotificationKind::StatusChanged),
            _ => None,
        }
    }
}

/// Delivery state of an outbound command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    /// Gave up after the configured attempts
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NotificationStatus::Pending),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

/// A command sitting in the outbox until a worker hands it to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationCommand {
    pub id: String,
    pub tenant_id: String,
    pub entry_id: String,
    pub kind: NotificationKind,
    /// Free-form JSON for the transport (ticket, doctor, room...)
    pub payload: serde_json::Value,
    pub status: NotificationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationCommand {
    pub fn new(
        tenant_id: &str,
        entry_id: &str,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            entry_id: entry_id.to_string(),
            kind,
            payload,
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }
}
