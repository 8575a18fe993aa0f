//! Queue entry model and its lifecycle state machine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::TenantScope;

/// Kind of service queue an entry belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueType {
    /// Patient arriving for a booked appointment
    Appointment,
    /// Patient arriving without a booking
    WalkIn,
    /// Return visit for an earlier consultation
    FollowUp,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [QueueType::Appointment, QueueType::WalkIn, QueueType::FollowUp];

    /// Ticket prefix letter.
    pub fn prefix(&self) -> char {
        match self {
            QueueType::Appointment => 'A',
            QueueType::WalkIn => 'W',
            QueueType::FollowUp => 'F',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::Appointment => "appointment",
            QueueType::WalkIn => "walk_in",
            QueueType::FollowUp => "follow_up",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "appointment" => Some(QueueType::Appointment),
            "walk_in" | "walk-in" => Some(QueueType::WalkIn),
            "follow_up" | "follow-up" => Some(QueueType::FollowUp),
            _ => None,
        }
    }
}

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Completed => "completed",
            QueueStatus::Cancelled => "cancelled",
            QueueStatus::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(QueueStatus::Waiting),
            "in_progress" => Some(QueueStatus::InProgress),
            "completed" => Some(QueueStatus::Completed),
            "cancelled" => Some(QueueStatus::Cancelled),
            "no_show" => Some(QueueStatus::NoShow),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueStatus::Completed | QueueStatus::Cancelled | QueueStatus::NoShow
        )
    }

    /// Status reached by applying `action`, or `None` if the action is illegal here.
    ///
    /// `Call` keeps the entry waiting; it only stamps `called_at`.
    pub fn apply(&self, action: QueueAction) -> Option<QueueStatus> {
        match (self, action) {
            (QueueStatus::Waiting, QueueAction::Call) => Some(QueueStatus::Waiting),
            (QueueStatus::Waiting, QueueAction::Start) => Some(QueueStatus::InProgress),
            (QueueStatus::Waiting, QueueAction::Cancel) => Some(QueueStatus::Cancelled),
            (QueueStatus::Waiting, QueueAction::NoShow) => Some(QueueStatus::NoShow),
            (QueueStatus::InProgress, QueueAction::Complete) => Some(QueueStatus::Completed),
            (QueueStatus::InProgress, QueueAction::Cancel) => Some(QueueStatus::Cancelled),
            _ => None,
        }
    }
}

/// Staff action requested against a queue entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    /// Summon the patient (stays waiting)
    Call,
    /// Begin consultation
    Start,
    /// Finish consultation
    Complete,
    Cancel,
    NoShow,
}

impl QueueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueAction::Call => "call",
            QueueAction::Start => "start",
            QueueAction::Complete => "complete",
            QueueAction::Cancel => "cancel",
            QueueAction::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "call" => Some(QueueAction::Call),
            "start" => Some(QueueAction::Start),
            "complete" => Some(QueueAction::Complete),
            "cancel" => Some(QueueAction::Cancel),
            "no_show" | "no-show" => Some(QueueAction::NoShow),
            _ => None,
        }
    }
}

/// How the patient checked in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    /// Front desk staff
    #[default]
    Reception,
    /// Self-service kiosk
    Kiosk,
    /// Remote check-in before arrival
    Online,
}

impl CheckInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInMethod::Reception => "reception",
            CheckInMethod::Kiosk => "kiosk",
            CheckInMethod::Online => "online",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reception" => Some(CheckInMethod::Reception),
            "kiosk" => Some(CheckInMethod::Kiosk),
            "online" => Some(CheckInMethod::Online),
            _ => None,
        }
    }
}

/// Vitals captured at triage, stored as JSON alongside the entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VitalsSnapshot {
    /// Blood pressure as recorded (e.g., "120/80")
    pub blood_pressure: Option<String>,
    pub pulse_bpm: Option<u32>,
    pub temperature_c: Option<f64>,
    pub spo2_percent: Option<u32>,
    pub weight_kg: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// One patient's place in a tenant's service queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    /// Unique entry ID
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Human-readable ticket, e.g. `W20240301-007`
    pub queue_number: String,
    /// Clinic-local calendar day the ticket belongs to
    pub queue_date: NaiveDate,
    pub queue_type: QueueType,
    /// Patient reference (foreign key into the patient directory)
    pub patient_id: String,
    /// Name snapshot taken at check-in
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
    pub appointment_id: Option<String>,
    pub visit_id: Option<String>,
    pub doctor_id: Option<String>,
    pub room_id: Option<String>,
    pub status: QueueStatus,
    /// Lower is served sooner
    pub priority: i64,
    /// Flagged urgent by staff; kept ahead of non-urgent entries
    pub urgent: bool,
    pub queued_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub checked_in: bool,
    pub check_in_method: CheckInMethod,
    pub vitals: VitalsSnapshot,
    pub notes: Option<String>,
    /// Last computed estimate; never used as input
    pub estimated_wait_minutes: Option<i64>,
}

impl QueueEntry {
    /// Create a waiting entry. The ticket is assigned when it is issued.
    pub fn new(
        scope: &TenantScope,
        patient_id: String,
        queue_type: QueueType,
        priority: i64,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: scope.id().to_string(),
            queue_number: String::new(),
            queue_date: queued_at.date_naive(),
            queue_type,
            patient_id,
            patient_first_name: None,
            patient_last_name: None,
            appointment_id: None,
            visit_id: None,
            doctor_id: None,
            room_id: None,
            status: QueueStatus::Waiting,
            priority: priority.max(0),
            urgent: false,
            queued_at,
            called_at: None,
            started_at: None,
            completed_at: None,
            checked_in: true,
            check_in_method: CheckInMethod::default(),
            vitals: VitalsSnapshot::default(),
            notes: None,
            estimated_wait_minutes: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == QueueStatus::Waiting
    }

    /// Whole minutes between start and completion.
    pub fn consultation_duration_minutes(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_minutes().max(0)),
            _ => None,
        }
    }
}
