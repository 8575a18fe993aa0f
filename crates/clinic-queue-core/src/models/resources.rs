//! Resources and directory records consumed by the queue.
//!
//! These mirror what the surrounding platform's directories hand back. The
//! queue only ever stores their ids.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A doctor on the available roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Doctor {
    pub id: String,
    /// Display name (e.g., "Dr. Osei")
    pub name: String,
    pub specialization: Option<String>,
}

impl Doctor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            specialization: None,
        }
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = Some(specialization.into());
        self
    }
}

/// A consultation room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A booked appointment, used for doctor conflict detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: String,
    pub doctor_id: String,
    pub patient_id: Option<String>,
    pub starts_at: DateTime<Utc>,
}

/// Patient name as returned by the patient directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientName {
    pub first_name: String,
    pub last_name: String,
}

/// Per-tenant queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TenantSettings {
    /// Run an optimizer pass right after each enqueue
    pub auto_queue_optimization: bool,
    /// Clinic's offset from UTC; decides which day a ticket belongs to
    pub utc_offset_minutes: i32,
}

impl TenantSettings {
    /// The clinic's calendar day at `at`.
    ///
    /// An offset outside ±24h is ignored and the UTC day is used.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)) {
            Some(offset) => at.with_timezone(&offset).date_naive(),
            None => at.date_naive(),
        }
    }
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            auto_queue_optimization: true,
            utc_offset_minutes: 0,
        }
    }
}
