//! Optimizer change records and allocation skips.

use serde::{Deserialize, Serialize};

/// What an optimizer pass changed on an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Doctor set on an entry that had none
    DoctorAssigned,
    /// Doctor replaced because the previous one was busy
    DoctorReassigned,
    /// Room set on an entry in consultation
    RoomAssigned,
    /// Urgent entry moved ahead of the waiting queue
    PriorityPromoted,
    /// Estimated wait recomputed
    WaitEstimateUpdated,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::DoctorAssigned => "doctor_assigned",
            ChangeAction::DoctorReassigned => "doctor_reassigned",
            ChangeAction::RoomAssigned => "room_assigned",
            ChangeAction::PriorityPromoted => "priority_promoted",
            ChangeAction::WaitEstimateUpdated => "wait_estimate_updated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "doctor_assigned" => Some(ChangeAction::DoctorAssigned),
            "doctor_reassigned" => Some(ChangeAction::DoctorReassigned),
            "room_assigned" => Some(ChangeAction::RoomAssigned),
            "priority_promoted" => Some(ChangeAction::PriorityPromoted),
            "wait_estimate_updated" => Some(ChangeAction::WaitEstimateUpdated),
            _ => None,
        }
    }
}

/// A single committed change, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueChange {
    pub entry_id: String,
    pub action: ChangeAction,
    /// Why the optimizer made the change
    pub reason: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl QueueChange {
    pub fn new(
        entry_id: &str,
        action: ChangeAction,
        reason: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            action,
            reason: reason.into(),
            old_value,
            new_value,
        }
    }
}

/// An entry the allocator could not serve this pass. Not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationSkip {
    pub entry_id: String,
    pub reason: String,
}
