//! Doctor and room allocation.
//!
//! Planning works on a snapshot of the active queue and the directories.
//! Committing writes each move with a conditional update that re-checks the
//! chosen doctor or room in the same statement; a stale move loses quietly.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use strsim::{jaro_winkler, normalized_levenshtein};
use tracing::{debug, warn};

use super::{PriorityScheduler, QueueResult};
use crate::config::QueueConfig;
use crate::db::{ActiveFilter, Database};
use crate::directory::{AppointmentWindow, Directories};
use crate::models::{
    AllocationSkip, Appointment, ChangeAction, Doctor, QueueChange, QueueEntry, QueueStatus, Room,
    TenantScope,
};

/// Minimum similarity for two specializations to count as the same.
const SPECIALIZATION_MATCH: f64 = 0.85;

/// A doctor the plan wants on an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorMove {
    pub entry_id: String,
    pub from: Option<String>,
    pub to: String,
    pub reason: String,
}

/// A room the plan wants on an entry in consultation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMove {
    pub entry_id: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationPlan {
    pub doctor_moves: Vec<DoctorMove>,
    pub room_moves: Vec<RoomMove>,
    pub skipped: Vec<AllocationSkip>,
    /// Doctors free at planning time
    pub doctors_available: usize,
    /// Rooms free at planning time
    pub rooms_available: usize,
}

/// What the allocator knows about a doctor relative to one entry.
#[derive(Debug, Clone, PartialEq)]
enum DoctorState {
    Free,
    Busy(String),
    /// Appointments could not be read; neither assign nor move away.
    Unknown,
}

/// Directory snapshot for one planning run.
struct Roster {
    doctors: Vec<Doctor>,
    rooms: Vec<Room>,
    /// `None` when the appointment directory failed for that doctor
    appointments: HashMap<String, Option<Vec<Appointment>>>,
    consulting: HashSet<String>,
}

impl Roster {
    fn doctor(&self, id: &str) -> Option<&Doctor> {
        self.doctors.iter().find(|d| d.id == id)
    }

    fn state(&self, doctor_id: &str, entry: &QueueEntry) -> DoctorState {
        if self.doctor(doctor_id).is_none() {
            return DoctorState::Busy(format!("doctor {} is not on duty", doctor_id));
        }
        if self.consulting.contains(doctor_id) {
            return DoctorState::Busy(format!("doctor {} is consulting", doctor_id));
        }
        match self.appointments.get(doctor_id) {
            Some(Some(appointments)) => {
                // An entry's own booking is not a conflict
                let conflict = appointments
                    .iter()
                    .find(|a| entry.appointment_id.as_deref() != Some(a.id.as_str()));
                match conflict {
                    Some(a) => DoctorState::Busy(format!(
                        "doctor {} has appointment {} at {}",
                        doctor_id,
                        a.id,
                        a.starts_at.format("%H:%M")
                    )),
                    None => DoctorState::Free,
                }
            }
            _ => DoctorState::Unknown,
        }
    }

    /// Free for anyone, ignoring per-entry bookings.
    fn is_generally_free(&self, doctor_id: &str) -> bool {
        !self.consulting.contains(doctor_id)
            && matches!(self.appointments.get(doctor_id), Some(Some(a)) if a.is_empty())
    }
}

/// Assigns free doctors to waiting entries and free rooms to consultations.
pub struct ResourceAllocator<'a> {
    db: &'a Database,
    directories: &'a Directories,
    lookahead_minutes: i64,
    scheduler: PriorityScheduler,
}

impl<'a> ResourceAllocator<'a> {
    pub fn new(db: &'a Database, directories: &'a Directories, config: &QueueConfig) -> Self {
        Self {
            db,
            directories,
            lookahead_minutes: config.appointment_lookahead_minutes,
            scheduler: PriorityScheduler::new(),
        }
    }

    /// Plan doctor and room moves for the active queue.
    ///
    /// Waiting entries are served in queue order, so the patient at the
    /// front gets first pick of the free doctors.
    pub fn plan(
        &self,
        scope: &TenantScope,
        active: &[QueueEntry],
        now: DateTime<Utc>,
    ) -> AllocationPlan {
        let roster = self.snapshot(scope, active, now);
        let mut plan = AllocationPlan {
            doctors_available: roster
                .doctors
                .iter()
                .filter(|d| roster.is_generally_free(&d.id))
                .count(),
            ..Default::default()
        };

        // Active entries per doctor, kept current as the plan moves them
        let mut load: HashMap<String, usize> = HashMap::new();
        for entry in active {
            if let Some(doctor_id) = &entry.doctor_id {
                *load.entry(doctor_id.clone()).or_default() += 1;
            }
        }

        let waiting = self
            .scheduler
            .order(active.iter().filter(|e| e.is_waiting()).cloned().collect());

        for entry in &waiting {
            let reason = match entry.doctor_id.as_deref() {
                None => "unassigned".to_string(),
                Some(current) => match roster.state(current, entry) {
                    DoctorState::Busy(reason) => reason,
                    DoctorState::Free | DoctorState::Unknown => continue,
                },
            };

            match self.pick_doctor(&roster, entry, &load) {
                Some(doctor) => {
                    if let Some(old) = &entry.doctor_id {
                        if let Some(n) = load.get_mut(old) {
                            *n = n.saturating_sub(1);
                        }
                    }
                    *load.entry(doctor.id.clone()).or_default() += 1;
                    plan.doctor_moves.push(DoctorMove {
                        entry_id: entry.id.clone(),
                        from: entry.doctor_id.clone(),
                        to: doctor.id.clone(),
                        reason,
                    });
                }
                None => plan.skipped.push(AllocationSkip {
                    entry_id: entry.id.clone(),
                    reason: format!("no free doctor ({})", reason),
                }),
            }
        }

        let occupied: HashSet<&str> = active
            .iter()
            .filter(|e| e.status == QueueStatus::InProgress)
            .filter_map(|e| e.room_id.as_deref())
            .collect();
        let mut free_rooms = roster
            .rooms
            .iter()
            .filter(|r| !occupied.contains(r.id.as_str()));
        plan.rooms_available = free_rooms.clone().count();

        let mut consultations: Vec<&QueueEntry> = active
            .iter()
            .filter(|e| e.status == QueueStatus::InProgress && e.room_id.is_none())
            .collect();
        consultations.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));

        for entry in consultations {
            match free_rooms.next() {
                Some(room) => plan.room_moves.push(RoomMove {
                    entry_id: entry.id.clone(),
                    to: room.id.clone(),
                }),
                None => plan.skipped.push(AllocationSkip {
                    entry_id: entry.id.clone(),
                    reason: "no free room".to_string(),
                }),
            }
        }

        plan
    }

    /// Apply a plan with conditional updates.
    ///
    /// Each move is checked inside its own UPDATE: the doctor must not be
    /// consulting and the room must be free at write time. A move and its
    /// audit record commit together. Returns the changes that landed and the
    /// moves that lost a race.
    pub fn commit(
        &self,
        scope: &TenantScope,
        pass_id: &str,
        plan: &AllocationPlan,
        recorded_at: DateTime<Utc>,
    ) -> QueueResult<(Vec<QueueChange>, Vec<AllocationSkip>)> {
        let mut changes = Vec::new();
        let mut skipped = Vec::new();

        for mv in &plan.doctor_moves {
            let action = if mv.from.is_some() {
                ChangeAction::DoctorReassigned
            } else {
                ChangeAction::DoctorAssigned
            };
            let change = QueueChange::new(
                &mv.entry_id,
                action,
                mv.reason.clone(),
                mv.from.clone(),
                Some(mv.to.clone()),
            );
            let landed = self.db.apply_audited(scope, pass_id, &change, recorded_at, |db| {
                db.update_doctor_if(scope, &mv.entry_id, mv.from.as_deref(), &mv.to)
            })?;

            if landed {
                changes.push(change);
            } else {
                debug!(tenant = scope.id(), entry_id = %mv.entry_id, doctor = %mv.to, "Doctor move lost a race");
                skipped.push(AllocationSkip {
                    entry_id: mv.entry_id.clone(),
                    reason: format!("doctor {} became busy or entry changed", mv.to),
                });
            }
        }

        for mv in &plan.room_moves {
            let change = QueueChange::new(
                &mv.entry_id,
                ChangeAction::RoomAssigned,
                "consultation without a room",
                None,
                Some(mv.to.clone()),
            );
            let landed = self.db.apply_audited(scope, pass_id, &change, recorded_at, |db| {
                db.update_room_if(scope, &mv.entry_id, None, &mv.to)
            })?;

            if landed {
                changes.push(change);
            } else {
                debug!(tenant = scope.id(), entry_id = %mv.entry_id, room = %mv.to, "Room move lost a race");
                skipped.push(AllocationSkip {
                    entry_id: mv.entry_id.clone(),
                    reason: format!("room {} no longer free", mv.to),
                });
            }
        }

        Ok((changes, skipped))
    }

    /// Give a room to an entry that just entered consultation.
    ///
    /// Tries free rooms in directory order; the room update itself refuses a
    /// room another consultation took meanwhile. Returns the room the entry
    /// ends up in, if any.
    pub fn assign_room_on_start(
        &self,
        scope: &TenantScope,
        entry: &QueueEntry,
    ) -> QueueResult<Option<String>> {
        if entry.room_id.is_some() {
            return Ok(entry.room_id.clone());
        }

        let rooms = self.directories.rooms.list_available(scope)?;
        let filter = ActiveFilter {
            status: Some(QueueStatus::InProgress),
            ..Default::default()
        };
        let occupied: HashSet<String> = self
            .db
            .list_active_entries(scope, &filter)?
            .into_iter()
            .filter_map(|e| e.room_id)
            .collect();

        for room in rooms.iter().filter(|r| !occupied.contains(&r.id)) {
            if self.db.update_room_if(scope, &entry.id, None, &room.id)? {
                return Ok(Some(room.id.clone()));
            }
            // Left consultation or got a room meanwhile
            let Some(current) = self.db.get_queue_entry(scope, &entry.id)? else {
                return Ok(None);
            };
            if current.status != QueueStatus::InProgress || current.room_id.is_some() {
                return Ok(current.room_id);
            }
        }

        debug!(tenant = scope.id(), entry_id = %entry.id, "No free room at start");
        Ok(None)
    }

    fn snapshot(&self, scope: &TenantScope, active: &[QueueEntry], now: DateTime<Utc>) -> Roster {
        let doctors = self.available_doctors(scope);
        let rooms = self.available_rooms(scope);
        let window = AppointmentWindow::lookahead(now, self.lookahead_minutes);

        let appointments = doctors
            .iter()
            .map(|d| {
                let upcoming = match self.directories.appointments.upcoming_for(scope, &d.id, window)
                {
                    Ok(a) => Some(a),
                    Err(e) => {
                        warn!(tenant = scope.id(), doctor = %d.id, error = %e, "Appointment lookup failed");
                        None
                    }
                };
                (d.id.clone(), upcoming)
            })
            .collect();

        let consulting = active
            .iter()
            .filter(|e| e.status == QueueStatus::InProgress)
            .filter_map(|e| e.doctor_id.clone())
            .collect();

        Roster {
            doctors,
            rooms,
            appointments,
            consulting,
        }
    }

    fn pick_doctor<'r>(
        &self,
        roster: &'r Roster,
        entry: &QueueEntry,
        load: &HashMap<String, usize>,
    ) -> Option<&'r Doctor> {
        let candidates: Vec<&Doctor> = roster
            .doctors
            .iter()
            .filter(|d| entry.doctor_id.as_deref() != Some(d.id.as_str()))
            .filter(|d| roster.state(&d.id, entry) == DoctorState::Free)
            .collect();

        // Prefer the specialty the patient was booked into
        let wanted = entry
            .doctor_id
            .as_deref()
            .and_then(|id| roster.doctor(id))
            .and_then(|d| d.specialization.as_deref());
        let matching: Vec<&Doctor> = match wanted {
            Some(specialty) => candidates
                .iter()
                .copied()
                .filter(|d| {
                    d.specialization
                        .as_deref()
                        .is_some_and(|s| specialization_matches(specialty, s))
                })
                .collect(),
            None => Vec::new(),
        };
        let pool = if matching.is_empty() { candidates } else { matching };

        pool.into_iter().min_by(|a, b| {
            let la = load.get(&a.id).copied().unwrap_or(0);
            let lb = load.get(&b.id).copied().unwrap_or(0);
            la.cmp(&lb).then_with(|| a.id.cmp(&b.id))
        })
    }

    fn available_doctors(&self, scope: &TenantScope) -> Vec<Doctor> {
        self.directories
            .doctors
            .list_available(scope)
            .unwrap_or_else(|e| {
                warn!(tenant = scope.id(), error = %e, "Doctor roster unavailable");
                Vec::new()
            })
    }

    fn available_rooms(&self, scope: &TenantScope) -> Vec<Room> {
        self.directories
            .rooms
            .list_available(scope)
            .unwrap_or_else(|e| {
                warn!(tenant = scope.id(), error = %e, "Room list unavailable");
                Vec::new()
            })
    }
}

/// Whether two specialization labels name the same field.
pub fn specialization_matches(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || jaro_winkler(&a, &b) * 0.6 + normalized_levenshtein(&a, &b) * 0.4 >= SPECIALIZATION_MATCH
}
