//! Clinic Queue Core Library
//!
//! Multi-tenant patient queue engine for outpatient clinics.
//!
//! # Architecture
//!
//! ```text
//! Check-in ──► EnqueueRequest ──► Ticket (W20240301-007)
//!                                      │
//!                              [queue_entries table]
//!                                      │
//!              ┌───────────────────────┼───────────────────────┐
//!              │                       │                       │
//!              ▼                       ▼                       ▼
//!        Staff actions          Optimizer pass           Display board
//!   call/start/complete/…   allocate → promote →      ordered, hydrated,
//!   (state machine)         estimate → audit          capped projection
//!              │                       │
//!              └──────────┬────────────┘
//!                         ▼
//!               [notification_outbox] ──► NotificationWorker ──► SMS/push
//! ```
//!
//! # Core Principle
//!
//! **Every query and mutation is tenant-scoped.** Nothing touches the queue
//! without a [`TenantScope`], and another tenant's entries look absent.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer (entries, audit log, outbox)
//! - [`models`]: Domain types (QueueEntry, QueueStatus, Doctor, etc.)
//! - [`queue`]: Ticketing, scheduling, allocation, optimization, display
//! - [`directory`]: Collaborator traits for patients, staff, rooms, settings
//! - [`notify`]: Outbox delivery
//! - [`worker`]: Periodic background threads (outbox drain, optimizer)
//! - [`config`]: Engine tunables

pub mod config;
pub mod db;
pub mod directory;
pub mod models;
pub mod notify;
pub mod queue;
pub mod worker;

// Re-export commonly used types
pub use config::{EstimatorMode, QueueConfig};
pub use db::Database;
pub use directory::{Directories, InMemoryDirectory};
pub use models::{
    Appointment, CheckInMethod, Doctor, PatientName, QueueAction, QueueEntry, QueueStatus,
    QueueType, Room, TenantScope, TenantSettings, VitalsSnapshot,
};
pub use notify::{NotificationDispatcher, NotificationWorker};
pub use worker::WorkerHandle;
pub use queue::{
    start_optimizer_worker, DisplayFilter, DisplayRow, EnqueueRequest, OptimizationReport,
    QueueError, QueueService,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
#[uniffi::export]
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicQueueError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Safe to retry
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Directory error: {0}")]
    DirectoryError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for ClinicQueueError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => ClinicQueueError::NotFound(what),
            other => ClinicQueueError::DatabaseError(other.to_string()),
        }
    }
}

impl From<QueueError> for ClinicQueueError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Validation(msg) => ClinicQueueError::InvalidInput(msg),
            QueueError::Transition { .. } => ClinicQueueError::InvalidTransition(e.to_string()),
            QueueError::GenerationExhausted { .. } | QueueError::Conflict(_) => {
                ClinicQueueError::Conflict(e.to_string())
            }
            QueueError::NotFound(id) => ClinicQueueError::NotFound(id),
            QueueError::Database(db) => db.into(),
            QueueError::Directory(err) => err.into(),
        }
    }
}

impl From<serde_json::Error> for ClinicQueueError {
    fn from(e: serde_json::Error) -> Self {
        ClinicQueueError::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for ClinicQueueError {
    fn from(e: anyhow::Error) -> Self {
        ClinicQueueError::DirectoryError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicQueueError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicQueueError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a queue database at the given path.
///
/// `config_json` overrides [`QueueConfig`] defaults field by field.
#[uniffi::export]
pub fn open_queue_database(
    path: String,
    config_json: Option<String>,
) -> Result<Arc<ClinicQueueCore>, ClinicQueueError> {
    let config = match config_json {
        Some(json) => QueueConfig::from_json(&json)?,
        None => QueueConfig::default(),
    };
    let db = Database::open(&path)?;
    Ok(Arc::new(ClinicQueueCore::new(db, config)))
}

/// Create an in-memory queue database (for testing).
#[uniffi::export]
pub fn open_queue_database_in_memory() -> Result<Arc<ClinicQueueCore>, ClinicQueueError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicQueueCore::new(db, QueueConfig::default())))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe queue engine for FFI.
///
/// Directory data lives in an [`InMemoryDirectory`] the host keeps current.
#[derive(uniffi::Object)]
pub struct ClinicQueueCore {
    db: Arc<Mutex<Database>>,
    directory: Arc<InMemoryDirectory>,
    directories: Directories,
    config: QueueConfig,
}

impl ClinicQueueCore {
    fn new(db: Database, config: QueueConfig) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        Self {
            db: Arc::new(Mutex::new(db)),
            directories: Directories::from_shared(directory.clone()),
            directory,
            config,
        }
    }
}

fn scope(tenant_id: &str) -> Result<TenantScope, ClinicQueueError> {
    TenantScope::new(tenant_id)
        .ok_or_else(|| ClinicQueueError::InvalidInput(format!("invalid tenant id: {:?}", tenant_id)))
}

fn parse_queue_type(s: &str) -> Result<QueueType, ClinicQueueError> {
    QueueType::parse(s).ok_or_else(|| ClinicQueueError::InvalidInput(format!("unknown queue type: {}", s)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ClinicQueueError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ClinicQueueError::InvalidInput(format!("invalid timestamp {:?}: {}", s, e)))
}

fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[uniffi::export]
impl ClinicQueueCore {
    // =========================================================================
    // Directory Snapshots
    // =========================================================================

    /// Replace the tenant's on-duty doctors.
    pub fn set_doctors(&self, tenant_id: String, doctors: Vec<FfiDoctor>) -> Result<(), ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        self.directory
            .set_doctors(&scope, doctors.into_iter().map(Into::into).collect())?;
        Ok(())
    }

    /// Replace the tenant's open rooms.
    pub fn set_rooms(&self, tenant_id: String, rooms: Vec<FfiRoom>) -> Result<(), ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        self.directory
            .set_rooms(&scope, rooms.into_iter().map(Into::into).collect())?;
        Ok(())
    }

    /// Replace the tenant's booked appointments.
    pub fn set_appointments(
        &self,
        tenant_id: String,
        appointments: Vec<FfiAppointment>,
    ) -> Result<(), ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let appointments = appointments
            .into_iter()
            .map(Appointment::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        self.directory.set_appointments(&scope, appointments)?;
        Ok(())
    }

    /// Add or update a patient's name.
    pub fn upsert_patient(
        &self,
        tenant_id: String,
        patient_id: String,
        first_name: String,
        last_name: String,
    ) -> Result<(), ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        self.directory.upsert_patient(
            &scope,
            &patient_id,
            PatientName {
                first_name,
                last_name,
            },
        )?;
        Ok(())
    }

    /// Toggle the optimizer pass that follows each check-in.
    pub fn set_auto_optimization(&self, tenant_id: String, enabled: bool) -> Result<(), ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let settings = TenantSettings {
            auto_queue_optimization: enabled,
            ..self.directories.settings.get(&scope)?
        };
        self.directory.set_settings(&scope, settings)?;
        Ok(())
    }

    /// Set the clinic's UTC offset; tickets roll over at local midnight.
    pub fn set_utc_offset(&self, tenant_id: String, minutes: i32) -> Result<(), ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        if minutes.abs() > 14 * 60 {
            return Err(ClinicQueueError::InvalidInput(format!(
                "utc offset out of range: {} minutes",
                minutes
            )));
        }
        let settings = TenantSettings {
            utc_offset_minutes: minutes,
            ..self.directories.settings.get(&scope)?
        };
        self.directory.set_settings(&scope, settings)?;
        Ok(())
    }

    // =========================================================================
    // Queue Operations
    // =========================================================================

    /// Check a patient in and issue a ticket.
    pub fn enqueue(
        &self,
        tenant_id: String,
        request: FfiEnqueueRequest,
    ) -> Result<FfiQueueEntry, ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let request = EnqueueRequest::try_from(request)?;
        let db = self.db.lock()?;
        let service = QueueService::new(&db, &self.directories, &self.config);
        Ok(service.enqueue(&scope, request)?.into())
    }

    /// Get an entry by ID.
    pub fn get_entry(&self, tenant_id: String, entry_id: String) -> Result<FfiQueueEntry, ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let db = self.db.lock()?;
        let service = QueueService::new(&db, &self.directories, &self.config);
        Ok(service.get(&scope, &entry_id)?.into())
    }

    /// Active entries in service order.
    pub fn list_active(
        &self,
        tenant_id: String,
        queue_type: Option<String>,
        doctor_id: Option<String>,
    ) -> Result<Vec<FfiQueueEntry>, ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let filter = queue::ActiveFilter {
            queue_type: queue_type.as_deref().map(parse_queue_type).transpose()?,
            doctor_id,
            ..Default::default()
        };
        let db = self.db.lock()?;
        let service = QueueService::new(&db, &self.directories, &self.config);
        let entries = service.list_active(&scope, &filter)?;
        Ok(entries.into_iter().map(Into::into).collect())
    }

    /// Apply a staff action: call, start, complete, cancel or no_show.
    pub fn transition(
        &self,
        tenant_id: String,
        entry_id: String,
        action: String,
    ) -> Result<FfiQueueEntry, ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let action = QueueAction::parse(&action)
            .ok_or_else(|| ClinicQueueError::InvalidInput(format!("unknown action: {}", action)))?;
        let db = self.db.lock()?;
        let service = QueueService::new(&db, &self.directories, &self.config);
        Ok(service.transition(&scope, &entry_id, action)?.into())
    }

    /// Move a waiting entry ahead of every non-urgent entry.
    pub fn mark_urgent(&self, tenant_id: String, entry_id: String) -> Result<FfiQueueEntry, ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let db = self.db.lock()?;
        let service = QueueService::new(&db, &self.directories, &self.config);
        Ok(service.mark_urgent(&scope, &entry_id)?.into())
    }

    /// Record triage vitals and notes.
    pub fn record_vitals(
        &self,
        tenant_id: String,
        entry_id: String,
        vitals: FfiVitals,
        notes: Option<String>,
    ) -> Result<FfiQueueEntry, ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let mut vitals: VitalsSnapshot = vitals.into();
        vitals.recorded_at = Some(Utc::now());
        let db = self.db.lock()?;
        let service = QueueService::new(&db, &self.directories, &self.config);
        Ok(service
            .record_triage(&scope, &entry_id, &vitals, notes.as_deref())?
            .into())
    }

    /// Optimizer changes recorded for an entry, oldest first.
    pub fn entry_history(
        &self,
        tenant_id: String,
        entry_id: String,
    ) -> Result<Vec<FfiQueueChange>, ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let db = self.db.lock()?;
        let service = QueueService::new(&db, &self.directories, &self.config);
        let history = service.history(&scope, &entry_id)?;
        Ok(history.into_iter().map(|r| r.change.into()).collect())
    }

    // =========================================================================
    // Optimizer & Display
    // =========================================================================

    /// Run one optimizer pass for the tenant.
    pub fn run_optimizer(&self, tenant_id: String) -> Result<FfiOptimizationReport, ClinicQueueError> {
        let scope = scope(&tenant_id)?;
        let db = self.db.lock()?;
        let service = QueueService::new(&db, &self.directories, &self.config);
        Ok(service.run_optimizer(&scope)?.into())
    }

    /// Display board rows. Never fails; problems yield an empty board.
    pub fn project_display(
        &self,
        tenant_id: String,
        queue_type: Option<String>,
        doctor_id: Option<String>,
        limit: Option<u32>,
    ) -> Vec<FfiDisplayRow> {
        let Ok(scope) = scope(&tenant_id) else {
            return Vec::new();
        };
        let Ok(queue_type) = queue_type.as_deref().map(parse_queue_type).transpose() else {
            return Vec::new();
        };
        let Ok(db) = self.db.lock() else {
            tracing::warn!(tenant = scope.id(), "Database lock poisoned, empty display");
            return Vec::new();
        };
        let filter = DisplayFilter {
            queue_type,
            doctor_id,
            limit: limit.map(|l| l as usize),
        };
        let service = QueueService::new(&db, &self.directories, &self.config);
        service
            .project_display(&scope, &filter)
            .into_iter()
            .map(Into::into)
            .collect()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Oldest pending notifications across tenants.
    ///
    /// They stay pending until acknowledged.
    pub fn take_pending_notifications(&self, limit: u32) -> Result<Vec<FfiNotification>, ClinicQueueError> {
        let db = self.db.lock()?;
        let pending = db.list_pending_notifications(limit as usize)?;
        Ok(pending.into_iter().map(Into::into).collect())
    }

    /// Report delivery of a notification. Returns its new status.
    pub fn acknowledge_notification(
        &self,
        notification_id: String,
        delivered: bool,
        error: Option<String>,
    ) -> Result<String, ClinicQueueError> {
        let db = self.db.lock()?;
        if delivered {
            if !db.mark_notification_sent(&notification_id)? {
                return Err(ClinicQueueError::NotFound(format!(
                    "pending notification {}",
                    notification_id
                )));
            }
            return Ok(models::NotificationStatus::Sent.as_str().to_string());
        }
        let status = db.record_notification_failure(
            &notification_id,
            error.as_deref().unwrap_or("delivery failed"),
            self.config.notification_max_attempts,
        )?;
        Ok(status.as_str().to_string())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe doctor.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDoctor {
    pub id: String,
    pub name: String,
    pub specialization: Option<String>,
}

impl From<FfiDoctor> for Doctor {
    fn from(d: FfiDoctor) -> Self {
        Doctor {
            id: d.id,
            name: d.name,
            specialization: d.specialization,
        }
    }
}

/// FFI-safe room.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRoom {
    pub id: String,
    pub name: String,
}

impl From<FfiRoom> for Room {
    fn from(r: FfiRoom) -> Self {
        Room::new(r.id, r.name)
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: String,
    pub doctor_id: String,
    pub patient_id: Option<String>,
    /// RFC 3339
    pub starts_at: String,
}

impl TryFrom<FfiAppointment> for Appointment {
    type Error = ClinicQueueError;

    fn try_from(a: FfiAppointment) -> Result<Self, Self::Error> {
        Ok(Appointment {
            starts_at: parse_timestamp(&a.starts_at)?,
            id: a.id,
            doctor_id: a.doctor_id,
            patient_id: a.patient_id,
        })
    }
}

/// FFI-safe check-in request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEnqueueRequest {
    pub patient_id: String,
    /// "appointment", "walk_in" or "follow_up"
    pub queue_type: String,
    pub appointment_id: Option<String>,
    pub visit_id: Option<String>,
    pub doctor_id: Option<String>,
    pub room_id: Option<String>,
    pub priority: Option<i64>,
    /// "reception" (default), "kiosk" or "online"
    pub check_in_method: Option<String>,
    pub notes: Option<String>,
}

impl TryFrom<FfiEnqueueRequest> for EnqueueRequest {
    type Error = ClinicQueueError;

    fn try_from(r: FfiEnqueueRequest) -> Result<Self, Self::Error> {
        let check_in_method = match r.check_in_method.as_deref() {
            Some(m) => CheckInMethod::parse(m).ok_or_else(|| {
                ClinicQueueError::InvalidInput(format!("unknown check-in method: {}", m))
            })?,
            None => CheckInMethod::default(),
        };
        Ok(EnqueueRequest {
            queue_type: parse_queue_type(&r.queue_type)?,
            patient_id: r.patient_id,
            appointment_id: r.appointment_id,
            visit_id: r.visit_id,
            doctor_id: r.doctor_id,
            room_id: r.room_id,
            priority: r.priority,
            check_in_method,
            notes: r.notes,
        })
    }
}

/// FFI-safe triage vitals.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVitals {
    pub blood_pressure: Option<String>,
    pub pulse_bpm: Option<u32>,
    pub temperature_c: Option<f64>,
    pub spo2_percent: Option<u32>,
    pub weight_kg: Option<f64>,
}

impl From<FfiVitals> for VitalsSnapshot {
    fn from(v: FfiVitals) -> Self {
        VitalsSnapshot {
            blood_pressure: v.blood_pressure,
            pulse_bpm: v.pulse_bpm,
            temperature_c: v.temperature_c,
            spo2_percent: v.spo2_percent,
            weight_kg: v.weight_kg,
            recorded_at: None,
        }
    }
}

impl From<VitalsSnapshot> for FfiVitals {
    fn from(v: VitalsSnapshot) -> Self {
        Self {
            blood_pressure: v.blood_pressure,
            pulse_bpm: v.pulse_bpm,
            temperature_c: v.temperature_c,
            spo2_percent: v.spo2_percent,
            weight_kg: v.weight_kg,
        }
    }
}

/// FFI-safe queue entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQueueEntry {
    pub id: String,
    pub tenant_id: String,
    pub queue_number: String,
    /// YYYY-MM-DD
    pub queue_date: String,
    pub queue_type: String,
    pub patient_id: String,
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
    pub appointment_id: Option<String>,
    pub visit_id: Option<String>,
    pub doctor_id: Option<String>,
    pub room_id: Option<String>,
    pub status: String,
    pub priority: i64,
    pub urgent: bool,
    pub queued_at: String,
    pub called_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub check_in_method: String,
    pub vitals: FfiVitals,
    pub notes: Option<String>,
    pub estimated_wait_minutes: Option<i64>,
    pub checked_in: bool,
}

impl From<QueueEntry> for FfiQueueEntry {
    fn from(e: QueueEntry) -> Self {
        Self {
            id: e.id,
            tenant_id: e.tenant_id,
            queue_number: e.queue_number,
            queue_date: e.queue_date.to_string(),
            queue_type: e.queue_type.as_str().to_string(),
            patient_id: e.patient_id,
            patient_first_name: e.patient_first_name,
            patient_last_name: e.patient_last_name,
            appointment_id: e.appointment_id,
            visit_id: e.visit_id,
            doctor_id: e.doctor_id,
            room_id: e.room_id,
            status: e.status.as_str().to_string(),
            priority: e.priority,
            urgent: e.urgent,
            queued_at: format_timestamp(&e.queued_at),
            called_at: e.called_at.as_ref().map(format_timestamp),
            started_at: e.started_at.as_ref().map(format_timestamp),
            completed_at: e.completed_at.as_ref().map(format_timestamp),
            check_in_method: e.check_in_method.as_str().to_string(),
            vitals: e.vitals.into(),
            notes: e.notes,
            estimated_wait_minutes: e.estimated_wait_minutes,
            checked_in: e.checked_in,
        }
    }
}

/// FFI-safe optimizer change.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQueueChange {
    pub entry_id: String,
    pub action: String,
    pub reason: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl From<models::QueueChange> for FfiQueueChange {
    fn from(c: models::QueueChange) -> Self {
        Self {
            entry_id: c.entry_id,
            action: c.action.as_str().to_string(),
            reason: c.reason,
            old_value: c.old_value,
            new_value: c.new_value,
        }
    }
}

/// FFI-safe allocation skip.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAllocationSkip {
    pub entry_id: String,
    pub reason: String,
}

impl From<models::AllocationSkip> for FfiAllocationSkip {
    fn from(s: models::AllocationSkip) -> Self {
        Self {
            entry_id: s.entry_id,
            reason: s.reason,
        }
    }
}

/// FFI-safe optimizer metrics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOptimizationMetrics {
    pub average_wait_minutes: f64,
    pub total_active: u32,
    pub waiting: u32,
    pub in_progress: u32,
    pub doctors_available: u32,
    pub rooms_available: u32,
}

impl From<queue::OptimizationMetrics> for FfiOptimizationMetrics {
    fn from(m: queue::OptimizationMetrics) -> Self {
        Self {
            average_wait_minutes: m.average_wait_minutes,
            total_active: m.total_active as u32,
            waiting: m.waiting as u32,
            in_progress: m.in_progress as u32,
            doctors_available: m.doctors_available as u32,
            rooms_available: m.rooms_available as u32,
        }
    }
}

/// FFI-safe optimizer report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOptimizationReport {
    pub pass_id: String,
    pub changes: Vec<FfiQueueChange>,
    pub skipped: Vec<FfiAllocationSkip>,
    pub metrics: FfiOptimizationMetrics,
}

impl From<OptimizationReport> for FfiOptimizationReport {
    fn from(r: OptimizationReport) -> Self {
        Self {
            pass_id: r.pass_id,
            changes: r.changes.into_iter().map(Into::into).collect(),
            skipped: r.skipped.into_iter().map(Into::into).collect(),
            metrics: r.metrics.into(),
        }
    }
}

/// FFI-safe display row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDisplayRow {
    pub position: Option<u32>,
    pub queue_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub doctor_name: Option<String>,
    pub room_name: Option<String>,
    pub status: String,
    pub estimated_wait_minutes: Option<i64>,
}

impl From<DisplayRow> for FfiDisplayRow {
    fn from(r: DisplayRow) -> Self {
        Self {
            position: r.position.map(|p| p as u32),
            queue_number: r.queue_number,
            first_name: r.first_name,
            last_name: r.last_name,
            doctor_name: r.doctor_name,
            room_name: r.room_name,
            status: r.status.as_str().to_string(),
            estimated_wait_minutes: r.estimated_wait_minutes,
        }
    }
}

/// FFI-safe outbound notification.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNotification {
    pub id: String,
    pub tenant_id: String,
    pub entry_id: String,
    pub kind: String,
    pub payload_json: String,
    pub attempts: u32,
    pub created_at: String,
}

impl From<models::NotificationCommand> for FfiNotification {
    fn from(n: models::NotificationCommand) -> Self {
        Self {
            id: n.id,
            tenant_id: n.tenant_id,
            entry_id: n.entry_id,
            kind: n.kind.as_str().to_string(),
            payload_json: n.payload.to_string(),
            attempts: n.attempts,
            created_at: format_timestamp(&n.created_at),
        }
    }
}
