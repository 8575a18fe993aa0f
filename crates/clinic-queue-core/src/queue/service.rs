//! Queue operations exposed to hosts.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use super::{
    ActiveFilter, DisplayFilter, DisplayProjector, DisplayRow, OptimizationReport,
    QueueError, QueueNumberGenerator, QueueOptimizer, QueueRegistry, QueueResult,
    ResourceAllocator,
};
use crate::config::QueueConfig;
use crate::db::{AuditRecord, Database};
use crate::directory::Directories;
use crate::models::{
    CheckInMethod, NotificationCommand, NotificationKind, QueueAction, QueueEntry, QueueType,
    TenantScope, VitalsSnapshot,
};

/// A patient checking in.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueRequest {
    pub patient_id: String,
    pub queue_type: QueueType,
    /// Required for appointment queues
    pub appointment_id: Option<String>,
    pub visit_id: Option<String>,
    pub doctor_id: Option<String>,
    pub room_id: Option<String>,
    /// Falls back to the configured default
    pub priority: Option<i64>,
    pub check_in_method: CheckInMethod,
    pub notes: Option<String>,
}

impl EnqueueRequest {
    pub fn new(patient_id: impl Into<String>, queue_type: QueueType) -> Self {
        Self {
            patient_id: patient_id.into(),
            queue_type,
            appointment_id: None,
            visit_id: None,
            doctor_id: None,
            room_id: None,
            priority: None,
            check_in_method: CheckInMethod::default(),
            notes: None,
        }
    }

    fn validate(&self) -> QueueResult<()> {
        if self.patient_id.trim().is_empty() {
            return Err(QueueError::Validation("patient_id is required".into()));
        }
        if self.queue_type == QueueType::Appointment
            && self.appointment_id.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            return Err(QueueError::Validation(
                "appointment queue entries need an appointment_id".into(),
            ));
        }
        if let Some(priority) = self.priority {
            if priority < 0 {
                return Err(QueueError::Validation("priority must not be negative".into()));
            }
        }
        for (field, value) in [("doctor_id", &self.doctor_id), ("room_id", &self.room_id)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(QueueError::Validation(format!("{} must not be blank", field)));
            }
        }
        Ok(())
    }
}

/// Entry point for all queue operations on one database.
pub struct QueueService<'a> {
    db: &'a Database,
    directories: &'a Directories,
    config: &'a QueueConfig,
    registry: QueueRegistry<'a>,
}

impl<'a> QueueService<'a> {
    pub fn new(db: &'a Database, directories: &'a Directories, config: &'a QueueConfig) -> Self {
        Self {
            db,
            directories,
            config,
            registry: QueueRegistry::new(db),
        }
    }

    /// Check a patient in and issue a ticket.
    pub fn enqueue(&self, scope: &TenantScope, request: EnqueueRequest) -> QueueResult<QueueEntry> {
        self.enqueue_at(scope, request, Utc::now())
    }

    pub fn enqueue_at(
        &self,
        scope: &TenantScope,
        request: EnqueueRequest,
        now: DateTime<Utc>,
    ) -> QueueResult<QueueEntry> {
        request.validate()?;

        let mut entry = QueueEntry::new(
            scope,
            request.patient_id,
            request.queue_type,
            request.priority.unwrap_or(self.config.default_priority),
            now,
        );
        entry.appointment_id = request.appointment_id;
        entry.visit_id = request.visit_id;
        entry.doctor_id = request.doctor_id;
        entry.room_id = request.room_id;
        entry.check_in_method = request.check_in_method;
        entry.notes = request.notes;
        entry.queue_date = self.queue_day(scope, now);

        // Name snapshot; an unreachable directory only costs the snapshot
        match self.directories.patients.lookup(scope, &entry.patient_id) {
            Ok(Some(name)) => {
                entry.patient_first_name = Some(name.first_name);
                entry.patient_last_name = Some(name.last_name);
            }
            Ok(None) => {
                return Err(QueueError::Validation(format!(
                    "unknown patient: {}",
                    entry.patient_id
                )))
            }
            Err(e) => warn!(
                tenant = scope.id(),
                patient_id = %entry.patient_id,
                error = %e,
                "Patient lookup failed, queuing without name"
            ),
        }

        QueueNumberGenerator::new(self.db, self.config).issue(scope, &mut entry)?;
        info!(
            tenant = scope.id(),
            ticket = %entry.queue_number,
            entry_id = %entry.id,
            "Patient queued"
        );

        self.notify(
            scope,
            &entry,
            NotificationKind::TicketIssued,
            serde_json::json!({
                "ticket": entry.queue_number,
                "queue_type": entry.queue_type.as_str(),
            }),
        );

        if self.auto_optimize(scope) {
            self.optimize_after_change(scope, now);
        }
        self.registry.get(scope, &entry.id)
    }

    /// Waiting and in-progress entries in service order.
    pub fn list_active(
        &self,
        scope: &TenantScope,
        filter: &ActiveFilter,
    ) -> QueueResult<Vec<QueueEntry>> {
        self.registry.list_active(scope, filter)
    }

    pub fn get(&self, scope: &TenantScope, entry_id: &str) -> QueueResult<QueueEntry> {
        self.registry.get(scope, entry_id)
    }

    /// Apply a staff action to an entry.
    pub fn transition(
        &self,
        scope: &TenantScope,
        entry_id: &str,
        action: QueueAction,
    ) -> QueueResult<QueueEntry> {
        self.transition_at(scope, entry_id, action, Utc::now())
    }

    pub fn transition_at(
        &self,
        scope: &TenantScope,
        entry_id: &str,
        action: QueueAction,
        now: DateTime<Utc>,
    ) -> QueueResult<QueueEntry> {
        let mut entry = self.registry.transition(scope, entry_id, action, now)?;

        // The transition has committed; a failed room lookup leaves the room unset
        if action == QueueAction::Start {
            match ResourceAllocator::new(self.db, self.directories, self.config)
                .assign_room_on_start(scope, &entry)
            {
                Ok(room_id) => entry.room_id = room_id,
                Err(e) => warn!(
                    tenant = scope.id(),
                    entry_id = %entry.id,
                    error = %e,
                    "Room assignment at start failed"
                ),
            }
        }

        let (kind, payload) = match action {
            QueueAction::Call => (
                NotificationKind::PatientCalled,
                serde_json::json!({
                    "ticket": entry.queue_number,
                    "doctor_id": entry.doctor_id,
                    "room_id": entry.room_id,
                }),
            ),
            _ => (
                NotificationKind::StatusChanged,
                serde_json::json!({
                    "ticket": entry.queue_number,
                    "status": entry.status.as_str(),
                }),
            ),
        };
        self.notify(scope, &entry, kind, payload);

        Ok(entry)
    }

    /// Flag an entry urgent; it moves ahead of every non-urgent entry.
    pub fn mark_urgent(&self, scope: &TenantScope, entry_id: &str) -> QueueResult<QueueEntry> {
        let entry = self.registry.mark_urgent(scope, entry_id)?;
        if self.auto_optimize(scope) {
            self.optimize_after_change(scope, Utc::now());
            return self.registry.get(scope, entry_id);
        }
        Ok(entry)
    }

    /// Record triage vitals and notes.
    pub fn record_triage(
        &self,
        scope: &TenantScope,
        entry_id: &str,
        vitals: &VitalsSnapshot,
        notes: Option<&str>,
    ) -> QueueResult<QueueEntry> {
        self.registry.record_triage(scope, entry_id, vitals, notes)
    }

    /// Optimizer audit trail for one entry.
    pub fn history(&self, scope: &TenantScope, entry_id: &str) -> QueueResult<Vec<AuditRecord>> {
        self.registry.history(scope, entry_id)
    }

    /// Run one optimizer pass.
    pub fn run_optimizer(&self, scope: &TenantScope) -> QueueResult<OptimizationReport> {
        QueueOptimizer::new(self.db, self.directories, self.config).run(scope)
    }

    /// Display board rows; empty on any failure.
    pub fn project_display(&self, scope: &TenantScope, filter: &DisplayFilter) -> Vec<DisplayRow> {
        DisplayProjector::new(self.db, self.directories, self.config).project(scope, filter)
    }

    /// The clinic-local day a ticket issued at `now` belongs to.
    fn queue_day(&self, scope: &TenantScope, now: DateTime<Utc>) -> NaiveDate {
        match self.directories.settings.get(scope) {
            Ok(settings) => settings.local_date(now),
            Err(e) => {
                warn!(tenant = scope.id(), error = %e, "Settings unavailable, using the UTC day");
                now.date_naive()
            }
        }
    }

    fn auto_optimize(&self, scope: &TenantScope) -> bool {
        match self.directories.settings.get(scope) {
            Ok(settings) => settings.auto_queue_optimization,
            Err(e) => {
                warn!(tenant = scope.id(), error = %e, "Settings unavailable, skipping optimizer");
                false
            }
        }
    }

    /// The triggering operation already committed; a failed pass is only logged.
    fn optimize_after_change(&self, scope: &TenantScope, now: DateTime<Utc>) {
        if let Err(e) = QueueOptimizer::new(self.db, self.directories, self.config).run_at(scope, now)
        {
            warn!(tenant = scope.id(), error = %e, "Event-triggered optimizer pass failed");
        }
    }

    fn notify(
        &self,
        scope: &TenantScope,
        entry: &QueueEntry,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) {
        let command = NotificationCommand::new(scope.id(), &entry.id, kind, payload);
        if let Err(e) = self.db.enqueue_notification(&command) {
            warn!(
                tenant = scope.id(),
                entry_id = %entry.id,
                kind = kind.as_str(),
                error = %e,
                "Failed to queue notification"
            );
        }
    }
}
