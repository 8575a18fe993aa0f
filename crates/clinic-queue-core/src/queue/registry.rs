//! Tenant-scoped queue entry access and the lifecycle state machine.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{PriorityScheduler, QueueError, QueueResult};
use crate::db::{ActiveFilter, AuditRecord, Database};
use crate::models::{QueueAction, QueueEntry, QueueStatus, TenantScope, VitalsSnapshot};

/// Read-validate-write attempts before reporting a conflict.
const MAX_CONDITIONAL_ATTEMPTS: u32 = 3;

/// Entry lookups and status changes for one database.
pub struct QueueRegistry<'a> {
    db: &'a Database,
    scheduler: PriorityScheduler,
}

impl<'a> QueueRegistry<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            scheduler: PriorityScheduler::new(),
        }
    }

    /// Get an entry; other tenants' entries are `NotFound`.
    pub fn get(&self, scope: &TenantScope, id: &str) -> QueueResult<QueueEntry> {
        self.db
            .get_queue_entry(scope, id)?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// Waiting and in-progress entries in service order.
    pub fn list_active(
        &self,
        scope: &TenantScope,
        filter: &ActiveFilter,
    ) -> QueueResult<Vec<QueueEntry>> {
        let entries = self.db.list_active_entries(scope, filter)?;
        Ok(self.scheduler.order(entries))
    }

    /// Apply a staff action.
    ///
    /// Illegal actions fail with [`QueueError::Transition`] and write nothing.
    /// Entering a terminal state releases the doctor and room.
    pub fn transition(
        &self,
        scope: &TenantScope,
        id: &str,
        action: QueueAction,
        now: DateTime<Utc>,
    ) -> QueueResult<QueueEntry> {
        for _ in 0..MAX_CONDITIONAL_ATTEMPTS {
            let current = self.get(scope, id)?;
            let next = current.status.apply(action).ok_or(QueueError::Transition {
                from: current.status,
                action,
            })?;
            let updated = stamp(&current, next, action, now);

            if self.db.update_entry_lifecycle(scope, &current, &updated)? {
                info!(
                    tenant = scope.id(),
                    ticket = %updated.queue_number,
                    action = action.as_str(),
                    status = next.as_str(),
                    "Queue entry transitioned"
                );
                return self.get(scope, id);
            }
            debug!(tenant = scope.id(), entry_id = id, "Entry changed underneath transition, retrying");
        }
        Err(QueueError::Conflict(id.to_string()))
    }

    /// Flag a waiting entry urgent and move it to the front.
    pub fn mark_urgent(&self, scope: &TenantScope, id: &str) -> QueueResult<QueueEntry> {
        let waiting_only = ActiveFilter {
            status: Some(QueueStatus::Waiting),
            ..Default::default()
        };

        for _ in 0..MAX_CONDITIONAL_ATTEMPTS {
            let entry = self.get(scope, id)?;
            if !entry.is_waiting() {
                return Err(QueueError::Validation(format!(
                    "only waiting entries can be marked urgent (entry is {})",
                    entry.status.as_str()
                )));
            }

            let waiting = self.db.list_active_entries(scope, &waiting_only)?;
            let priority = self
                .scheduler
                .urgent_priority(&entry, &waiting)
                .unwrap_or(entry.priority);
            if entry.urgent && priority == entry.priority {
                return Ok(entry);
            }

            if self
                .db
                .update_priority_if(scope, id, entry.priority, priority, true)?
            {
                info!(
                    tenant = scope.id(),
                    ticket = %entry.queue_number,
                    from = entry.priority,
                    to = priority,
                    "Entry marked urgent"
                );
                return self.get(scope, id);
            }
        }
        Err(QueueError::Conflict(id.to_string()))
    }

    /// Record triage vitals and notes on an active entry.
    pub fn record_triage(
        &self,
        scope: &TenantScope,
        id: &str,
        vitals: &VitalsSnapshot,
        notes: Option<&str>,
    ) -> QueueResult<QueueEntry> {
        if !self.db.update_triage(scope, id, vitals, notes)? {
            let entry = self.get(scope, id)?;
            return Err(QueueError::Validation(format!(
                "triage can only be recorded on active entries (entry is {})",
                entry.status.as_str()
            )));
        }
        self.get(scope, id)
    }

    /// Optimizer audit trail for one entry.
    pub fn history(&self, scope: &TenantScope, id: &str) -> QueueResult<Vec<AuditRecord>> {
        self.get(scope, id)?;
        Ok(self.db.list_changes_for_entry(scope, id)?)
    }
}

/// The entry as it looks after `action`, with timestamps kept monotonic.
fn stamp(
    entry: &QueueEntry,
    next: QueueStatus,
    action: QueueAction,
    now: DateTime<Utc>,
) -> QueueEntry {
    let mut updated = entry.clone();
    updated.status = next;
    let at = now.max(entry.queued_at);

    match action {
        QueueAction::Call => updated.called_at = Some(at),
        QueueAction::Start => {
            updated.called_at.get_or_insert(at);
            updated.started_at = Some(at);
            updated.estimated_wait_minutes = Some(0);
        }
        QueueAction::Complete => {
            let floor = entry.started_at.unwrap_or(at);
            updated.completed_at = Some(at.max(floor));
        }
        QueueAction::Cancel | QueueAction::NoShow => {}
    }

    if next.is_terminal() {
        updated.doctor_id = None;
        updated.room_id = None;
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueueType;
    use chrono::TimeZone;

    fn scope() -> TenantScope {
        TenantScope::new("clinicA").unwrap()
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap()
    }

    fn insert(db: &Database, seq: u32, priority: i64) -> QueueEntry {
        let mut e = QueueEntry::new(&scope(), format!("p{}", seq), QueueType::WalkIn, priority, at(seq));
        e.queue_number = format!("W20240301-{:03}", seq);
        db.insert_queue_entry(&e).unwrap();
        e
    }

    #[test]
    fn test_full_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let registry = QueueRegistry::new(&db);
        let entry = insert(&db, 1, 5);
        db.update_doctor_if(&scope(), &entry.id, None, "d1").unwrap();

        let called = registry.transition(&scope(), &entry.id, QueueAction::Call, at(10)).unwrap();
        assert_eq!(called.status, QueueStatus::Waiting);
        assert_eq!(called.called_at, Some(at(10)));

        let started = registry.transition(&scope(), &entry.id, QueueAction::Start, at(12)).unwrap();
        assert_eq!(started.status, QueueStatus::InProgress);
        assert_eq!(started.called_at, Some(at(10)));
        assert_eq!(started.started_at, Some(at(12)));
        assert_eq!(started.estimated_wait_minutes, Some(0));

        let done = registry.transition(&scope(), &entry.id, QueueAction::Complete, at(30)).unwrap();
        assert_eq!(done.status, QueueStatus::Completed);
        assert_eq!(done.consultation_duration_minutes(), Some(18));
        assert_eq!(done.doctor_id, None);

        let stored = registry.get(&scope(), &entry.id).unwrap();
        assert_eq!(stored, done);
    }

    #[test]
    fn test_illegal_transition_leaves_entry_unchanged() {
        let db = Database::open_in_memory().unwrap();
        let registry = QueueRegistry::new(&db);
        let entry = insert(&db, 1, 5);

        let err = registry
            .transition(&scope(), &entry.id, QueueAction::Complete, at(10))
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::Transition {
                from: QueueStatus::Waiting,
                action: QueueAction::Complete
            }
        ));
        assert_eq!(registry.get(&scope(), &entry.id).unwrap(), entry);

        registry.transition(&scope(), &entry.id, QueueAction::Cancel, at(10)).unwrap();
        let err = registry
            .transition(&scope(), &entry.id, QueueAction::Start, at(11))
            .unwrap_err();
        assert!(matches!(err, QueueError::Transition { from: QueueStatus::Cancelled, .. }));
    }

    #[test]
    fn test_start_clamped_to_queued_at() {
        let db = Database::open_in_memory().unwrap();
        let registry = QueueRegistry::new(&db);
        let entry = insert(&db, 20, 5);

        // Clock skew: "now" is before the entry was queued
        let started = registry.transition(&scope(), &entry.id, QueueAction::Start, at(5)).unwrap();
        assert_eq!(started.started_at, Some(entry.queued_at));
    }

    #[test]
    fn test_other_tenant_cannot_transition() {
        let db = Database::open_in_memory().unwrap();
        let registry = QueueRegistry::new(&db);
        let entry = insert(&db, 1, 5);

        let other = TenantScope::new("clinicB").unwrap();
        let err = registry
            .transition(&other, &entry.id, QueueAction::Start, at(10))
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[test]
    fn test_mark_urgent_moves_to_front() {
        let db = Database::open_in_memory().unwrap();
        let registry = QueueRegistry::new(&db);
        insert(&db, 1, 5);
        insert(&db, 2, 3);
        let last = insert(&db, 3, 5);

        let urgent = registry.mark_urgent(&scope(), &last.id).unwrap();
        assert!(urgent.urgent);
        assert_eq!(urgent.priority, 2);

        let active = registry.list_active(&scope(), &ActiveFilter::default()).unwrap();
        assert_eq!(active[0].id, last.id);

        // Idempotent
        assert_eq!(registry.mark_urgent(&scope(), &last.id).unwrap(), urgent);
    }

    #[test]
    fn test_mark_urgent_requires_waiting() {
        let db = Database::open_in_memory().unwrap();
        let registry = QueueRegistry::new(&db);
        let entry = insert(&db, 1, 5);
        registry.transition(&scope(), &entry.id, QueueAction::Start, at(10)).unwrap();

        assert!(matches!(
            registry.mark_urgent(&scope(), &entry.id),
            Err(QueueError::Validation(_))
        ));
    }

    #[test]
    fn test_record_triage() {
        let db = Database::open_in_memory().unwrap();
        let registry = QueueRegistry::new(&db);
        let entry = insert(&db, 1, 5);
        let vitals = VitalsSnapshot {
            pulse_bpm: Some(88),
            ..Default::default()
        };

        let updated = registry
            .record_triage(&scope(), &entry.id, &vitals, Some("dizzy"))
            .unwrap();
        assert_eq!(updated.vitals.pulse_bpm, Some(88));

        registry.transition(&scope(), &entry.id, QueueAction::NoShow, at(30)).unwrap();
        assert!(registry.record_triage(&scope(), &entry.id, &vitals, None).is_err());
    }
}
