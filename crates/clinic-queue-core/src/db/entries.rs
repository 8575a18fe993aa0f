//! Queue entry database operations.
//!
//! Every method takes a [`TenantScope`]; no statement here runs without a
//! `tenant_id = ?` predicate. Mutations are conditional updates that only
//! apply while the row still holds the value the caller read, and report
//! whether they applied.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{
    classify_insert_error, from_db_timestamp, from_db_timestamp_opt, to_db_timestamp, Database,
    DbError, DbResult,
};
use crate::models::{
    CheckInMethod, QueueEntry, QueueStatus, QueueType, TenantScope, VitalsSnapshot,
};

const ENTRY_COLUMNS: &str = r#"
    id, tenant_id, queue_number, queue_date, queue_type, patient_id,
    patient_first_name, patient_last_name, appointment_id, visit_id,
    doctor_id, room_id, status, priority, urgent, queued_at, called_at,
    started_at, completed_at, checked_in, check_in_method, vitals, notes,
    estimated_wait_minutes
"#;

/// Optional narrowing of the active queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveFilter {
    pub queue_type: Option<QueueType>,
    pub doctor_id: Option<String>,
    pub room_id: Option<String>,
    /// Must be an active status; terminal statuses match nothing
    pub status: Option<QueueStatus>,
}

impl Database {
    /// Insert a new queue entry.
    ///
    /// Fails with [`DbError::Duplicate`] when the ticket is already taken.
    pub fn insert_queue_entry(&self, entry: &QueueEntry) -> DbResult<()> {
        let vitals_json = serde_json::to_string(&entry.vitals)?;

        self.conn
            .execute(
                r#"
                INSERT INTO queue_entries (
                    id, tenant_id, queue_number, queue_date, queue_type, patient_id,
                    patient_first_name, patient_last_name, appointment_id, visit_id,
                    doctor_id, room_id, status, priority, urgent, queued_at, called_at,
                    started_at, completed_at, checked_in, check_in_method, vitals, notes,
                    estimated_wait_minutes
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24
                )
                "#,
                params![
                    entry.id,
                    entry.tenant_id,
                    entry.queue_number,
                    entry.queue_date.to_string(),
                    entry.queue_type.as_str(),
                    entry.patient_id,
                    entry.patient_first_name,
                    entry.patient_last_name,
                    entry.appointment_id,
                    entry.visit_id,
                    entry.doctor_id,
                    entry.room_id,
                    entry.status.as_str(),
                    entry.priority,
                    entry.urgent,
                    to_db_timestamp(&entry.queued_at),
                    entry.called_at.as_ref().map(to_db_timestamp),
                    entry.started_at.as_ref().map(to_db_timestamp),
                    entry.completed_at.as_ref().map(to_db_timestamp),
                    entry.checked_in,
                    entry.check_in_method.as_str(),
                    vitals_json,
                    entry.notes,
                    entry.estimated_wait_minutes,
                ],
            )
            .map_err(|e| classify_insert_error(e, &entry.queue_number))?;
        Ok(())
    }

    /// Get an entry by ID within a tenant.
    pub fn get_queue_entry(&self, scope: &TenantScope, id: &str) -> DbResult<Option<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM queue_entries WHERE id = ?1 AND tenant_id = ?2",
            ENTRY_COLUMNS
        );
        self.conn
            .query_row(&sql, params![id, scope.id()], read_entry_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Count tickets already issued for a (tenant, type, day).
    pub fn count_tickets_for_day(
        &self,
        scope: &TenantScope,
        queue_type: QueueType,
        day: NaiveDate,
    ) -> DbResult<u32> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM queue_entries
            WHERE tenant_id = ?1 AND queue_type = ?2 AND queue_date = ?3
            "#,
            params![scope.id(), queue_type.as_str(), day.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// List waiting and in-progress entries, ordered by priority then arrival.
    pub fn list_active_entries(
        &self,
        scope: &TenantScope,
        filter: &ActiveFilter,
    ) -> DbResult<Vec<QueueEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM queue_entries
            WHERE tenant_id = ?1
              AND status IN ('waiting', 'in_progress')
              AND (?2 IS NULL OR queue_type = ?2)
              AND (?3 IS NULL OR doctor_id = ?3)
              AND (?4 IS NULL OR room_id = ?4)
              AND (?5 IS NULL OR status = ?5)
            ORDER BY priority ASC, queued_at ASC, id ASC
            "#,
            ENTRY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt.query_map(
            params![
                scope.id(),
                filter.queue_type.map(|t| t.as_str()),
                filter.doctor_id,
                filter.room_id,
                filter.status.map(|s| s.as_str()),
            ],
            read_entry_row,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }

    /// Consultation lengths (minutes) of the most recently completed entries.
    pub fn recent_consultation_minutes(
        &self,
        scope: &TenantScope,
        queue_type: Option<QueueType>,
        limit: usize,
    ) -> DbResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT started_at, completed_at FROM queue_entries
            WHERE tenant_id = ?1
              AND status = 'completed'
              AND started_at IS NOT NULL
              AND completed_at IS NOT NULL
              AND (?2 IS NULL OR queue_type = ?2)
            ORDER BY completed_at DESC
            LIMIT ?3
            "#,
        )?;

        let rows = stmt.query_map(
            params![scope.id(), queue_type.map(|t| t.as_str()), limit as i64],
            |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            },
        )?;

        let mut minutes = Vec::new();
        for row in rows {
            let (started, completed) = row?;
            let started = from_db_timestamp(&started)?;
            let completed = from_db_timestamp(&completed)?;
            minutes.push((completed - started).num_minutes().max(0));
        }
        Ok(minutes)
    }

    /// Write the entry's next lifecycle state if the row still matches `current`.
    ///
    /// Every column the write touches is guarded on its value in `current`;
    /// a concurrent change to any of them makes this return false. A room
    /// that another consultation occupies is not carried into `in_progress`.
    pub fn update_entry_lifecycle(
        &self,
        scope: &TenantScope,
        current: &QueueEntry,
        next: &QueueEntry,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE queue_entries SET
                status = ?3,
                called_at = ?4,
                started_at = ?5,
                completed_at = ?6,
                doctor_id = ?7,
                room_id = CASE
                    WHEN ?3 = 'in_progress' AND ?8 IS NOT NULL AND EXISTS (
                        SELECT 1 FROM queue_entries o
                        WHERE o.tenant_id = ?2 AND o.room_id = ?8
                          AND o.status = 'in_progress' AND o.id <> ?1
                    ) THEN NULL
                    ELSE ?8
                END,
                estimated_wait_minutes = ?9,
                updated_at = datetime('now')
            WHERE id = ?1 AND tenant_id = ?2
              AND status = ?10
              AND called_at IS ?11
              AND started_at IS ?12
              AND completed_at IS ?13
              AND doctor_id IS ?14
              AND room_id IS ?15
              AND estimated_wait_minutes IS ?16
            "#,
            params![
                current.id,
                scope.id(),
                next.status.as_str(),
                next.called_at.as_ref().map(to_db_timestamp),
                next.started_at.as_ref().map(to_db_timestamp),
                next.completed_at.as_ref().map(to_db_timestamp),
                next.doctor_id,
                next.room_id,
                next.estimated_wait_minutes,
                current.status.as_str(),
                current.called_at.as_ref().map(to_db_timestamp),
                current.started_at.as_ref().map(to_db_timestamp),
                current.completed_at.as_ref().map(to_db_timestamp),
                current.doctor_id,
                current.room_id,
                current.estimated_wait_minutes,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set the doctor if it still equals `expected` and the entry is active.
    ///
    /// Refuses a doctor who is consulting another entry of the tenant.
    pub fn update_doctor_if(
        &self,
        scope: &TenantScope,
        entry_id: &str,
        expected: Option<&str>,
        doctor_id: &str,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE queue_entries SET doctor_id = ?3, updated_at = datetime('now')
            WHERE id = ?1 AND tenant_id = ?2 AND doctor_id IS ?4
              AND status IN ('waiting', 'in_progress')
              AND NOT EXISTS (
                  SELECT 1 FROM queue_entries o
                  WHERE o.tenant_id = ?2 AND o.doctor_id = ?3
                    AND o.status = 'in_progress' AND o.id <> ?1
              )
            "#,
            params![entry_id, scope.id(), doctor_id, expected],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set the room if it still equals `expected`, the entry is in
    /// consultation and no other consultation of the tenant holds the room.
    pub fn update_room_if(
        &self,
        scope: &TenantScope,
        entry_id: &str,
        expected: Option<&str>,
        room_id: &str,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE queue_entries SET room_id = ?3, updated_at = datetime('now')
            WHERE id = ?1 AND tenant_id = ?2 AND room_id IS ?4 AND status = 'in_progress'
              AND NOT EXISTS (
                  SELECT 1 FROM queue_entries o
                  WHERE o.tenant_id = ?2 AND o.room_id = ?3
                    AND o.status = 'in_progress' AND o.id <> ?1
              )
            "#,
            params![entry_id, scope.id(), room_id, expected],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set priority (and the urgent flag) if the waiting entry still has `expected`.
    pub fn update_priority_if(
        &self,
        scope: &TenantScope,
        entry_id: &str,
        expected: i64,
        priority: i64,
        urgent: bool,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE queue_entries SET priority = ?3, urgent = ?4, updated_at = datetime('now')
            WHERE id = ?1 AND tenant_id = ?2 AND priority = ?5 AND status = 'waiting'
            "#,
            params![entry_id, scope.id(), priority, urgent, expected],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set the wait estimate if it still equals `expected` and the entry is active.
    pub fn update_estimate_if(
        &self,
        scope: &TenantScope,
        entry_id: &str,
        expected: Option<i64>,
        minutes: i64,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE queue_entries SET estimated_wait_minutes = ?3, updated_at = datetime('now')
            WHERE id = ?1 AND tenant_id = ?2 AND estimated_wait_minutes IS ?4
              AND status IN ('waiting', 'in_progress')
            "#,
            params![entry_id, scope.id(), minutes, expected],
        )?;
        Ok(rows_affected > 0)
    }

    /// Record triage vitals and notes on an active entry.
    pub fn update_triage(
        &self,
        scope: &TenantScope,
        entry_id: &str,
        vitals: &VitalsSnapshot,
        notes: Option<&str>,
    ) -> DbResult<bool> {
        let vitals_json = serde_json::to_string(vitals)?;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE queue_entries SET vitals = ?3, notes = ?4, updated_at = datetime('now')
            WHERE id = ?1 AND tenant_id = ?2 AND status IN ('waiting', 'in_progress')
            "#,
            params![entry_id, scope.id(), vitals_json, notes],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct QueueEntryRow {
    id: String,
    tenant_id: String,
    queue_number: String,
    queue_date: String,
    queue_type: String,
    patient_id: String,
    patient_first_name: Option<String>,
    patient_last_name: Option<String>,
    appointment_id: Option<String>,
    visit_id: Option<String>,
    doctor_id: Option<String>,
    room_id: Option<String>,
    status: String,
    priority: i64,
    urgent: bool,
    queued_at: String,
    called_at: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    checked_in: bool,
    check_in_method: String,
    vitals: String,
    notes: Option<String>,
    estimated_wait_minutes: Option<i64>,
}

fn read_entry_row(row: &Row<'_>) -> rusqlite::Result<QueueEntryRow> {
    Ok(QueueEntryRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        queue_number: row.get(2)?,
        queue_date: row.get(3)?,
        queue_type: row.get(4)?,
        patient_id: row.get(5)?,
        patient_first_name: row.get(6)?,
        patient_last_name: row.get(7)?,
        appointment_id: row.get(8)?,
        visit_id: row.get(9)?,
        doctor_id: row.get(10)?,
        room_id: row.get(11)?,
        status: row.get(12)?,
        priority: row.get(13)?,
        urgent: row.get(14)?,
        queued_at: row.get(15)?,
        called_at: row.get(16)?,
        started_at: row.get(17)?,
        completed_at: row.get(18)?,
        checked_in: row.get(19)?,
        check_in_method: row.get(20)?,
        vitals: row.get(21)?,
        notes: row.get(22)?,
        estimated_wait_minutes: row.get(23)?,
    })
}

impl TryFrom<QueueEntryRow> for QueueEntry {
    type Error = DbError;

    fn try_from(row: QueueEntryRow) -> Result<Self, Self::Error> {
        let queue_type = QueueType::parse(&row.queue_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown queue type: {}", row.queue_type)))?;
        let status = QueueStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown queue status: {}", row.status)))?;
        let check_in_method = CheckInMethod::parse(&row.check_in_method).ok_or_else(|| {
            DbError::Constraint(format!("Unknown check-in method: {}", row.check_in_method))
        })?;
        let queue_date = NaiveDate::parse_from_str(&row.queue_date, "%Y-%m-%d")?;
        let vitals: VitalsSnapshot = serde_json::from_str(&row.vitals)?;

        Ok(QueueEntry {
            id: row.id,
            tenant_id: row.tenant_id,
            queue_number: row.queue_number,
            queue_date,
            queue_type,
            patient_id: row.patient_id,
            patient_first_name: row.patient_first_name,
            patient_last_name: row.patient_last_name,
            appointment_id: row.appointment_id,
            visit_id: row.visit_id,
            doctor_id: row.doctor_id,
            room_id: row.room_id,
            status,
            priority: row.priority,
            urgent: row.urgent,
            queued_at: from_db_timestamp(&row.queued_at)?,
            called_at: from_db_timestamp_opt(row.called_at)?,
            started_at: from_db_timestamp_opt(row.started_at)?,
            completed_at: from_db_timestamp_opt(row.completed_at)?,
            checked_in: row.checked_in,
            check_in_method,
            vitals,
            notes: row.notes,
            estimated_wait_minutes: row.estimated_wait_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn scope(id: &str) -> TenantScope {
        TenantScope::new(id).unwrap()
    }

    fn make_entry(tenant: &str, number: &str, minute: u32, priority: i64) -> QueueEntry {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap();
        let mut entry = QueueEntry::new(
            &scope(tenant),
            format!("patient-{}", minute),
            QueueType::WalkIn,
            priority,
            at,
        );
        entry.queue_number = number.to_string();
        entry
    }

    #[test]
    fn test_insert_and_get_entry() {
        let db = Database::open_in_memory().unwrap();
        let mut entry = make_entry("clinicA", "W20240301-001", 0, 5);
        entry.patient_first_name = Some("Ada".into());
        entry.vitals.pulse_bpm = Some(72);
        db.insert_queue_entry(&entry).unwrap();

        let retrieved = db.get_queue_entry(&scope("clinicA"), &entry.id).unwrap().unwrap();
        assert_eq!(retrieved, entry);
    }

    #[test]
    fn test_get_is_tenant_scoped() {
        let db = Database::open_in_memory().unwrap();
        let entry = make_entry("clinicA", "W20240301-001", 0, 5);
        db.insert_queue_entry(&entry).unwrap();

        let other = db.get_queue_entry(&scope("clinicB"), &entry.id).unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn test_duplicate_ticket_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_queue_entry(&make_entry("clinicA", "W20240301-001", 0, 5))
            .unwrap();

        let result = db.insert_queue_entry(&make_entry("clinicA", "W20240301-001", 1, 5));
        assert!(matches!(result, Err(DbError::Duplicate(_))));

        // Same ticket text in another tenant is fine
        db.insert_queue_entry(&make_entry("clinicB", "W20240301-001", 1, 5))
            .unwrap();
    }

    #[test]
    fn test_count_tickets_for_day() {
        let db = Database::open_in_memory().unwrap();
        db.insert_queue_entry(&make_entry("clinicA", "W20240301-001", 0, 5))
            .unwrap();
        db.insert_queue_entry(&make_entry("clinicA", "W20240301-002", 1, 5))
            .unwrap();
        db.insert_queue_entry(&make_entry("clinicB", "W20240301-001", 1, 5))
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let a = scope("clinicA");
        assert_eq!(db.count_tickets_for_day(&a, QueueType::WalkIn, day).unwrap(), 2);
        assert_eq!(db.count_tickets_for_day(&a, QueueType::FollowUp, day).unwrap(), 0);
        let next_day = day.succ_opt().unwrap();
        assert_eq!(db.count_tickets_for_day(&a, QueueType::WalkIn, next_day).unwrap(), 0);
    }

    #[test]
    fn test_list_active_ordered_and_filtered() {
        let db = Database::open_in_memory().unwrap();
        let first = make_entry("clinicA", "W20240301-001", 0, 5);
        let second = make_entry("clinicA", "W20240301-002", 1, 5);
        let mut urgent = make_entry("clinicA", "W20240301-003", 2, 4);
        urgent.doctor_id = Some("doc-1".into());
        for e in [&first, &second, &urgent] {
            db.insert_queue_entry(e).unwrap();
        }

        let a = scope("clinicA");
        let all = db.list_active_entries(&a, &ActiveFilter::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![urgent.id.as_str(), first.id.as_str(), second.id.as_str()]);

        let filter = ActiveFilter {
            doctor_id: Some("doc-1".into()),
            ..Default::default()
        };
        let for_doctor = db.list_active_entries(&a, &filter).unwrap();
        assert_eq!(for_doctor.len(), 1);

        let filter = ActiveFilter {
            status: Some(QueueStatus::Completed),
            ..Default::default()
        };
        assert!(db.list_active_entries(&a, &filter).unwrap().is_empty());
    }

    #[test]
    fn test_conditional_doctor_update() {
        let db = Database::open_in_memory().unwrap();
        let entry = make_entry("clinicA", "W20240301-001", 0, 5);
        db.insert_queue_entry(&entry).unwrap();
        let a = scope("clinicA");

        assert!(db.update_doctor_if(&a, &entry.id, None, "doc-1").unwrap());
        // Stale expectation no longer matches
        assert!(!db.update_doctor_if(&a, &entry.id, None, "doc-2").unwrap());
        assert!(db.update_doctor_if(&a, &entry.id, Some("doc-1"), "doc-2").unwrap());

        let stored = db.get_queue_entry(&a, &entry.id).unwrap().unwrap();
        assert_eq!(stored.doctor_id.as_deref(), Some("doc-2"));
    }

    #[test]
    fn test_conditional_priority_update() {
        let db = Database::open_in_memory().unwrap();
        let entry = make_entry("clinicA", "W20240301-001", 0, 5);
        db.insert_queue_entry(&entry).unwrap();
        let a = scope("clinicA");

        assert!(!db.update_priority_if(&a, &entry.id, 3, 1, true).unwrap());
        assert!(db.update_priority_if(&a, &entry.id, 5, 1, true).unwrap());

        let stored = db.get_queue_entry(&a, &entry.id).unwrap().unwrap();
        assert_eq!(stored.priority, 1);
        assert!(stored.urgent);
    }

    #[test]
    fn test_lifecycle_update_requires_expected_status() {
        let db = Database::open_in_memory().unwrap();
        let entry = make_entry("clinicA", "W20240301-001", 0, 5);
        db.insert_queue_entry(&entry).unwrap();
        let a = scope("clinicA");

        let mut next = entry.clone();
        next.status = QueueStatus::InProgress;
        next.started_at = Some(entry.queued_at + chrono::Duration::minutes(5));
        assert!(!db.update_entry_lifecycle(&a, &next, &next).unwrap());
        assert!(db.update_entry_lifecycle(&a, &entry, &next).unwrap());

        let stored = db.get_queue_entry(&a, &entry.id).unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::InProgress);
        assert_eq!(stored.started_at, next.started_at);
    }

    #[test]
    fn test_lifecycle_update_loses_to_concurrent_doctor_change() {
        let db = Database::open_in_memory().unwrap();
        let mut entry = make_entry("clinicA", "W20240301-001", 0, 5);
        entry.doctor_id = Some("doc-1".into());
        db.insert_queue_entry(&entry).unwrap();
        let a = scope("clinicA");

        // A transition reads the entry, then the optimizer moves the doctor
        let current = db.get_queue_entry(&a, &entry.id).unwrap().unwrap();
        assert!(db.update_doctor_if(&a, &entry.id, Some("doc-1"), "doc-2").unwrap());

        let mut next = current.clone();
        next.called_at = Some(entry.queued_at + chrono::Duration::minutes(3));
        assert!(!db.update_entry_lifecycle(&a, &current, &next).unwrap());

        let stored = db.get_queue_entry(&a, &entry.id).unwrap().unwrap();
        assert_eq!(stored.doctor_id.as_deref(), Some("doc-2"));
        assert_eq!(stored.called_at, None);

        // Re-reading picks up the move and the transition lands
        let mut next = stored.clone();
        next.called_at = Some(entry.queued_at + chrono::Duration::minutes(3));
        assert!(db.update_entry_lifecycle(&a, &stored, &next).unwrap());
        let stored = db.get_queue_entry(&a, &entry.id).unwrap().unwrap();
        assert_eq!(stored.doctor_id.as_deref(), Some("doc-2"));
        assert!(stored.called_at.is_some());
    }

    #[test]
    fn test_start_does_not_carry_an_occupied_room() {
        let db = Database::open_in_memory().unwrap();
        let mut holder = make_entry("clinicA", "W20240301-001", 0, 5);
        holder.status = QueueStatus::InProgress;
        holder.room_id = Some("r1".into());
        let mut booked = make_entry("clinicA", "W20240301-002", 1, 5);
        booked.room_id = Some("r1".into());
        db.insert_queue_entry(&holder).unwrap();
        db.insert_queue_entry(&booked).unwrap();
        let a = scope("clinicA");

        let mut next = booked.clone();
        next.status = QueueStatus::InProgress;
        next.started_at = Some(booked.queued_at + chrono::Duration::minutes(5));
        assert!(db.update_entry_lifecycle(&a, &booked, &next).unwrap());

        let stored = db.get_queue_entry(&a, &booked.id).unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::InProgress);
        assert_eq!(stored.room_id, None);
    }

    #[test]
    fn test_room_update_refuses_an_occupied_room() {
        let db = Database::open_in_memory().unwrap();
        let mut first = make_entry("clinicA", "W20240301-001", 0, 5);
        first.status = QueueStatus::InProgress;
        let mut second = make_entry("clinicA", "W20240301-002", 1, 5);
        second.status = QueueStatus::InProgress;
        let mut elsewhere = make_entry("clinicB", "W20240301-001", 0, 5);
        elsewhere.status = QueueStatus::InProgress;
        for e in [&first, &second, &elsewhere] {
            db.insert_queue_entry(e).unwrap();
        }
        let a = scope("clinicA");

        assert!(db.update_room_if(&a, &first.id, None, "r1").unwrap());
        assert!(!db.update_room_if(&a, &second.id, None, "r1").unwrap());
        // Rooms are per tenant
        assert!(db.update_room_if(&scope("clinicB"), &elsewhere.id, None, "r1").unwrap());

        let filter = ActiveFilter {
            room_id: Some("r1".into()),
            ..Default::default()
        };
        let in_r1 = db.list_active_entries(&a, &filter).unwrap();
        assert_eq!(in_r1.len(), 1);
        assert_eq!(in_r1[0].id, first.id);
    }

    #[test]
    fn test_doctor_update_refuses_a_consulting_doctor() {
        let db = Database::open_in_memory().unwrap();
        let mut consulting = make_entry("clinicA", "W20240301-001", 0, 5);
        consulting.status = QueueStatus::InProgress;
        consulting.doctor_id = Some("doc-1".into());
        let waiting = make_entry("clinicA", "W20240301-002", 1, 5);
        db.insert_queue_entry(&consulting).unwrap();
        db.insert_queue_entry(&waiting).unwrap();
        let a = scope("clinicA");

        assert!(!db.update_doctor_if(&a, &waiting.id, None, "doc-1").unwrap());
        assert!(db.update_doctor_if(&a, &waiting.id, None, "doc-2").unwrap());
        // The consultation itself may keep re-asserting its own doctor
        assert!(db
            .update_doctor_if(&a, &consulting.id, Some("doc-1"), "doc-1")
            .unwrap());
    }

    #[test]
    fn test_recent_consultation_minutes() {
        let db = Database::open_in_memory().unwrap();
        let mut entry = make_entry("clinicA", "W20240301-001", 0, 5);
        entry.status = QueueStatus::Completed;
        entry.started_at = Some(entry.queued_at + chrono::Duration::minutes(5));
        entry.completed_at = Some(entry.queued_at + chrono::Duration::minutes(25));
        db.insert_queue_entry(&entry).unwrap();

        let minutes = db
            .recent_consultation_minutes(&scope("clinicA"), None, 10)
            .unwrap();
        assert_eq!(minutes, vec![20]);
    }

    #[test]
    fn test_update_triage() {
        let db = Database::open_in_memory().unwrap();
        let entry = make_entry("clinicA", "W20240301-001", 0, 5);
        db.insert_queue_entry(&entry).unwrap();
        let a = scope("clinicA");

        let vitals = VitalsSnapshot {
            blood_pressure: Some("120/80".into()),
            temperature_c: Some(37.2),
            ..Default::default()
        };
        assert!(db.update_triage(&a, &entry.id, &vitals, Some("cough")).unwrap());

        let stored = db.get_queue_entry(&a, &entry.id).unwrap().unwrap();
        assert_eq!(stored.vitals, vitals);
        assert_eq!(stored.notes.as_deref(), Some("cough"));
    }
}
