//! SQLite schema definition.

/// Complete database schema for the clinic queue.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Queue Entries (never deleted; terminal rows are kept for reporting)
-- ============================================================================

CREATE TABLE IF NOT EXISTS queue_entries (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    queue_number TEXT NOT NULL,
    queue_date TEXT NOT NULL,                    -- YYYY-MM-DD
    queue_type TEXT NOT NULL CHECK (queue_type IN ('appointment', 'walk_in', 'follow_up')),
    patient_id TEXT NOT NULL,
    patient_first_name TEXT,
    patient_last_name TEXT,
    appointment_id TEXT,
    visit_id TEXT,
    doctor_id TEXT,
    room_id TEXT,
    status TEXT NOT NULL DEFAULT 'waiting'
        CHECK (status IN ('waiting', 'in_progress', 'completed', 'cancelled', 'no_show')),
    priority INTEGER NOT NULL CHECK (priority >= 0),
    urgent INTEGER NOT NULL DEFAULT 0,
    queued_at TEXT NOT NULL,
    called_at TEXT,
    started_at TEXT,
    completed_at TEXT,
    checked_in INTEGER NOT NULL DEFAULT 1,
    check_in_method TEXT NOT NULL DEFAULT 'reception',
    vitals TEXT NOT NULL DEFAULT '{}',           -- JSON VitalsSnapshot
    notes TEXT,
    estimated_wait_minutes INTEGER,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    -- Resources are only held while the entry is active
    CHECK (status IN ('waiting', 'in_progress') OR (doctor_id IS NULL AND room_id IS NULL)),
    CHECK (started_at IS NULL OR started_at >= queued_at),
    CHECK (completed_at IS NULL OR started_at IS NULL OR completed_at >= started_at)
);

-- One ticket per (tenant, type, day); concurrent issuers collide here and retry
CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_ticket
    ON queue_entries(tenant_id, queue_type, queue_date, queue_number);

CREATE INDEX IF NOT EXISTS idx_queue_active
    ON queue_entries(tenant_id, status, priority, queued_at);
CREATE INDEX IF NOT EXISTS idx_queue_doctor
    ON queue_entries(tenant_id, doctor_id, status);

-- Terminal states are final
CREATE TRIGGER IF NOT EXISTS queue_entries_terminal_guard BEFORE UPDATE OF status ON queue_entries
WHEN old.status IN ('completed', 'cancelled', 'no_show') AND new.status <> old.status
BEGIN
    SELECT RAISE(ABORT, 'Terminal queue entries cannot change status');
END;

CREATE TRIGGER IF NOT EXISTS queue_entries_no_delete BEFORE DELETE ON queue_entries
BEGIN
    SELECT RAISE(ABORT, 'Queue entries are retained for reporting');
END;

-- ============================================================================
-- Optimizer Audit Trail (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS queue_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    pass_id TEXT NOT NULL,
    entry_id TEXT NOT NULL REFERENCES queue_entries(id),
    action TEXT NOT NULL CHECK (action IN (
        'doctor_assigned', 'doctor_reassigned', 'room_assigned',
        'priority_promoted', 'wait_estimate_updated'
    )),
    reason TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_changes_entry ON queue_changes(tenant_id, entry_id);
CREATE INDEX IF NOT EXISTS idx_changes_pass ON queue_changes(tenant_id, pass_id);

CREATE TRIGGER IF NOT EXISTS queue_changes_no_update BEFORE UPDATE ON queue_changes
BEGIN
    SELECT RAISE(ABORT, 'Audit records are immutable');
END;

CREATE TRIGGER IF NOT EXISTS queue_changes_no_delete BEFORE DELETE ON queue_changes
BEGIN
    SELECT RAISE(ABORT, 'Audit records are immutable');
END;

-- ============================================================================
-- Notification Outbox (drained by a separate worker)
-- ============================================================================

CREATE TABLE IF NOT EXISTS notification_outbox (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    entry_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',          -- JSON for the transport
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'sent', 'failed')),
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_outbox_status ON notification_outbox(status, created_at);
CREATE INDEX IF NOT EXISTS idx_outbox_entry ON notification_outbox(tenant_id, entry_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    const INSERT_ENTRY: &str = "INSERT INTO queue_entries \
        (id, tenant_id, queue_number, queue_date, queue_type, patient_id, priority, queued_at) \
        VALUES (?1, 'clinicA', ?2, '2024-03-01', 'walk_in', 'p1', 5, '2024-03-01T09:00:00.000000Z')";

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_ticket_unique_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(INSERT_ENTRY, ["e1", "W20240301-001"]).unwrap();
        let result = conn.execute(INSERT_ENTRY, ["e2", "W20240301-001"]);
        assert!(result.is_err());

        let result = conn.execute(INSERT_ENTRY, ["e3", "W20240301-002"]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_terminal_status_guard() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(INSERT_ENTRY, ["e1", "W20240301-001"]).unwrap();

        conn.execute("UPDATE queue_entries SET status = 'cancelled' WHERE id = 'e1'", [])
            .unwrap();

        // Leaving a terminal state must fail
        let result = conn.execute("UPDATE queue_entries SET status = 'waiting' WHERE id = 'e1'", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_terminal_entries_hold_no_resources() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(INSERT_ENTRY, ["e1", "W20240301-001"]).unwrap();

        let result = conn.execute(
            "UPDATE queue_entries SET status = 'cancelled', doctor_id = 'd1' WHERE id = 'e1'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_entries_cannot_be_deleted() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(INSERT_ENTRY, ["e1", "W20240301-001"]).unwrap();

        let result = conn.execute("DELETE FROM queue_entries WHERE id = 'e1'", []);
        assert!(result.is_err());
    }
}
