//! Notification outbox operations.

use rusqlite::{params, OptionalExtension};

use super::{from_db_timestamp, to_db_timestamp, Database, DbError, DbResult};
use crate::models::{NotificationCommand, NotificationKind, NotificationStatus, TenantScope};

const OUTBOX_COLUMNS: &str =
    "id, tenant_id, entry_id, kind, payload, status, attempts, last_error, created_at";

impl Database {
    /// Queue a command for delivery.
    pub fn enqueue_notification(&self, command: &NotificationCommand) -> DbResult<()> {
        let payload_json = serde_json::to_string(&command.payload)?;
        self.conn.execute(
            r#"
            INSERT INTO notification_outbox (
                id, tenant_id, entry_id, kind, payload, status, attempts, last_error, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                command.id,
                command.tenant_id,
                command.entry_id,
                command.kind.as_str(),
                payload_json,
                command.status.as_str(),
                command.attempts,
                command.last_error,
                to_db_timestamp(&command.created_at),
            ],
        )?;
        Ok(())
    }

    /// Oldest pending commands across all tenants.
    pub fn list_pending_notifications(&self, limit: usize) -> DbResult<Vec<NotificationCommand>> {
        let sql = format!(
            r#"
            SELECT {} FROM notification_outbox
            WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT ?1
            "#,
            OUTBOX_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([limit as i64], read_outbox_row)?;

        let mut commands = Vec::new();
        for row in rows {
            commands.push(row?.try_into()?);
        }
        Ok(commands)
    }

    /// Commands raised for one entry, oldest first.
    pub fn list_notifications_for_entry(
        &self,
        scope: &TenantScope,
        entry_id: &str,
    ) -> DbResult<Vec<NotificationCommand>> {
        let sql = format!(
            r#"
            SELECT {} FROM notification_outbox
            WHERE tenant_id = ?1 AND entry_id = ?2
            ORDER BY created_at ASC, id ASC
            "#,
            OUTBOX_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![scope.id(), entry_id], read_outbox_row)?;

        let mut commands = Vec::new();
        for row in rows {
            commands.push(row?.try_into()?);
        }
        Ok(commands)
    }

    /// Get a command by ID.
    pub fn get_notification(&self, id: &str) -> DbResult<Option<NotificationCommand>> {
        let sql = format!("SELECT {} FROM notification_outbox WHERE id = ?1", OUTBOX_COLUMNS);
        self.conn
            .query_row(&sql, [id], read_outbox_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Mark a pending command delivered.
    pub fn mark_notification_sent(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE notification_outbox
            SET status = 'sent', attempts = attempts + 1, last_error = NULL,
                updated_at = datetime('now')
            WHERE id = ?1 AND status = 'pending'
            "#,
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Record a failed delivery; the command fails for good after `max_attempts`.
    pub fn record_notification_failure(
        &self,
        id: &str,
        error: &str,
        max_attempts: u32,
    ) -> DbResult<NotificationStatus> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE notification_outbox
            SET attempts = attempts + 1,
                last_error = ?2,
                status = CASE WHEN attempts + 1 >= ?3 THEN 'failed' ELSE 'pending' END,
                updated_at = datetime('now')
            WHERE id = ?1 AND status = 'pending'
            "#,
            params![id, error, max_attempts],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("pending notification {}", id)));
        }

        let status: String = self.conn.query_row(
            "SELECT status FROM notification_outbox WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        NotificationStatus::parse(&status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown notification status: {}", status)))
    }
}

struct OutboxRow {
    id: String,
    tenant_id: String,
    entry_id: String,
    kind: String,
    payload: String,
    status: String,
    attempts: u32,
    last_error: Option<String>,
    created_at: String,
}

fn read_outbox_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxRow> {
    Ok(OutboxRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        entry_id: row.get(2)?,
        kind: row.get(3)?,
        payload: row.get(4)?,
        status: row.get(5)?,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl TryFrom<OutboxRow> for NotificationCommand {
    type Error = DbError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let kind = NotificationKind::parse(&row.kind)
            .ok_or_else(|| DbError::Constraint(format!("Unknown notification kind: {}", row.kind)))?;
        let status = NotificationStatus::parse(&row.status).ok_or_else(|| {
            DbError::Constraint(format!("Unknown notification status: {}", row.status))
        })?;

        Ok(NotificationCommand {
            id: row.id,
            tenant_id: row.tenant_id,
            entry_id: row.entry_id,
            kind,
            payload: serde_json::from_str(&row.payload)?,
            status,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: from_db_timestamp(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(entry: &str) -> NotificationCommand {
        NotificationCommand::new(
            "clinicA",
            entry,
            NotificationKind::TicketIssued,
            serde_json::json!({ "ticket": "W20240301-001" }),
        )
    }

    #[test]
    fn test_enqueue_and_list_pending() {
        let db = Database::open_in_memory().unwrap();
        let cmd = command("e1");
        db.enqueue_notification(&cmd).unwrap();

        let pending = db.list_pending_notifications(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, cmd.id);
        assert_eq!(pending[0].kind, NotificationKind::TicketIssued);
        assert_eq!(pending[0].payload, cmd.payload);
        assert_eq!(pending[0].status, NotificationStatus::Pending);
    }

    #[test]
    fn test_mark_sent_removes_from_pending() {
        let db = Database::open_in_memory().unwrap();
        let cmd = command("e1");
        db.enqueue_notification(&cmd).unwrap();

        assert!(db.mark_notification_sent(&cmd.id).unwrap());
        assert!(db.list_pending_notifications(10).unwrap().is_empty());
        // Already sent
        assert!(!db.mark_notification_sent(&cmd.id).unwrap());

        let stored = db.get_notification(&cmd.id).unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
        assert_eq!(stored.attempts, 1);
    }

    #[test]
    fn test_failure_gives_up_after_max_attempts() {
        let db = Database::open_in_memory().unwrap();
        let cmd = command("e1");
        db.enqueue_notification(&cmd).unwrap();

        let status = db.record_notification_failure(&cmd.id, "sms gateway down", 2).unwrap();
        assert_eq!(status, NotificationStatus::Pending);
        let status = db.record_notification_failure(&cmd.id, "sms gateway down", 2).unwrap();
        assert_eq!(status, NotificationStatus::Failed);

        let stored = db.get_notification(&cmd.id).unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("sms gateway down"));
        assert!(db.record_notification_failure(&cmd.id, "again", 2).is_err());
    }

    #[test]
    fn test_list_for_entry_is_scoped() {
        let db = Database::open_in_memory().unwrap();
        db.enqueue_notification(&command("e1")).unwrap();
        db.enqueue_notification(&command("e2")).unwrap();

        let scope = TenantScope::new("clinicA").unwrap();
        assert_eq!(db.list_notifications_for_entry(&scope, "e1").unwrap().len(), 1);

        let other = TenantScope::new("clinicB").unwrap();
        assert!(db.list_notifications_for_entry(&other, "e1").unwrap().is_empty());
    }
}
