//! Optimizer audit trail (append-only).

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{from_db_timestamp, to_db_timestamp, Database, DbError, DbResult};
use crate::models::{ChangeAction, QueueChange, TenantScope};

/// A change as stored in the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub pass_id: String,
    pub change: QueueChange,
    pub recorded_at: DateTime<Utc>,
}

impl Database {
    /// Run a conditional update and record its change in one transaction.
    ///
    /// The change is written only when `update` reports that it applied.
    /// An error from either step rolls both back.
    pub fn apply_audited<F>(
        &self,
        scope: &TenantScope,
        pass_id: &str,
        change: &QueueChange,
        recorded_at: DateTime<Utc>,
        update: F,
    ) -> DbResult<bool>
    where
        F: FnOnce(&Database) -> DbResult<bool>,
    {
        let tx = self.conn.unchecked_transaction()?;
        if !update(self)? {
            return Ok(false);
        }

        tx.execute(
            r#"
            INSERT INTO queue_changes (
                tenant_id, pass_id, entry_id, action, reason,
                old_value, new_value, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                scope.id(),
                pass_id,
                change.entry_id,
                change.action.as_str(),
                change.reason,
                change.old_value,
                change.new_value,
                to_db_timestamp(&recorded_at),
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Audit history of one entry, oldest first.
    pub fn list_changes_for_entry(
        &self,
        scope: &TenantScope,
        entry_id: &str,
    ) -> DbResult<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT pass_id, entry_id, action, reason, old_value, new_value, recorded_at
            FROM queue_changes
            WHERE tenant_id = ?1 AND entry_id = ?2
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![scope.id(), entry_id], read_change_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.try_into()?);
        }
        Ok(records)
    }

    /// Everything one optimizer pass committed.
    pub fn list_changes_for_pass(
        &self,
        scope: &TenantScope,
        pass_id: &str,
    ) -> DbResult<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT pass_id, entry_id, action, reason, old_value, new_value, recorded_at
            FROM queue_changes
            WHERE tenant_id = ?1 AND pass_id = ?2
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![scope.id(), pass_id], read_change_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.try_into()?);
        }
        Ok(records)
    }
}

struct ChangeRow {
    pass_id: String,
    entry_id: String,
    action: String,
    reason: String,
    old_value: Option<String>,
    new_value: Option<String>,
    recorded_at: String,
}

fn read_change_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeRow> {
    Ok(ChangeRow {
        pass_id: row.get(0)?,
        entry_id: row.get(1)?,
        action: row.get(2)?,
        reason: row.get(3)?,
        old_value: row.get(4)?,
        new_value: row.get(5)?,
        recorded_at: row.get(6)?,
    })
}

impl TryFrom<ChangeRow> for AuditRecord {
    type Error = DbError;

    fn try_from(row: ChangeRow) -> Result<Self, Self::Error> {
        let action = ChangeAction::parse(&row.action)
            .ok_or_else(|| DbError::Constraint(format!("Unknown change action: {}", row.action)))?;

        Ok(AuditRecord {
            pass_id: row.pass_id,
            change: QueueChange {
                entry_id: row.entry_id,
                action,
                reason: row.reason,
                old_value: row.old_value,
                new_value: row.new_value,
            },
            recorded_at: from_db_timestamp(&row.recorded_at)?,
        })
    }
}
