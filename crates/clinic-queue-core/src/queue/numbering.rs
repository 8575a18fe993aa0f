//! Human-readable ticket numbers.
//!
//! Tickets read `{prefix}{YYYYMMDD}-{seq:03}` where the sequence restarts per
//! tenant, queue type and calendar day. Two issuers that compute the same
//! sequence collide on the ticket unique index; the loser recounts and tries
//! again after a short jittered backoff.

use std::thread::sleep;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{QueueError, QueueResult};
use crate::config::QueueConfig;
use crate::db::{Database, DbError};
use crate::models::{QueueEntry, QueueType, TenantScope};

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Format a ticket from its parts.
pub fn format_ticket(queue_type: QueueType, day: NaiveDate, sequence: u32) -> String {
    format!("{}{}-{:03}", queue_type.prefix(), day.format("%Y%m%d"), sequence)
}

/// Issues tickets and inserts the entries that carry them.
pub struct QueueNumberGenerator<'a> {
    db: &'a Database,
    max_attempts: u32,
    backoff_base: Duration,
}

impl<'a> QueueNumberGenerator<'a> {
    pub fn new(db: &'a Database, config: &QueueConfig) -> Self {
        Self {
            db,
            max_attempts: config.ticket_max_attempts.max(1),
            backoff_base: Duration::from_millis(config.ticket_backoff_base_ms),
        }
    }

    /// The ticket the next issue would try. Not reserved.
    pub fn generate(
        &self,
        scope: &TenantScope,
        queue_type: QueueType,
        day: NaiveDate,
    ) -> QueueResult<String> {
        let issued = self.db.count_tickets_for_day(scope, queue_type, day)?;
        Ok(format_ticket(queue_type, day, issued + 1))
    }

    /// Assign a ticket to `entry` and insert it.
    ///
    /// On return `entry.queue_number` holds the ticket that was stored.
    pub fn issue(&self, scope: &TenantScope, entry: &mut QueueEntry) -> QueueResult<()> {
        for attempt in 1..=self.max_attempts {
            entry.queue_number = self.generate(scope, entry.queue_type, entry.queue_date)?;

            match self.db.insert_queue_entry(entry) {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(
                            tenant = scope.id(),
                            ticket = %entry.queue_number,
                            attempt,
                            "Ticket issued after retries"
                        );
                    }
                    return Ok(());
                }
                Err(DbError::Duplicate(ticket)) => {
                    debug!(tenant = scope.id(), %ticket, attempt, "Ticket already taken");
                    if attempt < self.max_attempts {
                        sleep(self.backoff(attempt));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            tenant = scope.id(),
            queue_type = entry.queue_type.as_str(),
            attempts = self.max_attempts,
            "Ticket numbering exhausted"
        );
        entry.queue_number.clear();
        Err(QueueError::GenerationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Exponential delay with ±50% jitter so racing issuers spread out.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base.saturating_mul(1 << (attempt - 1).min(10));
        let jitter = 0.5 + rand::random::<f64>();
        exp.mul_f64(jitter).min(MAX_BACKOFF)
    }
}
