//! Outbound notification delivery.
//!
//! Queue operations only write commands to the outbox table. A worker drains
//! it through a [`NotificationDispatcher`], so a slow SMS gateway never holds
//! up a check-in.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::db::{Database, DbResult};
use crate::models::{NotificationCommand, NotificationStatus};
use crate::worker::{spawn_periodic, WorkerHandle};

/// Delivers one command to patients or staff (SMS, push, display chime…).
pub trait NotificationDispatcher: Send + Sync {
    fn send(&self, command: &NotificationCommand) -> anyhow::Result<()>;
}

/// Dispatcher that only logs; for hosts without a transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn send(&self, command: &NotificationCommand) -> anyhow::Result<()> {
        info!(
            tenant = %command.tenant_id,
            entry_id = %command.entry_id,
            kind = command.kind.as_str(),
            payload = %command.payload,
            "Notification"
        );
        Ok(())
    }
}

/// Outcome of one drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub sent: usize,
    /// Failed this time, will be retried
    pub retrying: usize,
    /// Out of attempts
    pub failed: usize,
}

pub struct NotificationWorker<'a> {
    db: &'a Database,
    dispatcher: &'a dyn NotificationDispatcher,
    max_attempts: u32,
}

impl<'a> NotificationWorker<'a> {
    pub fn new(
        db: &'a Database,
        dispatcher: &'a dyn NotificationDispatcher,
        config: &QueueConfig,
    ) -> Self {
        Self {
            db,
            dispatcher,
            max_attempts: config.notification_max_attempts.max(1),
        }
    }

    /// Send up to `limit` pending commands, oldest first.
    ///
    /// Only listing the outbox can fail the drain; a command whose outcome
    /// cannot be recorded is logged and left pending for the next drain.
    pub fn drain(&self, limit: usize) -> DbResult<DrainStats> {
        let mut stats = DrainStats::default();

        for command in self.db.list_pending_notifications(limit)? {
            match self.dispatcher.send(&command) {
                Ok(()) => match self.db.mark_notification_sent(&command.id) {
                    Ok(_) => stats.sent += 1,
                    Err(e) => warn!(
                        notification_id = %command.id,
                        error = %e,
                        "Sent notification could not be marked"
                    ),
                },
                Err(e) => {
                    warn!(
                        tenant = %command.tenant_id,
                        entry_id = %command.entry_id,
                        kind = command.kind.as_str(),
                        attempt = command.attempts + 1,
                        error = %e,
                        "Notification delivery failed"
                    );
                    match self.db.record_notification_failure(
                        &command.id,
                        &e.to_string(),
                        self.max_attempts,
                    ) {
                        Ok(NotificationStatus::Failed) => stats.failed += 1,
                        Ok(_) => stats.retrying += 1,
                        Err(e) => warn!(
                            notification_id = %command.id,
                            error = %e,
                            "Delivery failure could not be recorded"
                        ),
                    }
                }
            }
        }

        if stats != DrainStats::default() {
            debug!(sent = stats.sent, retrying = stats.retrying, failed = stats.failed, "Outbox drained");
        }
        Ok(stats)
    }
}

/// Drain the outbox of the database at `path` every `interval`.
///
/// The thread owns its own connection to the file.
pub fn start_notification_worker(
    path: impl Into<PathBuf>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    config: QueueConfig,
    interval: Duration,
    batch_size: usize,
) -> WorkerHandle {
    let path = path.into();

    spawn_periodic(
        "notifications",
        interval,
        move || match Database::open(&path) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Notification worker could not open database");
                None
            }
        },
        move |db| {
            let worker = NotificationWorker::new(db, dispatcher.as_ref(), &config);
            if let Err(e) = worker.drain(batch_size) {
                warn!(error = %e, "Outbox drain failed");
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use std::sync::Mutex;

    /// Records commands; fails for entries listed in `fail_for`.
    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<String>>,
        fail_for: Vec<String>,
    }

    impl NotificationDispatcher for RecordingDispatcher {
        fn send(&self, command: &NotificationCommand) -> anyhow::Result<()> {
            if self.fail_for.contains(&command.entry_id) {
                anyhow::bail!("gateway rejected {}", command.entry_id);
            }
            self.sent.lock().unwrap().push(command.entry_id.clone());
            Ok(())
        }
    }

    fn enqueue(db: &Database, entry: &str) -> NotificationCommand {
        let command = NotificationCommand::new(
            "clinicA",
            entry,
            NotificationKind::PatientCalled,
            serde_json::json!({ "ticket": "W20240301-001" }),
        );
        db.enqueue_notification(&command).unwrap();
        command
    }

    #[test]
    fn test_drain_sends_pending() {
        let db = Database::open_in_memory().unwrap();
        enqueue(&db, "e1");
        enqueue(&db, "e2");
        let dispatcher = RecordingDispatcher::default();
        let worker = NotificationWorker::new(&db, &dispatcher, &QueueConfig::default());

        let stats = worker.drain(10).unwrap();
        assert_eq!(stats.sent, 2);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 2);
        // Nothing left
        assert_eq!(worker.drain(10).unwrap(), DrainStats::default());
    }

    #[test]
    fn test_failures_retry_then_give_up() {
        let db = Database::open_in_memory().unwrap();
        let bad = enqueue(&db, "bad");
        enqueue(&db, "good");
        let dispatcher = RecordingDispatcher {
            fail_for: vec!["bad".into()],
            ..Default::default()
        };
        let config = QueueConfig {
            notification_max_attempts: 2,
            ..Default::default()
        };
        let worker = NotificationWorker::new(&db, &dispatcher, &config);

        let first = worker.drain(10).unwrap();
        assert_eq!((first.sent, first.retrying, first.failed), (1, 1, 0));
        let second = worker.drain(10).unwrap();
        assert_eq!((second.sent, second.retrying, second.failed), (0, 0, 1));

        let stored = db.get_notification(&bad.id).unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert!(stored.last_error.unwrap().contains("gateway rejected"));
    }

    #[test]
    fn test_unrecordable_outcome_does_not_stop_the_batch() {
        let db = Database::open_in_memory().unwrap();
        let stuck = enqueue(&db, "stuck");
        let failing = enqueue(&db, "failing");
        let fine = enqueue(&db, "fine");
        db.conn()
            .execute_batch(
                "CREATE TRIGGER outbox_readonly BEFORE UPDATE ON notification_outbox \
                 WHEN OLD.entry_id <> 'fine' \
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
        let dispatcher = RecordingDispatcher {
            fail_for: vec!["failing".into()],
            ..Default::default()
        };
        let worker = NotificationWorker::new(&db, &dispatcher, &QueueConfig::default());

        let stats = worker.drain(10).unwrap();
        assert_eq!(stats, DrainStats { sent: 1, retrying: 0, failed: 0 });
        let mut sent = dispatcher.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent, vec!["fine".to_string(), "stuck".to_string()]);

        let status = |id: &str| db.get_notification(id).unwrap().unwrap().status;
        assert_eq!(status(&stuck.id), NotificationStatus::Pending);
        assert_eq!(status(&failing.id), NotificationStatus::Pending);
        assert_eq!(status(&fine.id), NotificationStatus::Sent);
    }

    #[test]
    fn test_log_dispatcher_accepts_everything() {
        let db = Database::open_in_memory().unwrap();
        enqueue(&db, "e1");
        let worker = NotificationWorker::new(&db, &LogDispatcher, &QueueConfig::default());
        assert_eq!(worker.drain(10).unwrap().sent, 1);
    }

    #[test]
    fn test_background_worker_drains_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let db = Database::open(&path).unwrap();
        let command = enqueue(&db, "e1");

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let handle = start_notification_worker(
            &path,
            dispatcher.clone(),
            QueueConfig::default(),
            Duration::from_millis(50),
            10,
        );

        let mut delivered = false;
        for _ in 0..50 {
            let stored = db.get_notification(&command.id).unwrap().unwrap();
            if stored.status == NotificationStatus::Sent {
                delivered = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        drop(handle);

        assert!(delivered);
        assert_eq!(dispatcher.sent.lock().unwrap().as_slice(), ["e1".to_string()]);
    }
}
