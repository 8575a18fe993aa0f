//! Queue optimization passes.
//!
//! Pass: Allocation → Promotion → Estimation → Audit + Notifications
//!
//! Every write in a pass is a conditional update committed in one
//! transaction with its audit record. A pass that dies half-way leaves only
//! whole, audited per-entry updates behind, and a pass over an unchanged
//! queue writes nothing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    ActiveFilter, PriorityScheduler, QueueRegistry, QueueResult, ResourceAllocator,
    WaitTimeEstimator,
};
use crate::config::QueueConfig;
use crate::db::Database;
use crate::directory::Directories;
use crate::models::{
    AllocationSkip, ChangeAction, NotificationCommand, NotificationKind, QueueChange,
    QueueEntry, QueueStatus, TenantScope,
};
use crate::worker::{spawn_periodic, WorkerHandle};

/// Queue health after a pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    /// Mean estimate over waiting entries
    pub average_wait_minutes: f64,
    pub total_active: usize,
    pub waiting: usize,
    pub in_progress: usize,
    pub doctors_available: usize,
    pub rooms_available: usize,
}

/// Outcome of one optimizer pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// Groups this pass's rows in the audit log
    pub pass_id: String,
    /// Committed changes only
    pub changes: Vec<QueueChange>,
    pub skipped: Vec<AllocationSkip>,
    pub metrics: OptimizationMetrics,
}

impl OptimizationReport {
    /// Whether the pass left the queue untouched.
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Runs optimization passes over one tenant's active queue.
pub struct QueueOptimizer<'a> {
    db: &'a Database,
    config: &'a QueueConfig,
    registry: QueueRegistry<'a>,
    allocator: ResourceAllocator<'a>,
    scheduler: PriorityScheduler,
}

impl<'a> QueueOptimizer<'a> {
    pub fn new(db: &'a Database, directories: &'a Directories, config: &'a QueueConfig) -> Self {
        Self {
            db,
            config,
            registry: QueueRegistry::new(db),
            allocator: ResourceAllocator::new(db, directories, config),
            scheduler: PriorityScheduler::new(),
        }
    }

    /// Run a pass now.
    pub fn run(&self, scope: &TenantScope) -> QueueResult<OptimizationReport> {
        self.run_at(scope, Utc::now())
    }

    /// Run a pass as of `now`.
    pub fn run_at(
        &self,
        scope: &TenantScope,
        now: DateTime<Utc>,
    ) -> QueueResult<OptimizationReport> {
        let pass_id = uuid::Uuid::new_v4().to_string();
        let waiting_only = ActiveFilter {
            status: Some(QueueStatus::Waiting),
            ..Default::default()
        };

        // Step 1: Doctors and rooms
        let active = self.registry.list_active(scope, &ActiveFilter::default())?;
        let plan = self.allocator.plan(scope, &active, now);
        let (mut changes, lost) = self.allocator.commit(scope, &pass_id, &plan, now)?;
        let mut skipped = plan.skipped.clone();
        skipped.extend(lost);

        // Step 2: Urgent entries back to the front
        let waiting = self.registry.list_active(scope, &waiting_only)?;
        for promotion in self.scheduler.plan_promotions(&waiting) {
            let change = QueueChange::new(
                &promotion.entry_id,
                ChangeAction::PriorityPromoted,
                "urgent entry behind regular queue",
                Some(promotion.from.to_string()),
                Some(promotion.to.to_string()),
            );
            let landed = self.db.apply_audited(scope, &pass_id, &change, now, |db| {
                db.update_priority_if(scope, &promotion.entry_id, promotion.from, promotion.to, true)
            })?;
            if landed {
                changes.push(change);
            }
        }

        // Step 3: Wait estimates in final order; metrics come from the same read
        let settled = self.registry.list_active(scope, &ActiveFilter::default())?;
        let (waiting, consulting): (Vec<QueueEntry>, Vec<QueueEntry>) =
            settled.into_iter().partition(|e| e.is_waiting());
        let estimator = WaitTimeEstimator::for_tenant(self.db, scope, self.config);
        let mut estimates = Vec::with_capacity(waiting.len());
        for (position, (entry, minutes)) in estimator.estimates_for(&waiting).into_iter().enumerate() {
            estimates.push(minutes);
            if entry.estimated_wait_minutes == Some(minutes) {
                continue;
            }
            let change = QueueChange::new(
                &entry.id,
                ChangeAction::WaitEstimateUpdated,
                format!("position {}", position + 1),
                entry.estimated_wait_minutes.map(|m| m.to_string()),
                Some(minutes.to_string()),
            );
            let landed = self.db.apply_audited(scope, &pass_id, &change, now, |db| {
                db.update_estimate_if(scope, &entry.id, entry.estimated_wait_minutes, minutes)
            })?;
            if landed {
                changes.push(change);
            }
        }

        // Step 4: Notifications
        self.notify_reassignments(scope, &active, &changes);

        let metrics = OptimizationMetrics {
            average_wait_minutes: mean(&estimates),
            total_active: waiting.len() + consulting.len(),
            waiting: waiting.len(),
            in_progress: consulting.len(),
            doctors_available: plan.doctors_available,
            rooms_available: plan.rooms_available,
        };

        info!(
            tenant = scope.id(),
            pass_id = %pass_id,
            changes = changes.len(),
            skipped = skipped.len(),
            waiting = metrics.waiting,
            "Optimizer pass complete"
        );

        Ok(OptimizationReport {
            pass_id,
            changes,
            skipped,
            metrics,
        })
    }

    fn notify_reassignments(
        &self,
        scope: &TenantScope,
        active: &[QueueEntry],
        changes: &[QueueChange],
    ) {
        let tickets: HashMap<&str, &str> = active
            .iter()
            .map(|e| (e.id.as_str(), e.queue_number.as_str()))
            .collect();

        for change in changes
            .iter()
            .filter(|c| c.action == ChangeAction::DoctorReassigned)
        {
            let command = NotificationCommand::new(
                scope.id(),
                &change.entry_id,
                NotificationKind::DoctorReassigned,
                serde_json::json!({
                    "ticket": tickets.get(change.entry_id.as_str()),
                    "from_doctor_id": change.old_value,
                    "to_doctor_id": change.new_value,
                    "reason": change.reason,
                }),
            );
            if let Err(e) = self.db.enqueue_notification(&command) {
                warn!(
                    tenant = scope.id(),
                    entry_id = %change.entry_id,
                    error = %e,
                    "Failed to queue reassignment notification"
                );
            }
        }
    }
}

/// Run a pass for each tenant every `optimizer_interval_minutes`.
///
/// The thread owns its own connection to the database at `path`. A failed
/// pass is logged and the tenant is tried again on the next tick.
pub fn start_optimizer_worker(
    path: impl Into<PathBuf>,
    directories: Directories,
    config: QueueConfig,
    tenants: Vec<TenantScope>,
) -> WorkerHandle {
    let path = path.into();
    let interval = Duration::from_secs(config.optimizer_interval_minutes.saturating_mul(60));

    spawn_periodic(
        "optimizer",
        interval,
        move || match Database::open(&path) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Optimizer worker could not open database");
                None
            }
        },
        move |db| {
            let optimizer = QueueOptimizer::new(db, &directories, &config);
            for scope in &tenants {
                match optimizer.run(scope) {
                    Ok(_) => {}
                    Err(e) if e.is_retryable() => {
                        debug!(tenant = scope.id(), error = %e, "Scheduled pass lost a race")
                    }
                    Err(e) => warn!(tenant = scope.id(), error = %e, "Scheduled optimizer pass failed"),
                }
            }
        },
    )
}

fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<i64>() as f64 / values.len() as f64
    }
}
