//! Public display board projection.
//!
//! Rows carry just enough to call a patient: names, ticket, where to go and
//! how long to wait. The projection never fails. A queue read error yields
//! an empty board; an unreachable doctor or room directory only blanks those
//! names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ActiveFilter, QueueRegistry, WaitTimeEstimator};
use crate::config::QueueConfig;
use crate::db::Database;
use crate::directory::Directories;
use crate::models::{Doctor, QueueStatus, QueueType, Room, TenantScope};

/// Board narrowing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayFilter {
    pub queue_type: Option<QueueType>,
    pub doctor_id: Option<String>,
    /// Never exceeds the configured display limit
    pub limit: Option<usize>,
}

/// One line on a display board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRow {
    /// 1-based place among waiting rows; `None` once in consultation
    pub position: Option<usize>,
    pub queue_number: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub doctor_name: Option<String>,
    pub room_name: Option<String>,
    pub status: QueueStatus,
    pub estimated_wait_minutes: Option<i64>,
}

pub struct DisplayProjector<'a> {
    db: &'a Database,
    directories: &'a Directories,
    config: &'a QueueConfig,
    registry: QueueRegistry<'a>,
}

impl<'a> DisplayProjector<'a> {
    pub fn new(db: &'a Database, directories: &'a Directories, config: &'a QueueConfig) -> Self {
        Self {
            db,
            directories,
            config,
            registry: QueueRegistry::new(db),
        }
    }

    /// Rows in service order, capped at the display limit.
    pub fn project(&self, scope: &TenantScope, filter: &DisplayFilter) -> Vec<DisplayRow> {
        match self.try_project(scope, filter) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(tenant = scope.id(), error = %e, "Display projection failed");
                Vec::new()
            }
        }
    }

    fn try_project(
        &self,
        scope: &TenantScope,
        filter: &DisplayFilter,
    ) -> anyhow::Result<Vec<DisplayRow>> {
        let limit = filter
            .limit
            .map_or(self.config.display_limit, |l| l.min(self.config.display_limit));

        let entries = self.registry.list_active(
            scope,
            &ActiveFilter {
                queue_type: filter.queue_type,
                doctor_id: filter.doctor_id.clone(),
                ..Default::default()
            },
        )?;
        if entries.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let doctors = names(
            scope,
            "doctor",
            self.directories.doctors.list_available(scope),
            |d: Doctor| (d.id, d.name),
        );
        let rooms = names(
            scope,
            "room",
            self.directories.rooms.list_available(scope),
            |r: Room| (r.id, r.name),
        );
        let estimator = WaitTimeEstimator::for_tenant(self.db, scope, self.config);

        let mut ahead = 0;
        let rows = entries
            .into_iter()
            .take(limit)
            .map(|entry| {
                let (position, estimate) = if entry.is_waiting() {
                    ahead += 1;
                    (Some(ahead), Some(estimator.estimate(ahead - 1)))
                } else {
                    (None, None)
                };
                DisplayRow {
                    position,
                    doctor_name: entry.doctor_id.as_ref().and_then(|id| doctors.get(id).cloned()),
                    room_name: entry.room_id.as_ref().and_then(|id| rooms.get(id).cloned()),
                    queue_number: entry.queue_number,
                    first_name: entry.patient_first_name,
                    last_name: entry.patient_last_name,
                    status: entry.status,
                    estimated_wait_minutes: estimate,
                }
            })
            .collect();
        Ok(rows)
    }
}

/// Id to display name; empty when the directory could not be read.
fn names<T>(
    scope: &TenantScope,
    directory: &str,
    listed: anyhow::Result<Vec<T>>,
    pair: impl Fn(T) -> (String, String),
) -> HashMap<String, String> {
    match listed {
        Ok(items) => items.into_iter().map(pair).collect(),
        Err(e) => {
            warn!(tenant = scope.id(), directory, error = %e, "Directory unavailable, board shows no names");
            HashMap::new()
        }
    }
}
