//! Wait time estimation.

use tracing::warn;

use crate::config::{EstimatorMode, QueueConfig};
use crate::db::Database;
use crate::models::{QueueEntry, TenantScope};

/// Estimates waits as `patients ahead × minutes per patient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeEstimator {
    minutes_per_patient: i64,
}

impl WaitTimeEstimator {
    pub fn fixed(minutes_per_patient: i64) -> Self {
        Self {
            minutes_per_patient: minutes_per_patient.max(0),
        }
    }

    /// Build the estimator the config asks for.
    ///
    /// Rolling mode averages recent consultations of the tenant and falls
    /// back to the fixed rate when there is no history or it can't be read.
    pub fn for_tenant(db: &Database, scope: &TenantScope, config: &QueueConfig) -> Self {
        match config.estimator_mode {
            EstimatorMode::Fixed => Self::fixed(config.average_service_minutes),
            EstimatorMode::RollingAverage { window } => {
                match db.recent_consultation_minutes(scope, None, window) {
                    Ok(history) => Self::fixed(
                        rolling_average(&history).unwrap_or(config.average_service_minutes),
                    ),
                    Err(e) => {
                        warn!(tenant = scope.id(), error = %e, "Consultation history unavailable");
                        Self::fixed(config.average_service_minutes)
                    }
                }
            }
        }
    }

    pub fn minutes_per_patient(&self) -> i64 {
        self.minutes_per_patient
    }

    /// Minutes until service with `ahead` patients in front.
    pub fn estimate(&self, ahead: usize) -> i64 {
        (ahead as i64).saturating_mul(self.minutes_per_patient)
    }

    /// Estimate for each entry of an ordered waiting list.
    pub fn estimates_for<'e>(&self, ordered_waiting: &'e [QueueEntry]) -> Vec<(&'e QueueEntry, i64)> {
        ordered_waiting
            .iter()
            .enumerate()
            .map(|(ahead, entry)| (entry, self.estimate(ahead)))
            .collect()
    }
}

/// Rounded mean, or `None` for an empty history.
fn rolling_average(minutes: &[i64]) -> Option<i64> {
    if minutes.is_empty() {
        return None;
    }
    let total: i64 = minutes.iter().sum();
    let len = minutes.len() as i64;
    Some((total + len / 2) / len)
}
