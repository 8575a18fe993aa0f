//! Queue engine configuration.

use serde::{Deserialize, Serialize};

use crate::queue::{QueueError, QueueResult};

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "clinic_queue_core=info"
}

/// How the estimator derives minutes per patient ahead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EstimatorMode {
    /// Always `average_service_minutes`
    Fixed,
    /// Mean consultation length of the last `window` completions
    RollingAverage { window: usize },
}

/// Tunables for the queue engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Minutes per patient ahead in the queue
    pub average_service_minutes: i64,
    pub estimator_mode: EstimatorMode,
    /// An appointment inside this window makes a doctor busy
    pub appointment_lookahead_minutes: i64,
    /// Rows shown on a public display board
    pub display_limit: usize,
    /// Ticket insert attempts before giving up
    pub ticket_max_attempts: u32,
    /// Base delay for jittered backoff between ticket attempts
    pub ticket_backoff_base_ms: u64,
    /// Priority for entries enqueued without one
    pub default_priority: i64,
    /// Period of the background optimizer worker
    pub optimizer_interval_minutes: u64,
    /// Delivery attempts before an outbound notification is marked failed
    pub notification_max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            average_service_minutes: 15,
            estimator_mode: EstimatorMode::Fixed,
            appointment_lookahead_minutes: 30,
            display_limit: 20,
            ticket_max_attempts: 5,
            ticket_backoff_base_ms: 5,
            default_priority: 5,
            optimizer_interval_minutes: 15,
            notification_max_attempts: 3,
        }
    }
}

impl QueueConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> QueueResult<Self> {
        let config: QueueConfig = serde_json::from_str(json)
            .map_err(|e| QueueError::Validation(format!("invalid queue config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueueResult<()> {
        if self.average_service_minutes < 0 {
            return Err(QueueError::Validation(
                "average_service_minutes must not be negative".into(),
            ));
        }
        if self.appointment_lookahead_minutes < 0 {
            return Err(QueueError::Validation(
                "appointment_lookahead_minutes must not be negative".into(),
            ));
        }
        if self.ticket_max_attempts == 0 {
            return Err(QueueError::Validation("ticket_max_attempts must be at least 1".into()));
        }
        if self.default_priority < 0 {
            return Err(QueueError::Validation("default_priority must not be negative".into()));
        }
        if self.optimizer_interval_minutes == 0 {
            return Err(QueueError::Validation(
                "optimizer_interval_minutes must be at least 1".into(),
            ));
        }
        if let EstimatorMode::RollingAverage { window: 0 } = self.estimator_mode {
            return Err(QueueError::Validation("rolling average window must be at least 1".into()));
        }
        Ok(())
    }
}
