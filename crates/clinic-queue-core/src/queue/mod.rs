//! Patient queue engine.
//!
//! Pipeline: Enqueue (ticket) → Allocation → Promotion → Estimation → Display

mod allocator;
mod display;
mod estimator;
mod numbering;
mod optimizer;
mod registry;
mod scheduler;
mod service;

pub use allocator::*;
pub use display::*;
pub use estimator::*;
pub use numbering::*;
pub use optimizer::*;
pub use registry::*;
pub use scheduler::*;
pub use service::*;

pub use crate::db::ActiveFilter;

use crate::db::DbError;
use crate::models::{QueueAction, QueueStatus};
use thiserror::Error;

/// Queue errors.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Rejected before any write.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Illegal status change; the entry is untouched.
    #[error("Cannot {} an entry that is {}", .action.as_str(), .from.as_str())]
    Transition { from: QueueStatus, action: QueueAction },

    /// Ticket numbering lost every race; safe to retry.
    #[error("Ticket numbering exhausted after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },

    /// The entry moved under us between read and conditional write.
    #[error("Queue entry changed concurrently: {0}")]
    Conflict(String),

    #[error("Queue entry not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Directory unavailable: {0}")]
    Directory(#[from] anyhow::Error),
}

impl QueueError {
    /// Whether the caller may simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueueError::GenerationExhausted { .. } | QueueError::Conflict(_)
        )
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
