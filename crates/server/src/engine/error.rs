use chrono::{DateTime, Utc};
use thiserror::Error;

use super::reconcile::ReconcileError;
use super::rules::ValidationFailure;

/// Why a document operation was rejected. None of these leave partial writes.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("validation failed: {0}")]
    Validation(ValidationFailure),
    #[error("reconciliation failed: {0}")]
    Reconciliation(#[from] ReconcileError),
    #[error("document was modified at {stored}, client last saw {client_known}")]
    OptimisticLock { stored: DateTime<Utc>, client_known: DateTime<Utc> },
    #[error("document not found")]
    NotFound,
    #[error("document number sequence unavailable: {0:#}")]
    SequenceUnavailable(anyhow::Error),
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl From<ValidationFailure> for DocumentError {
    fn from(failure: ValidationFailure) -> Self {
        Self::Validation(failure)
    }
}

impl From<anyhow::Error> for DocumentError {
    fn from(error: anyhow::Error) -> Self {
        Self::Storage(error)
    }
}

impl DocumentError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::OptimisticLock { .. })
    }

    /// Short label used in outcome logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Reconciliation(_) => "reconciliation",
            Self::OptimisticLock { .. } => "conflict",
            Self::NotFound => "not_found",
            Self::SequenceUnavailable(_) => "sequence_unavailable",
            Self::Storage(_) => "transactional",
        }
    }
}
