//! Error types for the settlement service.

use crate::domain::{DepositStatus, PaymentStatus};

/// Domain-level errors (business rule violations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount {0} has more than 6 decimal places")]
    ExcessPrecision(String),

    #[error("Amount overflow")]
    AmountOverflow,

    #[error("Invalid split ratio: {0}")]
    InvalidRatio(String),

    #[error("Split of {gross} produced {merchant} + {dividend}, outside tolerance")]
    SplitInvariant {
        gross: String,
        merchant: String,
        dividend: String,
    },

    #[error("Unknown {entity} status: {value}")]
    UnknownStatus { entity: &'static str, value: String },

    #[error("Invalid payment transition: {from} -> {to}")]
    InvalidTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("Caller is not the depositor")]
    NotDepositor,

    #[error("Deposit payout already settled (status {0})")]
    PayoutAlreadySettled(DepositStatus),

    #[error("Deposit has not expired yet")]
    NotYetExpired,

    #[error("Deposit has expired")]
    DepositExpired,

    #[error("Depositor has no payout address")]
    MissingPayoutAddress,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored value does not map onto the closed domain vocabulary.
    #[error("Data integrity violation: {0}")]
    Integrity(String),
}

impl RepoError {
    /// Persistence failures leave in-flight work untouched for reconciliation.
    pub fn is_persistence(&self) -> bool {
        matches!(self, RepoError::Database(_) | RepoError::Transaction(_))
    }
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Payment network error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotDepositor => AppError::Forbidden(err.to_string()),
            DomainError::PayoutAlreadySettled(_) => AppError::Conflict(err.to_string()),
            DomainError::NotYetExpired
            | DomainError::DepositExpired
            | DomainError::MissingPayoutAddress => AppError::Precondition(err.to_string()),
            DomainError::UnknownStatus { .. } | DomainError::InvalidTransition { .. } => {
                AppError::Internal(err.to_string())
            }
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Conflict(e) => AppError::Conflict(e),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Integrity(e) => AppError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_payout_maps_to_conflict() {
        let err: AppError = DomainError::PayoutAlreadySettled(DepositStatus::Refunded).into();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_persistence_classification() {
        assert!(RepoError::Database("disk I/O".into()).is_persistence());
        assert!(!RepoError::NotFound.is_persistence());
        assert!(!RepoError::Integrity("bad status".into()).is_persistence());
    }
}
