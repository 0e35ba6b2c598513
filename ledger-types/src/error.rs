//! Error types for the ledger engine.

use crate::context::Interrupted;
use crate::domain::Currency;

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Store-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    /// The stored row no longer matches what the caller read.
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Errors returned by the acquiring bank.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Declined(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Caller-facing errors of the payment and refund managers.
///
/// The variant tells the caller whether retrying is meaningful.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("External processing error: {0}")]
    ExternalProcessing(String),

    #[error(transparent)]
    Cancelled(#[from] Interrupted),

    #[error("Store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Retrying with the same input can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Cancelled(_) | EngineError::ExternalProcessing(_)
        )
    }

    /// Stable machine-readable classification.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::PreconditionFailed(_) => "precondition_failed",
            EngineError::ExternalProcessing(_) => "external_processing",
            EngineError::Cancelled(_) => "cancelled",
            EngineError::Store(_) => "store",
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition { .. } => EngineError::PreconditionFailed(err.to_string()),
            DomainError::ValidationError(msg) => EngineError::Validation(msg),
            e => EngineError::Validation(e.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(e) => e.into(),
            StoreError::NotFound => EngineError::NotFound("Resource not found".into()),
            StoreError::Conflict(msg) => EngineError::PreconditionFailed(msg),
            StoreError::Database(e) => EngineError::Store(e),
            StoreError::Transaction(e) => EngineError::Store(e),
        }
    }
}

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Declined(msg) => EngineError::ExternalProcessing(msg),
            GatewayError::Interrupted(i) => EngineError::Cancelled(i),
        }
    }
}
