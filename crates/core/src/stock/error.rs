//! Stock ledger error types.
//!
//! Errors fall into three kinds: the referenced document has no movements
//! (not found), the request breaks a business rule (validation), or the
//! storage failed (transient, safe to retry).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use stockbook_shared::AppError;
use thiserror::Error;

use super::types::{Reference, StockKey};

/// Errors that can occur during stock ledger operations.
#[derive(Debug, Error)]
pub enum StockError {
    // ========== Not Found ==========
    /// No movements exist for the referenced document.
    #[error("No stock movements found for reference {0}")]
    ReferenceNotFound(Reference),

    // ========== Validation Errors ==========
    /// Movement quantity must be strictly positive.
    #[error("Movement quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    /// Movement quantity has more fractional digits than storage keeps.
    #[error("Movement quantity {0} has more than 4 fractional digits")]
    QuantityPrecision(Decimal),

    /// Not enough stock for a planned consumption.
    #[error("Insufficient stock for {key} on {date}: available {available}, requested {requested}")]
    InsufficientStock {
        /// The pair checked.
        key: StockKey,
        /// The business day checked.
        date: NaiveDate,
        /// Finish balance as of `date`.
        available: Decimal,
        /// Requested quantity.
        requested: Decimal,
    },

    /// Stored reference type tag is not known.
    #[error("Unknown reference type: {0}")]
    UnknownReferenceType(String),

    // ========== Engine Errors ==========
    /// Recalculation stopped part way; days before `resume_from` are committed.
    #[error("Recalculation interrupted, resume from {resume_from}: {source}")]
    Interrupted {
        /// First day that was not committed.
        resume_from: NaiveDate,
        /// The underlying failure.
        #[source]
        source: Box<StockError>,
    },

    // ========== Storage Errors ==========
    /// Storage failure (database unavailable, transaction aborted).
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Broad classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Surfaced to the caller, never retried.
    NotFound,
    /// Business failure, nothing was written.
    Validation,
    /// Infrastructure failure, retry after a cooldown.
    Transient,
}

impl StockError {
    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReferenceNotFound(_) => ErrorKind::NotFound,
            Self::NonPositiveQuantity(_)
            | Self::QuantityPrecision(_)
            | Self::InsufficientStock { .. }
            | Self::UnknownReferenceType(_) => ErrorKind::Validation,
            Self::Interrupted { source, .. } => source.kind(),
            Self::Storage(_) => ErrorKind::Transient,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ReferenceNotFound(_) => "REFERENCE_NOT_FOUND",
            Self::NonPositiveQuantity(_) => "NON_POSITIVE_QUANTITY",
            Self::QuantityPrecision(_) => "QUANTITY_PRECISION",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::UnknownReferenceType(_) => "UNKNOWN_REFERENCE_TYPE",
            Self::Interrupted { .. } => "RECALCULATION_INTERRUPTED",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NonPositiveQuantity(_)
            | Self::QuantityPrecision(_)
            | Self::UnknownReferenceType(_) => 400,
            Self::ReferenceNotFound(_) => 404,
            Self::InsufficientStock { .. } => 422,
            Self::Interrupted { source, .. } => source.http_status_code(),
            Self::Storage(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Day a failed recalculation should restart from, if it got that far.
    #[must_use]
    pub fn resume_from(&self) -> Option<NaiveDate> {
        match self {
            Self::Interrupted { resume_from, .. } => Some(*resume_from),
            _ => None,
        }
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        let message = err.to_string();
        match err {
            StockError::ReferenceNotFound(_) => Self::NotFound(message),
            StockError::NonPositiveQuantity(_)
            | StockError::QuantityPrecision(_)
            | StockError::UnknownReferenceType(_) => Self::Validation(message),
            StockError::InsufficientStock { .. } => Self::BusinessRule(message),
            StockError::Interrupted { .. } | StockError::Storage(_) => Self::Database(message),
        }
    }
}
