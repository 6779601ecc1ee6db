//! Outcome types for the acquisition pipeline
//!
//! Per-attempt failures are data, not exceptions: the retry loop matches on
//! [`AttemptFailure`] and every variant except `Cancelled` means "back off and
//! try again with a fresh CAPTCHA".

use thiserror::Error;

use crate::infrastructure::{ParsingError, StorageError, TransportError};

/// Why a single solve/validate/fetch cycle did not produce an image
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("OCR produced no text")]
    EmptyGuess,

    #[error("validation rejected: {message}")]
    Rejected { message: String },

    #[error("transient failure: {cause}")]
    Transient { cause: String },

    #[error("cancelled")]
    Cancelled,
}

impl AttemptFailure {
    pub fn transient(cause: impl ToString) -> Self {
        Self::Transient {
            cause: cause.to_string(),
        }
    }
}

impl From<TransportError> for AttemptFailure {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Cancelled => Self::Cancelled,
            other => Self::transient(other),
        }
    }
}

/// Terminal state of [`acquire_image`](super::RetryOrchestrator::acquire_image)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    /// Image written to its destination
    Saved,
    /// Attempt budget spent; a failure record was appended
    Exhausted,
    /// Shutdown requested mid-acquisition; nothing recorded
    Cancelled,
}

/// Item-level failures; contained by the batch runner, never fatal to a run
#[derive(Error, Debug)]
pub enum ItemError {
    /// The detail page lacks an item id or gallery; not retried
    #[error("malformed detail page: {0}")]
    Structural(#[from] ParsingError),

    #[error("detail page unavailable: {0}")]
    Transport(#[from] TransportError),

    #[error("detail page returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cancelled")]
    Cancelled,
}

impl ItemError {
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }
}
