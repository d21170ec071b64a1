use std::io;
use std::path::PathBuf;

use crate::lock::AcquireError;
use crate::model::PatchError;

/// Which invariant a rejected booking would have broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Another active booking starts within one slot on the same table and date.
    Table,
    /// The employee already holds a booking at exactly this date and time.
    Employee,
}

impl ConflictKind {
    pub fn label(self) -> &'static str {
        match self {
            ConflictKind::Table => "table",
            ConflictKind::Employee => "employee",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("row {index} out of range (table has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },
    #[error("WAL writer shut down")]
    WriterClosed,
    #[error("{} is already owned by another store", .0.display())]
    AlreadyOwned(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{}", conflict_message(.0))]
    Conflict(ConflictKind),
    #[error("Ref not found")]
    NotFound(String),
    #[error("System busy. Please try again in a moment.")]
    Busy,
    #[error("Server Error: {0}")]
    Store(#[from] StoreError),
}

fn conflict_message(kind: &ConflictKind) -> &'static str {
    match kind {
        ConflictKind::Table => {
            "This table has already been booked for this date and time slot. Please choose another table or time."
        }
        ConflictKind::Employee => {
            "You already have a booking for this specific time slot. Please choose another time or table."
        }
    }
}

impl EngineError {
    /// Stable machine-readable code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Conflict(_) => "conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::Busy => "busy",
            EngineError::Store(_) => "store",
        }
    }

    /// Busy and conflict can succeed on retry (later, or with other parameters).
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Busy | EngineError::Conflict(_))
    }
}

impl From<AcquireError> for EngineError {
    fn from(e: AcquireError) -> Self {
        match e {
            AcquireError::Timeout(_) => EngineError::Busy,
        }
    }
}

impl From<PatchError> for EngineError {
    fn from(e: PatchError) -> Self {
        EngineError::Validation(e.to_string())
    }
}
