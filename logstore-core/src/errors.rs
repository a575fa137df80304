use thiserror::Error;

/// The stable, backend-independent error taxonomy for the driver contract (spec §7).
///
/// Only [`StoreError::InvalidCursor`] and [`StoreError::VersionMismatch`] are guaranteed
/// reachable from user input across every backend; everything else wraps whatever the
/// underlying store surfaced. `not-found` has no variant here on purpose: the contract
/// represents absence as an empty list or `None`, never as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("cursor version mismatch: {0}")]
    VersionMismatch(String),

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("transient backend error: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("fatal backend error: {0}")]
    Fatal(#[source] anyhow::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    /// Coarse classification a caller can switch on when deciding whether to retry
    /// (spec §7 "Recovery" column).
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidCursor(_) => ErrorKind::InvalidCursor,
            StoreError::VersionMismatch(_) => ErrorKind::VersionMismatch,
            StoreError::UnsupportedFilter(_) => ErrorKind::UnsupportedFilter,
            StoreError::Invalid(_) => ErrorKind::Invalid,
            StoreError::Transient(_) => ErrorKind::TransientBackend,
            StoreError::Fatal(_) | StoreError::Internal(_) => ErrorKind::FatalBackend,
            StoreError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientBackend)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCursor,
    VersionMismatch,
    UnsupportedFilter,
    Invalid,
    TransientBackend,
    FatalBackend,
    Cancelled,
}
