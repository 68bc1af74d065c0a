//! Error types for the escrow ledger

use thiserror::Error;

/// Result type for escrow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Escrow errors
#[derive(Error, Debug)]
pub enum Error {
    /// Account already holds a lock
    #[error("Lock exists")]
    LockExists,

    /// Account holds no lock
    #[error("No lock")]
    NoLock,

    /// Lock end has passed
    #[error("Lock expired")]
    LockExpired,

    /// Lock end has not passed yet
    #[error("Lock not expired")]
    LockNotExpired,

    /// Lock is delegated to another account
    #[error("Lock delegated")]
    LockDelegated,

    /// Amount must be positive
    #[error("Only non zero amount")]
    NonZeroAmountRequired,

    /// Lock end must be in the future
    #[error("Only future lock end")]
    FutureLockEndRequired,

    /// Lock duration exceeds MAXTIME
    #[error("Exceeds maxtime")]
    ExceedsMaxTime,

    /// Lock end may only move forward
    #[error("Only increase lock end")]
    OnlyIncreaseLockEnd,

    /// Delegatee lock must end strictly after the delegator's
    #[error("Only delegate to longer lock")]
    OnlyDelegateToLongerLock,

    /// Delegatee holds no lock
    #[error("Delegatee has no lock")]
    DelegateeHasNoLock,

    /// Historical query for a sequence that is not in the past
    #[error("Only past sequence allowed")]
    OnlyPastSequenceAllowed,

    /// Caller is not allowed to perform a privileged operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Arithmetic overflow on amounts
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Malformed account identifier
    #[error("Invalid account id: {0}")]
    InvalidAccountId(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Precondition violation: state is untouched and the call may be retried
    /// once the caller fixes its input
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::LockExists
                | Error::NoLock
                | Error::LockExpired
                | Error::LockNotExpired
                | Error::LockDelegated
                | Error::NonZeroAmountRequired
                | Error::FutureLockEndRequired
                | Error::ExceedsMaxTime
                | Error::OnlyIncreaseLockEnd
                | Error::OnlyDelegateToLongerLock
                | Error::DelegateeHasNoLock
                | Error::OnlyPastSequenceAllowed
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(Error::LockExpired.is_precondition());
        assert!(Error::OnlyPastSequenceAllowed.is_precondition());
        assert!(!Error::Unauthorized("unlock".to_string()).is_precondition());
        assert!(!Error::Storage("disk".to_string()).is_precondition());
    }
}
